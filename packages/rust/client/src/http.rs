//! REST implementation of [`Backend`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use url::Url;

use annodemo_shared::{AnnoDemoError, AnnotationId, BackendConfig, Credentials, ResourceId, Result};

use crate::Backend;
use crate::types::{BodyOperation, Event, NewAnnotation, NewResource};

/// User-Agent string for backend requests.
const USER_AGENT: &str = concat!("annodemo/", env!("CARGO_PKG_VERSION"));

/// Longest error body echoed into an `Api` error.
const MAX_ERROR_BODY: usize = 500;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct PasswordTokenResponse {
    token: String,
}

#[derive(Deserialize)]
struct RefreshTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct EventsResponse {
    events: Vec<StoredEvent>,
}

#[derive(Deserialize)]
struct StoredEvent {
    event: RawEvent,
    metadata: EventMetadata,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventMetadata {
    sequence_number: u64,
}

// ---------------------------------------------------------------------------
// HttpBackend
// ---------------------------------------------------------------------------

/// Authenticated REST client for the annotation backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
    token: String,
}

impl HttpBackend {
    /// Build a client and exchange `credentials` for a bearer token.
    #[instrument(skip_all, fields(url = %config.resolved_url()))]
    pub async fn connect(config: &BackendConfig, credentials: &Credentials) -> Result<Self> {
        let client = build_client(config.timeout_secs)?;
        let base = parse_base(&config.resolved_url())?;
        let token = authenticate(&client, &base, credentials).await?;
        info!("authenticated with backend");
        Ok(Self {
            client,
            base,
            token,
        })
    }

    /// Build a client around an already-issued bearer token.
    pub fn with_token(base_url: &str, token: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout_secs)?,
            base: parse_base(base_url)?,
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        endpoint(&self.base, path)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    #[instrument(skip_all, fields(name = %resource.name, bytes = resource.content.len()))]
    async fn create_resource(&self, resource: NewResource) -> Result<ResourceId> {
        let entity_types = serde_json::to_string(&resource.entity_types)
            .map_err(|e| AnnoDemoError::parse(format!("failed to encode entity types: {e}")))?;
        let file = Part::bytes(resource.content)
            .file_name(resource.name.clone())
            .mime_str(&resource.format)
            .map_err(|e| AnnoDemoError::validation(format!("invalid format '{}': {e}", resource.format)))?;
        let form = Form::new()
            .text("name", resource.name)
            .text("format", resource.format)
            .text("entityTypes", entity_types)
            .part("file", file);

        let response = self
            .client
            .post(self.endpoint("resources")?)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(network)?;
        let body: Value = read_json(response).await?;

        let id = extract_id(&body, "resource")
            .ok_or_else(|| AnnoDemoError::parse("create resource response has no id"))?;
        debug!(%id, "resource created");
        Ok(ResourceId(id))
    }

    #[instrument(skip_all, fields(resource = %annotation.resource, motivation = ?annotation.motivation))]
    async fn create_annotation(&self, annotation: NewAnnotation) -> Result<AnnotationId> {
        let payload = json!({
            "motivation": annotation.motivation,
            "target": {
                "source": annotation.resource,
                "selector": annotation.selectors,
            },
            "body": annotation.body,
        });

        let path = format!("resources/{}/annotations", annotation.resource);
        let response = self
            .client
            .post(self.endpoint(&path)?)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await
            .map_err(network)?;
        let body: Value = read_json(response).await?;

        let id = extract_id(&body, "annotation")
            .ok_or_else(|| AnnoDemoError::parse("create annotation response has no id"))?;
        debug!(%id, "annotation created");
        Ok(AnnotationId(id))
    }

    #[instrument(skip_all, fields(resource = %resource, annotation = %annotation, ops = operations.len()))]
    async fn update_annotation_body(
        &self,
        resource: &ResourceId,
        annotation: &AnnotationId,
        operations: Vec<BodyOperation>,
    ) -> Result<()> {
        let path = format!("resources/{resource}/annotations/{annotation}/body");
        let response = self
            .client
            .put(self.endpoint(&path)?)
            .bearer_auth(&self.token)
            .json(&json!({ "operations": operations }))
            .send()
            .await
            .map_err(network)?;
        check_status(response).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(resource = %resource))]
    async fn get_events(&self, resource: &ResourceId) -> Result<Vec<Event>> {
        let path = format!("resources/{resource}/events");
        let response = self
            .client
            .get(self.endpoint(&path)?)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(network)?;
        let body: EventsResponse = read_json(response).await?;

        let events: Vec<Event> = body
            .events
            .into_iter()
            .map(|stored| Event {
                sequence: stored.metadata.sequence_number,
                event_type: stored.event.event_type,
                timestamp: stored.event.timestamp,
                user_id: stored.event.user_id,
                payload: stored.event.payload,
            })
            .collect();
        debug!(count = events.len(), "events fetched");
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// Exchange credentials for a bearer token.
async fn authenticate(client: &Client, base: &Url, credentials: &Credentials) -> Result<String> {
    match credentials {
        Credentials::Password { email, password } => {
            let response = client
                .post(endpoint(base, "api/tokens/password")?)
                .json(&json!({ "email": email, "password": password }))
                .send()
                .await
                .map_err(network)?;
            let body: PasswordTokenResponse = read_json(response).await.map_err(auth_error)?;
            Ok(body.token)
        }
        Credentials::Token(token) => {
            let response = client
                .post(endpoint(base, "api/tokens/refresh")?)
                .json(&json!({ "refreshToken": token }))
                .send()
                .await
                .map_err(network)?;
            let body: RefreshTokenResponse = read_json(response).await.map_err(auth_error)?;
            Ok(body.access_token)
        }
    }
}

fn auth_error(err: AnnoDemoError) -> AnnoDemoError {
    match err {
        AnnoDemoError::Api { status, message } => {
            AnnoDemoError::Auth(format!("token request rejected (HTTP {status}): {message}"))
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnnoDemoError::Network(format!("failed to build HTTP client: {e}")))
}

/// Parse the base URL so relative joins keep any path prefix.
fn parse_base(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| AnnoDemoError::config(format!("invalid backend URL '{raw}': {e}")))
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| AnnoDemoError::config(format!("invalid endpoint '{path}': {e}")))
}

fn network(err: reqwest::Error) -> AnnoDemoError {
    AnnoDemoError::Network(err.to_string())
}

/// Map non-2xx responses to `Api` errors carrying the (truncated) body.
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut message = response.text().await.unwrap_or_default();
    if message.len() > MAX_ERROR_BODY {
        let cut = (0..=MAX_ERROR_BODY)
            .rev()
            .find(|&i| message.is_char_boundary(i))
            .unwrap_or(0);
        message.truncate(cut);
    }
    if message.is_empty() {
        message = status.canonical_reason().unwrap_or("request failed").to_string();
    }
    Err(AnnoDemoError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| AnnoDemoError::parse(format!("invalid backend response: {e}")))
}

/// Find an id in `{<container>: {id|@id}}` or a top-level `id|@id`.
/// URI-shaped ids keep only their last path segment.
fn extract_id(body: &Value, container: &str) -> Option<String> {
    let lookup = |v: &Value| {
        v.get("id")
            .or_else(|| v.get("@id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let raw = body.get(container).and_then(lookup).or_else(|| lookup(body))?;
    let id = match raw.rsplit_once('/') {
        Some((_, last)) if raw.contains("://") && !last.is_empty() => last.to_string(),
        _ => raw,
    };
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BodyItem, Motivation, Selector};

    use wiremock::matchers::{body_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::with_token(&server.uri(), "secret", 5).unwrap()
    }

    #[test]
    fn extract_id_variants() {
        assert_eq!(
            extract_id(&json!({"resource": {"@id": "http://h/resources/abc"}}), "resource"),
            Some("abc".into())
        );
        assert_eq!(
            extract_id(&json!({"annotation": {"id": "ann-1"}}), "annotation"),
            Some("ann-1".into())
        );
        assert_eq!(extract_id(&json!({"id": "top"}), "resource"), Some("top".into()));
        assert_eq!(extract_id(&json!({"other": 1}), "resource"), None);
    }

    #[test]
    fn base_url_keeps_prefix() {
        let base = parse_base("http://host:4000/api-prefix").unwrap();
        assert_eq!(
            endpoint(&base, "resources").unwrap().as_str(),
            "http://host:4000/api-prefix/resources"
        );
    }

    #[tokio::test]
    async fn password_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/password"))
            .and(body_json(json!({"email": "a@b.c", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "jwt-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = BackendConfig {
            url: server.uri(),
            ..BackendConfig::default()
        };
        let creds = Credentials::Password {
            email: "a@b.c".into(),
            password: "pw".into(),
        };
        let backend = HttpBackend::connect(&config, &creds).await.unwrap();
        assert_eq!(backend.token, "jwt-1");
    }

    #[tokio::test]
    async fn refresh_token_exchange_and_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/refresh"))
            .and(body_json(json!({"refreshToken": "good"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "jwt-2"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/tokens/refresh"))
            .and(body_json(json!({"refreshToken": "bad"})))
            .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
            .mount(&server)
            .await;

        let config = BackendConfig {
            url: server.uri(),
            ..BackendConfig::default()
        };
        let ok = HttpBackend::connect(&config, &Credentials::Token("good".into()))
            .await
            .unwrap();
        assert_eq!(ok.token, "jwt-2");

        let err = HttpBackend::connect(&config, &Credentials::Token("bad".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnnoDemoError::Auth(ref m) if m.contains("401") && m.contains("expired")));
    }

    #[tokio::test]
    async fn create_resource_sends_multipart() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resources"))
            .and(header("authorization", "Bearer secret"))
            .and(body_string_contains("name=\"entityTypes\""))
            .and(body_string_contains("[\"legal\",\"opinion\"]"))
            .and(body_string_contains("Opinion text"))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"resource": {"@id": "http://backend/resources/res-9"}})),
            )
            .mount(&server)
            .await;

        let id = backend(&server)
            .create_resource(NewResource {
                name: "Opinion - Part 1".into(),
                content: b"Opinion text".to_vec(),
                format: "text/markdown".into(),
                entity_types: vec!["legal".into(), "opinion".into()],
            })
            .await
            .unwrap();
        assert_eq!(id, ResourceId::from("res-9"));
    }

    #[tokio::test]
    async fn create_annotation_and_update_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resources/toc-1/annotations"))
            .and(body_json(json!({
                "motivation": "linking",
                "target": {
                    "source": "toc-1",
                    "selector": [{"type": "TextPositionSelector", "start": 0, "end": 4}]
                },
                "body": []
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"annotation": {"id": "ann-1"}})))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/resources/toc-1/annotations/ann-1/body"))
            .and(body_json(json!({
                "operations": [{"op": "add", "item": {"type": "SpecificResource", "source": "doc-1", "purpose": "linking"}}]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend(&server);
        let ann = backend
            .create_annotation(NewAnnotation {
                resource: "toc-1".into(),
                selectors: vec![Selector::TextPosition { start: 0, end: 4 }],
                body: vec![],
                motivation: Motivation::Linking,
            })
            .await
            .unwrap();
        assert_eq!(ann, AnnotationId::from("ann-1"));

        backend
            .update_annotation_body(
                &"toc-1".into(),
                &ann,
                vec![BodyOperation::Add {
                    item: BodyItem::link("doc-1".into()),
                }],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn events_are_flattened() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/res-1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "events": [
                    {"event": {"type": "resource.created", "timestamp": "2026-01-01T00:00:00Z", "userId": "u1", "payload": {"name": "x"}},
                     "metadata": {"sequenceNumber": 1}},
                    {"event": {"type": "annotation.added"},
                     "metadata": {"sequenceNumber": 2}}
                ]
            })))
            .mount(&server)
            .await;

        let events = backend(&server).get_events(&"res-1".into()).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "resource.created");
        assert_eq!(events[0].user_id.as_deref(), Some("u1"));
        assert_eq!(events[1].sequence, 2);
        assert!(events[1].payload.is_null());
    }

    #[tokio::test]
    async fn non_success_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resources/missing/events"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such resource"))
            .mount(&server)
            .await;

        let err = backend(&server).get_events(&"missing".into()).await.unwrap_err();
        assert!(matches!(
            err,
            AnnoDemoError::Api { status: 404, ref message } if message == "no such resource"
        ));
    }
}

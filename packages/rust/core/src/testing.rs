//! In-memory [`Backend`] for tests. Records every call and emits the
//! events the real backend would.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use annodemo_client::{Backend, BodyOperation, Event, NewAnnotation, NewResource};
use annodemo_shared::{AnnoDemoError, AnnotationId, ResourceId, Result};

#[derive(Default)]
struct Inner {
    next_id: u64,
    sequence: u64,
    resources: Vec<(ResourceId, NewResource)>,
    annotations: Vec<NewAnnotation>,
    updates: Vec<(ResourceId, AnnotationId, Vec<BodyOperation>)>,
    events: HashMap<ResourceId, Vec<Event>>,
}

impl Inner {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn emit(&mut self, resource: &ResourceId, event_type: &str) {
        self.sequence += 1;
        let event = Event {
            sequence: self.sequence,
            event_type: event_type.to_string(),
            timestamp: None,
            user_id: Some("tester".into()),
            payload: json!({}),
        };
        self.events.entry(resource.clone()).or_default().push(event);
    }
}

#[derive(Default)]
pub(crate) struct MemoryBackend {
    inner: Mutex<Inner>,
    failing_names: Vec<String>,
    fail_updates: bool,
}

impl MemoryBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `create_resource` fails for this name.
    pub(crate) fn fail_resources_named(mut self, name: &str) -> Self {
        self.failing_names.push(name.to_string());
        self
    }

    /// Every `update_annotation_body` fails.
    pub(crate) fn fail_body_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    /// Create a resource directly, with its `resource.created` event.
    pub(crate) fn seed_resource(&self, name: &str) -> ResourceId {
        let mut inner = self.inner.lock().unwrap();
        let id = ResourceId(inner.next_id("res"));
        inner.emit(&id, "resource.created");
        inner.resources.push((
            id.clone(),
            NewResource {
                name: name.into(),
                content: vec![],
                format: "text/plain".into(),
                entity_types: vec![],
            },
        ));
        id
    }

    /// Append an arbitrary event to a resource's history.
    pub(crate) fn push_event(&self, resource: &ResourceId, event_type: &str) {
        self.inner.lock().unwrap().emit(resource, event_type);
    }

    /// Replace a resource's history wholesale.
    pub(crate) fn set_events(&self, resource: &ResourceId, events: Vec<Event>) {
        self.inner
            .lock()
            .unwrap()
            .events
            .insert(resource.clone(), events);
    }

    pub(crate) fn resources(&self) -> Vec<(ResourceId, NewResource)> {
        self.inner.lock().unwrap().resources.clone()
    }

    pub(crate) fn annotations(&self) -> Vec<NewAnnotation> {
        self.inner.lock().unwrap().annotations.clone()
    }

    pub(crate) fn body_updates(&self) -> Vec<(ResourceId, AnnotationId, Vec<BodyOperation>)> {
        self.inner.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_resource(&self, resource: NewResource) -> Result<ResourceId> {
        if self.failing_names.contains(&resource.name) {
            return Err(AnnoDemoError::Api {
                status: 500,
                message: format!("cannot store {}", resource.name),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        let id = ResourceId(inner.next_id("res"));
        inner.emit(&id, "resource.created");
        inner.resources.push((id.clone(), resource));
        Ok(id)
    }

    async fn create_annotation(&self, annotation: NewAnnotation) -> Result<AnnotationId> {
        let mut inner = self.inner.lock().unwrap();
        let id = AnnotationId(inner.next_id("ann"));
        inner.emit(&annotation.resource, "annotation.added");
        inner.annotations.push(annotation);
        Ok(id)
    }

    async fn update_annotation_body(
        &self,
        resource: &ResourceId,
        annotation: &AnnotationId,
        operations: Vec<BodyOperation>,
    ) -> Result<()> {
        if self.fail_updates {
            return Err(AnnoDemoError::Api {
                status: 409,
                message: "body update rejected".into(),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        inner.emit(resource, "annotation.body.updated");
        inner
            .updates
            .push((resource.clone(), annotation.clone(), operations));
        Ok(())
    }

    async fn get_events(&self, resource: &ResourceId) -> Result<Vec<Event>> {
        self.inner
            .lock()
            .unwrap()
            .events
            .get(resource)
            .cloned()
            .ok_or_else(|| AnnoDemoError::Api {
                status: 404,
                message: format!("no resource {resource}"),
            })
    }
}

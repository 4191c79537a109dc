//! Dataset sources: downloading into the local cache and loading documents
//! back out of it.
//!
//! `download` is the only step that touches the network. Everything after it
//! reads `<data_dir>/<dataset>/source.<ext>`, so a dataset can be re-loaded
//! offline and repeatedly.

mod arxiv;
mod cache;
mod hugging_face;
mod local;

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, info, instrument, warn};

use annodemo_shared::{AnnoDemoError, DatasetConfig, Document, Result, SourceConfig, SourcesConfig};

pub use arxiv::parse_feed;
pub use cache::{SourceCache, compute_hash};

/// User-Agent string for source downloads.
const USER_AGENT: &str = concat!("annodemo/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Timeout in seconds for a single download request.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// DownloadResult
// ---------------------------------------------------------------------------

/// Outcome of downloading one dataset.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Cached source file.
    pub path: PathBuf,
    /// Size of the cached source in bytes.
    pub bytes: u64,
    /// Hex SHA-256 of the cached source.
    pub sha256: String,
    /// `true` when an existing cache entry was reused.
    pub cached: bool,
}

/// Cache file extension for a source kind.
pub fn cache_extension(source: &SourceConfig) -> &'static str {
    match source {
        SourceConfig::Html { .. } => "html",
        SourceConfig::Arxiv { .. } => "xml",
        SourceConfig::Gutenberg { .. } => "txt",
        SourceConfig::HuggingFace { .. } | SourceConfig::Local { .. } => "json",
    }
}

// ---------------------------------------------------------------------------
// SourceClient
// ---------------------------------------------------------------------------

/// Downloads dataset sources over HTTP (or snapshots local files).
pub struct SourceClient {
    client: Client,
    config: SourcesConfig,
}

impl SourceClient {
    /// Create a client for the configured source endpoints.
    pub fn new(config: &SourcesConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| AnnoDemoError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Fetch the dataset's source into `cache`.
    ///
    /// An existing cache entry is reused unless `force` is set.
    #[instrument(skip_all, fields(dataset = %dataset.name, kind = dataset.source.kind(), force = force))]
    pub async fn download(
        &self,
        dataset: &DatasetConfig,
        cache: &SourceCache,
        force: bool,
    ) -> Result<DownloadResult> {
        let ext = cache_extension(&dataset.source);
        let path = cache.source_path(&dataset.name, ext);

        if path.exists() && !force {
            let sha256 = cache.stored_hash(&dataset.name, ext)?;
            let bytes = std::fs::metadata(&path)
                .map_err(|e| AnnoDemoError::io(&path, e))?
                .len();
            info!(path = %path.display(), bytes, "using cached source");
            return Ok(DownloadResult {
                path,
                bytes,
                sha256,
                cached: true,
            });
        }

        let body = self.fetch_source(&dataset.source).await?;
        let sha256 = cache.write(&dataset.name, ext, &body)?;

        info!(path = %path.display(), bytes = body.len(), %sha256, "source downloaded");

        Ok(DownloadResult {
            path,
            bytes: body.len() as u64,
            sha256,
            cached: false,
        })
    }

    async fn fetch_source(&self, source: &SourceConfig) -> Result<Vec<u8>> {
        match source {
            SourceConfig::Html { url, .. } => self.fetch_bytes(url).await,
            SourceConfig::Arxiv { id } => {
                let url = arxiv::query_url(&self.config.arxiv_api, id);
                let body = self.fetch_bytes(&url).await?;
                // Fail at download time rather than on first load.
                arxiv::parse_feed(&String::from_utf8_lossy(&body))?;
                Ok(body)
            }
            SourceConfig::Gutenberg { id } => {
                let url = format!(
                    "{}/cache/epub/{id}/pg{id}.txt",
                    self.config.gutenberg_base.trim_end_matches('/')
                );
                self.fetch_bytes(&url).await
            }
            SourceConfig::HuggingFace {
                dataset,
                config,
                split,
                length,
                ..
            } => self.fetch_rows(dataset, config, split, *length).await,
            SourceConfig::Local { path } => {
                let docs = local::read_documents(Path::new(path))?;
                serde_json::to_vec_pretty(&docs)
                    .map_err(|e| AnnoDemoError::parse(format!("failed to snapshot local files: {e}")))
            }
        }
    }

    async fn fetch_rows(
        &self,
        dataset: &str,
        config: &str,
        split: &str,
        length: usize,
    ) -> Result<Vec<u8>> {
        let mut rows = Vec::new();
        let mut offset = 0;

        while offset < length {
            let page_len = (length - offset).min(hugging_face::MAX_PAGE_LENGTH);
            let url = hugging_face::rows_url(
                &self.config.hugging_face_api,
                dataset,
                config,
                split,
                offset,
                page_len,
            )?;
            let body = self.fetch_bytes(url.as_str()).await?;
            let page: hugging_face::RowsPage = serde_json::from_slice(&body)
                .map_err(|e| AnnoDemoError::parse(format!("invalid rows response: {e}")))?;

            let fetched = page.rows.len();
            rows.extend(page.rows);
            offset += page_len;
            debug!(fetched, total = rows.len(), "fetched rows page");

            let exhausted = page.num_rows_total.is_some_and(|total| offset >= total);
            if fetched < page_len || exhausted {
                break;
            }
        }

        serde_json::to_vec_pretty(&hugging_face::CachedRows { rows })
            .map_err(|e| AnnoDemoError::parse(format!("failed to serialize rows: {e}")))
    }

    /// GET `url`, rejecting non-2xx statuses and oversized bodies.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!(%url, "fetching");
        let max = self.config.max_download_bytes;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnnoDemoError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnnoDemoError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > max {
                return Err(AnnoDemoError::validation(format!(
                    "{url}: response too large ({len} bytes, max {max})"
                )));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AnnoDemoError::Network(format!("{url}: failed to read body: {e}")))?;

        if body.len() as u64 > max {
            return Err(AnnoDemoError::validation(format!(
                "{url}: response too large ({} bytes, max {max})",
                body.len()
            )));
        }

        Ok(body.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read the dataset's cached source and format it into documents.
///
/// Fails with `NotDownloaded` when the cache entry is missing. Documents
/// that format to empty text are dropped.
#[instrument(skip_all, fields(dataset = %dataset.name, kind = dataset.source.kind()))]
pub fn load_documents(dataset: &DatasetConfig, cache: &SourceCache) -> Result<Vec<Document>> {
    let ext = cache_extension(&dataset.source);
    let raw = cache.read(&dataset.name, ext)?;

    let docs = match &dataset.source {
        SourceConfig::Html {
            content_selector, ..
        } => {
            let page = annodemo_text::html_to_text(
                &String::from_utf8_lossy(&raw),
                content_selector.as_deref(),
            )?;
            vec![Document {
                title: document_title(dataset, page.title),
                content: page.text,
            }]
        }
        SourceConfig::Arxiv { .. } => {
            let entry = arxiv::parse_feed(&String::from_utf8_lossy(&raw))?;
            let content = annodemo_text::format_arxiv(&entry);
            let found = entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
            vec![Document {
                title: document_title(dataset, Some(found)),
                content,
            }]
        }
        SourceConfig::Gutenberg { .. } => vec![Document {
            title: dataset.title().to_string(),
            content: annodemo_text::strip_gutenberg_boilerplate(&String::from_utf8_lossy(&raw)),
        }],
        SourceConfig::HuggingFace {
            text_field,
            title_field,
            ..
        } => {
            let cached: hugging_face::CachedRows = serde_json::from_slice(&raw)
                .map_err(|e| AnnoDemoError::parse(format!("invalid cached rows: {e}")))?;
            hugging_face::rows_to_documents(
                &cached.rows,
                text_field,
                title_field.as_deref(),
                dataset.title(),
            )?
        }
        SourceConfig::Local { .. } => {
            let snapshot: Vec<Document> = serde_json::from_slice(&raw)
                .map_err(|e| AnnoDemoError::parse(format!("invalid local snapshot: {e}")))?;
            snapshot
                .into_iter()
                .map(|doc| Document {
                    title: doc.title,
                    content: annodemo_text::format_plain(&doc.content),
                })
                .collect()
        }
    };

    let total = docs.len();
    let docs: Vec<Document> = docs
        .into_iter()
        .filter(|doc| {
            let keep = !doc.content.trim().is_empty();
            if !keep {
                warn!(title = %doc.title, "document is empty after formatting, dropping");
            }
            keep
        })
        .collect();

    info!(documents = docs.len(), dropped = total - docs.len(), "documents loaded");
    Ok(docs)
}

/// Configured display name wins; otherwise the title found in the source,
/// then the dataset name.
fn document_title(dataset: &DatasetConfig, found: Option<String>) -> String {
    dataset
        .display_name
        .clone()
        .or(found)
        .unwrap_or_else(|| dataset.name.clone())
}

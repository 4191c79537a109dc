//! Dataset commands: `download`, `load`, `annotate`, `validate`.
//!
//! Each command takes a [`PipelineContext`] and a [`ProgressReporter`] and
//! runs its stages one after another. Stage failures abort the command;
//! per-item failures inside upload and annotation loops are collected into
//! the report instead.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use annodemo_client::{Backend, HttpBackend, NewResource};
use annodemo_shared::{
    AnnoDemoError, AppConfig, BackendConfig, Chunk, ChunkingPolicy, DatasetConfig, DatasetState,
    Document, ResourceId, Result, TextSpan, resolve_credentials,
};
use annodemo_sources::{SourceCache, SourceClient};
use annodemo_state::StateStore;

use crate::citations::detector_from_config;
use crate::toc::{build_toc, toc_name};
use crate::upload::{ItemFailure, annotate_citations, create_references, upload_chunks};
use crate::validate::{ValidationReport, validate_state};

/// Format of the generated table-of-contents resource.
const TOC_FORMAT: &str = "text/markdown";

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A pipeline command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Download,
    Load,
    Annotate,
    Validate,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::Download,
        Command::Load,
        Command::Annotate,
        Command::Validate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Load => "load",
            Self::Annotate => "annotate",
            Self::Validate => "validate",
        }
    }

    /// One-line description for help screens.
    pub fn description(self) -> &'static str {
        match self {
            Self::Download => "Fetch the source into the local cache",
            Self::Load => "Chunk, upload, build the table of contents",
            Self::Annotate => "Detect citations and annotate them",
            Self::Validate => "Check uploaded resources via their events",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = AnnoDemoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                AnnoDemoError::config(format!(
                    "unknown command '{s}' (expected download, load, annotate or validate)"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item of a per-item loop.
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called when an item fails and the loop continues.
    fn warn(&self, message: &str);
    /// Called when the command completes.
    fn done(&self, report: &CommandReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn warn(&self, _message: &str) {}
    fn done(&self, _report: &CommandReport) {}
}

// ---------------------------------------------------------------------------
// Backend factory
// ---------------------------------------------------------------------------

/// Produces an authenticated backend. Commands that need the backend call
/// it once, after their local work succeeded.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Backend>>;
}

/// Connects to the REST backend with credentials from the environment.
pub struct HttpBackendFactory {
    config: BackendConfig,
}

impl HttpBackendFactory {
    pub fn new(config: BackendConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendFactory for HttpBackendFactory {
    async fn connect(&self) -> Result<Arc<dyn Backend>> {
        let credentials = resolve_credentials(&self.config)?;
        let backend = HttpBackend::connect(&self.config, &credentials).await?;
        Ok(Arc::new(backend))
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a command needs. Cheap enough to clone into a background
/// task.
#[derive(Clone)]
pub struct PipelineContext {
    pub app: AppConfig,
    pub dataset: DatasetConfig,
    pub data_dir: PathBuf,
    pub backends: Arc<dyn BackendFactory>,
}

impl PipelineContext {
    /// Context for `dataset`, with the data directory from `[defaults]`.
    pub fn new(app: &AppConfig, dataset: &DatasetConfig, backends: Arc<dyn BackendFactory>) -> Self {
        Self {
            data_dir: app.defaults.data_dir_path(),
            app: app.clone(),
            dataset: dataset.clone(),
            backends,
        }
    }

    pub fn cache(&self) -> SourceCache {
        SourceCache::new(&self.data_dir)
    }

    pub fn state_store(&self) -> StateStore {
        StateStore::new(&self.data_dir)
    }

    /// How far the dataset has come, judged from local files only.
    pub fn status(&self) -> DatasetStatus {
        let ext = annodemo_sources::cache_extension(&self.dataset.source);
        DatasetStatus {
            downloaded: self.cache().source_path(&self.dataset.name, ext).exists(),
            loaded: self.state_store().exists(&self.dataset.name),
        }
    }
}

/// Local progress of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetStatus {
    pub downloaded: bool,
    pub loaded: bool,
}

impl DatasetStatus {
    pub fn label(self) -> &'static str {
        match (self.downloaded, self.loaded) {
            (_, true) => "loaded",
            (true, false) => "downloaded",
            (false, false) => "new",
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of `download`.
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub dataset: String,
    pub path: PathBuf,
    pub bytes: u64,
    pub sha256: String,
    pub cached: bool,
    pub elapsed: Duration,
}

/// Result of `load`.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub dataset: String,
    pub documents: usize,
    pub chunks: usize,
    pub uploaded: usize,
    pub toc_id: Option<ResourceId>,
    pub references: usize,
    pub references_linked: usize,
    pub failures: Vec<ItemFailure>,
    pub state_path: PathBuf,
    pub elapsed: Duration,
}

/// Result of `annotate`.
#[derive(Debug, Clone)]
pub struct AnnotateReport {
    pub dataset: String,
    /// Set when nothing was done, with the reason.
    pub skipped: Option<String>,
    pub detector: Option<String>,
    pub pieces: usize,
    pub citations: usize,
    pub annotations: usize,
    pub failures: Vec<ItemFailure>,
    pub elapsed: Duration,
}

/// Result of any command.
#[derive(Debug, Clone)]
pub enum CommandReport {
    Download(DownloadReport),
    Load(LoadReport),
    Annotate(AnnotateReport),
    Validate(ValidationReport),
}

impl CommandReport {
    /// `false` only for a validation with failed checks.
    pub fn succeeded(&self) -> bool {
        match self {
            Self::Validate(report) => report.passed(),
            _ => true,
        }
    }
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[ItemFailure]) -> fmt::Result {
    if failures.is_empty() {
        return Ok(());
    }
    writeln!(f, "  Failures:    {}", failures.len())?;
    for failure in failures {
        writeln!(f, "    ✗ {failure}")?;
    }
    Ok(())
}

impl fmt::Display for DownloadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.cached { "Using cached" } else { "Downloaded" };
        writeln!(f, "{verb} source for '{}'", self.dataset)?;
        writeln!(f, "  Path:        {}", self.path.display())?;
        writeln!(f, "  Size:        {} bytes", self.bytes)?;
        writeln!(f, "  SHA-256:     {}", self.sha256)?;
        writeln!(f, "  Elapsed:     {:.1}s", self.elapsed.as_secs_f64())
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Loaded '{}'", self.dataset)?;
        writeln!(f, "  Documents:   {}", self.documents)?;
        writeln!(f, "  Chunks:      {} ({} uploaded)", self.chunks, self.uploaded)?;
        match &self.toc_id {
            Some(id) => writeln!(
                f,
                "  ToC:         {id} ({}/{} references linked)",
                self.references_linked, self.references
            )?,
            None => writeln!(f, "  ToC:         (none)")?,
        }
        writeln!(f, "  State:       {}", self.state_path.display())?;
        writeln!(f, "  Elapsed:     {:.1}s", self.elapsed.as_secs_f64())?;
        write_failures(f, &self.failures)
    }
}

impl fmt::Display for AnnotateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(reason) = &self.skipped {
            return writeln!(f, "Nothing to annotate for '{}': {reason}", self.dataset);
        }
        writeln!(f, "Annotated '{}'", self.dataset)?;
        if let Some(detector) = &self.detector {
            writeln!(f, "  Detector:    {detector}")?;
        }
        writeln!(f, "  Pieces:      {}", self.pieces)?;
        writeln!(f, "  Citations:   {}", self.citations)?;
        writeln!(f, "  Annotations: {}", self.annotations)?;
        writeln!(f, "  Elapsed:     {:.1}s", self.elapsed.as_secs_f64())?;
        write_failures(f, &self.failures)
    }
}

impl fmt::Display for CommandReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download(r) => r.fmt(f),
            Self::Load(r) => r.fmt(f),
            Self::Annotate(r) => r.fmt(f),
            Self::Validate(r) => r.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run `command` for the context's dataset.
#[instrument(skip_all, fields(dataset = %ctx.dataset.name, command = %command))]
pub async fn run(
    command: Command,
    ctx: &PipelineContext,
    force: bool,
    progress: &dyn ProgressReporter,
) -> Result<CommandReport> {
    let report = match command {
        Command::Download => CommandReport::Download(download(ctx, force, progress).await?),
        Command::Load => CommandReport::Load(load(ctx, progress).await?),
        Command::Annotate => CommandReport::Annotate(annotate(ctx, progress).await?),
        Command::Validate => CommandReport::Validate(validate(ctx, progress).await?),
    };
    progress.done(&report);
    Ok(report)
}

/// Fetch the dataset's source into the cache.
#[instrument(skip_all, fields(dataset = %ctx.dataset.name, force = force))]
pub async fn download(
    ctx: &PipelineContext,
    force: bool,
    progress: &dyn ProgressReporter,
) -> Result<DownloadReport> {
    let start = Instant::now();
    progress.phase(&format!("Downloading {} source", ctx.dataset.source.kind()));

    let client = SourceClient::new(&ctx.app.sources)?;
    let result = client.download(&ctx.dataset, &ctx.cache(), force).await?;

    Ok(DownloadReport {
        dataset: ctx.dataset.name.clone(),
        path: result.path,
        bytes: result.bytes,
        sha256: result.sha256,
        cached: result.cached,
        elapsed: start.elapsed(),
    })
}

/// Format, chunk and upload the cached source, then build and link the
/// table of contents and write the dataset state.
#[instrument(skip_all, fields(dataset = %ctx.dataset.name))]
pub async fn load(ctx: &PipelineContext, progress: &dyn ProgressReporter) -> Result<LoadReport> {
    let start = Instant::now();
    let dataset = &ctx.dataset;

    // --- Phase 1: Format ---
    progress.phase("Loading documents");
    let documents = annodemo_sources::load_documents(dataset, &ctx.cache())?;
    if documents.is_empty() {
        return Err(AnnoDemoError::validation(format!(
            "dataset '{}' produced no documents with text",
            dataset.name
        )));
    }
    let (formatted_text, doc_spans) = annodemo_text::join_documents(&documents);

    // --- Phase 2: Chunk ---
    progress.phase("Chunking");
    let chunks = chunk_documents(&documents, &doc_spans, &dataset.chunking);
    info!(documents = documents.len(), chunks = chunks.len(), "documents chunked");

    // --- Phase 3: Upload ---
    progress.phase("Connecting to backend");
    let backend = ctx.backends.connect().await?;

    progress.phase("Uploading chunks");
    let upload = upload_chunks(
        backend.as_ref(),
        &chunks,
        &dataset.format,
        &dataset.entity_types,
        progress,
    )
    .await;
    if upload.uploaded.is_empty() {
        return Err(AnnoDemoError::validation(format!(
            "none of the {} chunks could be uploaded",
            chunks.len()
        )));
    }
    let mut failures = upload.failures;

    // --- Phase 4: Table of contents ---
    let mut toc_id = None;
    let mut references = Vec::new();
    let mut references_linked = 0;

    if dataset.create_toc {
        progress.phase("Uploading table of contents");
        let entries: Vec<(String, ResourceId)> = upload
            .uploaded
            .iter()
            .map(|(chunk, id)| (chunk.title.clone(), id.clone()))
            .collect();
        let toc = build_toc(dataset.title(), &entries);

        let id = backend
            .create_resource(NewResource {
                name: toc_name(dataset.title()),
                content: toc.text.clone().into_bytes(),
                format: TOC_FORMAT.to_string(),
                entity_types: dataset.entity_types.clone(),
            })
            .await?;

        progress.phase("Linking references");
        let linked = create_references(backend.as_ref(), &id, &toc.text, &toc.references, progress).await;
        references_linked = linked.linked;
        references = linked.references;
        failures.extend(linked.failures);
        toc_id = Some(id);
    }

    // --- Phase 5: State ---
    progress.phase("Writing state");
    let state = DatasetState {
        dataset: dataset.name.clone(),
        toc_id: toc_id.clone(),
        chunk_ids: upload.uploaded.iter().map(|(_, id)| id.clone()).collect(),
        chunk_titles: upload.uploaded.iter().map(|(c, _)| c.title.clone()).collect(),
        chunk_spans: upload.uploaded.iter().map(|(c, _)| c.span).collect(),
        references,
        formatted_text,
        updated_at: Utc::now(),
    };
    let state_path = ctx.state_store().write(&state)?;

    let report = LoadReport {
        dataset: dataset.name.clone(),
        documents: documents.len(),
        chunks: chunks.len(),
        uploaded: state.chunk_ids.len(),
        toc_id,
        references: state.references.len(),
        references_linked,
        failures,
        state_path,
        elapsed: start.elapsed(),
    };

    info!(
        uploaded = report.uploaded,
        failures = report.failures.len(),
        elapsed_ms = report.elapsed.as_millis(),
        "load complete"
    );

    Ok(report)
}

/// Chunk every document, shifting spans into the joined text.
pub fn chunk_documents(
    documents: &[Document],
    doc_spans: &[TextSpan],
    policy: &ChunkingPolicy,
) -> Vec<Chunk> {
    documents
        .iter()
        .zip(doc_spans)
        .flat_map(|(doc, doc_span)| {
            annodemo_text::chunk_document(doc, policy)
                .into_iter()
                .map(move |chunk| Chunk {
                    span: chunk.span.offset(doc_span.start),
                    ..chunk
                })
        })
        .collect()
}

/// Detect citations in every uploaded piece and annotate them.
#[instrument(skip_all, fields(dataset = %ctx.dataset.name))]
pub async fn annotate(ctx: &PipelineContext, progress: &dyn ProgressReporter) -> Result<AnnotateReport> {
    let start = Instant::now();
    let dataset = &ctx.dataset;

    let mut report = AnnotateReport {
        dataset: dataset.name.clone(),
        skipped: None,
        detector: None,
        pieces: 0,
        citations: 0,
        annotations: 0,
        failures: Vec::new(),
        elapsed: Duration::ZERO,
    };

    if !dataset.detect_citations {
        report.skipped = Some("citation detection is disabled for this dataset".into());
        return Ok(report);
    }

    let state = ctx.state_store().read(&dataset.name)?;
    let detector = detector_from_config(&ctx.app.citations);
    report.detector = Some(detector.name().to_string());

    progress.phase("Connecting to backend");
    let backend = ctx.backends.connect().await?;

    let total = state.chunk_ids.len();
    for (i, id) in state.chunk_ids.iter().enumerate() {
        let label = state
            .chunk_titles
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("Piece {}", i + 1));

        let Some(text) = state.piece_text(i) else {
            warn!(resource = %id, "no text recorded for piece, skipping");
            progress.warn(&format!("{label}: no text recorded"));
            report.failures.push(ItemFailure {
                item: label,
                error: "no text recorded in state".into(),
            });
            continue;
        };

        progress.phase(&format!("Detecting citations in {label} ({}/{total})", i + 1));
        let matches = detector.detect(text)?;
        report.pieces += 1;
        report.citations += matches.len();

        if matches.is_empty() {
            continue;
        }

        let summary = annotate_citations(
            backend.as_ref(),
            id,
            text,
            &matches,
            &ctx.app.citations.entity_type,
            progress,
        )
        .await;
        report.annotations += summary.created.len();
        report.failures.extend(summary.failures);
    }

    report.elapsed = start.elapsed();
    info!(
        pieces = report.pieces,
        citations = report.citations,
        annotations = report.annotations,
        "annotate complete"
    );

    Ok(report)
}

/// Read back event histories and check them.
///
/// Returns the report even when checks fail; see
/// [`CommandReport::succeeded`].
#[instrument(skip_all, fields(dataset = %ctx.dataset.name))]
pub async fn validate(
    ctx: &PipelineContext,
    progress: &dyn ProgressReporter,
) -> Result<ValidationReport> {
    let state = ctx.state_store().read(&ctx.dataset.name)?;

    progress.phase("Connecting to backend");
    let backend = ctx.backends.connect().await?;

    progress.phase("Fetching event histories");
    Ok(validate_state(backend.as_ref(), &state, progress).await)
}

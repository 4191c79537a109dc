//! Application configuration for annodemo.
//!
//! User config lives at `~/.annodemo/annodemo.toml` unless a path is given
//! explicitly. CLI flags and environment variables override config file
//! values, which override defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AnnoDemoError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "annodemo.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".annodemo";

/// Environment variable that overrides `[backend] url`.
pub const BACKEND_URL_ENV: &str = "ANNODEMO_BACKEND_URL";

// ---------------------------------------------------------------------------
// Config structs (matching annodemo.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Upstream source endpoints.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Citation detector selection.
    #[serde(default)]
    pub citations: CitationsConfig,

    /// Dataset definitions. Empty means "use the built-in samples".
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
}

impl AppConfig {
    /// Default config with the built-in sample datasets spelled out, so a
    /// freshly initialized file is a usable template.
    pub fn with_sample_datasets() -> Self {
        Self {
            datasets: sample_datasets(),
            ..Self::default()
        }
    }
}

/// `[backend]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the annotation backend.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Name of the env var holding the login email.
    #[serde(default = "default_email_env")]
    pub email_env: String,

    /// Name of the env var holding the login password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Name of the env var holding a pre-issued token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            email_env: default_email_env(),
            password_env: default_password_env(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BackendConfig {
    /// Backend URL, honouring the `ANNODEMO_BACKEND_URL` override.
    pub fn resolved_url(&self) -> String {
        match std::env::var(BACKEND_URL_ENV) {
            Ok(val) if !val.is_empty() => val,
            _ => self.url.clone(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:4000".into()
}
fn default_email_env() -> String {
    "ANNODEMO_EMAIL".into()
}
fn default_password_env() -> String {
    "ANNODEMO_PASSWORD".into()
}
fn default_token_env() -> String {
    "ANNODEMO_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding download caches and state files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl DefaultsConfig {
    /// `data_dir` with a leading `~/` expanded to the home directory.
    pub fn data_dir_path(&self) -> PathBuf {
        expand_home(&self.data_dir)
    }
}

fn default_data_dir() -> String {
    "data".into()
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// arXiv API origin.
    #[serde(default = "default_arxiv_api")]
    pub arxiv_api: String,

    /// Project Gutenberg origin.
    #[serde(default = "default_gutenberg_base")]
    pub gutenberg_base: String,

    /// Hugging Face datasets-server origin.
    #[serde(default = "default_hugging_face_api")]
    pub hugging_face_api: String,

    /// Largest response accepted from any source.
    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            arxiv_api: default_arxiv_api(),
            gutenberg_base: default_gutenberg_base(),
            hugging_face_api: default_hugging_face_api(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

fn default_arxiv_api() -> String {
    "https://export.arxiv.org".into()
}
fn default_gutenberg_base() -> String {
    "https://www.gutenberg.org".into()
}
fn default_hugging_face_api() -> String {
    "https://datasets-server.huggingface.co".into()
}
fn default_max_download_bytes() -> u64 {
    20 * 1024 * 1024
}

/// Which citation detector implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Built-in regular-expression detector.
    #[default]
    Regex,
    /// External process reading text on stdin and writing JSON on stdout.
    Subprocess,
}

/// `[citations]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationsConfig {
    #[serde(default)]
    pub detector: DetectorKind,

    /// Program for the subprocess detector.
    #[serde(default = "default_citation_command")]
    pub command: String,

    /// Arguments for the subprocess detector.
    #[serde(default = "default_citation_args")]
    pub args: Vec<String>,

    /// Entity type tag placed on citation annotations.
    #[serde(default = "default_citation_entity_type")]
    pub entity_type: String,
}

impl Default for CitationsConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            command: default_citation_command(),
            args: default_citation_args(),
            entity_type: default_citation_entity_type(),
        }
    }
}

fn default_citation_command() -> String {
    "python3".into()
}
fn default_citation_args() -> Vec<String> {
    vec!["scripts/detect_citations.py".into()]
}
fn default_citation_entity_type() -> String {
    "LegalCitation".into()
}

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

/// `[[datasets]]` entry — external content plus its processing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Unique name used on the command line.
    pub name: String,

    /// Human-readable name, used for the ToC heading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// MIME type the pieces are uploaded as.
    #[serde(default = "default_format")]
    pub format: String,

    /// Tags attached to every uploaded resource.
    #[serde(default)]
    pub entity_types: Vec<String>,

    /// Whether `load` builds a linked table of contents.
    #[serde(default)]
    pub create_toc: bool,

    /// Whether `annotate` runs citation detection.
    #[serde(default)]
    pub detect_citations: bool,

    /// How documents are cut into pieces.
    #[serde(default)]
    pub chunking: ChunkingPolicy,

    /// Where the content comes from.
    pub source: SourceConfig,
}

impl DatasetConfig {
    /// Display name, falling back to the dataset name.
    pub fn title(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

fn default_format() -> String {
    "text/plain".into()
}

/// Chunking settings for a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingPolicy {
    /// When false each document is uploaded whole.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Paragraph-aware chunking; fixed-size slices when false.
    #[serde(default = "default_true")]
    pub smart: bool,

    /// Target chunk size in characters.
    #[serde(default = "default_target_size")]
    pub target_size: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            smart: true,
            target_size: default_target_size(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_target_size() -> usize {
    5000
}

/// Content source of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    /// A single HTML page, e.g. a court opinion.
    Html {
        url: String,
        /// CSS selector of the content root (defaults to `main`, then `body`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_selector: Option<String>,
    },
    /// An arXiv paper's metadata and abstract.
    Arxiv { id: String },
    /// A Project Gutenberg plain-text book.
    Gutenberg { id: u32 },
    /// Rows from a Hugging Face dataset, one document per row.
    HuggingFace {
        dataset: String,
        #[serde(default = "default_hf_config")]
        config: String,
        #[serde(default = "default_hf_split")]
        split: String,
        #[serde(default = "default_hf_length")]
        length: usize,
        #[serde(default = "default_hf_text_field")]
        text_field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title_field: Option<String>,
    },
    /// A local file, or a directory of `.txt`/`.md` files.
    Local { path: String },
}

impl SourceConfig {
    /// Short label for listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Html { .. } => "html",
            Self::Arxiv { .. } => "arxiv",
            Self::Gutenberg { .. } => "gutenberg",
            Self::HuggingFace { .. } => "hugging_face",
            Self::Local { .. } => "local",
        }
    }
}

fn default_hf_config() -> String {
    "default".into()
}
fn default_hf_split() -> String {
    "train".into()
}
fn default_hf_length() -> usize {
    10
}
fn default_hf_text_field() -> String {
    "text".into()
}

/// Built-in sample datasets used when the config defines none.
pub fn sample_datasets() -> Vec<DatasetConfig> {
    vec![
        DatasetConfig {
            name: "citizens-united".into(),
            display_name: Some("Citizens United v. FEC".into()),
            format: "text/markdown".into(),
            entity_types: vec!["legal".into(), "opinion".into()],
            create_toc: true,
            detect_citations: true,
            chunking: ChunkingPolicy {
                enabled: true,
                smart: true,
                target_size: 5000,
            },
            source: SourceConfig::Html {
                url: "https://www.law.cornell.edu/supremecourt/text/08-205".into(),
                content_selector: None,
            },
        },
        DatasetConfig {
            name: "pride-and-prejudice".into(),
            display_name: Some("Pride and Prejudice".into()),
            format: "text/plain".into(),
            entity_types: vec!["literature".into()],
            create_toc: true,
            detect_citations: false,
            chunking: ChunkingPolicy {
                enabled: true,
                smart: true,
                target_size: 4000,
            },
            source: SourceConfig::Gutenberg { id: 1342 },
        },
        DatasetConfig {
            name: "attention-paper".into(),
            display_name: Some("Attention Is All You Need".into()),
            format: "text/markdown".into(),
            entity_types: vec!["science".into(), "paper".into()],
            create_toc: false,
            detect_citations: false,
            chunking: ChunkingPolicy {
                enabled: false,
                ..ChunkingPolicy::default()
            },
            source: SourceConfig::Arxiv {
                id: "1706.03762".into(),
            },
        },
        DatasetConfig {
            name: "courtlistener-opinions".into(),
            display_name: Some("CourtListener Opinions".into()),
            format: "text/plain".into(),
            entity_types: vec!["legal".into(), "opinion".into()],
            create_toc: true,
            detect_citations: true,
            chunking: ChunkingPolicy {
                enabled: false,
                ..ChunkingPolicy::default()
            },
            source: SourceConfig::HuggingFace {
                dataset: "pile-of-law/pile-of-law".into(),
                config: "courtlistener_opinions".into(),
                split: "train".into(),
                length: 5,
                text_field: "text".into(),
                title_field: None,
            },
        },
        DatasetConfig {
            name: "local-notes".into(),
            display_name: Some("Local Notes".into()),
            format: "text/markdown".into(),
            entity_types: vec!["notes".into()],
            create_toc: true,
            detect_citations: false,
            chunking: ChunkingPolicy {
                enabled: true,
                smart: true,
                target_size: 1500,
            },
            source: SourceConfig::Local {
                path: "data/local".into(),
            },
        },
    ]
}

// ---------------------------------------------------------------------------
// DatasetRegistry
// ---------------------------------------------------------------------------

/// Dataset table built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    datasets: Vec<DatasetConfig>,
}

impl DatasetRegistry {
    /// Build from config, falling back to the samples when none are defined.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let datasets = if config.datasets.is_empty() {
            sample_datasets()
        } else {
            config.datasets.clone()
        };
        Self::new(datasets)
    }

    /// Build from an explicit list, validating names and chunk sizes.
    pub fn new(datasets: Vec<DatasetConfig>) -> Result<Self> {
        let mut seen = HashSet::new();
        for ds in &datasets {
            if ds.name.trim().is_empty() {
                return Err(AnnoDemoError::config("dataset with empty name"));
            }
            if !seen.insert(ds.name.as_str()) {
                return Err(AnnoDemoError::config(format!(
                    "duplicate dataset name '{}'",
                    ds.name
                )));
            }
            if ds.chunking.enabled && ds.chunking.target_size == 0 {
                return Err(AnnoDemoError::config(format!(
                    "dataset '{}': chunking.target_size must be positive",
                    ds.name
                )));
            }
        }
        Ok(Self { datasets })
    }

    /// Look up a dataset by name.
    pub fn get(&self, name: &str) -> Result<&DatasetConfig> {
        self.datasets.iter().find(|d| d.name == name).ok_or_else(|| {
            AnnoDemoError::config(format!(
                "unknown dataset '{name}'. Available: {}",
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.datasets.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetConfig> {
        self.datasets.iter()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Login material exchanged for a bearer token before any backend call.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { email: String, password: String },
    Token(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"***")
                .finish(),
            Self::Token(_) => f.debug_tuple("Token").field(&"***").finish(),
        }
    }
}

/// Resolve credentials from the env vars named in `[backend]`.
///
/// An email/password pair wins over a token; neither is a config error.
pub fn resolve_credentials(backend: &BackendConfig) -> Result<Credentials> {
    let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    if let (Some(email), Some(password)) =
        (read(&backend.email_env), read(&backend.password_env))
    {
        return Ok(Credentials::Password { email, password });
    }

    if let Some(token) = read(&backend.token_env) {
        return Ok(Credentials::Token(token));
    }

    Err(AnnoDemoError::config(format!(
        "backend credentials not found. Set {} and {}, or {}.",
        backend.email_env, backend.password_env, backend.token_env
    )))
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.annodemo/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AnnoDemoError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.annodemo/annodemo.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| AnnoDemoError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| AnnoDemoError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Write a default config file (with sample datasets) to `path`, or to the
/// default location when `path` is `None`. Returns the written path.
pub fn init_config(path: Option<&Path>) -> Result<PathBuf> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| AnnoDemoError::io(dir, e))?;
    }

    let config = AppConfig::with_sample_datasets();
    let content =
        toml::to_string_pretty(&config).map_err(|e| AnnoDemoError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| AnnoDemoError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

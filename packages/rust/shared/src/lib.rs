//! Shared types, error model, and configuration for annodemo.
//!
//! This crate is the foundation depended on by all other annodemo crates.
//! It provides:
//! - [`AnnoDemoError`] — the unified error type
//! - Domain types ([`Chunk`], [`TocReference`], [`DatasetState`], ids)
//! - Configuration ([`AppConfig`], [`DatasetRegistry`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BackendConfig, ChunkingPolicy, CitationsConfig, Credentials, DatasetConfig,
    DatasetRegistry, DefaultsConfig, DetectorKind, SourceConfig, SourcesConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_credentials,
    sample_datasets,
};
pub use error::{AnnoDemoError, Result};
pub use types::{
    AnnotationId, Chunk, DatasetState, Document, ResourceId, TextSpan, TocReference,
};

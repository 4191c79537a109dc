//! Pipeline orchestration and domain logic for annodemo.
//!
//! This crate ties together sources, text processing, the backend client
//! and the state store into the four dataset commands (`download`, `load`,
//! `annotate`, `validate`).

pub mod citations;
pub mod pipeline;
pub mod toc;
pub mod upload;
pub mod validate;

#[cfg(test)]
mod testing;

pub use citations::{
    CitationDetector, CitationMatch, RegexCitationDetector, SubprocessCitationDetector,
    detector_from_config,
};
pub use pipeline::{
    AnnotateReport, BackendFactory, Command, CommandReport, DatasetStatus, DownloadReport,
    HttpBackendFactory, LoadReport, PipelineContext, ProgressReporter, SilentProgress, run,
};
pub use validate::{ResourceCheck, ValidationReport};

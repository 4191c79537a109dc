//! Upload helpers: chunks, ToC references, citation annotations.
//!
//! Every helper walks its items one at a time. A failing item is recorded
//! and the loop moves on; callers decide what a partial result means.

use std::fmt;

use tracing::{info, instrument, warn};

use annodemo_client::{Backend, BodyItem, BodyOperation, Motivation, NewAnnotation, NewResource, Selector};
use annodemo_shared::{AnnotationId, Chunk, ResourceId, TocReference};

use crate::citations::CitationMatch;
use crate::pipeline::ProgressReporter;

/// An item that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Chunk title, reference text or citation text.
    pub item: String,
    pub error: String,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.item, self.error)
    }
}

fn write_failures(f: &mut fmt::Formatter<'_>, failures: &[ItemFailure]) -> fmt::Result {
    for failure in failures {
        writeln!(f, "  ✗ {failure}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Outcome of [`upload_chunks`].
#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub uploaded: Vec<(Chunk, ResourceId)>,
    pub failures: Vec<ItemFailure>,
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Uploaded {} of {} chunks",
            self.uploaded.len(),
            self.uploaded.len() + self.failures.len()
        )?;
        write_failures(f, &self.failures)
    }
}

/// Upload each chunk as its own resource, sequentially.
#[instrument(skip_all, fields(chunks = chunks.len(), format = %format))]
pub async fn upload_chunks(
    backend: &dyn Backend,
    chunks: &[Chunk],
    format: &str,
    entity_types: &[String],
    progress: &dyn ProgressReporter,
) -> UploadSummary {
    let mut summary = UploadSummary::default();
    let total = chunks.len();

    for (i, chunk) in chunks.iter().enumerate() {
        progress.item(i + 1, total, &chunk.title);

        let resource = NewResource {
            name: chunk.title.clone(),
            content: chunk.content.as_bytes().to_vec(),
            format: format.to_string(),
            entity_types: entity_types.to_vec(),
        };

        match backend.create_resource(resource).await {
            Ok(id) => summary.uploaded.push((chunk.clone(), id)),
            Err(e) => {
                warn!(title = %chunk.title, error = %e, "chunk upload failed");
                progress.warn(&format!("{}: {e}", chunk.title));
                summary.failures.push(ItemFailure {
                    item: chunk.title.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        uploaded = summary.uploaded.len(),
        failed = summary.failures.len(),
        "chunk upload finished"
    );
    summary
}

// ---------------------------------------------------------------------------
// ToC references
// ---------------------------------------------------------------------------

/// Outcome of [`create_references`].
#[derive(Debug, Clone, Default)]
pub struct ReferenceSummary {
    /// Every reference, with `annotation_id` set where the stub was created.
    pub references: Vec<TocReference>,
    /// References whose link body was added.
    pub linked: usize,
    pub failures: Vec<ItemFailure>,
}

impl fmt::Display for ReferenceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Linked {} of {} references",
            self.linked,
            self.references.len()
        )?;
        write_failures(f, &self.failures)
    }
}

/// Create a stub reference annotation for each ToC entry, then link it to
/// the entry's resource.
///
/// `toc_text` is the uploaded ToC text the reference offsets point into.
#[instrument(skip_all, fields(toc = %toc_id, references = references.len()))]
pub async fn create_references(
    backend: &dyn Backend,
    toc_id: &ResourceId,
    toc_text: &str,
    references: &[TocReference],
    progress: &dyn ProgressReporter,
) -> ReferenceSummary {
    let mut summary = ReferenceSummary::default();
    let total = references.len();

    for (i, reference) in references.iter().enumerate() {
        progress.item(i + 1, total, &reference.text);
        let mut reference = reference.clone();

        match link_reference(backend, toc_id, toc_text, &reference).await {
            Ok(annotation) => {
                reference.annotation_id = Some(annotation);
                summary.linked += 1;
            }
            Err((annotation, e)) => {
                warn!(reference = %reference.text, error = %e, "reference linking failed");
                progress.warn(&format!("{}: {e}", reference.text));
                reference.annotation_id = annotation;
                summary.failures.push(ItemFailure {
                    item: reference.text.clone(),
                    error: e.to_string(),
                });
            }
        }
        summary.references.push(reference);
    }

    info!(
        linked = summary.linked,
        failed = summary.failures.len(),
        "reference linking finished"
    );
    summary
}

/// Stub first, then link. On failure the stub id (if any) comes back with
/// the error.
async fn link_reference(
    backend: &dyn Backend,
    toc_id: &ResourceId,
    toc_text: &str,
    reference: &TocReference,
) -> Result<AnnotationId, (Option<AnnotationId>, annodemo_shared::AnnoDemoError)> {
    let stub = NewAnnotation {
        resource: toc_id.clone(),
        selectors: Selector::for_span(toc_text, reference.start, reference.end),
        body: vec![],
        motivation: Motivation::Linking,
    };
    let annotation = backend
        .create_annotation(stub)
        .await
        .map_err(|e| (None, e))?;

    let link = BodyOperation::Add {
        item: BodyItem::link(reference.document_id.clone()),
    };
    backend
        .update_annotation_body(toc_id, &annotation, vec![link])
        .await
        .map_err(|e| (Some(annotation.clone()), e))?;

    Ok(annotation)
}

// ---------------------------------------------------------------------------
// Citations
// ---------------------------------------------------------------------------

/// Outcome of [`annotate_citations`].
#[derive(Debug, Clone, Default)]
pub struct AnnotationSummary {
    pub created: Vec<AnnotationId>,
    pub failures: Vec<ItemFailure>,
}

/// Create one highlighting annotation per citation match, tagged with
/// `entity_type`.
///
/// `text` is the resource's content; match offsets are characters into it.
#[instrument(skip_all, fields(resource = %resource, matches = matches.len()))]
pub async fn annotate_citations(
    backend: &dyn Backend,
    resource: &ResourceId,
    text: &str,
    matches: &[CitationMatch],
    entity_type: &str,
    progress: &dyn ProgressReporter,
) -> AnnotationSummary {
    let mut summary = AnnotationSummary::default();
    let total = matches.len();

    for (i, citation) in matches.iter().enumerate() {
        progress.item(i + 1, total, &citation.text);

        let annotation = NewAnnotation {
            resource: resource.clone(),
            selectors: Selector::for_span(text, citation.start, citation.end),
            body: vec![BodyItem::tag(entity_type)],
            motivation: Motivation::Highlighting,
        };

        match backend.create_annotation(annotation).await {
            Ok(id) => summary.created.push(id),
            Err(e) => {
                warn!(citation = %citation.text, error = %e, "citation annotation failed");
                progress.warn(&format!("{}: {e}", citation.text));
                summary.failures.push(ItemFailure {
                    item: citation.text.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::MemoryBackend;
    use annodemo_shared::TextSpan;

    fn chunk(part: usize, title: &str) -> Chunk {
        Chunk {
            part,
            title: title.into(),
            content: format!("content of {title}"),
            span: TextSpan::new(0, 0),
        }
    }

    #[tokio::test]
    async fn upload_continues_after_failure() {
        let backend = MemoryBackend::new().fail_resources_named("Doc - Part 2");
        let chunks = vec![chunk(1, "Doc - Part 1"), chunk(2, "Doc - Part 2"), chunk(3, "Doc - Part 3")];

        let summary = upload_chunks(&backend, &chunks, "text/plain", &[], &SilentProgress).await;

        assert_eq!(summary.uploaded.len(), 2);
        assert_eq!(summary.uploaded[1].0.title, "Doc - Part 3");
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].item, "Doc - Part 2");

        let text = summary.to_string();
        assert!(text.starts_with("Uploaded 2 of 3 chunks"));
        assert!(text.contains("✗ Doc - Part 2"));
    }

    #[tokio::test]
    async fn references_are_stubbed_then_linked() {
        let backend = MemoryBackend::new();
        let toc_id = backend.seed_resource("toc");
        let toc = crate::toc::build_toc(
            "Doc",
            &[("Part 1".into(), "r-1".into()), ("Part 2".into(), "r-2".into())],
        );

        let summary =
            create_references(&backend, &toc_id, &toc.text, &toc.references, &SilentProgress).await;

        assert_eq!(summary.linked, 2);
        assert!(summary.failures.is_empty());
        assert!(summary.references.iter().all(|r| r.annotation_id.is_some()));

        let annotations = backend.annotations();
        assert_eq!(annotations.len(), 2);
        assert_eq!(annotations[0].motivation, Motivation::Linking);
        assert!(annotations[0].body.is_empty(), "stub has no link body");
        assert_eq!(
            annotations[0].selectors[1],
            Selector::TextQuote {
                exact: "Part 1".into(),
                prefix: Some("# Doc\n\n1. ".into()),
                suffix: Some("\n2. Part 2\n".into()),
            }
        );

        let updates = backend.body_updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(
            updates[1].2,
            vec![BodyOperation::Add {
                item: BodyItem::link("r-2".into())
            }]
        );
    }

    #[tokio::test]
    async fn failed_link_keeps_stub_id() {
        let backend = MemoryBackend::new().fail_body_updates();
        let toc_id = backend.seed_resource("toc");
        let toc = crate::toc::build_toc("Doc", &[("Part 1".into(), "r-1".into())]);

        let summary =
            create_references(&backend, &toc_id, &toc.text, &toc.references, &SilentProgress).await;

        assert_eq!(summary.linked, 0);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.references[0].annotation_id.is_some());
    }

    #[tokio::test]
    async fn citations_become_tagged_highlights() {
        let backend = MemoryBackend::new();
        let resource = backend.seed_resource("opinion");
        let text = "See Bush v. Gore, 531 U.S. 98 (2000).";
        let matches = vec![CitationMatch {
            text: "Bush v. Gore, 531 U.S. 98 (2000)".into(),
            start: 4,
            end: 36,
            kind: "FullCaseCitation".into(),
        }];

        let summary = annotate_citations(
            &backend,
            &resource,
            text,
            &matches,
            "LegalCitation",
            &SilentProgress,
        )
        .await;

        assert_eq!(summary.created.len(), 1);
        let annotation = &backend.annotations()[0];
        assert_eq!(annotation.motivation, Motivation::Highlighting);
        assert_eq!(annotation.body, vec![BodyItem::tag("LegalCitation")]);
        assert_eq!(annotation.selectors[0], Selector::TextPosition { start: 4, end: 36 });
    }
}

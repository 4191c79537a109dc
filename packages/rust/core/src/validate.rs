//! Read-back validation of a loaded dataset through resource event
//! histories.

use std::fmt;

use tracing::{info, instrument, warn};

use annodemo_client::{Backend, Event};
use annodemo_shared::{DatasetState, ResourceId};

use crate::pipeline::ProgressReporter;

pub const RESOURCE_CREATED: &str = "resource.created";
pub const ANNOTATION_ADDED: &str = "annotation.added";
pub const ANNOTATION_BODY_UPDATED: &str = "annotation.body.updated";

/// Checks run against one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCheck {
    /// Chunk title or `"Table of Contents"`.
    pub label: String,
    pub resource: ResourceId,
    /// Number of events fetched.
    pub events: usize,
    /// Empty when every check passed.
    pub problems: Vec<String>,
}

impl ResourceCheck {
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Result of validating a dataset.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub dataset: String,
    pub checks: Vec<ResourceCheck>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(ResourceCheck::passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ResourceCheck> {
        self.checks.iter().filter(|c| !c.passed())
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failed().count();
        writeln!(
            f,
            "Validated {} resources for '{}': {} passed, {failed} failed",
            self.checks.len(),
            self.dataset,
            self.checks.len() - failed
        )?;
        for check in &self.checks {
            let mark = if check.passed() { "✓" } else { "✗" };
            writeln!(
                f,
                "  {mark} {:<40} {} ({} events)",
                check.label, check.resource, check.events
            )?;
            for problem in &check.problems {
                writeln!(f, "      - {problem}")?;
            }
        }
        Ok(())
    }
}

/// Check one resource's history.
///
/// Always: a `resource.created` event exists and sequence numbers strictly
/// increase. With `expected_references`: exactly that many
/// `annotation.added` and `annotation.body.updated` events.
pub fn check_events(
    label: &str,
    resource: &ResourceId,
    events: &[Event],
    expected_references: Option<usize>,
) -> ResourceCheck {
    let mut problems = Vec::new();

    if !events.iter().any(|e| e.event_type == RESOURCE_CREATED) {
        problems.push(format!("missing {RESOURCE_CREATED} event"));
    }

    for pair in events.windows(2) {
        if pair[1].sequence <= pair[0].sequence {
            problems.push(format!(
                "sequence not increasing: {} followed by {}",
                pair[0].sequence, pair[1].sequence
            ));
        }
    }

    if let Some(expected) = expected_references {
        for kind in [ANNOTATION_ADDED, ANNOTATION_BODY_UPDATED] {
            let found = events.iter().filter(|e| e.event_type == kind).count();
            if found != expected {
                problems.push(format!("expected {expected} {kind} events, found {found}"));
            }
        }
    }

    ResourceCheck {
        label: label.to_string(),
        resource: resource.clone(),
        events: events.len(),
        problems,
    }
}

/// Fetch and check the ToC (if any) and every uploaded piece.
///
/// A failed event fetch is recorded as a problem on that resource.
#[instrument(skip_all, fields(dataset = %state.dataset, chunks = state.chunk_ids.len()))]
pub async fn validate_state(
    backend: &dyn Backend,
    state: &DatasetState,
    progress: &dyn ProgressReporter,
) -> ValidationReport {
    let mut targets: Vec<(String, ResourceId, Option<usize>)> = Vec::new();
    if let Some(toc_id) = &state.toc_id {
        targets.push((
            "Table of Contents".to_string(),
            toc_id.clone(),
            Some(state.references.len()),
        ));
    }
    for (i, id) in state.chunk_ids.iter().enumerate() {
        let label = state
            .chunk_titles
            .get(i)
            .cloned()
            .unwrap_or_else(|| format!("Piece {}", i + 1));
        targets.push((label, id.clone(), None));
    }

    let total = targets.len();
    let mut checks = Vec::with_capacity(total);

    for (i, (label, id, expected)) in targets.into_iter().enumerate() {
        progress.item(i + 1, total, &label);

        let check = match backend.get_events(&id).await {
            Ok(events) => check_events(&label, &id, &events, expected),
            Err(e) => ResourceCheck {
                label: label.clone(),
                resource: id.clone(),
                events: 0,
                problems: vec![format!("could not fetch events: {e}")],
            },
        };

        if !check.passed() {
            warn!(label = %check.label, problems = ?check.problems, "validation check failed");
            progress.warn(&format!("{}: {}", check.label, check.problems.join("; ")));
        }
        checks.push(check);
    }

    let report = ValidationReport {
        dataset: state.dataset.clone(),
        checks,
    };
    info!(passed = report.passed(), "validation finished");
    report
}

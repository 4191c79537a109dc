//! Core domain types shared by every annodemo crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Backend-assigned identifier of an uploaded resource (document).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Backend-assigned identifier of an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub String);

impl AnnotationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Text pieces
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` into some source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextSpan {
    pub start: usize,
    pub end: usize,
}

impl TextSpan {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Shift both ends by `offset` bytes.
    pub fn offset(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
        }
    }
}

/// A titled piece of formatted text, before chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub content: String,
}

/// A titled, numbered slice of a larger document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 1-based part number, contiguous among emitted chunks.
    pub part: usize,
    /// `"<prefix> <part>"`, or the document title when chunking is off.
    pub title: String,
    /// Verbatim slice of the source text.
    pub content: String,
    /// Byte span of `content` within the source text.
    pub span: TextSpan,
}

// ---------------------------------------------------------------------------
// Table of contents
// ---------------------------------------------------------------------------

/// A linkable span of the generated table-of-contents document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocReference {
    /// Entry title exactly as it appears in the ToC text.
    pub text: String,
    /// Character offset of the first character of `text`.
    pub start: usize,
    /// Character offset one past the last character of `text`.
    pub end: usize,
    /// Resource the entry links to.
    pub document_id: ResourceId,
    /// Stub reference annotation, once created on the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation_id: Option<AnnotationId>,
}

// ---------------------------------------------------------------------------
// DatasetState
// ---------------------------------------------------------------------------

/// Per-dataset state written by `load` and read by `annotate`/`validate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetState {
    /// Dataset name.
    pub dataset: String,
    /// Uploaded table-of-contents resource, if the dataset builds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toc_id: Option<ResourceId>,
    /// Uploaded pieces, in order.
    pub chunk_ids: Vec<ResourceId>,
    /// Titles of the uploaded pieces, parallel to `chunk_ids`.
    #[serde(default)]
    pub chunk_titles: Vec<String>,
    /// Byte span of each uploaded piece within `formatted_text`.
    #[serde(default)]
    pub chunk_spans: Vec<TextSpan>,
    /// Table-of-contents references.
    #[serde(default)]
    pub references: Vec<TocReference>,
    /// Full formatted text the pieces were cut from.
    pub formatted_text: String,
    /// When `load` last wrote this file.
    pub updated_at: DateTime<Utc>,
}

impl DatasetState {
    /// Text of the `index`-th uploaded piece, if its span is recorded.
    pub fn piece_text(&self, index: usize) -> Option<&str> {
        let span = self.chunk_spans.get(index)?;
        self.formatted_text.get(span.start..span.end)
    }
}

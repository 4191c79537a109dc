//! Request and event types exchanged with the backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use annodemo_shared::ResourceId;
use annodemo_text::byte_offset;

/// A document to upload.
#[derive(Debug, Clone)]
pub struct NewResource {
    pub name: String,
    pub content: Vec<u8>,
    /// MIME type, e.g. `text/markdown`.
    pub format: String,
    pub entity_types: Vec<String>,
}

/// Why an annotation exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Motivation {
    Linking,
    Highlighting,
}

/// Where in a resource an annotation points. Offsets are characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selector {
    #[serde(rename = "TextPositionSelector")]
    TextPosition { start: usize, end: usize },
    #[serde(rename = "TextQuoteSelector")]
    TextQuote {
        exact: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
}

impl Selector {
    /// Position and quote selectors for `exact`, found at characters
    /// `start..end` of `text`. Prefix and suffix carry up to 32 characters
    /// of context. An inverted span quotes nothing.
    pub fn for_span(text: &str, start: usize, end: usize) -> Vec<Selector> {
        const CONTEXT: usize = 32;

        let from = byte_offset(text, start);
        let to = byte_offset(text, end).max(from);
        let before = byte_offset(text, start.saturating_sub(CONTEXT));
        let after = byte_offset(text, end.saturating_add(CONTEXT)).max(to);

        let exact = text[from..to].to_string();
        let prefix = &text[before..from];
        let suffix = &text[to..after];

        vec![
            Selector::TextPosition { start, end },
            Selector::TextQuote {
                exact,
                prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
                suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
            },
        ]
    }
}

/// One body item of an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BodyItem {
    /// A text value, used for tags (`purpose: "tagging"`) and comments.
    TextualBody {
        value: String,
        purpose: String,
    },
    /// A link to another resource (`purpose: "linking"`).
    SpecificResource {
        source: ResourceId,
        purpose: String,
    },
}

impl BodyItem {
    pub fn tag(value: impl Into<String>) -> Self {
        Self::TextualBody {
            value: value.into(),
            purpose: "tagging".into(),
        }
    }

    pub fn link(target: ResourceId) -> Self {
        Self::SpecificResource {
            source: target,
            purpose: "linking".into(),
        }
    }
}

/// An annotation to create on `resource`.
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub resource: ResourceId,
    pub selectors: Vec<Selector>,
    pub body: Vec<BodyItem>,
    pub motivation: Motivation,
}

/// An edit applied to an existing annotation's body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BodyOperation {
    Add { item: BodyItem },
}

/// One entry of a resource's event history.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub sequence: u64,
    pub event_type: String,
    pub timestamp: Option<String>,
    pub user_id: Option<String>,
    pub payload: Value,
}

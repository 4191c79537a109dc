//! Hugging Face datasets-server `rows` endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use annodemo_shared::{AnnoDemoError, Document, Result};

/// The datasets-server caps `length` per request.
pub(crate) const MAX_PAGE_LENGTH: usize = 100;

/// One page of the `rows` response. Only the fields read here are typed.
#[derive(Debug, Deserialize)]
pub(crate) struct RowsPage {
    pub rows: Vec<RowEntry>,
    #[serde(default)]
    pub num_rows_total: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RowEntry {
    pub row_idx: usize,
    pub row: serde_json::Map<String, Value>,
}

/// What gets cached: the concatenated rows of every page fetched.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CachedRows {
    pub rows: Vec<RowEntry>,
}

/// Query URL for rows `[offset, offset + length)`.
pub(crate) fn rows_url(
    api_base: &str,
    dataset: &str,
    config: &str,
    split: &str,
    offset: usize,
    length: usize,
) -> Result<url::Url> {
    let base = format!("{}/rows", api_base.trim_end_matches('/'));
    url::Url::parse_with_params(
        &base,
        &[
            ("dataset", dataset.to_string()),
            ("config", config.to_string()),
            ("split", split.to_string()),
            ("offset", offset.to_string()),
            ("length", length.to_string()),
        ],
    )
    .map_err(|e| AnnoDemoError::config(format!("invalid Hugging Face API URL '{base}': {e}")))
}

/// Turn cached rows into documents.
///
/// Rows whose `text_field` is missing, not a string, or blank are skipped.
/// Titles come from `title_field` when present, else `<fallback> #<n>`.
pub(crate) fn rows_to_documents(
    rows: &[RowEntry],
    text_field: &str,
    title_field: Option<&str>,
    fallback_title: &str,
) -> Result<Vec<Document>> {
    let mut docs = Vec::new();
    for entry in rows {
        let Some(text) = entry.row.get(text_field).and_then(Value::as_str) else {
            warn!(row = entry.row_idx, field = text_field, "row has no text field, skipping");
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }

        let title = title_field
            .and_then(|field| entry.row.get(field))
            .and_then(value_as_title)
            .unwrap_or_else(|| format!("{fallback_title} #{}", entry.row_idx + 1));

        docs.push(Document {
            title,
            content: annodemo_text::format_plain(text),
        });
    }

    if docs.is_empty() && !rows.is_empty() {
        return Err(AnnoDemoError::parse(format!(
            "no row contains a text field named '{text_field}'"
        )));
    }
    Ok(docs)
}

fn value_as_title(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

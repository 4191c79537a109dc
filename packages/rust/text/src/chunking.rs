//! Paragraph-aware and fixed-size text chunking.
//!
//! [`chunk_text`] cuts at paragraph boundaries (runs of two or more `\n`),
//! choosing for each chunk the boundary closest to `position + target_size`:
//! the last boundary at or before the target, else the first one after it.
//! A paragraph is never split, so a text without boundaries becomes a single
//! chunk regardless of its size.
//!
//! [`chunk_fixed`] slices at raw character offsets and is used when a
//! dataset turns smart chunking off.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use annodemo_shared::{Chunk, ChunkingPolicy, Document, TextSpan};

static PARAGRAPH_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("valid regex"));

/// Byte offsets of every paragraph boundary, with `0` and `text.len()` as
/// sentinels. Each interior offset sits immediately after a run of 2+ newlines.
pub fn paragraph_breaks(text: &str) -> Vec<usize> {
    let mut breaks = vec![0];
    breaks.extend(PARAGRAPH_BREAK_RE.find_iter(text).map(|m| m.end()));
    if breaks.last() != Some(&text.len()) {
        breaks.push(text.len());
    }
    breaks
}

/// Split `text` into chunks near `target_size` characters, cutting only at
/// paragraph boundaries.
///
/// Chunk contents are trimmed verbatim slices; chunks that trim to nothing
/// are dropped and part numbers stay contiguous among the emitted ones.
pub fn chunk_text(text: &str, target_size: usize, title_prefix: &str) -> Vec<Chunk> {
    let target_size = target_size.max(1);
    let breaks = paragraph_breaks(text);
    let mut chunks = Vec::new();
    let mut position = skip_whitespace(text, 0);

    while position < text.len() {
        let target = advance_chars(text, position, target_size);
        let end = choose_break(&breaks, position, target, text.len());

        if let Some(chunk) = trimmed_chunk(text, position, end, chunks.len() + 1, title_prefix) {
            chunks.push(chunk);
        }

        position = skip_whitespace(text, end);
    }

    debug!(
        text_len = text.len(),
        target_size,
        boundaries = breaks.len(),
        chunks = chunks.len(),
        "paragraph chunking complete"
    );

    chunks
}

/// Split `text` into consecutive slices of exactly `size` characters (the
/// last one may be shorter). Contents are not trimmed.
pub fn chunk_fixed(text: &str, size: usize, title_prefix: &str) -> Vec<Chunk> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let end = advance_chars(text, start, size);
        let part = chunks.len() + 1;
        chunks.push(Chunk {
            part,
            title: format!("{title_prefix} {part}"),
            content: text[start..end].to_string(),
            span: TextSpan::new(start, end),
        });
        start = end;
    }

    chunks
}

/// Cut one document according to a dataset's chunking policy.
///
/// With chunking disabled the whole (trimmed) document becomes a single
/// chunk carrying the document title. Spans are relative to `doc.content`.
pub fn chunk_document(doc: &Document, policy: &ChunkingPolicy) -> Vec<Chunk> {
    if !policy.enabled {
        return trimmed_chunk(&doc.content, 0, doc.content.len(), 1, "")
            .map(|chunk| Chunk {
                title: doc.title.clone(),
                ..chunk
            })
            .into_iter()
            .collect();
    }

    let prefix = format!("{} - Part", doc.title);
    if policy.smart {
        chunk_text(&doc.content, policy.target_size, &prefix)
    } else {
        chunk_fixed(&doc.content, policy.target_size, &prefix)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Pick the boundary for a chunk starting at `position` whose ideal end is
/// `target`: the last boundary `<= target`, else the first boundary after it.
fn choose_break(breaks: &[usize], position: usize, target: usize, len: usize) -> usize {
    let after = breaks.partition_point(|&b| b <= target);
    match after.checked_sub(1).map(|i| breaks[i]) {
        Some(b) if b > position => b,
        _ => breaks.get(after).copied().unwrap_or(len),
    }
}

/// Byte offset `n` characters past `start`, clamped to the end of `text`.
fn advance_chars(text: &str, start: usize, n: usize) -> usize {
    text[start..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| start + i)
        .unwrap_or(text.len())
}

fn skip_whitespace(text: &str, position: usize) -> usize {
    let rest = &text[position..];
    position + (rest.len() - rest.trim_start().len())
}

fn trimmed_chunk(
    text: &str,
    start: usize,
    end: usize,
    part: usize,
    title_prefix: &str,
) -> Option<Chunk> {
    let slice = &text[start..end];
    let content = slice.trim();
    if content.is_empty() {
        return None;
    }
    let content_start = start + (slice.len() - slice.trim_start().len());
    Some(Chunk {
        part,
        title: format!("{title_prefix} {part}"),
        content: content.to_string(),
        span: TextSpan::new(content_start, content_start + content.len()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Cleanup pipeline applied to every formatted document.
//!
//! Each pass is a function `&str -> String` applied in sequence. Paragraph
//! boundaries (blank lines) are what the chunker cuts on, so the passes keep
//! exactly one blank line between paragraphs.

use std::sync::LazyLock;

use regex::Regex;

/// Run the full cleanup pipeline on converted or downloaded text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let mut result = normalize_line_endings(text);

    result = normalize_headings(&result);
    result = strip_leftover_html(&result);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

/// Convert `\r\n` and lone `\r` to `\n`.
pub(crate) fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Headings
// ---------------------------------------------------------------------------

/// Keep at most one H1; later ones are demoted to H2.
fn normalize_headings(md: &str) -> String {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^#\s+(.+)$").expect("valid regex"));

    let mut seen_h1 = false;
    md.lines()
        .map(|line| match H1_RE.captures(line) {
            Some(caps) if seen_h1 => format!("## {}", &caps[1]),
            Some(_) => {
                seen_h1 = true;
                line.to_string()
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Leftover HTML
// ---------------------------------------------------------------------------

/// Remove container tags that survived conversion, keeping their text.
/// Fenced code blocks are left untouched.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|sup|sub|font|center)(?:\s[^>]*)?>")
            .expect("valid regex")
    });

    let mut in_code_block = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
                return line.to_string();
            }
            if in_code_block {
                line.to_string()
            } else {
                HTML_TAG_RE.replace_all(line, "").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line, so whitespace-only lines become
/// blank lines and count as paragraph separators.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of 2+ blank lines into exactly one.
fn clean_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").into_owned()
}

// ---------------------------------------------------------------------------
// Pass 6: Trailing newline
// ---------------------------------------------------------------------------

/// Ensure the text ends with exactly one newline (empty text stays empty).
fn ensure_trailing_newline(text: &str) -> String {
    let trimmed = text.trim_end_matches('\n');
    if trimmed.is_empty() {
        return String::new();
    }
    format!("{trimmed}\n")
}

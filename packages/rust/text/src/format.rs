//! Source-specific formatting: HTML pages, Gutenberg books, arXiv entries.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use annodemo_shared::{AnnoDemoError, Document, Result, TextSpan};

use crate::cleanup;

/// Separator placed between documents in a dataset's formatted text.
pub const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Tags dropped before HTML → Markdown conversion.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg", "form",
];

/// Content roots tried when no selector is configured, in priority order.
const CONTENT_SELECTORS: &[&str] = &["main", "article", "[role=\"main\"]", "#content", "body"];

// ---------------------------------------------------------------------------
// HTML
// ---------------------------------------------------------------------------

/// Result of converting an HTML page to text.
#[derive(Debug, Clone)]
pub struct ConvertedPage {
    /// Page title: first H1 of the converted text, else `<title>`.
    pub title: Option<String>,
    /// Cleaned Markdown text.
    pub text: String,
}

/// Convert an HTML page to clean Markdown text.
///
/// `content_selector` picks the content root; when absent (or matching
/// nothing) the usual semantic containers are tried, then `<body>`.
#[instrument(skip(html), fields(html_len = html.len()))]
pub fn html_to_text(html: &str, content_selector: Option<&str>) -> Result<ConvertedPage> {
    let doc = Html::parse_document(html);
    let content_html = select_content(&doc, content_selector)?;

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();
    let raw = converter
        .convert(&content_html)
        .map_err(|e| AnnoDemoError::parse(format!("HTML conversion failed: {e}")))?;

    let text = cleanup::run_pipeline(&raw);
    let title = first_heading(&text).or_else(|| document_title(&doc));

    debug!(raw_len = raw.len(), text_len = text.len(), "HTML converted");

    Ok(ConvertedPage { title, text })
}

fn select_content(doc: &Html, content_selector: Option<&str>) -> Result<String> {
    if let Some(sel) = content_selector {
        let selector = Selector::parse(sel)
            .map_err(|e| AnnoDemoError::parse(format!("invalid content selector '{sel}': {e}")))?;
        if let Some(el) = doc.select(&selector).next() {
            return Ok(el.inner_html());
        }
        debug!(selector = sel, "content selector matched nothing, falling back");
    }

    for sel in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(sel) {
            if let Some(el) = doc.select(&selector).next() {
                return Ok(el.inner_html());
            }
        }
    }

    Ok(doc.root_element().inner_html())
}

fn first_heading(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

fn document_title(doc: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    doc.select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

// ---------------------------------------------------------------------------
// Plain text
// ---------------------------------------------------------------------------

/// Clean up a plain-text or Markdown document.
pub fn format_plain(text: &str) -> String {
    cleanup::run_pipeline(text)
}

/// Keep only the body of a Project Gutenberg text, between the
/// `*** START OF ...` and `*** END OF ...` marker lines. Text without both
/// markers is returned cleaned but otherwise unchanged.
pub fn strip_gutenberg_boilerplate(text: &str) -> String {
    static START_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?mi)^\*\*\*\s*START OF (?:THE|THIS) PROJECT GUTENBERG[^\n]*$")
            .expect("valid regex")
    });
    static END_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?mi)^\*\*\*\s*END OF (?:THE|THIS) PROJECT GUTENBERG[^\n]*$")
            .expect("valid regex")
    });

    let text = cleanup::normalize_line_endings(text);
    let body = match (START_RE.find(&text), END_RE.find(&text)) {
        (Some(start), Some(end)) if start.end() <= end.start() => &text[start.end()..end.start()],
        _ => {
            debug!("Gutenberg markers not found, keeping full text");
            text.as_str()
        }
    };

    cleanup::run_pipeline(body.trim())
}

// ---------------------------------------------------------------------------
// arXiv
// ---------------------------------------------------------------------------

/// Metadata of one arXiv paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivEntry {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
}

/// Render an arXiv entry as a Markdown document.
pub fn format_arxiv(entry: &ArxivEntry) -> String {
    let title = collapse_whitespace(&entry.title);
    let summary = collapse_whitespace(&entry.summary);
    let text = format!(
        "# {title}\n\n**Authors:** {}\n\n**arXiv:** {}\n\n## Abstract\n\n{summary}\n",
        entry.authors.join(", "),
        entry.id
    );
    cleanup::run_pipeline(&text)
}

/// Collapse internal runs of whitespace (arXiv wraps titles and abstracts).
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Multi-document datasets
// ---------------------------------------------------------------------------

/// Concatenate documents with [`DOCUMENT_SEPARATOR`], returning the joined
/// text and each document's byte span within it.
pub fn join_documents(docs: &[Document]) -> (String, Vec<TextSpan>) {
    let mut text = String::new();
    let mut spans = Vec::with_capacity(docs.len());

    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            text.push_str(DOCUMENT_SEPARATOR);
        }
        let start = text.len();
        text.push_str(&doc.content);
        spans.push(TextSpan::new(start, text.len()));
    }

    (text, spans)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_to_text_uses_main_and_drops_chrome() {
        let html = r#"<html><head><title>Opinion page</title></head><body>
            <nav><a href="/">Home</a></nav>
            <main><h1>Citizens United v. FEC</h1><p>Held: reversed.</p><p>Second paragraph.</p></main>
            <footer><p>Copyright</p></footer>
        </body></html>"#;

        let page = html_to_text(html, None).unwrap();
        assert_eq!(page.title.as_deref(), Some("Citizens United v. FEC"));
        assert!(page.text.contains("Held: reversed."));
        assert!(page.text.contains("\n\nSecond paragraph."));
        assert!(!page.text.contains("Copyright"));
        assert!(!page.text.contains("Home"));
    }

    #[test]
    fn html_to_text_honours_selector() {
        let html = r#"<html><body>
            <main><p>Site chrome in main</p><div id="opinion"><p>Opinion body.</p></div></main>
        </body></html>"#;

        let page = html_to_text(html, Some("#opinion")).unwrap();
        assert!(page.text.contains("Opinion body."));
        assert!(!page.text.contains("Site chrome"));
    }

    #[test]
    fn html_to_text_falls_back_to_title_tag() {
        let html = "<html><head><title>Only Title</title></head><body><p>Text.</p></body></html>";
        let page = html_to_text(html, None).unwrap();
        assert_eq!(page.title.as_deref(), Some("Only Title"));
    }

    #[test]
    fn html_to_text_rejects_bad_selector() {
        let err = html_to_text("<p>x</p>", Some("[[")).unwrap_err();
        assert!(err.to_string().contains("invalid content selector"));
    }

    #[test]
    fn gutenberg_markers_are_stripped() {
        let raw = "The Project Gutenberg eBook of Test\r\nLicense blah\r\n\
                   *** START OF THE PROJECT GUTENBERG EBOOK TEST ***\r\n\r\n\
                   Chapter 1\r\n\r\nIt is a truth.\r\n\r\n\
                   *** END OF THE PROJECT GUTENBERG EBOOK TEST ***\r\nMore license";
        let body = strip_gutenberg_boilerplate(raw);
        assert_eq!(body, "Chapter 1\n\nIt is a truth.\n");
    }

    #[test]
    fn gutenberg_without_markers_is_kept() {
        let body = strip_gutenberg_boilerplate("Just text.\n\nMore.");
        assert_eq!(body, "Just text.\n\nMore.\n");
    }

    #[test]
    fn arxiv_entry_formatting() {
        let entry = ArxivEntry {
            id: "1706.03762".into(),
            title: "Attention Is All\n  You Need".into(),
            authors: vec!["Ashish Vaswani".into(), "Noam Shazeer".into()],
            summary: "  The dominant sequence\n transduction models...".into(),
        };
        let text = format_arxiv(&entry);
        assert!(text.starts_with("# Attention Is All You Need\n\n"));
        assert!(text.contains("**Authors:** Ashish Vaswani, Noam Shazeer"));
        assert!(text.contains("## Abstract\n\nThe dominant sequence transduction models..."));
    }

    #[test]
    fn join_documents_records_spans() {
        let docs = vec![
            Document {
                title: "One".into(),
                content: "first".into(),
            },
            Document {
                title: "Two".into(),
                content: "second".into(),
            },
        ];
        let (text, spans) = join_documents(&docs);
        assert_eq!(text, "first\n\nsecond");
        assert_eq!(&text[spans[0].start..spans[0].end], "first");
        assert_eq!(&text[spans[1].start..spans[1].end], "second");
    }

    #[test]
    fn join_documents_empty() {
        let (text, spans) = join_documents(&[]);
        assert!(text.is_empty());
        assert!(spans.is_empty());
    }
}

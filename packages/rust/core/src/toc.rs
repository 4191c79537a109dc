//! Table-of-contents document builder.
//!
//! The ToC is a small Markdown document, one numbered line per uploaded
//! piece. Each entry title becomes a reference span that is later linked to
//! the piece's resource.

use tracing::{debug, instrument};

use annodemo_shared::{ResourceId, TocReference};
use annodemo_text::char_len;

/// Generated ToC text and the reference span of every entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocDocument {
    pub text: String,
    pub references: Vec<TocReference>,
}

/// Build the ToC for `entries` (`(title, resource)` pairs, in order).
///
/// ```text
/// # <title>
///
/// 1. <entry title>
/// 2. <entry title>
/// ```
///
/// Reference offsets are characters, covering the entry title exactly.
#[instrument(skip_all, fields(title = %title, entries = entries.len()))]
pub fn build_toc(title: &str, entries: &[(String, ResourceId)]) -> TocDocument {
    let mut text = format!("# {title}\n\n");
    let mut chars = char_len(&text);
    let mut references = Vec::with_capacity(entries.len());

    for (i, (entry_title, id)) in entries.iter().enumerate() {
        let marker = format!("{}. ", i + 1);
        chars += char_len(&marker);
        text.push_str(&marker);

        let start = chars;
        let title_chars = char_len(entry_title);
        text.push_str(entry_title);
        text.push('\n');
        chars += title_chars + 1;

        references.push(TocReference {
            text: entry_title.clone(),
            start,
            end: start + title_chars,
            document_id: id.clone(),
            annotation_id: None,
        });
    }

    debug!(text_len = text.len(), "table of contents built");

    TocDocument { text, references }
}

/// Resource name for a dataset's ToC.
pub fn toc_name(dataset_title: &str) -> String {
    format!("{dataset_title} - Table of Contents")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_chars(text: &str, start: usize, end: usize) -> String {
        text.chars().skip(start).take(end - start).collect()
    }

    #[test]
    fn builds_numbered_list() {
        let toc = build_toc(
            "Pride and Prejudice",
            &[
                ("Part 1".to_string(), "r-1".into()),
                ("Part 2".to_string(), "r-2".into()),
            ],
        );
        assert_eq!(toc.text, "# Pride and Prejudice\n\n1. Part 1\n2. Part 2\n");
        assert_eq!(toc.references.len(), 2);
        assert_eq!(toc.references[1].document_id, ResourceId::from("r-2"));
        assert!(toc.references.iter().all(|r| r.annotation_id.is_none()));
    }

    #[test]
    fn reference_spans_cover_titles() {
        let entries: Vec<(String, ResourceId)> = (1..=12)
            .map(|i| (format!("Café § {i}"), ResourceId(format!("r-{i}"))))
            .collect();
        let toc = build_toc("Opinions — Überblick", &entries);

        for (reference, (title, _)) in toc.references.iter().zip(&entries) {
            assert_eq!(&slice_chars(&toc.text, reference.start, reference.end), title);
            assert_eq!(&reference.text, title);
        }
    }

    #[test]
    fn empty_toc_has_only_heading() {
        let toc = build_toc("Empty", &[]);
        assert_eq!(toc.text, "# Empty\n\n");
        assert!(toc.references.is_empty());
    }

    #[test]
    fn toc_resource_name() {
        assert_eq!(toc_name("Citizens United v. FEC"), "Citizens United v. FEC - Table of Contents");
    }
}

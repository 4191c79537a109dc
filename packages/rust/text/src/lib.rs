//! Text formatting and chunking for annotation datasets.
//!
//! Turns downloaded sources (HTML, Gutenberg text, arXiv metadata, plain
//! Markdown) into clean text, splits it into paragraph-aligned chunks, and
//! converts byte offsets to the character offsets the backend expects.

mod cleanup;

pub mod chunking;
pub mod format;
pub mod offsets;

pub use chunking::{chunk_document, chunk_fixed, chunk_text, paragraph_breaks};
pub use format::{
    ArxivEntry, ConvertedPage, DOCUMENT_SEPARATOR, format_arxiv, format_plain, html_to_text,
    join_documents, strip_gutenberg_boilerplate,
};
pub use offsets::{byte_offset, char_len, char_offset, char_span};

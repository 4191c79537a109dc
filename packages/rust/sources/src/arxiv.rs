//! arXiv Atom feed parsing.

use scraper::{ElementRef, Html, Selector};

use annodemo_shared::{AnnoDemoError, Result};
use annodemo_text::ArxivEntry;

/// Build the query URL for one paper.
pub(crate) fn query_url(api_base: &str, id: &str) -> String {
    format!("{}/api/query?id_list={id}", api_base.trim_end_matches('/'))
}

/// Extract the first `<entry>` of an arXiv Atom response.
///
/// The abs-page id (`http://arxiv.org/abs/1706.03762v7`) is reduced to the
/// bare identifier; an entry titled `Error` is how arXiv reports a bad id.
pub fn parse_feed(xml: &str) -> Result<ArxivEntry> {
    let doc = Html::parse_document(xml);
    let entry_sel = selector("entry")?;
    let entry = doc
        .select(&entry_sel)
        .next()
        .ok_or_else(|| AnnoDemoError::parse("arXiv response contains no entry"))?;

    let title = child_text(&entry, "entry > title")?.unwrap_or_default();
    if title.is_empty() || title == "Error" {
        let detail = child_text(&entry, "entry > summary")?.unwrap_or_default();
        return Err(AnnoDemoError::parse(format!("arXiv returned an error entry: {detail}")));
    }

    let id = child_text(&entry, "entry > id")?
        .map(|raw| {
            raw.rsplit("/abs/")
                .next()
                .unwrap_or(raw.as_str())
                .to_string()
        })
        .unwrap_or_default();
    let summary = child_text(&entry, "entry > summary")?.unwrap_or_default();

    let name_sel = selector("author > name")?;
    let authors = entry
        .select(&name_sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(ArxivEntry {
        id,
        title,
        authors,
        summary,
    })
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| AnnoDemoError::parse(format!("bad selector '{css}': {e}")))
}

fn child_text(entry: &ElementRef<'_>, css: &str) -> Result<Option<String>> {
    let sel = selector(css)?;
    Ok(entry
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=&amp;id_list=1706.03762</title>
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <title>Attention Is All
  You Need</title>
    <summary>  The dominant sequence transduction models are based on complex
recurrent or convolutional neural networks.
</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <link href="http://arxiv.org/abs/1706.03762v7" rel="alternate" type="text/html"/>
  </entry>
</feed>"#;

    #[test]
    fn parses_entry() {
        let entry = parse_feed(FEED).unwrap();
        assert_eq!(entry.id, "1706.03762v7");
        assert!(entry.title.starts_with("Attention Is All"));
        assert_eq!(entry.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert!(entry.summary.starts_with("The dominant sequence"));
    }

    #[test]
    fn empty_feed_is_parse_error() {
        let err = parse_feed("<feed><title>ArXiv Query</title></feed>").unwrap_err();
        assert!(err.to_string().contains("no entry"));
    }

    #[test]
    fn error_entry_is_reported() {
        let xml = "<feed><entry><id>http://arxiv.org/api/errors#bad</id><title>Error</title>\
                   <summary>incorrect id format for 1234</summary></entry></feed>";
        let err = parse_feed(xml).unwrap_err();
        assert!(err.to_string().contains("incorrect id format"));
    }

    #[test]
    fn query_url_trims_slash() {
        assert_eq!(
            query_url("https://export.arxiv.org/", "1706.03762"),
            "https://export.arxiv.org/api/query?id_list=1706.03762"
        );
    }
}

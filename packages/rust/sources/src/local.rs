//! Local files: a single file, or a directory of `.txt`/`.md` files.

use std::path::Path;

use annodemo_shared::{AnnoDemoError, Document, Result};

const EXTENSIONS: &[&str] = &["txt", "md"];

/// Read the file (or every matching file of the directory, sorted by name)
/// into documents titled by file stem.
pub(crate) fn read_documents(path: &Path) -> Result<Vec<Document>> {
    if !path.exists() {
        return Err(AnnoDemoError::config(format!(
            "local source not found: {}",
            path.display()
        )));
    }

    if path.is_file() {
        return Ok(vec![read_file(path)?]);
    }

    let entries = std::fs::read_dir(path).map_err(|e| AnnoDemoError::io(path, e))?;
    let mut files: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && has_text_extension(p))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(AnnoDemoError::config(format!(
            "no .txt or .md files in {}",
            path.display()
        )));
    }

    files.iter().map(|p| read_file(p)).collect()
}

fn read_file(path: &Path) -> Result<Document> {
    let content = std::fs::read_to_string(path).map_err(|e| AnnoDemoError::io(path, e))?;
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(Document { title, content })
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|x| ext.eq_ignore_ascii_case(x)))
}

//! Per-dataset state file: `<root>/<dataset>/state.json`.
//!
//! Written wholesale by `load`, read by `annotate` and `validate`. There is
//! no locking; the last writer wins.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use annodemo_shared::{AnnoDemoError, DatasetState, Result};

const STATE_FILE: &str = "state.json";

/// JSON state files under a data directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the state file for `dataset`.
    pub fn path(&self, dataset: &str) -> PathBuf {
        self.root.join(dataset).join(STATE_FILE)
    }

    pub fn exists(&self, dataset: &str) -> bool {
        self.path(dataset).is_file()
    }

    /// Read the state of `dataset`; `NotLoaded` when no state file exists.
    #[instrument(skip(self))]
    pub fn read(&self, dataset: &str) -> Result<DatasetState> {
        let path = self.path(dataset);
        if !path.is_file() {
            return Err(AnnoDemoError::NotLoaded {
                dataset: dataset.to_string(),
            });
        }

        let raw = std::fs::read_to_string(&path).map_err(|e| AnnoDemoError::io(&path, e))?;
        let state: DatasetState = serde_json::from_str(&raw).map_err(|e| {
            AnnoDemoError::parse(format!("invalid state file {}: {e}", path.display()))
        })?;

        if state.dataset != dataset {
            return Err(AnnoDemoError::validation(format!(
                "state file {} belongs to dataset '{}'",
                path.display(),
                state.dataset
            )));
        }

        debug!(chunks = state.chunk_ids.len(), "state read");
        Ok(state)
    }

    /// Write `state` as pretty JSON via a temp file and rename.
    #[instrument(skip_all, fields(dataset = %state.dataset))]
    pub fn write(&self, state: &DatasetState) -> Result<PathBuf> {
        let dir = self.root.join(&state.dataset);
        std::fs::create_dir_all(&dir).map_err(|e| AnnoDemoError::io(&dir, e))?;

        let json = serde_json::to_string_pretty(state)
            .map_err(|e| AnnoDemoError::parse(format!("failed to serialize state: {e}")))?;

        let target = dir.join(STATE_FILE);
        let temp = dir.join(format!(".{STATE_FILE}.tmp"));
        std::fs::write(&temp, json).map_err(|e| AnnoDemoError::io(&temp, e))?;
        std::fs::rename(&temp, &target).map_err(|e| AnnoDemoError::io(&target, e))?;

        debug!(path = %target.display(), "state written");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annodemo_shared::{TextSpan, TocReference};

    fn temp_store() -> StateStore {
        StateStore::new(std::env::temp_dir().join(format!("annodemo-state-test-{}", uuid::Uuid::now_v7())))
    }

    fn sample(dataset: &str) -> DatasetState {
        DatasetState {
            dataset: dataset.into(),
            toc_id: Some("toc-1".into()),
            chunk_ids: vec!["r-1".into(), "r-2".into()],
            chunk_titles: vec!["Doc - Part 1".into(), "Doc - Part 2".into()],
            chunk_spans: vec![TextSpan::new(0, 4), TextSpan::new(6, 10)],
            references: vec![TocReference {
                text: "Doc - Part 1".into(),
                start: 9,
                end: 21,
                document_id: "r-1".into(),
                annotation_id: Some("a-1".into()),
            }],
            formatted_text: "AAAA\n\nBBBB".into(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn missing_state_is_not_loaded() {
        let store = temp_store();
        assert!(!store.exists("nope"));
        let err = store.read("nope").unwrap_err();
        assert!(matches!(err, AnnoDemoError::NotLoaded { dataset } if dataset == "nope"));
    }

    #[test]
    fn write_then_read() {
        let store = temp_store();
        let state = sample("cases");

        let path = store.write(&state).unwrap();
        assert_eq!(path, store.path("cases"));
        assert!(store.exists("cases"));

        let read = store.read("cases").unwrap();
        assert_eq!(read.chunk_ids, state.chunk_ids);
        assert_eq!(read.references, state.references);
        assert_eq!(read.piece_text(1), Some("BBBB"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"chunkIds\""));
        assert!(raw.contains("\"formattedText\""));

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn write_overwrites_wholesale() {
        let store = temp_store();
        store.write(&sample("cases")).unwrap();

        let mut second = sample("cases");
        second.toc_id = None;
        second.chunk_ids = vec!["only".into()];
        store.write(&second).unwrap();

        let read = store.read("cases").unwrap();
        assert_eq!(read.toc_id, None);
        assert_eq!(read.chunk_ids.len(), 1);
        assert!(!store.path("cases").with_file_name(".state.json.tmp").exists());

        let _ = std::fs::remove_dir_all(store.root());
    }

    #[test]
    fn corrupt_state_is_parse_error() {
        let store = temp_store();
        let path = store.path("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();

        let err = store.read("broken").unwrap_err();
        assert!(matches!(err, AnnoDemoError::Parse { .. }));

        let _ = std::fs::remove_dir_all(store.root());
    }
}

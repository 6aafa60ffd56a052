//! Queue store (C9): a directory-backed FIFO of pending run requests, one
//! subdirectory per DAG. Enqueue writes to a temp file and renames it into
//! place (atomic with respect to readers); dequeue takes the
//! lexicographically smallest filename and unlinks it after reading, so a
//! crash between read and unlink just means the request is retried.

use crate::hashpath::hash_path;
use chrono::Utc;
use std::path::{Path, PathBuf};

pub struct QueueStore {
    dir: PathBuf,
}

impl QueueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn dag_dir(&self, dag_path: &Path) -> PathBuf {
        self.dir.join(hash_path(dag_path))
    }

    /// Enqueues `payload` (typically the JSON-encoded run request) under a
    /// `<timestamp>-<id>.json` filename so dequeue order matches arrival
    /// order for requests enqueued more than a microsecond apart.
    pub fn enqueue(&self, dag_path: &Path, id: &str, payload: &str) -> std::io::Result<PathBuf> {
        let dir = self.dag_dir(dag_path);
        std::fs::create_dir_all(&dir)?;

        let timestamp = Utc::now().format("%Y%m%d%H%M%S%.6f");
        let final_name = format!("{timestamp}-{id}.json");
        let tmp_path = dir.join(format!(".{final_name}.tmp"));
        let final_path = dir.join(final_name);

        std::fs::write(&tmp_path, payload)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(final_path)
    }

    /// Pops the oldest pending request for `dag_path`, if any.
    pub fn dequeue(&self, dag_path: &Path) -> std::io::Result<Option<String>> {
        let dir = self.dag_dir(dag_path);
        if !dir.exists() {
            return Ok(None);
        }

        let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| !n.to_string_lossy().starts_with('.'))
                    .unwrap_or(false)
            })
            .collect();
        entries.sort();

        let Some(path) = entries.into_iter().next() else {
            return Ok(None);
        };
        let payload = std::fs::read_to_string(&path)?;
        std::fs::remove_file(&path)?;
        Ok(Some(payload))
    }

    /// Removes a specific pending request by its `id` component, regardless
    /// of position in the FIFO order. Used by `dagu dequeue --dag-run=`,
    /// which targets one request rather than popping the oldest.
    pub fn remove(&self, dag_path: &Path, id: &str) -> std::io::Result<bool> {
        let dir = self.dag_dir(dag_path);
        if !dir.exists() {
            return Ok(false);
        }
        let suffix = format!("-{id}.json");
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path
                .file_name()
                .map(|n| n.to_string_lossy().ends_with(&suffix))
                .unwrap_or(false)
            {
                std::fs::remove_file(&path)?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn len(&self, dag_path: &Path) -> usize {
        let dir = self.dag_dir(dag_path);
        std::fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| {
                        e.file_name()
                            .to_str()
                            .map(|n| !n.starts_with('.'))
                            .unwrap_or(false)
                    })
                    .count()
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self, dag_path: &Path) -> bool {
        self.len(dag_path) == 0
    }
}

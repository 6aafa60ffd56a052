//! Suspend flags (C9): a zero-byte file per suspended DAG, checked by the
//! scheduler on every tick before it fires a DAG's schedule.

use crate::hashpath::hash_path;
use std::path::{Path, PathBuf};

pub struct SuspendStore {
    dir: PathBuf,
}

impl SuspendStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn flag_path(&self, dag_path: &Path) -> PathBuf {
        self.dir.join(hash_path(dag_path))
    }

    pub fn suspend(&self, dag_path: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::File::create(self.flag_path(dag_path))?;
        Ok(())
    }

    pub fn resume(&self, dag_path: &Path) -> std::io::Result<()> {
        let path = self.flag_path(dag_path);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn is_suspended(&self, dag_path: &Path) -> bool {
        self.flag_path(dag_path).exists()
    }
}

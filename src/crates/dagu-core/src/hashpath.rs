//! Deterministic hashing of a DAG's identity path into a filesystem- and
//! socket-path-safe slug, shared by the History Store (data directory layout)
//! and the control socket (socket filename).

use sha1::{Digest, Sha1};

pub fn hash_path(path: &std::path::Path) -> String {
    let mut hasher = Sha1::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn same_path_hashes_the_same() {
        let a = hash_path(Path::new("/dags/example.yaml"));
        let b = hash_path(Path::new("/dags/example.yaml"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_hash_differently() {
        let a = hash_path(Path::new("/dags/a.yaml"));
        let b = hash_path(Path::new("/dags/b.yaml"));
        assert_ne!(a, b);
    }
}

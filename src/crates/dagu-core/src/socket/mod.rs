//! The control socket (C6): a per-run Unix domain socket an Agent listens on
//! so the CLI and a parent run can query status and request cancellation
//! without going through the History Store.

mod error;
mod server;

pub use error::{Result, SocketError};
pub use server::{Server, StatusView};

use crate::hashpath::hash_path;
use std::path::{Path, PathBuf};

/// Deterministic socket path for a DAG, `<socket_dir>/<hash(dag identity path)>.sock`.
/// Keyed on the DAG's identity path rather than a run id: binding is what
/// enforces "at most one Agent per DAG at a time" (a second run of the same
/// DAG fails to bind and gets [`SocketError::RunAlreadyActive`]).
pub fn path_for(socket_dir: impl AsRef<Path>, dag_path: &Path) -> PathBuf {
    socket_dir.as_ref().join(format!("{}.sock", hash_path(dag_path)))
}

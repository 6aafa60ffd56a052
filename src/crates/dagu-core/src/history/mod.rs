//! The History Store (C5): an append-only, per-(DAG, day) log of Status
//! Snapshots, with a liveness check that corrects stale `Running` reads.

mod error;
mod snapshot;
mod store;
mod writer;

pub use error::{HistoryError, Result};
pub use snapshot::{RunState, Snapshot};
pub use store::Store;
pub use writer::Writer;

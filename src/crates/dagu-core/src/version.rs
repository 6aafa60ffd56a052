//! Version information for the `dagu-core` crate, surfaced by the CLI's
//! `--version` flag via `clap`'s `#[command(version)]`.

/// Version string for this crate, taken from `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

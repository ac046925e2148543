//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `WASMHOST_*` env overrides.
//!
//! # Module layout
//!
//! - **types**: `HostConfig` (loaded operator settings), `RuntimeConfig`
//!   (reconciled canonical shape) and the `FrozenConfig` handle.
//! - **raw**: Raw TOML deserialization types (`RawConfig`, `RawHost`, …).
//!   These mirror the file shape and use serde defaults; kept private.
//! - **load**: Loading logic: `merge_toml`, `load_raw_merged`, `load`,
//!   `load_from`, `apply_overrides`.

mod load;
mod raw;
mod types;

pub use load::{EnvOverrides, apply_overrides, load, load_from};
pub use types::*;

//! wasmhost: bootstrap core of a distributed WebAssembly actor host.
//!
//! The binary entry point is src/main.rs; everything it drives lives here so
//! integration tests can boot a host in-process.

mod core;

pub mod bootstrap;
pub mod host;
pub mod shared;
pub mod supervisor;

pub use core::{config, error};

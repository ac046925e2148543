//! Bootstrap layer: modules that run before the supervision topology starts.
//!
//! - **identity**: ed25519 keypair generation, seed decoding, fallback resolution.
//! - **trust**: cluster identity and accepted-issuer reconciliation.
//! - **reconcile**: merges loaded config, identities and per-boot values.
//! - **chunking**: chunked-transfer connection negotiation seam.
//! - **persist**: redacted config snapshots on disk.
//! - **logger**: tracing-subscriber initialisation and sink swap.

pub mod chunking;
pub mod identity;
pub mod logger;
pub mod persist;
pub mod reconcile;
pub mod trust;

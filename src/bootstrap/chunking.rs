//! Chunked-transfer connection negotiation.
//!
//! Invocation payloads above the inline limit travel out of band. The host
//! only hands the connection descriptor to whoever implements
//! [`ChunkingConfigurator`]; the transfer itself lives elsewhere.

use std::sync::OnceLock;

use thiserror::Error;

/// Connection details for the chunked-transfer store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConnection {
    pub host: String,
    pub port: u16,
    pub seed: String,
    pub lattice: String,
    pub jwt: String,
    pub js_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkingError {
    #[error("chunking host must not be empty")]
    EmptyHost,

    #[error("chunking port must be non-zero")]
    ZeroPort,

    #[error("chunking connection already configured")]
    AlreadyConfigured,

    #[error("chunking configuration rejected: {0}")]
    Rejected(String),
}

/// Receives the chunking connection descriptor once per boot.
pub trait ChunkingConfigurator: Send + Sync {
    fn configure(&self, connection: &ChunkingConnection) -> Result<(), ChunkingError>;
}

/// Write-once holder for the negotiated descriptor.
///
/// Subsystems that move large payloads read it back with [`ChunkingSlot::get`];
/// `None` means chunking is disabled for this boot.
#[derive(Debug, Default)]
pub struct ChunkingSlot {
    connection: OnceLock<ChunkingConnection>,
}

impl ChunkingSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&ChunkingConnection> {
        self.connection.get()
    }
}

impl ChunkingConfigurator for ChunkingSlot {
    fn configure(&self, connection: &ChunkingConnection) -> Result<(), ChunkingError> {
        if connection.host.trim().is_empty() {
            return Err(ChunkingError::EmptyHost);
        }
        if connection.port == 0 {
            return Err(ChunkingError::ZeroPort);
        }
        self.connection
            .set(connection.clone())
            .map_err(|_| ChunkingError::AlreadyConfigured)
    }
}

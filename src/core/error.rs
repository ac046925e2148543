//! Application-wide error types.
//!
//! Only conditions that abort boot surface as [`AppError`]. Degraded paths
//! (bad seeds, chunking, persistence) are logged and resolved where they occur.

use thiserror::Error;

use crate::supervisor::TopologyError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("persist error: {0}")]
    Persist(String),

    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn logger_error_display() {
        let e = AppError::Logger("already initialized".into());
        assert!(e.to_string().contains("already initialized"));
    }

    #[test]
    fn topology_error_converts() {
        let e: AppError = TopologyError::EmptyTopology.into();
        assert!(e.to_string().starts_with("topology error"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}

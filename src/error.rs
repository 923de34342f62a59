//! Error types and result aliases for featurecode.
//!
//! This module defines the error handling infrastructure:
//! - [`Result<T>`]: Type alias for `anyhow::Result<T>` used throughout the crate
//! - [`ProcessError`]: fatal conditions callers may want to match on
//!
//! Malformed numeric tokens and unknown feature markers are not errors; the
//! engine recovers from them locally and counts them in the pass summary.

use std::io;
use std::path::PathBuf;

use anyhow::Result as AnyhowResult;

pub type Result<T> = AnyhowResult<T>;

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProcessError::InputNotFound {
            path: PathBuf::from("part.gcode"),
        };
        assert_eq!(err.to_string(), "input not found: part.gcode");

        let err = ProcessError::InvalidConfig("fan 120".to_string());
        assert_eq!(err.to_string(), "invalid configuration: fan 120");
    }

    #[test]
    fn test_io_source_is_kept() {
        let err = ProcessError::Write {
            path: PathBuf::from("out.gcode"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "denied");
    }
}

// crates/core/src/error.rs

//! Error taxonomy for the capability lifecycle.
//!
//! A capability throwing at runtime is *not* an error here: the sandbox turns
//! it into a [`Fault`](crate::types::Fault) inside the execution outcome.

use std::path::PathBuf;

use crate::types::Fault;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("no versions found for capability `{name}`")]
    NotFound { name: String },
    #[error("capability `{name}` was declined by the reviewer")]
    Declined { name: String },
    #[error("failed to fix capability `{name}` after {attempts} attempts; last fault: {last_fault}")]
    RepairExhausted {
        name: String,
        attempts: u32,
        last_fault: Fault,
    },
    #[error("generator response did not contain the expected {expected}")]
    GeneratorProtocol { expected: String },
    #[error("generator request failed: {0:#}")]
    Generator(#[source] anyhow::Error),
    #[error("dependency installation failed: {0}")]
    Install(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn protocol(expected: impl Into<String>) -> Self {
        Self::GeneratorProtocol {
            expected: expected.into(),
        }
    }
}

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MaceError {
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Algorithm error: {0}")]
    Algorithm(#[from] mace_algo::MaceError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MaceError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, MaceError>;

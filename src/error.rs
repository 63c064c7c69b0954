use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot decode input: {0}")]
    Decode(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("recognizer did not finish within {0:?}")]
    Timeout(Duration),

    #[error("unsupported export format '{0}' (expected one of txt, pdf, docx, md, json)")]
    UnsupportedFormat(String),

    #[error("unsupported input type: {0}")]
    UnsupportedInput(String),

    #[error("failed to render PDF pages: {0}")]
    Render(String),

    #[error("I/O failure at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write document: {0}")]
    Export(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScanError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Recognition and timeout failures degrade a page instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recognition(_) | Self::Timeout(_))
    }
}

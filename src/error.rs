use std::path::PathBuf;
use thiserror::Error;

use crate::browser::BrowserError;
use crate::fetcher::FetchError;
use crate::http_client::HttpError;

pub type Result<T> = core::result::Result<T, HarvestError>;

/// Errors surfaced by the harvesting pipeline and its maintenance passes
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Operator input rejected before any work starts
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A chapter page could not be opened
    #[error("Navigation to {url} failed: {source}")]
    NavigationFailure {
        url: String,
        #[source]
        source: BrowserError,
    },

    /// An element did not appear within its bound
    #[error("Timed out extracting {0}")]
    ExtractionTimeout(String),

    #[error("Fetching {url} failed: {source}")]
    FetchFailure {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Could not hash {path}: {source}")]
    HashFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not delete {path}: {source}")]
    DeleteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl HarvestError {
    /// Whether this error ends the whole operation rather than a single item
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::InvalidInput(_)
                | HarvestError::NavigationFailure { .. }
                | HarvestError::Config(_)
                | HarvestError::Logging(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_item_errors_are_not_fatal() {
        let err = HarvestError::DeleteFailure {
            path: PathBuf::from("a.webp"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!err.is_fatal());
        assert!(HarvestError::InvalidInput("stop".into()).is_fatal());
    }

    #[test]
    fn messages_name_the_subject() {
        let err = HarvestError::ExtractionTimeout("chapter number".into());
        assert_eq!(err.to_string(), "Timed out extracting chapter number");
    }
}

//! Error types for pokespin.
//!
//! Library crates use [`PokespinError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pokespin operations.
#[derive(Debug, thiserror::Error)]
pub enum PokespinError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A fetch that exhausted its retry budget or hit a non-retryable status.
    #[error("failed to fetch {url} after {attempts} attempt(s): {reason}")]
    Fetch {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// The input table is missing required columns or holds malformed keys.
    #[error("schema error: {message}")]
    Schema { message: String },

    /// Malformed upstream data that could not be interpreted.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Backup copy or final rename failed while publishing a table.
    #[error("publish error at {path:?}: {source}")]
    Publish {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An error raised while processing a specific item.
    #[error("item {id}: {source}")]
    Item {
        id: u32,
        #[source]
        source: Box<PokespinError>,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PokespinError>;

impl PokespinError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a schema error from any displayable message.
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a publish-step `std::io::Error` with the path it failed on.
    pub fn publish(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Publish {
            path: path.into(),
            source,
        }
    }

    /// Attach the item ID that was being processed when `self` occurred.
    pub fn for_item(self, id: u32) -> Self {
        Self::Item {
            id,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PokespinError::schema("missing columns: [\"BallType\"]");
        assert_eq!(err.to_string(), "schema error: missing columns: [\"BallType\"]");

        let err = PokespinError::Fetch {
            url: "https://pokeapi.co/api/v2/pokemon/1".into(),
            attempts: 3,
            reason: "HTTP 503".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch https://pokeapi.co/api/v2/pokemon/1 after 3 attempt(s): HTTP 503"
        );
    }

    #[test]
    fn item_error_keeps_row_and_cause() {
        let err = PokespinError::Fetch {
            url: "http://x/pokemon/25".into(),
            attempts: 6,
            reason: "connection refused".into(),
        }
        .for_item(25);

        let text = err.to_string();
        assert!(text.starts_with("item 25: failed to fetch http://x/pokemon/25"));
        assert!(std::error::Error::source(&err).is_some());
    }
}

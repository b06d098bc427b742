//! Error kinds shared across the mcloud crates.
//!
//! One enum carries every error kind named in the component design so that
//! the task engine's dispatch boundary (`mcloud_registry::HandlerRegistry`)
//! has a single type to pattern-match when deciding whether a failure is
//! recoverable (logged as progress) or terminal (`task.failure`).

use thiserror::Error;

pub type McloudResult<T> = Result<T, McloudError>;

#[derive(Debug, Error)]
pub enum McloudError {
    #[error("application not found: {0}")]
    NotFound(String),

    #[error("application already exists: {0}")]
    AlreadyExists(String),

    #[error("config parse error: {0}")]
    ConfigParseError(String),

    #[error("volume not found: {0}")]
    VolumeNotFound(String),

    #[error("container not found by name")]
    ContainerMissing,

    #[error("timed out waiting for event: {pattern}")]
    Timeout { pattern: String },

    #[error("No such task: {0}")]
    UnknownTask(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("invalid value: {0}")]
    ValueError(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl McloudError {
    /// Errors that a task handler may log as progress and continue past,
    /// as opposed to ones that must resolve the ticket as failed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, McloudError::ContainerMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_missing_is_recoverable() {
        assert!(McloudError::ContainerMissing.is_recoverable());
    }

    #[test]
    fn not_found_is_not_recoverable() {
        assert!(!McloudError::NotFound("demo".into()).is_recoverable());
    }

    #[test]
    fn display_messages() {
        assert_eq!(
            McloudError::UnknownTask("nope".into()).to_string(),
            "No such task: nope"
        );
        assert_eq!(
            McloudError::VolumeNotFound("data".into()).to_string(),
            "volume not found: data"
        );
    }

    #[test]
    fn json_error_converts() {
        let err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let wrapped: McloudError = err.into();
        assert!(matches!(wrapped, McloudError::Json(_)));
    }
}

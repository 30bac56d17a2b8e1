use thiserror::Error;

use crate::events::MediaSource;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HuddleError {
    #[error("permission denied for {0}")]
    PermissionDenied(MediaSource),
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("not supported: {0}")]
    Unsupported(String),
    #[error("suggestion service failed: {0}")]
    SuggestionService(String),
    #[error("could not load profile: {0}")]
    ProfileLoad(String),
    #[error("{0}")]
    ValidationRejected(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("http error: {0}")]
    Http(String),
}

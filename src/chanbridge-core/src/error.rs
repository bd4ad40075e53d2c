use crate::value::ValueError;
use thiserror::Error;

/// Failures while handling a single invocation.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{method}: missing argument `{name}`")]
    MissingArgument { method: String, name: String },
    #[error("{method}: invalid argument `{name}`: {source}")]
    InvalidArgument {
        method: String,
        name: String,
        source: ValueError,
    },
    #[error("{method}: result cannot be sent: {source}")]
    InvalidResult { method: String, source: ValueError },
    #[error("{method}: a response is already staged")]
    AlreadyStaged { method: String },
    #[error("{method}: no response staged before sending")]
    NothingStaged { method: String },
    #[error("{method}: {message}")]
    Handler { method: String, message: String },
    #[error("failed to send response: {0}")]
    Reply(#[from] ReplyError),
}

impl CallError {
    /// True when the caller sent something this plugin cannot accept, as
    /// opposed to a failure on the plugin side.
    pub fn is_bad_invocation(&self) -> bool {
        matches!(
            self,
            CallError::MissingArgument { .. } | CallError::InvalidArgument { .. }
        )
    }
}

/// Failures of the reply channel itself.
#[derive(Debug, Error)]
pub enum ReplyError {
    #[error("reply channel is closed")]
    Closed,
    #[error("failed to write reply: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

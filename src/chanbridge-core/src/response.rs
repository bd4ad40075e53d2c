use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The outcome of one invocation, as sent back over the reply channel.
#[derive(Debug, Clone, PartialEq)]
pub enum MethodResponse {
    /// Successful call; a null payload is `Success(Value::Null)`.
    Success(Value),
    /// The invoked method is not supported by this plugin.
    NotImplemented,
    /// The call was understood but failed.
    Error(ErrorResponse),
}

/// Error payload of a [`MethodResponse::Error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl MethodResponse {
    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success(value.into())
    }

    pub fn null() -> Self {
        Self::Success(Value::Null)
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>, details: Option<Value>) -> Self {
        Self::Error(ErrorResponse {
            code: code.into(),
            message: message.into(),
            details,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented)
    }

    /// The success payload, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Success(value) => Some(value),
            _ => None,
        }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success(Value::Null) => "null",
            Self::Success(_) => "success",
            Self::NotImplemented => "not_implemented",
            Self::Error(_) => "error",
        }
    }
}

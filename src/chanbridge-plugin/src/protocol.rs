//! Wire envelope for method-channel traffic.
//!
//! One JSON object per line. Requests carry a correlation id, the method
//! name and its named arguments; responses echo the id with a tagged result.

use chanbridge_core::{Arguments, ErrorResponse, Invocation, MethodResponse, Value};
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// Error codes used in [`PluginResult::Error`] responses produced by this crate.
pub mod error_codes {
    /// A required argument was missing or had the wrong kind.
    pub const BAD_INVOCATION: &str = "bad_invocation";
    /// The handler failed for reasons other than its arguments.
    pub const HANDLER_ERROR: &str = "handler_error";
    /// The handler returned without staging a response.
    pub const NO_RESPONSE: &str = "no_response";
    /// The request line could not be decoded.
    pub const MALFORMED_REQUEST: &str = "malformed_request";
}

/// Request sent by the host to the plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Unique request ID for correlation.
    pub id: u64,
    /// Name of the method to invoke.
    pub method: String,
    /// Named arguments; may be omitted when the method takes none.
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub args: Arguments,
}

/// Response from the plugin to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Request ID this response correlates to.
    pub id: u64,
    pub result: PluginResult,
}

/// Result of a method invocation on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PluginResult {
    Success {
        #[serde(default)]
        value: Value,
    },
    NotImplemented,
    Error(ErrorResponse),
}

impl PluginRequest {
    pub fn new(id: u64, invocation: &Invocation) -> Self {
        Self {
            id,
            method: invocation.name().to_string(),
            args: invocation.arguments().clone(),
        }
    }

    /// Splits the request into its correlation id and the invocation.
    pub fn into_invocation(self) -> (u64, Invocation) {
        (self.id, Invocation::with_arguments(self.method, self.args))
    }
}

impl PluginResponse {
    pub fn new(id: u64, response: MethodResponse) -> Self {
        Self {
            id,
            result: response.into(),
        }
    }
}

impl From<MethodResponse> for PluginResult {
    fn from(response: MethodResponse) -> Self {
        match response {
            MethodResponse::Success(value) => Self::Success { value },
            MethodResponse::NotImplemented => Self::NotImplemented,
            MethodResponse::Error(err) => Self::Error(err),
        }
    }
}

impl From<PluginResult> for MethodResponse {
    fn from(result: PluginResult) -> Self {
        match result {
            PluginResult::Success { value } => Self::Success(value),
            PluginResult::NotImplemented => Self::NotImplemented,
            PluginResult::Error(err) => Self::Error(err),
        }
    }
}

//! Incoming invocations and the per-call adapter handlers work with.
//!
//! A [`Method`] wraps one [`Invocation`] together with its reply channel.
//! Handlers read typed arguments from it, stage exactly one response and
//! finally call [`Method::return_result`], which consumes the adapter so a
//! response can never be sent twice.

use crate::error::{CallError, ReplyError};
use crate::response::MethodResponse;
use crate::value::{FromValue, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Named arguments of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Arguments(BTreeMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// One named method call received from the host.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    name: String,
    arguments: Arguments,
}

impl Invocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Arguments::new(),
        }
    }

    pub fn with_arguments(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Builder-style helper, mostly for tests and the CLI.
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name, value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }
}

/// The reply channel of one invocation.
pub trait Responder {
    /// Delivers the response. Called at most once per invocation.
    fn respond(self: Box<Self>, response: MethodResponse) -> Result<(), ReplyError>;
}

impl<F> Responder for F
where
    F: FnOnce(MethodResponse) -> Result<(), ReplyError>,
{
    fn respond(self: Box<Self>, response: MethodResponse) -> Result<(), ReplyError> {
        (*self)(response)
    }
}

/// Adapter around a single invocation and its pending response.
pub struct Method {
    invocation: Invocation,
    responder: Box<dyn Responder>,
    pending: Option<MethodResponse>,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("invocation", &self.invocation)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Method {
    pub fn new(invocation: Invocation, responder: impl Responder + 'static) -> Self {
        Self {
            invocation,
            responder: Box::new(responder),
            pending: None,
        }
    }

    pub fn name(&self) -> &str {
        self.invocation.name()
    }

    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    /// Reads the argument `name` as `T`.
    pub fn get_argument<T: FromValue>(&self, name: &str) -> Result<T, CallError> {
        let value = self
            .invocation
            .arguments()
            .get(name)
            .ok_or_else(|| CallError::MissingArgument {
                method: self.name().to_string(),
                name: name.to_string(),
            })?;
        self.convert(name, value)
    }

    /// Like [`Method::get_argument`], but an absent or null argument is `None`.
    pub fn get_optional_argument<T: FromValue>(&self, name: &str) -> Result<Option<T>, CallError> {
        match self.invocation.arguments().get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => self.convert(name, value).map(Some),
        }
    }

    fn convert<T: FromValue>(&self, name: &str, value: &Value) -> Result<T, CallError> {
        T::from_value(value).map_err(|source| CallError::InvalidArgument {
            method: self.name().to_string(),
            name: name.to_string(),
            source,
        })
    }

    pub fn return_value(&mut self, result: impl Into<Value>) -> Result<(), CallError> {
        self.stage(MethodResponse::Success(result.into()))
    }

    pub fn return_null(&mut self) -> Result<(), CallError> {
        self.stage(MethodResponse::null())
    }

    pub fn return_not_implemented(&mut self) -> Result<(), CallError> {
        self.stage(MethodResponse::NotImplemented)
    }

    pub fn return_error(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Result<(), CallError> {
        self.stage(MethodResponse::error(code, message, details))
    }

    /// Stages `response`. Fails if one is already pending or if its payload
    /// has no wire form, leaving nothing staged in the latter case.
    pub fn stage(&mut self, response: MethodResponse) -> Result<(), CallError> {
        if self.pending.is_some() {
            return Err(CallError::AlreadyStaged {
                method: self.name().to_string(),
            });
        }
        let payload = match &response {
            MethodResponse::Success(value) => Some(value),
            MethodResponse::Error(err) => err.details.as_ref(),
            MethodResponse::NotImplemented => None,
        };
        if let Some(value) = payload {
            value
                .ensure_encodable()
                .map_err(|source| CallError::InvalidResult {
                    method: self.name().to_string(),
                    source,
                })?;
        }
        tracing::trace!(method = %self.name(), response = response.label(), "staged response");
        self.pending = Some(response);
        Ok(())
    }

    pub fn is_staged(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&MethodResponse> {
        self.pending.as_ref()
    }

    /// Removes the staged response so another can be staged in its place.
    pub fn take_pending(&mut self) -> Option<MethodResponse> {
        self.pending.take()
    }

    /// Sends the staged response over the reply channel.
    ///
    /// The responder is not invoked when nothing is staged.
    pub fn return_result(self) -> Result<(), CallError> {
        let Method {
            invocation,
            responder,
            pending,
        } = self;
        let response = pending.ok_or_else(|| CallError::NothingStaged {
            method: invocation.name().to_string(),
        })?;
        tracing::debug!(method = %invocation.name(), response = response.label(), "sending response");
        responder.respond(response)?;
        Ok(())
    }
}

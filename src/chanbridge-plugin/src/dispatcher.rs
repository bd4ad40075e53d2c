//! Routes invocations to handlers by method name.

use crate::protocol::error_codes;
use chanbridge_core::{CallError, Invocation, Method, MethodResponse, Responder};
use std::collections::BTreeMap;

/// Handles one kind of invocation.
///
/// A handler reads its arguments and stages a response on `method`; the
/// dispatcher sends it. Returning an error replaces whatever was staged with
/// an error response.
pub trait MethodHandler: Send + Sync {
    fn handle(&self, method: &mut Method) -> Result<(), CallError>;
}

impl<F> MethodHandler for F
where
    F: Fn(&mut Method) -> Result<(), CallError> + Send + Sync,
{
    fn handle(&self, method: &mut Method) -> Result<(), CallError> {
        self(method)
    }
}

/// What happened to a dispatched invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler staged a success or error response of its own.
    Handled,
    /// No handler (or the handler itself) answered not-implemented.
    NotImplemented,
    /// The handler failed or staged nothing; an error response was sent.
    Rejected,
}

/// Name-to-handler routing table for one channel.
pub struct Dispatcher {
    channel: String,
    handlers: BTreeMap<String, Box<dyn MethodHandler>>,
}

impl Dispatcher {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            handlers: BTreeMap::new(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Registers `handler` for `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, handler: impl MethodHandler + 'static) {
        let name = name.into();
        if self.handlers.insert(name.clone(), Box::new(handler)).is_some() {
            tracing::warn!(channel = %self.channel, method = %name, "replaced existing handler");
        }
    }

    pub fn with_handler(mut self, name: impl Into<String>, handler: impl MethodHandler + 'static) -> Self {
        self.register(name, handler);
        self
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Handles `invocation` and sends exactly one response through `responder`.
    pub fn dispatch(
        &self,
        invocation: Invocation,
        responder: impl Responder + 'static,
    ) -> Result<DispatchOutcome, CallError> {
        let mut method = Method::new(invocation, responder);

        let outcome = match self.handlers.get(method.name()) {
            None => {
                tracing::debug!(channel = %self.channel, method = %method.name(), "no handler registered");
                method.return_not_implemented()?;
                DispatchOutcome::NotImplemented
            }
            Some(handler) => match handler.handle(&mut method) {
                Ok(()) => match method.pending().map(MethodResponse::is_not_implemented) {
                    Some(true) => DispatchOutcome::NotImplemented,
                    Some(false) => DispatchOutcome::Handled,
                    None => {
                        tracing::warn!(
                            channel = %self.channel,
                            method = %method.name(),
                            "handler returned without staging a response"
                        );
                        let message = format!("{} produced no response", method.name());
                        method.return_error(error_codes::NO_RESPONSE, message, None)?;
                        DispatchOutcome::Rejected
                    }
                },
                Err(err) => {
                    let code = if err.is_bad_invocation() {
                        error_codes::BAD_INVOCATION
                    } else {
                        error_codes::HANDLER_ERROR
                    };
                    tracing::warn!(
                        channel = %self.channel,
                        method = %method.name(),
                        code,
                        error = %err,
                        "invocation rejected"
                    );
                    method.take_pending();
                    method.return_error(code, err.to_string(), None)?;
                    DispatchOutcome::Rejected
                }
            },
        };

        method.return_result()?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chanbridge_core::{ReplyError, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn run(dispatcher: &Dispatcher, invocation: Invocation) -> (DispatchOutcome, MethodResponse) {
        let sent: Rc<RefCell<Option<MethodResponse>>> = Rc::default();
        let sink = Rc::clone(&sent);
        let outcome = dispatcher
            .dispatch(
                invocation,
                move |response: MethodResponse| -> Result<(), ReplyError> {
                    *sink.borrow_mut() = Some(response);
                    Ok(())
                },
            )
            .unwrap();
        let response = sent.borrow_mut().take().expect("a response is always sent");
        (outcome, response)
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new("test")
            .with_handler("getPosition", |method: &mut Method| method.return_value(42))
            .with_handler("seek", |method: &mut Method| {
                let position: i32 = method.get_argument("position")?;
                method.return_value(position)
            })
            .with_handler("silent", |_: &mut Method| -> Result<(), CallError> { Ok(()) })
            .with_handler("later", |method: &mut Method| method.return_not_implemented())
            .with_handler("broken", |method: &mut Method| -> Result<(), CallError> {
                method.return_value("half done")?;
                Err(CallError::Handler {
                    method: method.name().to_string(),
                    message: "device unavailable".into(),
                })
            })
    }

    #[test]
    fn registered_handler_answers() {
        let (outcome, response) = run(&dispatcher(), Invocation::new("getPosition"));
        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(response, MethodResponse::Success(Value::Int(42)));
    }

    #[test]
    fn unknown_method_is_not_implemented() {
        let (outcome, response) = run(&dispatcher(), Invocation::new("eject"));
        assert_eq!(outcome, DispatchOutcome::NotImplemented);
        assert!(response.is_not_implemented());
    }

    #[test]
    fn handler_may_decline() {
        let (outcome, response) = run(&dispatcher(), Invocation::new("later"));
        assert_eq!(outcome, DispatchOutcome::NotImplemented);
        assert!(response.is_not_implemented());
    }

    #[test]
    fn missing_argument_becomes_bad_invocation() {
        let (outcome, response) = run(&dispatcher(), Invocation::new("seek"));
        assert_eq!(outcome, DispatchOutcome::Rejected);
        match response {
            MethodResponse::Error(err) => {
                assert_eq!(err.code, error_codes::BAD_INVOCATION);
                assert!(err.message.contains("position"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn mistyped_argument_becomes_bad_invocation() {
        let invocation = Invocation::new("seek").with_argument("position", "ten");
        let (_, response) = run(&dispatcher(), invocation);
        assert!(matches!(response, MethodResponse::Error(ref err) if err.code == error_codes::BAD_INVOCATION));
    }

    #[test]
    fn handler_failure_replaces_staged_response() {
        let (outcome, response) = run(&dispatcher(), Invocation::new("broken"));
        assert_eq!(outcome, DispatchOutcome::Rejected);
        match response {
            MethodResponse::Error(err) => {
                assert_eq!(err.code, error_codes::HANDLER_ERROR);
                assert_eq!(err.message, "broken: device unavailable");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn silent_handler_gets_no_response_error() {
        let (outcome, response) = run(&dispatcher(), Invocation::new("silent"));
        assert_eq!(outcome, DispatchOutcome::Rejected);
        assert!(matches!(response, MethodResponse::Error(ref err) if err.code == error_codes::NO_RESPONSE));
    }

    #[test]
    fn method_names_are_sorted() {
        let names: Vec<_> = dispatcher().method_names().map(str::to_string).collect();
        assert_eq!(names, ["broken", "getPosition", "later", "seek", "silent"]);
    }
}

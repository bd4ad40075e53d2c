//! Line-oriented serve loop: reads request frames, dispatches them and
//! writes one response frame per request.

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::protocol::{error_codes, PluginRequest, PluginResponse};
use chanbridge_core::{CallError, ChannelConfig, MethodResponse, ReplyError};
use std::cell::RefCell;
use std::io::{self, BufRead, Read, Write};
use std::rc::Rc;
use thiserror::Error;

/// Errors that end the serve loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to read from channel: {0}")]
    ReadError(io::Error),
    #[error("failed to write to channel: {0}")]
    WriteError(io::Error),
    #[error("failed to encode response: {0}")]
    EncodeError(serde_json::Error),
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] CallError),
    #[error("no response was produced for request {id}")]
    NoReply { id: u64 },
}

/// Counters reported when the serve loop reaches end of input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub handled: u64,
    pub not_implemented: u64,
    pub rejected: u64,
    pub malformed: u64,
}

impl ServeSummary {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Handled => self.handled += 1,
            DispatchOutcome::NotImplemented => self.not_implemented += 1,
            DispatchOutcome::Rejected => self.rejected += 1,
        }
    }
}

/// A single-slot reply channel: the responder stores the response, the
/// owner takes it afterwards.
#[derive(Debug, Clone, Default)]
pub struct ResponseSlot {
    inner: Rc<RefCell<Option<MethodResponse>>>,
}

impl ResponseSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A responder that fills this slot. Fails with [`ReplyError::Closed`]
    /// if the slot is already occupied.
    pub fn responder(&self) -> impl FnOnce(MethodResponse) -> Result<(), ReplyError> {
        let inner = Rc::clone(&self.inner);
        move |response| {
            let mut slot = inner.borrow_mut();
            if slot.is_some() {
                return Err(ReplyError::Closed);
            }
            *slot = Some(response);
            Ok(())
        }
    }

    pub fn take(&self) -> Option<MethodResponse> {
        self.inner.borrow_mut().take()
    }
}

enum Frame {
    Line(String),
    Oversized,
    Invalid(String),
    Eof,
}

/// Serves a [`Dispatcher`] over a pair of byte streams.
pub struct ChannelServer {
    dispatcher: Dispatcher,
    max_line_bytes: usize,
}

impl ChannelServer {
    pub fn new(dispatcher: Dispatcher, config: &ChannelConfig) -> Self {
        Self {
            dispatcher,
            max_line_bytes: config.max_line_bytes.max(1),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Runs until `reader` reaches end of input.
    pub fn serve<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        mut writer: W,
    ) -> Result<ServeSummary, ServerError> {
        let span = tracing::info_span!("serve", channel = %self.dispatcher.channel());
        let _enter = span.enter();
        tracing::info!(
            methods = self.dispatcher.method_names().count(),
            "serving method channel"
        );

        let mut summary = ServeSummary::default();
        loop {
            let line = match self.read_frame(&mut reader)? {
                Frame::Eof => break,
                Frame::Line(line) => line,
                Frame::Oversized => {
                    tracing::warn!(limit = self.max_line_bytes, "request line too long");
                    summary.malformed += 1;
                    let message = format!("request exceeds {} bytes", self.max_line_bytes);
                    write_response(&mut writer, 0, malformed(message))?;
                    continue;
                }
                Frame::Invalid(reason) => {
                    tracing::warn!(%reason, "unreadable request line");
                    summary.malformed += 1;
                    write_response(&mut writer, 0, malformed(reason))?;
                    continue;
                }
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: PluginRequest = match serde_json::from_str(trimmed) {
                Ok(request) => request,
                Err(err) => {
                    let id = salvage_id(trimmed);
                    tracing::warn!(id, error = %err, "failed to decode request");
                    summary.malformed += 1;
                    write_response(&mut writer, id, malformed(err.to_string()))?;
                    continue;
                }
            };

            let (id, invocation) = request.into_invocation();
            tracing::debug!(id, method = %invocation.name(), args = invocation.arguments().len(), "received invocation");

            let slot = ResponseSlot::new();
            let outcome = self.dispatcher.dispatch(invocation, slot.responder())?;
            summary.record(outcome);
            let response = slot.take().ok_or(ServerError::NoReply { id })?;
            write_response(&mut writer, id, response)?;
        }

        tracing::info!(
            handled = summary.handled,
            not_implemented = summary.not_implemented,
            rejected = summary.rejected,
            malformed = summary.malformed,
            "method channel closed"
        );
        Ok(summary)
    }

    fn read_frame<R: BufRead>(&self, reader: &mut R) -> Result<Frame, ServerError> {
        let mut bytes = Vec::new();
        let limit = (self.max_line_bytes as u64).saturating_add(1);
        let read = Read::take(&mut *reader, limit)
            .read_until(b'\n', &mut bytes)
            .map_err(ServerError::ReadError)?;
        if read == 0 {
            return Ok(Frame::Eof);
        }

        if bytes.last() == Some(&b'\n') {
            bytes.pop();
        } else if read as u64 == limit {
            discard_line(reader).map_err(ServerError::ReadError)?;
            return Ok(Frame::Oversized);
        }

        match String::from_utf8(bytes) {
            Ok(line) => Ok(Frame::Line(line)),
            Err(err) => Ok(Frame::Invalid(err.to_string())),
        }
    }
}

/// Skips the remainder of the current line without buffering it.
fn discard_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(pos) = buf.iter().position(|b| *b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = buf.len();
        reader.consume(len);
    }
}

/// Best-effort id recovery from a line that failed to decode as a request.
fn salvage_id(line: &str) -> u64 {
    serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|value| value.get("id").and_then(serde_json::Value::as_u64))
        .unwrap_or(0)
}

fn malformed(message: impl Into<String>) -> MethodResponse {
    MethodResponse::error(error_codes::MALFORMED_REQUEST, message, None)
}

fn write_response<W: Write>(writer: &mut W, id: u64, response: MethodResponse) -> Result<(), ServerError> {
    let json = serde_json::to_string(&PluginResponse::new(id, response))
        .map_err(ServerError::EncodeError)?;
    writeln!(writer, "{}", json).map_err(ServerError::WriteError)?;
    writer.flush().map_err(ServerError::WriteError)
}

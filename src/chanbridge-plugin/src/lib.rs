//! Method-channel plumbing for chanbridge plugins.
//!
//! This crate provides:
//! - A JSON line protocol carrying invocations and their responses
//! - A [`Dispatcher`] that routes invocations to handlers by method name
//! - A [`ChannelServer`] that serves a dispatcher over any reader/writer pair
//!
//! # Channel Protocol
//!
//! The host writes one [`PluginRequest`] per line; the plugin answers every
//! request with exactly one [`PluginResponse`] line carrying the same id:
//!
//! ```text
//! -> {"id":1,"method":"setVolume","args":{"volume":0.5}}
//! <- {"id":1,"result":{"status":"success","value":null}}
//! -> {"id":2,"method":"eject"}
//! <- {"id":2,"result":{"status":"not_implemented"}}
//! -> {"id":3,"method":"load"}
//! <- {"id":3,"result":{"status":"error","code":"bad_invocation","message":"load: missing argument `path`"}}
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use chanbridge_core::{ChannelConfig, Method};
//! use chanbridge_plugin::{ChannelServer, Dispatcher};
//!
//! let dispatcher = Dispatcher::new("audio").with_handler("getVolume", |method: &mut Method| {
//!     method.return_value(0.8)
//! });
//! let server = ChannelServer::new(dispatcher, &ChannelConfig::default());
//! server.serve(std::io::stdin().lock(), std::io::stdout().lock())?;
//! ```

mod dispatcher;
pub mod protocol;
mod server;

pub use dispatcher::{DispatchOutcome, Dispatcher, MethodHandler};
pub use protocol::{error_codes, PluginRequest, PluginResponse, PluginResult, PROTOCOL_VERSION};
pub use server::{ChannelServer, ResponseSlot, ServeSummary, ServerError};

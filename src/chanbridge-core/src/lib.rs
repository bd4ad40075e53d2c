//! Core types for chanbridge plugin method channels.
//!
//! - [`value`]: the dynamic [`Value`] union and typed conversions
//! - [`call`]: [`Invocation`]s and the per-call [`Method`] adapter
//! - [`response`]: the staged [`MethodResponse`]
//! - configuration, logging and platform directories shared by the binaries
//!
//! ```rust,ignore
//! use chanbridge_core::{CallError, Method};
//!
//! fn set_volume(method: &mut Method) -> Result<(), CallError> {
//!     let volume: f32 = method.get_argument("volume")?;
//!     player.set_volume(volume);
//!     method.return_null()
//! }
//! ```

pub mod call;
pub mod config;
pub mod error;
pub mod logging;
pub mod paths;
pub mod response;
pub mod value;

pub use call::{Arguments, Invocation, Method, Responder};
pub use config::{ChannelConfig, Config, ConfigError, LogLevel, LoggingConfig, ValidationError};
pub use error::{CallError, ReplyError};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use paths::{AppDirs, DirsError};
pub use response::{ErrorResponse, MethodResponse};
pub use value::{FromValue, StringMap, Value, ValueError, ValueKind};

pub const APP_NAME: &str = "chanbridge";
pub const APP_AUTHOR: &str = "Chanbridge";
pub const APP_QUALIFIER: &str = "io";

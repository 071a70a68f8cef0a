//! Console session management.
//!
//! This module provides the per-connection interactive loop, session
//! identification and state tracking, and the registry of open sessions
//! used to force them closed at shutdown.

mod console;
mod id;
mod registry;
mod state;

pub use console::{
    default_banner, CloseReason, ConsoleSession, SessionOptions, DEFAULT_EVAL_TIMEOUT,
    DEFAULT_MAX_INPUT_BYTES,
};
pub use id::{SessionId, SessionIdAllocator};
pub use registry::{Registration, SessionHandle, SessionRegistry};
pub use state::SessionState;

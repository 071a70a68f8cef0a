//! # robo-console
//!
//! Remote interactive console for live control processes.
//!
//! A host process (typically a robot's main control loop) starts a
//! [`ConsoleServer`] with a [`SharedContext`]. Operators attach with any
//! line-oriented TCP client (`nc`, `telnet`), inspect and change values in
//! the shared namespace, and detach while the host keeps running.
//!
//! ## Features
//!
//! - **Shared namespace**: every session and the host see one context
//! - **Pluggable evaluation**: input is handed to an [`Evaluator`]
//! - **Prompt shutdown**: closing the server forces idle sessions to end of
//!   stream, so an attached console never stalls process exit
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use robo_console::{server, ConsoleConfig, NamespaceEvaluator, SharedContext};
//!
//! #[tokio::main]
//! async fn main() -> robo_console::Result<()> {
//!     robo_console::logging::try_init().ok();
//!
//!     let context = SharedContext::new();
//!     context.set("drive_speed", 0.5);
//!
//!     let console = server::start(
//!         ConsoleConfig::localhost(13501),
//!         context.clone(),
//!         Arc::new(NamespaceEvaluator::new()),
//!     )
//!     .await?;
//!
//!     // ... run the control loop, reading `context` as it goes ...
//!
//!     console.shutdown().await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod eval;
pub mod logging;
pub mod server;
pub mod session;

// Re-export commonly used types
pub use context::SharedContext;
pub use error::{ConsoleError, Result};
pub use eval::{EvalError, Evaluator, NamespaceEvaluator, Outcome};
pub use server::{ConsoleConfig, ConsoleServer, ServerState};
pub use session::{
    CloseReason, ConsoleSession, SessionHandle, SessionId, SessionOptions, SessionRegistry,
    SessionState,
};

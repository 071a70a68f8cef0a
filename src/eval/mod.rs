//! Line evaluation.
//!
//! The console server does not interpret input itself. Each submitted line
//! (or accumulated block, see [`Outcome::Incomplete`]) is handed to an
//! [`Evaluator`] together with the [`SharedContext`](crate::SharedContext).
//!
//! [`NamespaceEvaluator`] is a small built-in evaluator that reads and writes
//! context values as JSON.

mod namespace;

use std::time::Duration;

use thiserror::Error;

use crate::context::SharedContext;

pub use namespace::NamespaceEvaluator;

/// Successful evaluation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Text to show the client. Empty text writes nothing.
    Output(String),
    /// The source is a valid prefix; the session should read another line
    /// and resubmit the accumulated block.
    Incomplete,
}

/// Evaluation failure. Reported to the client; never ends the session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Reference to an unbound name.
    #[error("name '{0}' is not defined")]
    NameError(String),

    /// Input could not be parsed.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Evaluation did not finish within the session's bound.
    #[error("evaluation timed out after {0:?}")]
    TimedOut(Duration),

    /// The evaluator panicked.
    #[error("evaluator panicked: {0}")]
    Panicked(String),

    /// Any other evaluator-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Evaluates console input against the shared context.
///
/// Calls run on the blocking thread pool, so implementations may block, but
/// they should return in bounded time: shutdown waits for an in-flight call
/// to finish (or for the session's evaluation timeout).
///
/// A call that outlives its timeout is detached, not stopped, and dropping a
/// tokio runtime waits for detached blocking work. Hosts that must exit
/// regardless should end their runtime with
/// [`Runtime::shutdown_timeout`](tokio::runtime::Runtime::shutdown_timeout)
/// rather than `#[tokio::main]`.
pub trait Evaluator: Send + Sync + 'static {
    /// Evaluate `source` against `context`.
    fn evaluate(&self, source: &str, context: &SharedContext) -> Result<Outcome, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(&str, &SharedContext) -> Result<Outcome, EvalError> + Send + Sync + 'static,
{
    fn evaluate(&self, source: &str, context: &SharedContext) -> Result<Outcome, EvalError> {
        self(source, context)
    }
}

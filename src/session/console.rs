//! Interactive read-evaluate-respond loop for one connection.

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{Registration, SessionHandle, SessionId, SessionState};
use crate::context::SharedContext;
use crate::eval::{EvalError, Evaluator, Outcome};

/// Default bound on a single evaluator call.
pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on one input line and on an accumulated statement.
pub const DEFAULT_MAX_INPUT_BYTES: usize = 64 * 1024;

/// Bound on flushing and shutting down the output sink during cleanup.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Per-session presentation and evaluation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Line written once on connect. `None` disables it.
    pub banner: Option<String>,
    /// Prompt shown before each new statement.
    pub prompt: String,
    /// Prompt shown while the evaluator wants more input.
    pub continuation_prompt: String,
    /// Bound on one evaluator call. `None` waits indefinitely.
    pub eval_timeout: Option<Duration>,
    /// Longest accepted line, and longest statement built from continuation
    /// lines. Exceeding it ends the session.
    pub max_input_bytes: usize,
}

impl SessionOptions {
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    pub fn without_banner(mut self) -> Self {
        self.banner = None;
        self
    }

    pub fn with_prompts(
        mut self,
        prompt: impl Into<String>,
        continuation: impl Into<String>,
    ) -> Self {
        self.prompt = prompt.into();
        self.continuation_prompt = continuation.into();
        self
    }

    pub fn with_eval_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.eval_timeout = timeout;
        self
    }

    pub fn with_max_input_bytes(mut self, limit: usize) -> Self {
        self.max_input_bytes = limit;
        self
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            banner: Some(default_banner()),
            prompt: ">>> ".to_string(),
            continuation_prompt: "... ".to_string(),
            eval_timeout: Some(DEFAULT_EVAL_TIMEOUT),
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// Banner text used when none is configured.
pub fn default_banner() -> String {
    format!(
        "robo-console {}: attached to live process. Send EOF (Ctrl-D) to detach.",
        env!("CARGO_PKG_VERSION")
    )
}

/// Why a session's loop exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed its side of the connection.
    EndOfInput,
    /// The session was force-closed from outside.
    ForcedClose,
    /// The connection failed or sent malformed input.
    IoError,
}

enum Input {
    Line(String),
    EndOfStream,
    Cancelled,
}

/// One console session bound to a client connection.
///
/// The session owns its registry [`Registration`] once attached, so the
/// registry entry is removed whenever the session is dropped, including when
/// the task running it panics.
pub struct ConsoleSession<R, W> {
    id: SessionId,
    reader: BufReader<R>,
    writer: W,
    context: SharedContext,
    evaluator: Arc<dyn Evaluator>,
    options: Arc<SessionOptions>,
    cancel: CancellationToken,
    state: SessionState,
    registration: Option<Registration>,
}

impl<R, W> ConsoleSession<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a session reading from `reader` and writing to `writer`.
    pub fn new(
        id: SessionId,
        reader: R,
        writer: W,
        context: SharedContext,
        evaluator: Arc<dyn Evaluator>,
        options: Arc<SessionOptions>,
    ) -> Self {
        Self {
            id,
            reader: BufReader::new(reader),
            writer,
            context,
            evaluator,
            options,
            cancel: CancellationToken::new(),
            state: SessionState::Open,
            registration: None,
        }
    }

    /// Use `cancel` as this session's force-close signal.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Hand the registry entry to the session; it is released on exit.
    pub fn attach(mut self, registration: Registration) -> Self {
        self.registration = Some(registration);
        self
    }

    /// Handle for force-closing this session from another task.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(self.id, self.cancel.clone())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the loop to completion, then clean up.
    pub async fn run(mut self) -> CloseReason {
        self.state.advance(SessionState::Running);

        let reason = match self.interact().await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(session = %self.id, error = %e, "console connection failed");
                CloseReason::IoError
            }
        };

        match tokio::time::timeout(CLOSE_GRACE, self.writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!(session = %self.id, error = %e, "output shutdown failed"),
            Err(_) => trace!(session = %self.id, "output shutdown timed out"),
        }

        self.state.advance(SessionState::Closed);
        self.registration.take();
        info!(session = %self.id, ?reason, "console closed");
        reason
    }

    async fn interact(&mut self) -> io::Result<CloseReason> {
        let options = Arc::clone(&self.options);

        if let Some(banner) = &options.banner {
            if !self.send(&format!("{}\n", banner)).await? {
                return Ok(CloseReason::ForcedClose);
            }
        }

        let mut block = String::new();
        loop {
            let prompt = if block.is_empty() {
                &options.prompt
            } else {
                &options.continuation_prompt
            };
            if !self.send(prompt).await? {
                return Ok(CloseReason::ForcedClose);
            }

            let line = match self.read_line().await? {
                Input::Line(line) => line,
                Input::EndOfStream => return Ok(CloseReason::EndOfInput),
                Input::Cancelled => return Ok(CloseReason::ForcedClose),
            };
            trace!(session = %self.id, %line, "input");

            if !block.is_empty() {
                block.push('\n');
            }
            block.push_str(&line);
            if block.len() > options.max_input_bytes {
                return Err(too_long("statement"));
            }

            let result = evaluate(
                Arc::clone(&self.evaluator),
                self.context.clone(),
                block.clone(),
                options.eval_timeout,
            )
            .await;

            let mut reply = match result {
                Ok(Outcome::Incomplete) => continue,
                Ok(Outcome::Output(text)) => text,
                Err(e) => {
                    debug!(session = %self.id, error = %e, "evaluation failed");
                    format!("error: {}", e)
                }
            };
            block.clear();

            if reply.is_empty() {
                continue;
            }
            if !reply.ends_with('\n') {
                reply.push('\n');
            }
            if !self.send(&reply).await? {
                return Ok(CloseReason::ForcedClose);
            }
        }
    }

    /// Read one line, or report end of stream if force-closed first.
    async fn read_line(&mut self) -> io::Result<Input> {
        let mut line = String::new();
        let limit = self.options.max_input_bytes;
        let mut reader = (&mut self.reader).take(limit as u64 + 1);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(Input::Cancelled),
            read = reader.read_line(&mut line) => {
                if read? == 0 {
                    return Ok(Input::EndOfStream);
                }
                if line.len() > limit && !line.ends_with('\n') {
                    return Err(too_long("line"));
                }
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(Input::Line(line))
            }
        }
    }

    /// Write `text`. Returns `false` if force-closed before it went out.
    async fn send(&mut self, text: &str) -> io::Result<bool> {
        let writer = &mut self.writer;

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(false),
            written = async {
                writer.write_all(text.as_bytes()).await?;
                writer.flush().await
            } => written.map(|()| true),
        }
    }
}

/// Run one evaluator call on the blocking pool.
async fn evaluate(
    evaluator: Arc<dyn Evaluator>,
    context: SharedContext,
    source: String,
    limit: Option<Duration>,
) -> Result<Outcome, EvalError> {
    let call = tokio::task::spawn_blocking(move || evaluator.evaluate(&source, &context));

    // On timeout the blocking call is detached, not interrupted.
    let joined = match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| EvalError::TimedOut(limit))?,
        None => call.await,
    };

    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(EvalError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(EvalError::Other(e.to_string())),
    }
}

fn too_long(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("input {} too long", what))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Console server: listener, lifecycle and shutdown.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use robo_console::{server, ConsoleConfig, NamespaceEvaluator, SharedContext};
//!
//! #[tokio::main]
//! async fn main() -> robo_console::Result<()> {
//!     let context = SharedContext::new();
//!     context.set("x", 1);
//!
//!     let console = server::start(
//!         ConsoleConfig::default(),
//!         context.clone(),
//!         Arc::new(NamespaceEvaluator::new()),
//!     )
//!     .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     console.close()?;
//!     console.wait_closed().await
//! }
//! ```

mod listener;
mod state;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::SharedContext;
use crate::error::ConsoleError;
use crate::eval::Evaluator;
use crate::session::{SessionId, SessionIdAllocator, SessionOptions, SessionRegistry};
use crate::Result;

use listener::Acceptor;
pub use state::ServerState;

/// Well-known development port for the console.
pub const DEFAULT_PORT: u16 = 13501;

/// Default bound used by [`ConsoleServer::shutdown`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Console server configuration.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Address to bind to.
    pub host: IpAddr,
    /// Port to listen on. `0` picks an ephemeral port.
    pub port: u16,
    /// Set SO_REUSEADDR so a restarted process can rebind immediately.
    pub reuse_address: bool,
    /// Settings applied to every session.
    pub session: SessionOptions,
    /// Bound on waiting for sessions during [`ConsoleServer::shutdown`].
    pub shutdown_timeout: Option<Duration>,
}

impl ConsoleConfig {
    pub fn new(host: IpAddr, port: u16) -> Self {
        Self {
            host,
            port,
            ..Self::default()
        }
    }

    /// Loopback-only configuration, mostly for tests.
    pub fn localhost(port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    pub fn with_reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            reuse_address: true,
            session: SessionOptions::default(),
            shutdown_timeout: Some(DEFAULT_SHUTDOWN_TIMEOUT),
        }
    }
}

/// Handle to a console server.
///
/// Dropping the handle stops the listener and force-closes open sessions
/// without waiting for them.
pub struct ConsoleServer {
    config: ConsoleConfig,
    context: SharedContext,
    evaluator: Arc<dyn Evaluator>,
    registry: Arc<SessionRegistry>,
    state: Mutex<ServerState>,
    shutdown: CancellationToken,
    /// Cancelled once the listening socket is closed.
    released: CancellationToken,
    local_addr: Option<SocketAddr>,
    accept_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ConsoleServer {
    /// Create a server in the `Created` state. Nothing is bound yet.
    pub fn new(
        config: ConsoleConfig,
        context: SharedContext,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            config,
            context,
            evaluator,
            registry: Arc::new(SessionRegistry::new()),
            state: Mutex::new(ServerState::Created),
            shutdown: CancellationToken::new(),
            released: CancellationToken::new(),
            local_addr: None,
            accept_task: Mutex::new(None),
        }
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let current = self.state();
        if !current.can_transition_to(ServerState::Listening) {
            return Err(ConsoleError::InvalidStateTransition {
                from: current,
                to: ServerState::Listening,
            });
        }

        let listener = listener::bind(self.config.bind_address(), self.config.reuse_address)?;
        let local_addr = listener.local_addr()?;

        let acceptor = Acceptor {
            listener,
            ids: SessionIdAllocator::new(),
            registry: Arc::clone(&self.registry),
            context: self.context.clone(),
            evaluator: Arc::clone(&self.evaluator),
            options: Arc::new(self.config.session.clone()),
            shutdown: self.shutdown.clone(),
            released: self.released.clone().drop_guard(),
        };
        *self.accept_task.get_mut().unwrap_or_else(PoisonError::into_inner) =
            Some(tokio::spawn(acceptor.run()));

        self.local_addr = Some(local_addr);
        self.lock_state().transition_to(ServerState::Listening)?;
        info!(addr = %local_addr, "console server listening");
        Ok(local_addr)
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn state(&self) -> ServerState {
        *self.lock_state()
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    /// The namespace shared by every session.
    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Number of sessions currently open.
    pub fn session_count(&self) -> usize {
        self.registry.count()
    }

    /// IDs of the sessions currently open.
    pub fn session_ids(&self) -> Result<Vec<SessionId>> {
        self.registry.ids()
    }

    /// Stop accepting and tell every open session to stop.
    ///
    /// Does not wait for sessions to exit; see [`wait_closed`](Self::wait_closed).
    /// Calling it again is a no-op. Returns the number of sessions signalled.
    pub fn close(&self) -> Result<usize> {
        {
            let mut state = self.lock_state();
            if state.is_closing() {
                return Ok(0);
            }
            if *state == ServerState::Created {
                // No listener was ever bound.
                self.released.cancel();
            }
            state.transition_to(ServerState::ShuttingDown)?;
        }

        self.shutdown.cancel();
        let signalled = self.registry.close_all()?;
        info!(sessions = signalled, "console server closing");
        Ok(signalled)
    }

    /// Wait until the server is closed: listener released and every session
    /// has run its cleanup.
    ///
    /// Waits for [`close`](Self::close) if it has not been called yet.
    pub async fn wait_closed(&self) -> Result<()> {
        self.shutdown.cancelled().await;
        self.released.cancelled().await;

        // The first waiter to get here surfaces the accept loop's result.
        let task = self
            .accept_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let accepted = match task {
            Some(task) => task
                .await
                .unwrap_or_else(|e| Err(ConsoleError::AcceptLoop(e.to_string()))),
            None => Ok(()),
        };

        self.registry.wait_empty().await;

        {
            let mut state = self.lock_state();
            if *state == ServerState::ShuttingDown {
                state.transition_to(ServerState::Closed)?;
                info!("console server closed");
            }
        }

        accepted
    }

    /// [`wait_closed`](Self::wait_closed) bounded by `limit`.
    pub async fn wait_closed_timeout(&self, limit: Duration) -> Result<()> {
        match tokio::time::timeout(limit, self.wait_closed()).await {
            Ok(result) => result,
            Err(_) => {
                let remaining = self.registry.count();
                warn!(remaining, ?limit, "console shutdown timed out");
                Err(ConsoleError::ShutdownTimeout { remaining })
            }
        }
    }

    /// Close and wait, bounded by the configured shutdown timeout.
    pub async fn shutdown(&self) -> Result<()> {
        self.close()?;
        match self.config.shutdown_timeout {
            Some(limit) => self.wait_closed_timeout(limit).await,
            None => self.wait_closed().await,
        }
    }

    // The guarded value is a plain Copy enum, so a poisoned lock still holds
    // a consistent state.
    fn lock_state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ConsoleServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for ConsoleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleServer")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .field("sessions", &self.session_count())
            .finish()
    }
}

/// Create and start a console server.
///
/// Fails with [`ConsoleError::Bind`] if the address is unavailable.
pub async fn start(
    config: ConsoleConfig,
    context: SharedContext,
    evaluator: Arc<dyn Evaluator>,
) -> Result<ConsoleServer> {
    let mut server = ConsoleServer::new(config, context, evaluator);
    server.start().await?;
    Ok(server)
}

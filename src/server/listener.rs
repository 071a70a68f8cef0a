//! TCP listener and accept loop.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, trace, warn};

use crate::context::SharedContext;
use crate::error::ConsoleError;
use crate::eval::Evaluator;
use crate::session::{
    ConsoleSession, SessionHandle, SessionIdAllocator, SessionOptions, SessionRegistry,
};
use crate::Result;

/// Pending connection queue length.
const BACKLOG: u32 = 128;

/// Pause after a failed accept so persistent errors (e.g. EMFILE) do not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind a listening socket on `addr`.
pub(crate) fn bind(addr: SocketAddr, reuse_address: bool) -> Result<TcpListener> {
    let bind_err = move |source: io::Error| ConsoleError::Bind { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(reuse_address).map_err(bind_err)?;
    socket.bind(addr).map_err(bind_err)?;
    socket.listen(BACKLOG).map_err(bind_err)
}

/// Accepts connections and starts a session for each one.
///
/// Fields drop in declaration order: `listener` is closed before
/// `released` fires.
pub(crate) struct Acceptor {
    pub(crate) listener: TcpListener,
    pub(crate) ids: SessionIdAllocator,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) context: SharedContext,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    pub(crate) options: Arc<SessionOptions>,
    pub(crate) shutdown: CancellationToken,
    /// Cancels the server's listener-released token when the acceptor is
    /// dropped, on return or on panic.
    pub(crate) released: DropGuard,
}

impl Acceptor {
    /// Accept until `shutdown` is cancelled. The listening socket is closed
    /// when this returns.
    ///
    /// Fails only on a registry invariant violation.
    pub(crate) async fn run(self) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = self.open_session(stream, peer) {
                            error!(error = %e, "console registry invariant violated, stopping accept loop");
                            return Err(e);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept console connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        debug!("console listener closed");
        Ok(())
    }

    fn open_session(&self, stream: TcpStream, peer: SocketAddr) -> Result<()> {
        let id = self.ids.next_id();
        // Child of the server token: a session accepted while close() is
        // running is cancelled even if the registry snapshot missed it.
        let cancel = self.shutdown.child_token();
        let registration = self
            .registry
            .register(SessionHandle::new(id, cancel.clone()).with_peer(peer))?;

        if let Err(e) = stream.set_nodelay(true) {
            trace!(session = %id, error = %e, "failed to set TCP_NODELAY");
        }

        let (reader, writer) = stream.into_split();
        let session = ConsoleSession::new(
            id,
            reader,
            writer,
            self.context.clone(),
            Arc::clone(&self.evaluator),
            Arc::clone(&self.options),
        )
        .with_cancel(cancel)
        .attach(registration);

        info!(session = %id, %peer, "console opened");
        tokio::spawn(session.run());
        Ok(())
    }
}

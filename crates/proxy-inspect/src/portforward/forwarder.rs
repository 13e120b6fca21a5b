use std::sync::Arc;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Dialer;
use super::PortForwardError;
use super::UpstreamStream;

/// Background forwarding loop of one session.
///
/// Owns the local listener and every live connection for its whole lifetime.
pub(crate) struct Forwarder {
    listener: TcpListener,
    dialer: Arc<dyn Dialer>,
    target: String,
}

impl Forwarder {
    pub(crate) fn new(listener: TcpListener, dialer: Arc<dyn Dialer>, target: String) -> Self {
        Self {
            listener,
            dialer,
            target,
        }
    }

    /// Run until `stop` fires or is dropped.
    ///
    /// The upgrade handshake happens before `ready` is sent, so a ready tunnel
    /// is always able to carry traffic. Returns `Ok(())` on a clean stop.
    ///
    /// # Errors
    ///
    /// - [`PortForwardError::Dial`] if the upgrade handshake fails
    /// - [`PortForwardError::Loop`] if the local listener fails
    #[tracing::instrument(skip_all, fields(target = %self.target))]
    pub(crate) async fn run(
        self,
        ready: oneshot::Sender<()>,
        mut stop: oneshot::Receiver<()>,
    ) -> Result<(), Report<PortForwardError>> {
        let handshake = select! {
            biased;
            _ = &mut stop => {
                debug!("Stopped before the upgrade handshake completed");
                return Ok(());
            }
            upstream = self.dialer.dial() => upstream?,
        };

        // Served to the first local connection
        let mut pending = Some(handshake);

        if ready.send(()).is_err() {
            debug!("Readiness is no longer awaited");
        }
        info!("Forwarding loop ready");

        let mut connections = JoinSet::new();
        let result = loop {
            select! {
                biased;
                _ = &mut stop => break Ok(()),
                accepted = self.listener.accept() => {
                    let (conn, peer) = match accepted.change_context_lazy(|| PortForwardError::Loop {
                        target: self.target.clone(),
                    }) {
                        Ok(accepted) => accepted,
                        Err(e) => break Err(e),
                    };
                    debug!(%peer, "Accepted local connection");
                    connections.spawn(forward_connection(
                        conn,
                        pending.take(),
                        Arc::clone(&self.dialer),
                        self.target.clone(),
                    ));
                }
                Some(finished) = connections.join_next() => match finished {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("Forwarded connection failed: {e:?}"),
                    Err(e) if e.is_panic() => error!("Forwarded connection panicked: {e}"),
                    Err(_) => {}
                },
            }
        };

        // In-flight transfers are aborted, not drained
        connections.shutdown().await;
        debug!("Forwarding loop stopped");
        result
    }
}

async fn forward_connection(
    mut conn: TcpStream,
    upstream: Option<UpstreamStream>,
    dialer: Arc<dyn Dialer>,
    target: String,
) -> Result<(), Report<PortForwardError>> {
    let mut upstream = match upstream {
        Some(upstream) => upstream,
        None => dialer.dial().await?,
    };

    let (sent, received) = tokio::io::copy_bidirectional(&mut conn, &mut upstream)
        .await
        .change_context(PortForwardError::Connection { target })?;
    debug!(sent, received, "Local connection closed");

    Ok(())
}

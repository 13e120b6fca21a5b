use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use tokio::net::TcpListener;
use tokio::select;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::forwarder::Forwarder;
use super::Dialer;
use super::KubeDialer;
use super::PortForwardError;
use super::PortForwarder;
use super::TunnelTarget;
use crate::kube_client;
use crate::kube_client::ClusterAccess;
use crate::kube_client::CredentialSource;

/// How long `open` waits for the tunnel to become ready.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

type Outcome = Result<(), Report<PortForwardError>>;

/// A pod port forwarding session which runs as a background task.
///
/// Cluster access and the dialer are resolved on the first `open` and cached
/// for the lifetime of the session. Every `open` allocates a
/// fresh local port.
pub struct PortForward {
    target: TunnelTarget,
    credentials: CredentialSource,
    access: Option<ClusterAccess>,
    dialer: Option<Arc<dyn Dialer>>,
    open_timeout: Duration,

    local_port: Option<u16>,
    stop_tx: Option<oneshot::Sender<()>>,
    outcome_rx: Option<oneshot::Receiver<Outcome>>,
}

impl PortForward {
    pub fn new(target: TunnelTarget, credentials: CredentialSource) -> Self {
        Self {
            target,
            credentials,
            access: None,
            dialer: None,
            open_timeout: OPEN_TIMEOUT,
            local_port: None,
            stop_tx: None,
            outcome_rx: None,
        }
    }

    /// Reuse already resolved cluster access instead of resolving credentials.
    pub fn with_cluster_access(mut self, access: ClusterAccess) -> Self {
        self.access = Some(access);
        self
    }

    /// Use a custom dialer; cluster access is then never resolved.
    pub fn with_dialer(mut self, dialer: Arc<dyn Dialer>) -> Self {
        self.dialer = Some(dialer);
        self
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn target(&self) -> &TunnelTarget {
        &self.target
    }

    /// Local port of the most recent successful `open`.
    pub fn local_port(&self) -> Option<u16> {
        self.local_port
    }

    /// Open the tunnel and return `localhost:<port>`.
    ///
    /// Waits for the first of: the forwarding task failing, `cancel` firing,
    /// the tunnel becoming ready, or the open timeout. Cancellation is only
    /// observed until this returns.
    ///
    /// The listener is bound on `127.0.0.1` only. `localhost` resolvers that
    /// try `::1` first fall back to the IPv4 loopback.
    ///
    /// # Errors
    ///
    /// - [`PortForwardError::AlreadyOpen`] if the session has not been closed
    /// - [`PortForwardError::Allocation`] if no local port can be bound
    /// - [`PortForwardError::Credentials`] if cluster access cannot be resolved
    /// - [`PortForwardError::Dial`] if the upgrade handshake fails
    /// - [`PortForwardError::Loop`] if the forwarding task ends before ready
    /// - [`PortForwardError::Cancelled`] / [`PortForwardError::TimedOut`]
    #[tracing::instrument(skip_all, fields(target = %self.target))]
    pub async fn open(&mut self, cancel: &CancellationToken) -> Result<String, Report<PortForwardError>> {
        if self.stop_tx.is_some() {
            return Err(Report::new(PortForwardError::AlreadyOpen {
                target: self.target.to_string(),
            }));
        }
        self.local_port = None;

        let listener = allocate_local_port(self.target.remote_port()).await?;
        let local_port = listener
            .local_addr()
            .change_context(PortForwardError::Allocation)?
            .port();
        debug!(local_port, "Allocated local port");

        let dialer = self.dialer().await?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (outcome_tx, mut outcome_rx) = oneshot::channel::<Outcome>();
        self.stop_tx = Some(stop_tx);

        let forwarder = Forwarder::new(listener, dialer, self.target.to_string());
        tokio::spawn(async move {
            // Nobody listens once open has returned without keeping the receiver
            let _ = outcome_tx.send(forwarder.run(ready_tx, stop_rx).await);
        });

        let timeout = self.open_timeout;
        let target = self.target.to_string();
        match race_open(&mut outcome_rx, ready_rx, cancel, timeout, &target).await {
            OpenSignal::Ready => {
                self.local_port = Some(local_port);
                self.outcome_rx = Some(outcome_rx);
                let address = format!("localhost:{local_port}");
                info!(%address, "Port forward established");
                Ok(address)
            }
            OpenSignal::Failed(e) => {
                self.stop_tx = None;
                Err(e)
            }
            OpenSignal::Cancelled => {
                self.close();
                Err(Report::new(PortForwardError::Cancelled { target }))
            }
            OpenSignal::TimedOut => {
                self.close();
                Err(Report::new(PortForwardError::TimedOut { target, timeout }))
            }
        }
    }

    /// Signal the forwarding task to stop.
    ///
    /// Closing twice, or closing a session that never opened, is a caller
    /// error; it is logged and otherwise ignored.
    pub fn close(&mut self) {
        match self.stop_tx.take() {
            Some(stop) => {
                // The task may already have exited on its own
                let _ = stop.send(());
                debug!(target = %self.target, "Port forward stop signalled");
            }
            None => warn!(target = %self.target, "Close called on a port forward that is not open"),
        }
    }

    /// Wait for the forwarding task of the last successful `open` to exit.
    ///
    /// Resolves once [`close`](Self::close) has taken effect or the loop failed
    /// on its own. Returns immediately if there is nothing to wait for.
    ///
    /// # Errors
    ///
    /// - [`PortForwardError::Loop`] if the forwarding task terminated abnormally
    pub async fn closed(&mut self) -> Result<(), Report<PortForwardError>> {
        let Some(outcome_rx) = self.outcome_rx.take() else {
            return Ok(());
        };

        outcome_rx.await.unwrap_or_else(|_| {
            Err(Report::new(PortForwardError::Loop {
                target: self.target.to_string(),
            })
            .attach_printable("forwarding task exited without reporting an outcome"))
        })
    }

    /// Resolve cluster access and the dialer, once each.
    async fn dialer(&mut self) -> Result<Arc<dyn Dialer>, Report<PortForwardError>> {
        if let Some(dialer) = &self.dialer {
            return Ok(Arc::clone(dialer));
        }

        let access = match &self.access {
            Some(access) => access.clone(),
            None => {
                let access = kube_client::resolve(&self.credentials)
                    .await
                    .change_context_lazy(|| PortForwardError::Credentials {
                        target: self.target.to_string(),
                    })?;
                self.access = Some(access.clone());
                access
            }
        };

        let dialer = KubeDialer::new(&access, &self.target)?;
        debug!(url = %dialer.forward_url(), "Port forward URL");

        let dialer: Arc<dyn Dialer> = Arc::new(dialer);
        self.dialer = Some(Arc::clone(&dialer));
        Ok(dialer)
    }
}

impl PortForwarder for PortForward {
    async fn open(&mut self, cancel: &CancellationToken) -> Result<String, Report<PortForwardError>> {
        PortForward::open(self, cancel).await
    }

    fn close(&mut self) {
        PortForward::close(self);
    }
}

/// First signal observed while waiting for a freshly spawned forwarding task.
#[derive(Debug)]
enum OpenSignal {
    Ready,
    Failed(Report<PortForwardError>),
    Cancelled,
    TimedOut,
}

async fn race_open(
    outcome_rx: &mut oneshot::Receiver<Outcome>,
    ready_rx: oneshot::Receiver<()>,
    cancel: &CancellationToken,
    timeout: Duration,
    target: &str,
) -> OpenSignal {
    select! {
        // A failure wins over everything, cancellation over a simultaneous ready
        biased;
        outcome = outcome_rx => OpenSignal::Failed(match outcome {
            Ok(Err(e)) => e,
            Ok(Ok(())) => Report::new(PortForwardError::Loop {
                target: target.to_string(),
            })
            .attach_printable("forwarding stopped before becoming ready"),
            Err(_) => Report::new(PortForwardError::Loop {
                target: target.to_string(),
            })
            .attach_printable("forwarding task exited without reporting an outcome"),
        }),
        _ = cancel.cancelled() => OpenSignal::Cancelled,
        Ok(()) = ready_rx => OpenSignal::Ready,
        _ = tokio::time::sleep(timeout) => OpenSignal::TimedOut,
    }
}

/// Bind the loopback listener the tunnel will serve on.
///
/// The listener is kept rather than bound once and released, so no other process
/// can take the port between allocation and forwarding.
async fn allocate_local_port(remote_port: u16) -> Result<TcpListener, Report<PortForwardError>> {
    let bind = || async {
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .change_context(PortForwardError::Allocation)
    };

    let listener = bind().await?;
    let port = listener
        .local_addr()
        .change_context(PortForwardError::Allocation)?
        .port();
    if port != remote_port {
        return Ok(listener);
    }

    // Holding the first listener guarantees a different port
    let replacement = bind().await?;
    drop(listener);
    Ok(replacement)
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    const TARGET: &str = "default/web:19000";

    fn channels() -> (
        oneshot::Sender<()>,
        oneshot::Receiver<()>,
        oneshot::Sender<Outcome>,
        oneshot::Receiver<Outcome>,
    ) {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        (ready_tx, ready_rx, outcome_tx, outcome_rx)
    }

    #[test(tokio::test)]
    async fn failure_wins_over_simultaneous_ready() {
        let (ready_tx, ready_rx, outcome_tx, mut outcome_rx) = channels();
        ready_tx.send(()).unwrap();
        outcome_tx
            .send(Err(Report::new(PortForwardError::Loop {
                target: TARGET.to_string(),
            })))
            .unwrap();

        let signal = race_open(&mut outcome_rx, ready_rx, &CancellationToken::new(), OPEN_TIMEOUT, TARGET).await;

        assert!(matches!(
            signal,
            OpenSignal::Failed(e) if matches!(e.current_context(), PortForwardError::Loop { .. })
        ));
    }

    #[test(tokio::test)]
    async fn clean_stop_before_ready_is_a_loop_error() {
        let (ready_tx, ready_rx, outcome_tx, mut outcome_rx) = channels();
        drop(ready_tx);
        outcome_tx.send(Ok(())).unwrap();

        let signal = race_open(&mut outcome_rx, ready_rx, &CancellationToken::new(), OPEN_TIMEOUT, TARGET).await;

        assert!(matches!(
            signal,
            OpenSignal::Failed(e) if matches!(e.current_context(), PortForwardError::Loop { target } if target == TARGET)
        ));
    }

    #[test(tokio::test)]
    async fn vanished_task_is_a_loop_error() {
        let (_ready_tx, ready_rx, outcome_tx, mut outcome_rx) = channels();
        drop(outcome_tx);

        let signal = race_open(&mut outcome_rx, ready_rx, &CancellationToken::new(), OPEN_TIMEOUT, TARGET).await;

        assert!(matches!(
            signal,
            OpenSignal::Failed(e) if matches!(e.current_context(), PortForwardError::Loop { .. })
        ));
    }

    #[test(tokio::test)]
    async fn cancellation_wins_over_simultaneous_ready() {
        let (ready_tx, ready_rx, _outcome_tx, mut outcome_rx) = channels();
        ready_tx.send(()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let signal = race_open(&mut outcome_rx, ready_rx, &cancel, OPEN_TIMEOUT, TARGET).await;

        assert!(matches!(signal, OpenSignal::Cancelled));
    }

    #[test(tokio::test)]
    async fn ready_when_nothing_else_fired() {
        let (ready_tx, ready_rx, _outcome_tx, mut outcome_rx) = channels();
        ready_tx.send(()).unwrap();

        let signal = race_open(&mut outcome_rx, ready_rx, &CancellationToken::new(), OPEN_TIMEOUT, TARGET).await;

        assert!(matches!(signal, OpenSignal::Ready));
    }

    #[test(tokio::test(start_paused = true))]
    async fn times_out_without_any_signal() {
        let (_ready_tx, ready_rx, _outcome_tx, mut outcome_rx) = channels();
        let start = tokio::time::Instant::now();

        let signal = race_open(&mut outcome_rx, ready_rx, &CancellationToken::new(), OPEN_TIMEOUT, TARGET).await;

        assert!(matches!(signal, OpenSignal::TimedOut));
        assert!(start.elapsed() >= OPEN_TIMEOUT);
    }

    #[tokio::test]
    async fn allocated_port_differs_from_remote_port() {
        let first = allocate_local_port(1).await.unwrap();
        let taken = first.local_addr().unwrap().port();

        // Pretend the remote port is the one the OS hands out next
        let second = allocate_local_port(taken).await.unwrap();
        assert_ne!(second.local_addr().unwrap().port(), taken);
    }

    #[tokio::test]
    async fn close_without_open_is_ignored() {
        let target = TunnelTarget::new("default", "web", 19000).unwrap();
        let mut pf = PortForward::new(target, CredentialSource::default());

        pf.close();
        pf.close();

        assert!(pf.closed().await.is_ok());
        assert_eq!(pf.local_port(), None);
    }
}

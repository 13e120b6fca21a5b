//! Pod port forwarding.
//!
//! A [`PortForward`] session owns one tunnel from a loopback port to a single
//! container port of a pod. Opening it allocates the local port, resolves
//! cluster access, performs the upgrade handshake in a background forwarding
//! task and waits for that task to report readiness, an error, caller
//! cancellation or the open timeout, whichever comes first.
//!
//! The main components are:
//! - [`PortForward`]: the session lifecycle (`open` / `close` / `closed`)
//! - [`TunnelTarget`]: validated namespace, pod name and remote port
//! - [`Dialer`]: opens upgraded streams to the target; [`KubeDialer`] goes
//!   through the cluster API server

use core::error::Error;
use std::future::Future;
use std::time::Duration;

use error_stack::Report;
use tokio_util::sync::CancellationToken;

mod dialer;
mod forwarder;
mod session;
mod target;

pub use dialer::AsyncStream;
pub use dialer::Dialer;
pub use dialer::KubeDialer;
pub use dialer::UpstreamStream;
pub use session::PortForward;
pub use session::OPEN_TIMEOUT;
pub use target::TunnelTarget;

/// Errors that can occur while opening or running a port forward.
#[derive(Debug, derive_more::Display)]
pub enum PortForwardError {
    #[display("Invalid port forward target: {message}")]
    InvalidTarget { message: String },
    #[display("Port forward to {target} is already open")]
    AlreadyOpen { target: String },
    #[display("Failed to allocate local port")]
    Allocation,
    #[display("Failed to resolve cluster credentials for {target}")]
    Credentials { target: String },
    #[display("Failed to establish upgraded stream to {target}")]
    Dial { target: String },
    #[display("Forwarded connection to {target} failed")]
    Connection { target: String },
    #[display("Port forwarding to {target} terminated abnormally")]
    Loop { target: String },
    #[display("Port forward to {target} cancelled")]
    Cancelled { target: String },
    #[display("Port forward to {target} timed out after {timeout:?}")]
    TimedOut { target: String, timeout: Duration },
}

impl Error for PortForwardError {}

/// A tunnel that can be opened to obtain a local address and closed again.
///
/// Consumers such as the config fetcher depend on this rather than on
/// [`PortForward`] so that they can be exercised without a cluster.
pub trait PortForwarder: Send {
    /// Open the tunnel and return its local address (`localhost:<port>`).
    fn open(
        &mut self,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<String, Report<PortForwardError>>> + Send;

    /// Signal the forwarding task to stop. Must be called at most once per
    /// successful `open`.
    fn close(&mut self);
}

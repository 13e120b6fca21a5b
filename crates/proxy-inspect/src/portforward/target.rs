use std::fmt;

use error_stack::Report;

use super::PortForwardError;

/// Identifies one forwarding target. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelTarget {
    namespace: String,
    pod_name: String,
    remote_port: u16,
}

impl TunnelTarget {
    /// # Errors
    ///
    /// - [`PortForwardError::InvalidTarget`] if the namespace or pod name is
    ///   empty, or the remote port is zero
    pub fn new(
        namespace: impl Into<String>,
        pod_name: impl Into<String>,
        remote_port: u16,
    ) -> Result<Self, Report<PortForwardError>> {
        let namespace = namespace.into();
        let pod_name = pod_name.into();

        if namespace.trim().is_empty() {
            return Err(Report::new(PortForwardError::InvalidTarget {
                message: "namespace must not be empty".to_string(),
            }));
        }
        if pod_name.trim().is_empty() {
            return Err(Report::new(PortForwardError::InvalidTarget {
                message: "pod name must not be empty".to_string(),
            }));
        }
        if remote_port == 0 {
            return Err(Report::new(PortForwardError::InvalidTarget {
                message: format!("remote port of {namespace}/{pod_name} must be positive"),
            }));
        }

        Ok(Self {
            namespace,
            pod_name,
            remote_port,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    pub const fn remote_port(&self) -> u16 {
        self.remote_port
    }
}

impl fmt::Display for TunnelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.pod_name, self.remote_port)
    }
}

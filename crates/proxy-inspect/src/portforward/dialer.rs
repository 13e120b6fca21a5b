use error_stack::Report;
use error_stack::ResultExt;
use futures::future::BoxFuture;
use futures::FutureExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tracing::debug;
use tracing::warn;
use url::Url;

use super::PortForwardError;
use super::TunnelTarget;
use crate::kube_client::ClusterAccess;

/// Bidirectional byte stream to the remote port.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type UpstreamStream = Box<dyn AsyncStream>;

/// Opens upgraded streams to a forwarding target.
///
/// Each call yields a fresh stream; one is needed per forwarded local
/// connection. Failures are reported with [`PortForwardError::Dial`].
pub trait Dialer: Send + Sync {
    fn dial(&self) -> BoxFuture<'_, Result<UpstreamStream, Report<PortForwardError>>>;
}

/// Dials the pod `portforward` subresource through the cluster API server.
///
/// The upgrade request itself is issued by kube's `Api::portforward`, which
/// builds the same subresource path that [`forward_url`](Self::forward_url)
/// reports.
pub struct KubeDialer {
    pods: Api<Pod>,
    pod_name: String,
    remote_port: u16,
    target: String,
    forward_url: Url,
}

impl KubeDialer {
    /// # Errors
    ///
    /// - [`PortForwardError::Dial`] if no upgrade request can be built for the target
    pub fn new(access: &ClusterAccess, target: &TunnelTarget) -> Result<Self, Report<PortForwardError>> {
        let dial_error = || PortForwardError::Dial {
            target: target.to_string(),
        };

        let pods: Api<Pod> = Api::namespaced(access.client().clone(), target.namespace());
        let request = kube::core::Request::new(pods.resource_url())
            .portforward(target.pod_name(), &[target.remote_port()])
            .change_context_lazy(dial_error)?;
        let forward_url = Url::parse(&format!(
            "{}{}",
            access.cluster_url().as_str().trim_end_matches('/'),
            request.uri()
        ))
        .change_context_lazy(dial_error)?;

        Ok(Self {
            pods,
            pod_name: target.pod_name().to_string(),
            remote_port: target.remote_port(),
            target: target.to_string(),
            forward_url,
        })
    }

    /// Subresource endpoint the upgrade handshake goes to.
    pub fn forward_url(&self) -> &Url {
        &self.forward_url
    }
}

impl Dialer for KubeDialer {
    fn dial(&self) -> BoxFuture<'_, Result<UpstreamStream, Report<PortForwardError>>> {
        async move {
            debug!(url = %self.forward_url, "Opening upgraded stream");
            let mut forwarder = self
                .pods
                .portforward(&self.pod_name, &[self.remote_port])
                .await
                .change_context_lazy(|| PortForwardError::Dial {
                    target: self.target.clone(),
                })?;

            let stream = forwarder.take_stream(self.remote_port).ok_or_else(|| {
                Report::new(PortForwardError::Dial {
                    target: self.target.clone(),
                })
                .attach_printable("upgraded connection carries no stream for the remote port")
            })?;

            if let Some(remote_error) = forwarder.take_error(self.remote_port) {
                let target = self.target.clone();
                tokio::spawn(async move {
                    if let Some(message) = remote_error.await {
                        warn!(target = %target, "Remote side reported port forward error: {message}");
                    }
                });
            }

            // The upgraded connection lives until the stream handed out is dropped
            let target = self.target.clone();
            tokio::spawn(async move {
                if let Err(e) = forwarder.join().await {
                    debug!(target = %target, "Upgraded connection closed with error: {e}");
                }
            });

            Ok(Box::new(stream) as UpstreamStream)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use kube::Client;
    use kube::Config;
    use similar_asserts::assert_eq;

    use super::*;

    fn cluster_access(server: &str) -> ClusterAccess {
        let config = Config::new(server.parse().unwrap());
        let client = Client::try_from(config).unwrap();
        ClusterAccess::new(client, Url::parse(server).unwrap(), "default")
    }

    #[tokio::test]
    async fn dials_pod_portforward_subresource() {
        let access = cluster_access("https://10.0.0.1:6443/");
        let target = TunnelTarget::new("default", "web-0", 19000).unwrap();

        let dialer = KubeDialer::new(&access, &target).unwrap();

        assert_eq!(
            dialer.forward_url().as_str(),
            "https://10.0.0.1:6443/api/v1/namespaces/default/pods/web-0/portforward?ports=19000"
        );
    }

    #[tokio::test]
    async fn keeps_server_path_prefix() {
        let access = cluster_access("https://rancher.example.com/k8s/clusters/c-1");
        let target = TunnelTarget::new("apps", "api-7d9f", 8080).unwrap();

        let dialer = KubeDialer::new(&access, &target).unwrap();

        assert_eq!(
            dialer.forward_url().as_str(),
            "https://rancher.example.com/k8s/clusters/c-1/api/v1/namespaces/apps/pods/api-7d9f/portforward?ports=8080"
        );
    }
}

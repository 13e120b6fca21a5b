//! Cluster credential resolution.
//!
//! Turns an optional kubeconfig path and context name into a [`ClusterAccess`]
//! handle. The handle is read-only and cheap to clone, so one resolution can be
//! shared by every session of a process.

use core::error::Error;
use std::fmt;
use std::path::PathBuf;

use error_stack::Report;
use error_stack::ResultExt;
use kube::config::KubeConfigOptions;
use kube::config::Kubeconfig;
use kube::Client;
use kube::Config;
use tracing::debug;
use url::Url;

/// Errors that can occur while resolving cluster access.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
}

impl Error for KubernetesError {}

/// Where cluster credentials are loaded from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSource {
    /// Explicit kubeconfig file; the default loading rules apply when unset
    pub kubeconfig: Option<PathBuf>,
    /// Context to use instead of the kubeconfig's current context
    pub context: Option<String>,
}

/// Authenticated, read-only access to one cluster.
#[derive(Clone)]
pub struct ClusterAccess {
    client: Client,
    cluster_url: Url,
    default_namespace: String,
}

impl ClusterAccess {
    pub fn new(client: Client, cluster_url: Url, default_namespace: impl Into<String>) -> Self {
        Self {
            client,
            cluster_url,
            default_namespace: default_namespace.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Base URL of the cluster API server.
    pub fn cluster_url(&self) -> &Url {
        &self.cluster_url
    }

    /// Namespace selected by the resolved context.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }
}

impl fmt::Debug for ClusterAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterAccess")
            .field("cluster_url", &self.cluster_url.as_str())
            .field("default_namespace", &self.default_namespace)
            .finish_non_exhaustive()
    }
}

/// Resolve cluster credentials.
///
/// # Errors
///
/// - [`KubernetesError::ConnectionFailed`] if the kubeconfig cannot be read,
///   the context does not exist, or no in-cluster configuration is available
pub async fn resolve(source: &CredentialSource) -> Result<ClusterAccess, Report<KubernetesError>> {
    let options = KubeConfigOptions {
        context: source.context.clone(),
        ..Default::default()
    };

    let config = match (&source.kubeconfig, &source.context) {
        (Some(kubeconfig_path), _) => {
            let kubeconfig = Kubeconfig::read_from(kubeconfig_path).change_context(
                KubernetesError::ConnectionFailed {
                    message: format!(
                        "Failed to read kubeconfig file: {}",
                        kubeconfig_path.display()
                    ),
                },
            )?;

            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: format!(
                        "Failed to create config from kubeconfig: {}",
                        kubeconfig_path.display()
                    ),
                })?
        }
        (None, Some(context)) => Config::from_kubeconfig(&options).await.change_context(
            KubernetesError::ConnectionFailed {
                message: format!("Failed to load kubeconfig context: {context}"),
            },
        )?,
        // In-cluster configuration or ~/.kube/config
        (None, None) => {
            Config::infer()
                .await
                .change_context(KubernetesError::ConnectionFailed {
                    message: "Failed to infer Kubernetes configuration".to_string(),
                })?
        }
    };

    let cluster_url = Url::parse(&config.cluster_url.to_string()).change_context(
        KubernetesError::ConnectionFailed {
            message: format!("Invalid cluster URL: {}", config.cluster_url),
        },
    )?;
    let default_namespace = config.default_namespace.clone();

    let client = Client::try_from(config).change_context(KubernetesError::ConnectionFailed {
        message: "Failed to create Kubernetes client".to_string(),
    })?;

    debug!(cluster_url = %cluster_url, namespace = %default_namespace, "Resolved cluster access");

    Ok(ClusterAccess::new(client, cluster_url, default_namespace))
}

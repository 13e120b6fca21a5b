//! Command layer - Entry points for the proxy-inspect subcommands

pub mod read;
pub mod wait;

pub use read::run_read;
pub use wait::run_wait_annotation;

use anyhow::Result;

use crate::kube_client;
use crate::kube_client::ClusterAccess;
use crate::kube_client::CredentialSource;

async fn cluster_access(credentials: &CredentialSource) -> Result<ClusterAccess> {
    kube_client::resolve(credentials)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to resolve cluster access: {e:?}"))
}

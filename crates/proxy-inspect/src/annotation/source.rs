use std::collections::BTreeMap;
use std::future::Future;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::Client;

use super::AnnotationError;

/// Supplies a snapshot of an object's annotations.
///
/// The waiter asks for a fresh snapshot on every attempt; static sources
/// simply return the same snapshot each time.
pub trait AnnotationSource: Sync {
    fn annotations(
        &self,
    ) -> impl Future<Output = Result<BTreeMap<String, String>, Report<AnnotationError>>> + Send;
}

impl AnnotationSource for Pod {
    async fn annotations(&self) -> Result<BTreeMap<String, String>, Report<AnnotationError>> {
        Ok(self.metadata.annotations.clone().unwrap_or_default())
    }
}

impl AnnotationSource for BTreeMap<String, String> {
    async fn annotations(&self) -> Result<BTreeMap<String, String>, Report<AnnotationError>> {
        Ok(self.clone())
    }
}

/// Re-reads a pod from the cluster API on every snapshot.
pub struct LivePod {
    api: Api<Pod>,
    namespace: String,
    name: String,
}

impl LivePod {
    pub fn new(client: Client, namespace: &str, name: impl Into<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            name: name.into(),
        }
    }

    /// Fetch the current state of the pod.
    ///
    /// # Errors
    ///
    /// - [`AnnotationError::Fetch`] if the pod cannot be read
    pub async fn fetch(&self) -> Result<Pod, Report<AnnotationError>> {
        self.api
            .get(&self.name)
            .await
            .change_context_lazy(|| AnnotationError::Fetch {
                pod: format!("{}/{}", self.namespace, self.name),
            })
    }
}

impl AnnotationSource for LivePod {
    async fn annotations(&self) -> Result<BTreeMap<String, String>, Report<AnnotationError>> {
        let pod = self.fetch().await?;
        Ok(pod.metadata.annotations.unwrap_or_default())
    }
}

//! Pod annotation polling and decoding.
//!
//! Another component writes derived configuration into a pod annotation
//! asynchronously. [`AnnotationWaiter`] blocks, under a fixed retry budget,
//! until the annotation shows up; [`parse_annotation`] then decodes its value.

use core::error::Error;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Pod;
use serde::de::DeserializeOwned;

mod source;
mod waiter;

pub use source::AnnotationSource;
pub use source::LivePod;
pub use waiter::AnnotationWaiter;
pub use waiter::RetrySpec;
pub use waiter::DEFAULT_RETRY_INTERVAL;

/// Annotation carrying the traffic redirect configuration of a pod.
pub const REDIRECT_TRAFFIC_ANNOTATION: &str = "consul.hashicorp.com/redirect-traffic-config";

/// Errors that can occur while reading annotations.
#[derive(Debug, derive_more::Display)]
pub enum AnnotationError {
    #[display("could not find {key} annotation for {pod} pod")]
    Missing { key: String, pod: String },
    #[display("could not decode {key} annotation for {pod} pod")]
    Decode { key: String, pod: String },
    #[display("Failed to fetch pod {pod}")]
    Fetch { pod: String },
}

impl Error for AnnotationError {}

/// Decode the JSON value of annotation `key` on `pod`.
///
/// # Errors
///
/// - [`AnnotationError::Missing`] if the pod has no such annotation
/// - [`AnnotationError::Decode`] if the value is not valid JSON for `T`
pub fn parse_annotation<T: DeserializeOwned>(pod: &Pod, key: &str) -> Result<T, Report<AnnotationError>> {
    let pod_name = pod.metadata.name.as_deref().unwrap_or("unknown");

    let value = pod
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .ok_or_else(|| {
            Report::new(AnnotationError::Missing {
                key: key.to_string(),
                pod: pod_name.to_string(),
            })
        })?;

    serde_json::from_str(value).change_context_lazy(|| AnnotationError::Decode {
        key: key.to_string(),
        pod: pod_name.to_string(),
    })
}

/// Look up `<PREFIX>_DNS_SERVICE_HOST` in the environment of the pod's containers.
///
/// Service environment variables are injected into application containers,
/// so the first container defining it wins.
pub fn dns_ip_from_environment(pod: &Pod, prefix: &str) -> Option<String> {
    let variable = format!(
        "{}_DNS_SERVICE_HOST",
        prefix.to_uppercase().replace('-', "_")
    );

    pod.spec
        .as_ref()?
        .containers
        .iter()
        .flat_map(|container| container.env.iter().flatten())
        .find(|env| env.name == variable)
        .and_then(|env| env.value.clone())
}

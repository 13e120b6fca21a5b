use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use api_types::RedirectConfig;

use crate::annotation;
use crate::annotation::AnnotationError;
use crate::annotation::AnnotationWaiter;
use crate::annotation::LivePod;
use crate::annotation::RetrySpec;
use crate::config::WaitAnnotationArgs;
use crate::kube_client::CredentialSource;

pub async fn run_wait_annotation(credentials: CredentialSource, args: WaitAnnotationArgs) -> Result<()> {
    let access = super::cluster_access(&credentials).await?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| access.default_namespace().to_string());

    let pod = LivePod::new(access.client().clone(), &namespace, &args.pod);
    let waiter = AnnotationWaiter::new(args.interval());
    let spec = RetrySpec::new(&args.key, args.attempts);

    if !waiter.wait(&pod, &spec).await {
        return Err(anyhow::anyhow!(
            "{}",
            AnnotationError::Missing {
                key: args.key,
                pod: args.pod,
            }
        ));
    }

    let snapshot = pod.fetch().await.map_err(|e| anyhow::anyhow!("{e:?}"))?;
    let mut config: RedirectConfig =
        annotation::parse_annotation(&snapshot, &args.key).map_err(|e| anyhow::anyhow!("{e:?}"))?;

    if config.dns_ip.is_empty() {
        if let Some(dns_ip) = annotation::dns_ip_from_environment(&snapshot, &args.dns_prefix) {
            tracing::debug!(%dns_ip, "DNS address taken from the pod environment");
            config.dns_ip = dns_ip;
        }
    }

    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, &config).context("encode redirect config failed")?;
    writeln!(out).context("write redirect config failed")?;

    Ok(())
}

use std::io::IsTerminal;
use std::io::Write;

use anyhow::Context;
use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::config::OutputFormat;
use crate::config::ReadArgs;
use crate::envoy;
use crate::envoy::Renderer;
use crate::kube_client::CredentialSource;
use crate::portforward::PortForward;
use crate::portforward::TunnelTarget;

pub async fn run_read(credentials: CredentialSource, args: ReadArgs) -> Result<()> {
    let access = super::cluster_access(&credentials).await?;
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| access.default_namespace().to_string());

    let target = TunnelTarget::new(namespace, &args.pod, args.admin_port)
        .map_err(|e| anyhow::anyhow!("{e:?}"))?;
    tracing::info!("Reading proxy configuration of {target}");

    let mut session = PortForward::new(target, credentials).with_cluster_access(access);
    let http = envoy::admin_client().map_err(|e| anyhow::anyhow!("{e:?}"))?;

    let cancel = CancellationToken::new();
    let interrupted = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl+C, cancelling");
            interrupted.cancel();
        }
    });

    let config = envoy::fetch_config(&cancel, &mut session, &http)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read proxy configuration of pod {}: {e:?}", args.pod))?;

    session
        .closed()
        .await
        .map_err(|e| anyhow::anyhow!("Port forward to pod {} ended abnormally: {e:?}", args.pod))?;

    let stdout = std::io::stdout();
    let renderer = Renderer::new(!args.no_color && stdout.is_terminal());
    let mut out = stdout.lock();
    let written = match args.output {
        OutputFormat::Json => renderer.render_json(&config, &mut out),
        OutputFormat::Table => renderer.render_tables(&config, args.filters(), &mut out),
    };
    written.context("write proxy configuration failed")?;
    out.flush().context("write proxy configuration failed")?;

    Ok(())
}

use std::time::Duration;

use clap::Parser;

use crate::annotation::REDIRECT_TRAFFIC_ANNOTATION;

#[derive(Parser, Debug)]
pub struct WaitAnnotationArgs {
    #[arg(help = "Name of the pod to watch")]
    pub pod: String,

    #[arg(
        short,
        long,
        help = "Pod namespace, defaults to the namespace of the kubeconfig context"
    )]
    pub namespace: Option<String>,

    #[arg(long, help = "Annotation key to wait for", default_value = REDIRECT_TRAFFIC_ANNOTATION)]
    pub key: String,

    #[arg(long, help = "Maximum number of checks", default_value = "30")]
    pub attempts: u32,

    #[arg(long, help = "Delay between checks in milliseconds", default_value = "1000")]
    pub interval_ms: u64,

    #[arg(
        long,
        help = "Prefix of the DNS service environment variable used when the annotation carries no DNS address",
        default_value = "consul"
    )]
    pub dns_prefix: String,
}

impl WaitAnnotationArgs {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

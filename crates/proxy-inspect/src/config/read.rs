use clap::Parser;
use clap::ValueEnum;

use crate::envoy::Filters;
use crate::envoy::ADMIN_PORT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned tables, one per category
    Table,
    /// The configuration dump exactly as returned by the proxy
    Json,
}

#[derive(Parser, Debug)]
pub struct ReadArgs {
    #[arg(help = "Name of the pod running the sidecar proxy")]
    pub pod: String,

    #[arg(
        short,
        long,
        help = "Pod namespace, defaults to the namespace of the kubeconfig context"
    )]
    pub namespace: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    #[arg(long, help = "Show clusters")]
    pub clusters: bool,

    #[arg(long, help = "Show listeners")]
    pub listeners: bool,

    #[arg(long, help = "Show routes")]
    pub routes: bool,

    #[arg(long, help = "Show endpoints")]
    pub endpoints: bool,

    #[arg(long, help = "Show secrets")]
    pub secrets: bool,

    #[arg(
        long,
        help = "Admin API port of the sidecar proxy",
        default_value_t = ADMIN_PORT,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub admin_port: u16,

    #[arg(long, help = "Disable coloured table output")]
    pub no_color: bool,
}

impl ReadArgs {
    pub fn filters(&self) -> Filters {
        Filters {
            clusters: self.clusters,
            listeners: self.listeners,
            routes: self.routes,
            endpoints: self.endpoints,
            secrets: self.secrets,
        }
    }
}

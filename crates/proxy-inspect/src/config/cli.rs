use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use utils::version;

use crate::config::read::ReadArgs;
use crate::config::wait::WaitAnnotationArgs;
use crate::kube_client::CredentialSource;

#[derive(Parser, Debug)]
#[command(about, long_about, version = &**version::VERSION)]
pub struct Cli {
    #[arg(
        short = 'c',
        long,
        global = true,
        help = "Path to the kubeconfig file",
        value_hint = clap::ValueHint::FilePath
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, global = true, help = "Kubeconfig context to use")]
    pub context: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn credentials(&self) -> CredentialSource {
        CredentialSource {
            kubeconfig: self.kubeconfig.clone(),
            context: self.context.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read the sidecar proxy configuration of a pod
    Read(ReadArgs),
    /// Wait for the traffic redirect annotation of a pod and print it
    #[command(name = "wait-annotation")]
    WaitAnnotation(WaitAnnotationArgs),
}

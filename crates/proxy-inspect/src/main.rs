use anyhow::Result;
use clap::Parser;
use proxy_inspect::cmd;
use proxy_inspect::config::Cli;
use proxy_inspect::config::Commands;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are reported through the error path as well
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    utils::logging::init(tracing::Level::WARN);
    tracing::debug!("proxy-inspect {}", &**version::VERSION);

    let credentials = cli.credentials();
    match cli.command {
        Commands::Read(args) => cmd::run_read(credentials, args).await,
        Commands::WaitAnnotation(args) => cmd::run_wait_annotation(credentials, args).await,
    }
}

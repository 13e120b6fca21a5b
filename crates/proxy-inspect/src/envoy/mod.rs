//! Sidecar proxy configuration: fetching it over a port forward, flattening
//! the admin config dump into rows and printing them.

use core::error::Error;

mod config;
mod fetch;
mod render;

pub use config::ClusterRow;
pub use config::EndpointRow;
pub use config::EnvoyConfig;
pub use config::ListenerRow;
pub use config::RouteRow;
pub use config::SecretRow;
pub use fetch::admin_client;
pub use fetch::fetch_config;
pub use fetch::ADMIN_PORT;
pub use render::Filters;
pub use render::Renderer;

/// Errors that can occur while reading the proxy configuration.
#[derive(Debug, derive_more::Display)]
pub enum FetchError {
    #[display("Failed to build HTTP client")]
    Client,
    #[display("Failed to open tunnel to the proxy admin API")]
    Tunnel,
    #[display("Reading the proxy configuration was cancelled")]
    Cancelled,
    #[display("Request to {url} failed")]
    Request { url: String },
    #[display("Failed to decode proxy configuration")]
    Decode,
}

impl Error for FetchError {}

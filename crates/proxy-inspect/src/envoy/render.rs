//! Terminal output of a proxy configuration.

use std::io;
use std::io::Write;

use crossterm::style::Color;
use crossterm::style::Stylize;
use tabled::settings::Style;
use tabled::Table;
use tabled::Tabled;

use super::EnvoyConfig;

/// Categories selected on the command line. Nothing selected means everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filters {
    pub clusters: bool,
    pub listeners: bool,
    pub routes: bool,
    pub endpoints: bool,
    pub secrets: bool,
}

impl Filters {
    const fn any(&self) -> bool {
        self.clusters || self.listeners || self.routes || self.endpoints || self.secrets
    }

    const fn shows(&self, selected: bool) -> bool {
        !self.any() || selected
    }
}

#[derive(Tabled)]
struct ClusterLine {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "FQDN")]
    fqdn: String,
    #[tabled(rename = "Endpoints")]
    endpoints: String,
    #[tabled(rename = "Type")]
    discovery_type: String,
    #[tabled(rename = "Last Updated")]
    last_updated: String,
}

#[derive(Tabled)]
struct EndpointLine {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Cluster")]
    cluster: String,
    #[tabled(rename = "Weight")]
    weight: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct ListenerLine {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address:Port")]
    address: String,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Filter Chain")]
    filter_chains: String,
    #[tabled(rename = "Last Updated")]
    last_updated: String,
}

#[derive(Tabled)]
struct RouteLine {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Destination Cluster")]
    destination_clusters: String,
    #[tabled(rename = "Last Updated")]
    last_updated: String,
}

#[derive(Tabled)]
struct SecretLine {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Last Updated")]
    last_updated: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub const fn new(color: bool) -> Self {
        Self { color }
    }

    /// Print the configuration document as returned by the proxy.
    pub fn render_json<W: Write>(&self, config: &EnvoyConfig, writer: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, &config.raw)?;
        writeln!(writer)
    }

    /// Print one table per selected category.
    pub fn render_tables<W: Write>(
        &self,
        config: &EnvoyConfig,
        filters: Filters,
        writer: &mut W,
    ) -> io::Result<()> {
        if filters.shows(filters.clusters) {
            let lines = config.clusters.iter().map(|cluster| ClusterLine {
                name: cluster.name.clone(),
                fqdn: cluster.fully_qualified_domain_name.clone(),
                endpoints: cluster.endpoints.join(", "),
                discovery_type: cluster.discovery_type.clone(),
                last_updated: cluster.last_updated.clone(),
            });
            self.section(writer, "Clusters", lines)?;
        }

        if filters.shows(filters.endpoints) {
            let lines = config.endpoints.iter().map(|endpoint| EndpointLine {
                address: endpoint.address.clone(),
                cluster: endpoint.cluster.clone(),
                weight: format!("{:.2}", endpoint.weight),
                status: self.status(&endpoint.status),
            });
            self.section(writer, "Endpoints", lines)?;
        }

        if filters.shows(filters.listeners) {
            let lines = config.listeners.iter().map(|listener| ListenerLine {
                name: listener.name.clone(),
                address: listener.address.clone(),
                direction: listener.direction.clone(),
                filter_chains: listener.filter_chains.join("; "),
                last_updated: listener.last_updated.clone(),
            });
            self.section(writer, "Listeners", lines)?;
        }

        if filters.shows(filters.routes) {
            let lines = config.routes.iter().map(|route| RouteLine {
                name: route.name.clone(),
                destination_clusters: route.destination_clusters.join(", "),
                last_updated: route.last_updated.clone(),
            });
            self.section(writer, "Routes", lines)?;
        }

        if filters.shows(filters.secrets) {
            let lines = config.secrets.iter().map(|secret| SecretLine {
                name: secret.name.clone(),
                kind: secret.kind.clone(),
                last_updated: secret.last_updated.clone(),
            });
            self.section(writer, "Secrets", lines)?;
        }

        Ok(())
    }

    fn section<W, L>(&self, writer: &mut W, title: &str, lines: impl IntoIterator<Item = L>) -> io::Result<()>
    where
        W: Write,
        L: Tabled,
    {
        if self.color {
            writeln!(writer, "{}", title.bold().underlined())?;
        } else {
            writeln!(writer, "{title}")?;
        }

        let table = Table::new(lines).with(Style::blank()).to_string();
        writeln!(writer, "{table}")?;
        writeln!(writer)
    }

    fn status(&self, status: &str) -> String {
        if !self.color {
            return status.to_string();
        }

        let color = if status == "HEALTHY" { Color::Green } else { Color::Red };
        status.with(color).to_string()
    }
}

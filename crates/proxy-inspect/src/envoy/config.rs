//! Flattened view of the sidecar configuration dump.

use std::collections::HashMap;

use api_types::envoy::ClusterLoadAssignment;
use api_types::envoy::ConfigDump;
use api_types::envoy::ConfigDumpSection;
use api_types::envoy::Listener;
use api_types::envoy::RouteConfiguration;
use serde::Deserialize;
use serde::Serialize;

/// Discovery type reported when the dump omits it (protobuf default).
const DEFAULT_DISCOVERY_TYPE: &str = "STATIC";
const DEFAULT_DIRECTION: &str = "UNSPECIFIED";
const DEFAULT_HEALTH_STATUS: &str = "UNKNOWN";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRow {
    pub name: String,
    pub fully_qualified_domain_name: String,
    pub endpoints: Vec<String>,
    pub discovery_type: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListenerRow {
    pub name: String,
    pub address: String,
    /// One entry per filter chain, listing its filters
    pub filter_chains: Vec<String>,
    pub direction: String,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteRow {
    pub name: String,
    pub destination_clusters: Vec<String>,
    pub last_updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointRow {
    pub address: String,
    pub cluster: String,
    pub weight: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecretRow {
    pub name: String,
    pub kind: String,
    pub last_updated: String,
}

/// Proxy configuration as read from the admin API.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvoyConfig {
    pub clusters: Vec<ClusterRow>,
    pub listeners: Vec<ListenerRow>,
    pub routes: Vec<RouteRow>,
    pub endpoints: Vec<EndpointRow>,
    pub secrets: Vec<SecretRow>,
    /// The document exactly as returned by the admin API
    pub raw: serde_json::Value,
}

impl EnvoyConfig {
    /// Decode an admin `/config_dump` response body.
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: serde_json::Value = serde_json::from_slice(body)?;
        let dump = ConfigDump::deserialize(&raw)?;

        let mut config = Self::from(dump);
        config.raw = raw;
        Ok(config)
    }
}

impl From<ConfigDump> for EnvoyConfig {
    fn from(dump: ConfigDump) -> Self {
        let mut config = Self::default();

        let mut assignments: Vec<ClusterLoadAssignment> = Vec::new();
        let mut clusters = Vec::new();
        for section in dump.configs {
            match section {
                ConfigDumpSection::Clusters(dump) => {
                    clusters.extend(dump.static_clusters);
                    clusters.extend(dump.dynamic_active_clusters);
                }
                ConfigDumpSection::Listeners(dump) => {
                    for state in dump.static_listeners {
                        config.listeners.push(listener_row(&state.listener, state.last_updated));
                    }
                    for state in dump.dynamic_listeners.into_iter().filter_map(|l| l.active_state) {
                        config.listeners.push(listener_row(&state.listener, state.last_updated));
                    }
                }
                ConfigDumpSection::Routes(dump) => {
                    for entry in dump.static_route_configs.into_iter().chain(dump.dynamic_route_configs) {
                        config.routes.push(route_row(&entry.route_config, entry.last_updated));
                    }
                }
                ConfigDumpSection::Endpoints(dump) => {
                    assignments.extend(
                        dump.static_endpoint_configs
                            .into_iter()
                            .chain(dump.dynamic_endpoint_configs)
                            .map(|entry| entry.endpoint_config),
                    );
                }
                ConfigDumpSection::Secrets(dump) => {
                    for entry in dump.static_secrets.into_iter().chain(dump.dynamic_active_secrets) {
                        config.secrets.push(SecretRow {
                            name: entry.name,
                            kind: entry
                                .secret
                                .as_ref()
                                .map_or("Unknown", |secret| secret.kind())
                                .to_string(),
                            last_updated: entry.last_updated.unwrap_or_default(),
                        });
                    }
                }
                ConfigDumpSection::Other => {}
            }
        }

        let by_cluster: HashMap<&str, &ClusterLoadAssignment> = assignments
            .iter()
            .map(|assignment| (assignment.cluster_name.as_str(), assignment))
            .collect();

        for entry in clusters {
            let cluster = entry.cluster;
            let endpoints = by_cluster
                .get(cluster.name.as_str())
                .copied()
                .or(cluster.load_assignment.as_ref())
                .map(endpoint_addresses)
                .unwrap_or_default();

            config.clusters.push(ClusterRow {
                name: cluster.name.split('.').next().unwrap_or_default().to_string(),
                endpoints,
                discovery_type: cluster
                    .discovery_type
                    .or(cluster.cluster_type.map(|custom| custom.name))
                    .unwrap_or_else(|| DEFAULT_DISCOVERY_TYPE.to_string()),
                last_updated: entry.last_updated.unwrap_or_default(),
                fully_qualified_domain_name: cluster.name,
            });
        }

        for assignment in &assignments {
            for lb_endpoint in assignment.endpoints.iter().flat_map(|locality| &locality.lb_endpoints) {
                config.endpoints.push(EndpointRow {
                    address: lb_endpoint
                        .endpoint
                        .as_ref()
                        .and_then(|endpoint| endpoint.address.as_ref())
                        .map(ToString::to_string)
                        .unwrap_or_default(),
                    cluster: assignment.cluster_name.clone(),
                    weight: f64::from(lb_endpoint.load_balancing_weight.unwrap_or(1)),
                    status: lb_endpoint
                        .health_status
                        .clone()
                        .unwrap_or_else(|| DEFAULT_HEALTH_STATUS.to_string()),
                });
            }
        }

        config
    }
}

fn endpoint_addresses(assignment: &ClusterLoadAssignment) -> Vec<String> {
    assignment
        .endpoints
        .iter()
        .flat_map(|locality| &locality.lb_endpoints)
        .filter_map(|lb_endpoint| lb_endpoint.endpoint.as_ref()?.address.as_ref())
        .map(ToString::to_string)
        .collect()
}

fn listener_row(listener: &Listener, last_updated: Option<String>) -> ListenerRow {
    ListenerRow {
        name: listener.name.clone(),
        address: listener
            .address
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        filter_chains: listener
            .filter_chains
            .iter()
            .map(|chain| {
                chain
                    .filters
                    .iter()
                    .map(|filter| filter.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .collect(),
        direction: listener
            .traffic_direction
            .clone()
            .unwrap_or_else(|| DEFAULT_DIRECTION.to_string()),
        last_updated: last_updated.unwrap_or_default(),
    }
}

fn route_row(route_config: &RouteConfiguration, last_updated: Option<String>) -> RouteRow {
    let mut destination_clusters: Vec<String> = Vec::new();
    let actions = route_config
        .virtual_hosts
        .iter()
        .flat_map(|host| &host.routes)
        .filter_map(|route| route.route.as_ref());

    for action in actions {
        let weighted = action
            .weighted_clusters
            .iter()
            .flat_map(|weighted| &weighted.clusters)
            .map(|cluster| &cluster.name);
        for name in action.cluster.iter().chain(weighted) {
            if !destination_clusters.contains(name) {
                destination_clusters.push(name.clone());
            }
        }
    }

    RouteRow {
        name: route_config.name.clone(),
        destination_clusters,
        last_updated: last_updated.unwrap_or_default(),
    }
}

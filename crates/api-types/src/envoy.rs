//! Partial model of the sidecar admin `/config_dump` document.
//!
//! Only the fields the inspector renders are modelled; everything else in the
//! dump is ignored during deserialization.

use std::fmt;

use serde::de::IgnoredAny;
use serde::Deserialize;

/// Top level of the admin config dump.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigDump {
    #[serde(default)]
    pub configs: Vec<ConfigDumpSection>,
}

/// One entry of the `configs` array, discriminated by its `@type` URL.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "@type")]
pub enum ConfigDumpSection {
    #[serde(rename = "type.googleapis.com/envoy.admin.v3.ClustersConfigDump")]
    Clusters(ClustersConfigDump),
    #[serde(rename = "type.googleapis.com/envoy.admin.v3.ListenersConfigDump")]
    Listeners(ListenersConfigDump),
    #[serde(rename = "type.googleapis.com/envoy.admin.v3.RoutesConfigDump")]
    Routes(RoutesConfigDump),
    #[serde(rename = "type.googleapis.com/envoy.admin.v3.EndpointsConfigDump")]
    Endpoints(EndpointsConfigDump),
    #[serde(rename = "type.googleapis.com/envoy.admin.v3.SecretsConfigDump")]
    Secrets(SecretsConfigDump),
    /// Bootstrap, scoped routes and any section this model does not read
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClustersConfigDump {
    pub static_clusters: Vec<ClusterEntry>,
    pub dynamic_active_clusters: Vec<ClusterEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterEntry {
    pub cluster: Cluster,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Cluster {
    pub name: String,
    /// Discovery type (`STATIC`, `EDS`, `LOGICAL_DNS`, ...)
    #[serde(rename = "type")]
    pub discovery_type: Option<String>,
    /// Set instead of `type` for extension clusters
    pub cluster_type: Option<CustomClusterType>,
    pub load_assignment: Option<ClusterLoadAssignment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustomClusterType {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterLoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityLbEndpoints>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LocalityLbEndpoints {
    pub lb_endpoints: Vec<LbEndpoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LbEndpoint {
    pub endpoint: Option<Endpoint>,
    pub health_status: Option<String>,
    pub load_balancing_weight: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub address: Option<Address>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Address {
    pub socket_address: Option<SocketAddress>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SocketAddress {
    pub address: String,
    pub port_value: u32,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.socket_address {
            Some(socket) => write!(f, "{}:{}", socket.address, socket.port_value),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListenersConfigDump {
    pub static_listeners: Vec<ListenerState>,
    pub dynamic_listeners: Vec<DynamicListener>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenerState {
    pub listener: Listener,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DynamicListener {
    pub name: String,
    /// Absent while the listener is still warming or draining
    pub active_state: Option<ListenerState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Listener {
    pub name: String,
    pub address: Option<Address>,
    pub filter_chains: Vec<FilterChain>,
    pub traffic_direction: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterChain {
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RoutesConfigDump {
    pub static_route_configs: Vec<RouteConfigEntry>,
    pub dynamic_route_configs: Vec<RouteConfigEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfigEntry {
    pub route_config: RouteConfiguration,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VirtualHost {
    pub name: String,
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Route {
    pub route: Option<RouteAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RouteAction {
    pub cluster: Option<String>,
    pub weighted_clusters: Option<WeightedClusters>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WeightedClusters {
    pub clusters: Vec<ClusterWeight>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClusterWeight {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EndpointsConfigDump {
    pub static_endpoint_configs: Vec<EndpointConfigEntry>,
    pub dynamic_endpoint_configs: Vec<EndpointConfigEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfigEntry {
    pub endpoint_config: ClusterLoadAssignment,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecretsConfigDump {
    pub static_secrets: Vec<SecretEntry>,
    pub dynamic_active_secrets: Vec<SecretEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecretEntry {
    pub name: String,
    pub secret: Option<Secret>,
    pub last_updated: Option<String>,
}

/// Secret payloads are never decoded, only their kind is reported.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Secret {
    pub tls_certificate: Option<IgnoredAny>,
    pub validation_context: Option<IgnoredAny>,
    pub session_ticket_keys: Option<IgnoredAny>,
    pub generic_secret: Option<IgnoredAny>,
}

impl Secret {
    /// Human readable kind of the secret.
    pub fn kind(&self) -> &'static str {
        if self.tls_certificate.is_some() {
            "TLS Certificate"
        } else if self.validation_context.is_some() {
            "Validation Context"
        } else if self.session_ticket_keys.is_some() {
            "Session Ticket Keys"
        } else if self.generic_secret.is_some() {
            "Generic Secret"
        } else {
            "Unknown"
        }
    }
}

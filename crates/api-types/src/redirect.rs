use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

/// Traffic redirection settings written into a pod annotation by the
/// injector and consumed by the network namespace setup step.
///
/// Field names follow the annotation's JSON layout, which upper-cases
/// acronyms (`ProxyUserID`, `ConsulDNSIP`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectConfig {
    /// DNS server the redirected DNS traffic is sent to
    #[serde(rename = "ConsulDNSIP")]
    pub dns_ip: String,
    /// Port of the DNS server
    #[serde(rename = "ConsulDNSPort")]
    pub dns_port: u16,
    /// UID the proxy process runs as; its traffic is never redirected
    #[serde(rename = "ProxyUserID")]
    pub proxy_user_id: String,
    #[serde(rename = "ProxyInboundPort")]
    pub proxy_inbound_port: u16,
    #[serde(rename = "ProxyOutboundPort")]
    pub proxy_outbound_port: u16,
    #[serde(rename = "ExcludeInboundPorts", deserialize_with = "nullable_list")]
    pub exclude_inbound_ports: Vec<String>,
    #[serde(rename = "ExcludeOutboundPorts", deserialize_with = "nullable_list")]
    pub exclude_outbound_ports: Vec<String>,
    #[serde(rename = "ExcludeOutboundCIDRs", deserialize_with = "nullable_list")]
    pub exclude_outbound_cidrs: Vec<String>,
    #[serde(rename = "ExcludeUIDs", deserialize_with = "nullable_list")]
    pub exclude_uids: Vec<String>,
    /// Path of the network namespace the rules are applied in
    #[serde(rename = "NetNS")]
    pub net_ns: String,
}

/// Writers emit `null` for empty lists.
fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Vec<String>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

pub mod annotation;
pub mod cmd;
pub mod config;
pub mod envoy;
pub mod kube_client;
pub mod portforward;

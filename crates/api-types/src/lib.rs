//! Shared API type definitions
//!
//! This crate contains the wire formats shared across proxy-inspect components:
//! the traffic redirect configuration carried in pod annotations, and the subset
//! of the sidecar admin config dump that the inspector reads.

pub mod envoy;
pub mod redirect;

pub use redirect::RedirectConfig;

//! Ambient helpers shared by proxy-inspect binaries.

pub mod logging;
pub mod version;

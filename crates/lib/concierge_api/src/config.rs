//! API server configuration.

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3000").
    pub bind_addr: String,
    /// Tenant every request acts for. One tenant per deployment.
    pub tenant: String,
}

impl ApiConfig {
    pub fn new(bind_addr: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
            tenant: tenant.into(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND_ADDR, "default")
    }
}

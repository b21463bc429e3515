//! # concierge_core
//!
//! Credential management and command dispatch for Concierge.
//!
//! - [`credentials`]: token bundles, the two-tier credential store and the
//!   token manager that keeps both tiers in step.
//! - [`oauth`]: OAuth provider clients and pending-authorization state.
//! - [`dispatch`]: the command registry and dispatcher.
//! - [`integrations`]: the third-party calls registered as commands.

pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod integrations;
pub mod oauth;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}

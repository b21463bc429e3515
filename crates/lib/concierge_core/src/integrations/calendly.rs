//! Calendly scheduled events.

use futures::FutureExt;
use reqwest::Client;
use serde_json::Value;

use super::{IntegrationError, http_error, opt_str_param, read_json};
use crate::config::CalendlyConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const LIST_EVENTS: &str = "list_events";

const PROVIDER: &str = "calendly";

const DEFAULT_COUNT: u64 = 20;
const MAX_COUNT: u64 = 100;

#[derive(Clone)]
pub struct Calendly {
    config: Option<CalendlyConfig>,
    http: Client,
}

impl Calendly {
    pub fn new(config: Option<CalendlyConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// List the configured user's scheduled events. Optional `count`
    /// (1..=100) and `status` (`active` or `canceled`).
    pub async fn list_events(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;

        let count = params
            .get("count")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_COUNT)
            .clamp(1, MAX_COUNT)
            .to_string();
        let mut query = vec![("user", config.user_uri.as_str()), ("count", count.as_str())];
        if let Some(status) = opt_str_param(params, "status") {
            query.push(("status", status));
        }

        let resp = self
            .http
            .get(format!(
                "{}/scheduled_events",
                config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&config.token)
            .query(&query)
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        read_json(PROVIDER, resp).await
    }
}

pub fn register(builder: &mut DispatcherBuilder, api: Calendly) -> Result<(), DispatchError> {
    builder.register(LIST_EVENTS, &[], move |params| {
        let api = api.clone();
        async move { api.list_events(&params).await }.boxed()
    })?;
    Ok(())
}

//! Slack incoming webhooks.

use futures::FutureExt;
use reqwest::Client;
use serde_json::{Map, Value, json};

use super::{IntegrationError, MAX_ERROR_BODY, http_error, opt_str_param, str_param, truncate};
use crate::config::SlackConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const POST_SLACK: &str = "post_slack";

const PROVIDER: &str = "slack";

#[derive(Clone)]
pub struct Slack {
    config: Option<SlackConfig>,
    http: Client,
}

impl Slack {
    pub fn new(config: Option<SlackConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Post `text` (optional `channel`) through the webhook.
    ///
    /// Webhooks answer with a plain `ok` body rather than JSON, so only the
    /// status is checked.
    pub async fn post(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;

        let mut payload = Map::new();
        payload.insert("text".into(), str_param(params, "text")?.into());
        if let Some(channel) = opt_str_param(params, "channel") {
            payload.insert("channel".into(), channel.into());
        }

        let resp = self
            .http
            .post(&config.webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(IntegrationError::Provider {
                provider: PROVIDER,
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }

        Ok(json!({ "delivered": true }))
    }
}

pub fn register(builder: &mut DispatcherBuilder, api: Slack) -> Result<(), DispatchError> {
    builder.register(POST_SLACK, &["text"], move |params| {
        let api = api.clone();
        async move { api.post(&params).await }.boxed()
    })?;
    Ok(())
}

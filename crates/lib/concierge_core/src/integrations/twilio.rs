//! Twilio programmable SMS.

use futures::FutureExt;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use super::{IntegrationError, http_error, read_json, str_param};
use crate::config::TwilioConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const SEND_SMS: &str = "send_sms";

const PROVIDER: &str = "twilio";

#[derive(Clone)]
pub struct Twilio {
    config: Option<TwilioConfig>,
    http: Client,
}

impl Twilio {
    pub fn new(config: Option<TwilioConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Send `body` to `to` from the configured number. Returns `{ sid, status }`.
    pub async fn send_sms(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;

        let form = [
            ("To", str_param(params, "to")?),
            ("From", config.from_number.as_str()),
            ("Body", str_param(params, "body")?),
        ];
        let resp = self
            .http
            .post(messages_url(config))
            .basic_auth(&config.account_sid, Some(&config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        let message = read_json(PROVIDER, resp).await?;
        info!(sid = ?message.get("sid"), "sms queued");

        Ok(json!({ "sid": message["sid"], "status": message["status"] }))
    }
}

fn messages_url(config: &TwilioConfig) -> String {
    format!(
        "{}/2010-04-01/Accounts/{}/Messages.json",
        config.base_url.trim_end_matches('/'),
        config.account_sid
    )
}

pub fn register(builder: &mut DispatcherBuilder, api: Twilio) -> Result<(), DispatchError> {
    builder.register(SEND_SMS, &["to", "body"], move |params| {
        let api = api.clone();
        async move { api.send_sms(&params).await }.boxed()
    })?;
    Ok(())
}

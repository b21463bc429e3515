//! Stripe Checkout sessions.

use futures::FutureExt;
use reqwest::Client;
use serde_json::{Value, json};

use super::{IntegrationError, http_error, opt_str_param, read_json, str_param};
use crate::config::StripeConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const CREATE_CHECKOUT: &str = "create_checkout";

const PROVIDER: &str = "stripe";

#[derive(Clone)]
pub struct Stripe {
    config: Option<StripeConfig>,
    http: Client,
}

impl Stripe {
    pub fn new(config: Option<StripeConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Create a Checkout session for one price. Returns `{ id, url }`.
    pub async fn create_checkout(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;

        let quantity = params
            .get("quantity")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .to_string();
        let mut form = vec![
            ("mode", opt_str_param(params, "mode").unwrap_or("payment").to_string()),
            ("line_items[0][price]", str_param(params, "priceId")?.to_string()),
            ("line_items[0][quantity]", quantity),
            ("success_url", str_param(params, "successUrl")?.to_string()),
            ("cancel_url", str_param(params, "cancelUrl")?.to_string()),
        ];
        if let Some(email) = opt_str_param(params, "customerEmail") {
            form.push(("customer_email", email.to_string()));
        }

        let resp = self
            .http
            .post(format!(
                "{}/v1/checkout/sessions",
                config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&config.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        let session = read_json(PROVIDER, resp).await?;

        Ok(json!({ "id": session["id"], "url": session["url"] }))
    }
}

pub fn register(builder: &mut DispatcherBuilder, api: Stripe) -> Result<(), DispatchError> {
    builder.register(
        CREATE_CHECKOUT,
        &["priceId", "successUrl", "cancelUrl"],
        move |params| {
            let api = api.clone();
            async move { api.create_checkout(&params).await }.boxed()
        },
    )?;
    Ok(())
}

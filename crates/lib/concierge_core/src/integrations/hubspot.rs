//! HubSpot CRM contacts.

use futures::FutureExt;
use reqwest::Client;
use serde_json::{Map, Value, json};

use super::{IntegrationError, http_error, opt_str_param, read_json, str_param};
use crate::config::HubSpotConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const CREATE_CONTACT: &str = "create_contact";

const PROVIDER: &str = "hubspot";

/// Optional contact properties passed through when present.
const OPTIONAL_PROPERTIES: &[&str] = &["firstname", "lastname", "phone", "company", "website"];

#[derive(Clone)]
pub struct HubSpot {
    config: Option<HubSpotConfig>,
    http: Client,
}

impl HubSpot {
    pub fn new(config: Option<HubSpotConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Create a CRM contact. Returns HubSpot's contact object.
    pub async fn create_contact(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;

        let resp = self
            .http
            .post(format!(
                "{}/crm/v3/objects/contacts",
                config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&config.access_token)
            .json(&json!({ "properties": contact_properties(params)? }))
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        read_json(PROVIDER, resp).await
    }
}

fn contact_properties(params: &Params) -> Result<Map<String, Value>, IntegrationError> {
    let mut properties = Map::new();
    properties.insert("email".into(), str_param(params, "email")?.into());
    for name in OPTIONAL_PROPERTIES {
        if let Some(value) = opt_str_param(params, name) {
            properties.insert((*name).into(), value.into());
        }
    }
    Ok(properties)
}

pub fn register(builder: &mut DispatcherBuilder, api: HubSpot) -> Result<(), DispatchError> {
    builder.register(CREATE_CONTACT, &["email"], move |params| {
        let api = api.clone();
        async move { api.create_contact(&params).await }.boxed()
    })?;
    Ok(())
}

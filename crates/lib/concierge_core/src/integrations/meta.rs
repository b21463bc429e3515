//! Meta Graph API: Facebook page posts and Instagram image posts.
//!
//! Instagram publishing is two calls: create a media container, then publish
//! it. The publish call is only made once the container exists.

use futures::FutureExt;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use super::{IntegrationError, http_error, opt_str_param, read_json, str_param};
use crate::config::MetaConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const POST_FACEBOOK: &str = "post_facebook";
pub const POST_INSTAGRAM: &str = "post_instagram";

const PROVIDER: &str = "meta";

#[derive(Clone)]
pub struct Meta {
    config: Option<MetaConfig>,
    http: Client,
}

impl Meta {
    pub fn new(config: Option<MetaConfig>, http: Client) -> Self {
        Self { config, http }
    }

    fn endpoint(config: &MetaConfig, node: &str, edge: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            config.base_url.trim_end_matches('/'),
            config.graph_version,
            node,
            edge
        )
    }

    async fn post_form(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> Result<Value, IntegrationError> {
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        read_json(PROVIDER, resp).await
    }

    /// Publish `message` (optional `link`) to the configured page feed.
    pub async fn post_facebook(&self, params: &Params) -> Result<Value, IntegrationError> {
        let (config, page_id) = self
            .config
            .as_ref()
            .and_then(|c| c.page_id.as_deref().map(|id| (c, id)))
            .ok_or(IntegrationError::NotConfigured("facebook"))?;

        let mut form = vec![
            ("message", str_param(params, "message")?),
            ("access_token", config.access_token.as_str()),
        ];
        if let Some(link) = opt_str_param(params, "link") {
            form.push(("link", link));
        }

        let result = self
            .post_form(Self::endpoint(config, page_id, "feed"), &form)
            .await?;
        info!(post_id = ?result.get("id"), "facebook post published");
        Ok(result)
    }

    /// Create an image container from `imageUrl` (optional `caption`) and
    /// publish it. Returns the publish response.
    pub async fn post_instagram(&self, params: &Params) -> Result<Value, IntegrationError> {
        let (config, account_id) = self
            .config
            .as_ref()
            .and_then(|c| c.instagram_account_id.as_deref().map(|id| (c, id)))
            .ok_or(IntegrationError::NotConfigured("instagram"))?;

        let mut form = vec![
            ("image_url", str_param(params, "imageUrl")?),
            ("access_token", config.access_token.as_str()),
        ];
        if let Some(caption) = opt_str_param(params, "caption") {
            form.push(("caption", caption));
        }

        let container = self
            .post_form(Self::endpoint(config, account_id, "media"), &form)
            .await?;
        let creation_id = container
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: "media container id missing".to_string(),
            })?;
        debug!(creation_id, "instagram media container created");

        let published = self
            .post_form(
                Self::endpoint(config, account_id, "media_publish"),
                &[
                    ("creation_id", creation_id),
                    ("access_token", config.access_token.as_str()),
                ],
            )
            .await?;
        info!(media_id = ?published.get("id"), "instagram post published");
        Ok(published)
    }
}

pub fn register(builder: &mut DispatcherBuilder, api: Meta) -> Result<(), DispatchError> {
    let facebook = api.clone();
    builder.register(POST_FACEBOOK, &["message"], move |params| {
        let api = facebook.clone();
        async move { api.post_facebook(&params).await }.boxed()
    })?;
    builder.register(POST_INSTAGRAM, &["imageUrl"], move |params| {
        let api = api.clone();
        async move { api.post_instagram(&params).await }.boxed()
    })?;
    Ok(())
}

//! LinkedIn UGC text posts.

use futures::FutureExt;
use reqwest::Client;
use serde_json::{Value, json};

use super::{IntegrationError, http_error, read_json, str_param};
use crate::config::LinkedInConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const POST_LINKEDIN: &str = "post_linkedin";

const PROVIDER: &str = "linkedin";

#[derive(Clone)]
pub struct LinkedIn {
    config: Option<LinkedInConfig>,
    http: Client,
}

impl LinkedIn {
    pub fn new(config: Option<LinkedInConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Publish a public text share as the configured author. Returns `{ id }`.
    pub async fn post(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;

        let body = share_body(&config.author_urn, str_param(params, "text")?);
        let resp = self
            .http
            .post(format!("{}/v2/ugcPosts", config.base_url.trim_end_matches('/')))
            .bearer_auth(&config.access_token)
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&body)
            .send()
            .await
            .map_err(http_error(PROVIDER))?;

        // The created id comes back in a header; the body may be empty.
        let header_id = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let created = read_json(PROVIDER, resp).await?;
        let id = header_id
            .or_else(|| created.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: "post id missing".to_string(),
            })?;

        Ok(json!({ "id": id }))
    }
}

fn share_body(author: &str, text: &str) -> Value {
    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": text },
                "shareMediaCategory": "NONE"
            }
        },
        "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
    })
}

pub fn register(builder: &mut DispatcherBuilder, api: LinkedIn) -> Result<(), DispatchError> {
    builder.register(POST_LINKEDIN, &["text"], move |params| {
        let api = api.clone();
        async move { api.post(&params).await }.boxed()
    })?;
    Ok(())
}

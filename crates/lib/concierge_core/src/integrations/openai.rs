//! OpenAI chat completions for text generation.

use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{IntegrationError, http_error, opt_str_param, read_json, str_param};
use crate::config::OpenAiConfig;
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};

pub const GENERATE_TEXT: &str = "generate_text";

const PROVIDER: &str = "openai";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct OpenAi {
    config: Option<OpenAiConfig>,
    http: Client,
}

impl OpenAi {
    pub fn new(config: Option<OpenAiConfig>, http: Client) -> Self {
        Self { config, http }
    }

    /// Generate text for `prompt` (optional `system`, `model`). Returns
    /// `{ text, model }`.
    pub async fn generate_text(&self, params: &Params) -> Result<Value, IntegrationError> {
        let config = self
            .config
            .as_ref()
            .ok_or(IntegrationError::NotConfigured(PROVIDER))?;
        let prompt = str_param(params, "prompt")?;
        let model = opt_str_param(params, "model").unwrap_or(&config.model);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = opt_str_param(params, "system") {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let resp = self
            .http
            .post(format!(
                "{}/v1/chat/completions",
                config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&config.api_key)
            .json(&ChatRequest { model, messages })
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        let body = read_json(PROVIDER, resp).await?;

        let parsed: ChatResponse =
            serde_json::from_value(body).map_err(|e| IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: e.to_string(),
            })?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: "no completion returned".to_string(),
            })?;

        Ok(json!({ "text": text, "model": parsed.model.as_deref().unwrap_or(model) }))
    }
}

pub fn register(builder: &mut DispatcherBuilder, api: OpenAi) -> Result<(), DispatchError> {
    builder.register(GENERATE_TEXT, &["prompt"], move |params| {
        let api = api.clone();
        async move { api.generate_text(&params).await }.boxed()
    })?;
    Ok(())
}

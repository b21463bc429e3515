//! Third-party integrations registered as dispatcher commands.
//!
//! Each submodule wraps one vendor API: it takes validated parameters, makes
//! the outbound call(s) and returns the vendor's response (or a trimmed view
//! of it). Google-backed commands authorize through the token manager; every
//! other integration uses a static credential from configuration.
//!
//! # Commands
//!
//! | Command         | Required                              | Module       |
//! |-----------------|---------------------------------------|--------------|
//! | `send_email`    | `to`, `subject`, `html`               | [`google`]   |
//! | `append_sheet`  | `spreadsheetId`, `range`, `values`    | [`google`]   |
//! | `generate_text` | `prompt`                              | [`openai`]   |
//! | `create_checkout` | `priceId`, `successUrl`, `cancelUrl` | [`stripe`]   |
//! | `post_facebook` | `message`                             | [`meta`]     |
//! | `post_instagram`| `imageUrl`                            | [`meta`]     |
//! | `post_linkedin` | `text`                                | [`linkedin`] |
//! | `create_contact`| `email`                               | [`hubspot`]  |
//! | `send_sms`      | `to`, `body`                          | [`twilio`]   |
//! | `post_slack`    | `text`                                | [`slack`]    |
//! | `list_events`   |                                       | [`calendly`] |

pub mod calendly;
pub mod google;
pub mod hubspot;
pub mod linkedin;
pub mod meta;
pub mod openai;
pub mod slack;
pub mod stripe;
pub mod twilio;

use std::time::Duration;

use reqwest::{Client, Response};
use serde_json::Value;
use thiserror::Error;

use crate::config::ConciergeConfig;
use crate::credentials::{CredentialError, TokenManager};
use crate::dispatch::{DispatchError, Dispatcher, Params};

/// Outbound request timeout for every vendor call.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest vendor error body echoed back to callers.
pub(crate) const MAX_ERROR_BODY: usize = 500;

/// Errors raised by integration handlers.
#[derive(Debug, Error)]
pub enum IntegrationError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Credential(#[from] CredentialError),

    #[error("{provider} request failed: {message}")]
    Http {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an unexpected response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error("Invalid parameter {name}: {message}")]
    InvalidParam { name: &'static str, message: String },
}

/// Shared HTTP client with the vendor-call timeout.
pub fn http_client() -> Result<Client, reqwest::Error> {
    Client::builder().timeout(HTTP_TIMEOUT).build()
}

/// Build the full command table from configuration.
///
/// Every command is registered regardless of configuration; commands whose
/// integration is missing configuration fail when called.
pub fn build_dispatcher(
    config: &ConciergeConfig,
    tokens: TokenManager,
    http: Client,
) -> Result<Dispatcher, DispatchError> {
    let mut builder = Dispatcher::builder();
    google::register(&mut builder, google::GoogleApis::new(config, tokens, http.clone()))?;
    openai::register(&mut builder, openai::OpenAi::new(config.openai.clone(), http.clone()))?;
    stripe::register(&mut builder, stripe::Stripe::new(config.stripe.clone(), http.clone()))?;
    meta::register(&mut builder, meta::Meta::new(config.meta.clone(), http.clone()))?;
    linkedin::register(
        &mut builder,
        linkedin::LinkedIn::new(config.linkedin.clone(), http.clone()),
    )?;
    hubspot::register(
        &mut builder,
        hubspot::HubSpot::new(config.hubspot.clone(), http.clone()),
    )?;
    twilio::register(&mut builder, twilio::Twilio::new(config.twilio.clone(), http.clone()))?;
    slack::register(&mut builder, slack::Slack::new(config.slack.clone(), http.clone()))?;
    calendly::register(&mut builder, calendly::Calendly::new(config.calendly.clone(), http))?;
    Ok(builder.build())
}

// =============================================================================
// Helpers
// =============================================================================

/// Map a transport error for `provider`. The request URL is stripped: some
/// endpoints (Slack webhooks) carry their credential in the path.
pub(crate) fn http_error(
    provider: &'static str,
) -> impl FnOnce(reqwest::Error) -> IntegrationError {
    move |e| IntegrationError::Http {
        provider,
        message: e.without_url().to_string(),
    }
}

/// Check status and decode a JSON body. An empty success body decodes as
/// `null`.
pub(crate) async fn read_json(
    provider: &'static str,
    resp: Response,
) -> Result<Value, IntegrationError> {
    let status = resp.status();
    let text = resp.text().await.map_err(http_error(provider))?;

    if !status.is_success() {
        return Err(IntegrationError::Provider {
            provider,
            status: status.as_u16(),
            body: truncate(&text, MAX_ERROR_BODY),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| IntegrationError::InvalidResponse {
        provider,
        message: e.to_string(),
    })
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// A required string parameter. The dispatcher has already checked presence;
/// this checks the type.
pub(crate) fn str_param<'a>(
    params: &'a Params,
    name: &'static str,
) -> Result<&'a str, IntegrationError> {
    match params.get(name) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(IntegrationError::InvalidParam {
            name,
            message: "expected a string".to_string(),
        }),
        None => Err(IntegrationError::InvalidParam {
            name,
            message: "missing".to_string(),
        }),
    }
}

/// An optional, non-blank string parameter.
pub(crate) fn opt_str_param<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

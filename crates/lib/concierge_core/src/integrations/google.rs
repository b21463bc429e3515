//! Gmail and Sheets, authorized through the token manager.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use futures::FutureExt;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use super::{IntegrationError, http_error, opt_str_param, read_json, str_param};
use crate::config::ConciergeConfig;
use crate::credentials::{CredentialKey, TokenManager};
use crate::dispatch::{DispatchError, DispatcherBuilder, Params};
use crate::oauth::GOOGLE;

pub const SEND_EMAIL: &str = "send_email";
pub const APPEND_SHEET: &str = "append_sheet";

const PROVIDER: &str = "google";

/// Google Workspace APIs for the deployment's tenant.
#[derive(Clone)]
pub struct GoogleApis {
    tokens: TokenManager,
    tenant: String,
    http: Client,
    gmail_base_url: String,
    sheets_base_url: String,
}

impl GoogleApis {
    pub fn new(config: &ConciergeConfig, tokens: TokenManager, http: Client) -> Self {
        Self {
            tokens,
            tenant: config.tenant.clone(),
            http,
            gmail_base_url: config.google_api.gmail_base_url.trim_end_matches('/').to_string(),
            sheets_base_url: config.google_api.sheets_base_url.clone(),
        }
    }

    async fn bearer_token(&self) -> Result<String, IntegrationError> {
        let key = CredentialKey::new(&self.tenant, GOOGLE);
        let mut client = self.tokens.acquire(&key).await?;
        Ok(client.bearer_token().await?)
    }

    /// Send an HTML email from the connected account. Returns `{ id }`.
    pub async fn send_email(&self, params: &Params) -> Result<Value, IntegrationError> {
        let raw = build_raw_message(
            str_param(params, "to")?,
            str_param(params, "subject")?,
            str_param(params, "html")?,
        )?;
        let token = self.bearer_token().await?;

        let resp = self
            .http
            .post(format!("{}/gmail/v1/users/me/messages/send", self.gmail_base_url))
            .bearer_auth(token)
            .json(&json!({ "raw": raw }))
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        let body = read_json(PROVIDER, resp).await?;

        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: "message id missing".to_string(),
            })?;
        info!(message_id = id, "email sent");
        Ok(json!({ "id": id }))
    }

    /// Append rows to a sheet range. `values` is a list of rows, or a single
    /// row of scalars.
    pub async fn append_sheet(&self, params: &Params) -> Result<Value, IntegrationError> {
        let spreadsheet_id = str_param(params, "spreadsheetId")?;
        let range = str_param(params, "range")?;
        let rows = normalize_rows(params.get("values").cloned().unwrap_or(Value::Null))?;
        let input_option = opt_str_param(params, "valueInputOption").unwrap_or("USER_ENTERED");

        let mut url = url::Url::parse(&self.sheets_base_url).map_err(|e| {
            IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: format!("bad sheets base url: {e}"),
            }
        })?;
        url.path_segments_mut()
            .map_err(|_| IntegrationError::InvalidResponse {
                provider: PROVIDER,
                message: "sheets base url cannot take a path".to_string(),
            })?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values"])
            .push(&format!("{range}:append"));

        let token = self.bearer_token().await?;
        let resp = self
            .http
            .post(url)
            .query(&[("valueInputOption", input_option)])
            .bearer_auth(token)
            .json(&json!({ "values": rows }))
            .send()
            .await
            .map_err(http_error(PROVIDER))?;
        read_json(PROVIDER, resp).await
    }
}

pub fn register(builder: &mut DispatcherBuilder, api: GoogleApis) -> Result<(), DispatchError> {
    let gmail = api.clone();
    builder.register(SEND_EMAIL, &["to", "subject", "html"], move |params| {
        let gmail = gmail.clone();
        async move { gmail.send_email(&params).await }.boxed()
    })?;
    builder.register(
        APPEND_SHEET,
        &["spreadsheetId", "range", "values"],
        move |params| {
            let sheets = api.clone();
            async move { sheets.append_sheet(&params).await }.boxed()
        },
    )?;
    Ok(())
}

/// RFC 2822 message, base64url encoded for the Gmail `raw` field.
fn build_raw_message(to: &str, subject: &str, html: &str) -> Result<String, IntegrationError> {
    for (name, value) in [("to", to), ("subject", subject)] {
        if value.contains(['\r', '\n']) {
            return Err(IntegrationError::InvalidParam {
                name,
                message: "must not contain line breaks".to_string(),
            });
        }
    }

    let subject = if subject.is_ascii() {
        subject.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(subject))
    };
    let message = format!(
        "To: {to}\r\n\
         Subject: {subject}\r\n\
         MIME-Version: 1.0\r\n\
         Content-Type: text/html; charset=\"UTF-8\"\r\n\
         \r\n\
         {html}"
    );
    Ok(URL_SAFE_NO_PAD.encode(message))
}

fn normalize_rows(values: Value) -> Result<Value, IntegrationError> {
    match values {
        Value::Array(items) if items.iter().all(Value::is_array) => Ok(Value::Array(items)),
        Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => {
            Ok(Value::Array(vec![Value::Array(items)]))
        }
        _ => Err(IntegrationError::InvalidParam {
            name: "values",
            message: "expected a row or a list of rows".to_string(),
        }),
    }
}

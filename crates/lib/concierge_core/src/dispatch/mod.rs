//! Command dispatch.
//!
//! A [`Dispatcher`] maps command names to a set of required parameters and a
//! handler. Registration happens once through [`DispatcherBuilder`]; the
//! built table is immutable and cheap to clone across requests.
//!
//! Every dispatch runs at most one handler, with no retry and no queuing.
//! Handler errors and panics come back as [`DispatchError::IntegrationFailure`].

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::integrations::IntegrationError;

/// Command parameters as received from the caller.
pub type Params = Map<String, Value>;

/// Future returned by a command handler.
pub type HandlerFuture = BoxFuture<'static, Result<Value, IntegrationError>>;

type Handler = Arc<dyn Fn(Params) -> HandlerFuture + Send + Sync>;

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing required parameters: {}", .0.join(", "))]
    InvalidParams(Vec<String>),

    #[error("{0}")]
    IntegrationFailure(String),

    #[error("Command registered twice: {0}")]
    DuplicateCommand(String),
}

impl DispatchError {
    /// Whether the caller sent a bad request (as opposed to a downstream
    /// failure).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::UnknownCommand(_) | DispatchError::InvalidParams(_)
        )
    }
}

/// Normalized result envelope: `{ ok: true, result }` or `{ ok: false, error }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntegrationResult {
    pub fn success(result: Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

impl From<&Result<Value, DispatchError>> for IntegrationResult {
    fn from(outcome: &Result<Value, DispatchError>) -> Self {
        match outcome {
            Ok(v) => IntegrationResult::success(v.clone()),
            Err(e) => IntegrationResult::failure(e.to_string()),
        }
    }
}

struct Command {
    required: Vec<&'static str>,
    handler: Handler,
}

/// Collects command registrations before the table is frozen.
#[derive(Default)]
pub struct DispatcherBuilder {
    commands: BTreeMap<&'static str, Command>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with its required parameters and handler. Each name
    /// may be registered once.
    pub fn register<F>(
        &mut self,
        name: &'static str,
        required: &[&'static str],
        handler: F,
    ) -> Result<&mut Self, DispatchError>
    where
        F: Fn(Params) -> HandlerFuture + Send + Sync + 'static,
    {
        if self.commands.contains_key(name) {
            return Err(DispatchError::DuplicateCommand(name.to_string()));
        }
        self.commands.insert(
            name,
            Command {
                required: required.to_vec(),
                handler: Arc::new(handler),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> Dispatcher {
        info!(commands = self.commands.len(), "command table built");
        Dispatcher {
            commands: Arc::new(self.commands),
        }
    }
}

/// Immutable command table.
#[derive(Clone)]
pub struct Dispatcher {
    commands: Arc<BTreeMap<&'static str, Command>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Registered command names, sorted.
    pub fn commands(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }

    /// Required parameters of `name`, if registered.
    pub fn required_params(&self, name: &str) -> Option<&[&'static str]> {
        self.commands.get(name).map(|c| c.required.as_slice())
    }

    /// Validate and run one command.
    pub async fn dispatch(&self, name: &str, params: Params) -> Result<Value, DispatchError> {
        let command = self
            .commands
            .get(name)
            .ok_or_else(|| DispatchError::UnknownCommand(name.to_string()))?;

        let missing = missing_params(&command.required, &params);
        if !missing.is_empty() {
            debug!(command = name, ?missing, "rejecting command with missing parameters");
            return Err(DispatchError::InvalidParams(missing));
        }

        info!(command = name, "dispatching command");
        let call = (command.handler)(params);
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(command = name, "command failed: {e}");
                Err(DispatchError::IntegrationFailure(e.to_string()))
            }
            Err(_) => {
                warn!(command = name, "command handler panicked");
                Err(DispatchError::IntegrationFailure(format!(
                    "{name} failed unexpectedly"
                )))
            }
        }
    }
}

/// Required parameters that are absent, null, or empty.
pub fn missing_params(required: &[&'static str], params: &Params) -> Vec<String> {
    required
        .iter()
        .filter(|name| params.get(**name).is_none_or(is_empty_value))
        .map(|name| name.to_string())
        .collect()
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

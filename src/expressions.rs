//! Handler references embedded in test data
//!
//! Two forms are understood:
//!
//! - `#name` / `#name:arg1,arg2` names an assert or capture handler. The
//!   prefix comes from [`RegistryOptions::reference_prefix`].
//! - `$F{name}` / `$F{name:arg1,arg2}` anywhere inside a JSON value is
//!   replaced by the result of the `name` data function handler.
//!
//! [`RegistryOptions::reference_prefix`]: crate::handlers::RegistryOptions

use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

use crate::handlers::{HandlerRegistry, RegistryError, Request, Response, Spec, Store};

static DATA_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$F\{([^{}:]+)(?::([^{}]*))?\}").expect("data function pattern is valid")
});

#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("not a handler reference: {0}")]
    NotAReference(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Parsed `#name:arg1,arg2` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRef {
    pub name: String,
    pub args: Option<Vec<String>>,
}

impl HandlerRef {
    /// Returns `None` when `expression` does not start with `prefix` or names nothing
    pub fn parse(expression: &str, prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }

        let rest = expression.strip_prefix(prefix)?;
        let (name, args) = match rest.split_once(':') {
            Some((name, args)) => (name, split_args(args)),
            None => (rest, None),
        };

        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            args,
        })
    }
}

fn split_args(raw: &str) -> Option<Vec<String>> {
    if raw.trim().is_empty() {
        return None;
    }
    Some(raw.split(',').map(|arg| arg.trim().to_string()).collect())
}

fn parse_reference(
    registry: &HandlerRegistry,
    expression: &str,
) -> Result<HandlerRef, ExpressionError> {
    HandlerRef::parse(expression, &registry.options().reference_prefix)
        .ok_or_else(|| ExpressionError::NotAReference(expression.to_string()))
}

/// Whether `value` is a string naming a handler under the registry's prefix
pub fn is_reference(registry: &HandlerRegistry, value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| HandlerRef::parse(s, &registry.options().reference_prefix).is_some())
}

/// Evaluate `#name:args` against `data` with the named assert handler
pub fn evaluate_assertion(
    registry: &HandlerRegistry,
    expression: &str,
    data: &Value,
) -> Result<bool, ExpressionError> {
    let reference = parse_reference(registry, expression)?;
    Ok(registry.run_assert_handler(&reference.name, data, reference.args)?)
}

/// Capture a value from a response with the handler named by `expression`
pub fn capture(
    registry: &HandlerRegistry,
    expression: &str,
    req: &Request,
    res: &Response,
    store: Option<&Store>,
) -> Result<Value, ExpressionError> {
    let reference = parse_reference(registry, expression)?;
    Ok(registry.run_capture_handler(&reference.name, req, res, store)?)
}

/// Run every store declared on the spec, returning the captured values by store name
pub fn capture_stores(
    registry: &HandlerRegistry,
    spec: &Spec,
    res: &Response,
    store: Option<&Store>,
) -> Result<Store, ExpressionError> {
    let mut captured = Store::new();
    for (key, expression) in &spec.stores {
        let value = capture(registry, expression, &spec.request, res, store)?;
        debug!(store = %key, "Captured value");
        captured.insert(key.clone(), value);
    }
    Ok(captured)
}

/// Replace `$F{..}` templates throughout a JSON value
///
/// A string consisting of a single template takes the handler's value as-is,
/// so `"$F{count}"` may become a number. Templates embedded in longer strings
/// are interpolated as text. Object keys are left untouched.
pub fn process_data_functions(
    registry: &HandlerRegistry,
    value: &Value,
) -> Result<Value, ExpressionError> {
    match value {
        Value::String(text) => process_string(registry, text),
        Value::Array(items) => items
            .iter()
            .map(|item| process_data_functions(registry, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => {
            let mut processed = Map::with_capacity(fields.len());
            for (key, field) in fields {
                processed.insert(key.clone(), process_data_functions(registry, field)?);
            }
            Ok(Value::Object(processed))
        }
        other => Ok(other.clone()),
    }
}

/// Apply data function templates to a request's URL and payload
pub fn process_request(
    registry: &HandlerRegistry,
    req: &mut Request,
) -> Result<(), ExpressionError> {
    if DATA_FUNCTION.is_match(&req.url) {
        req.url = value_to_text(process_string(registry, &req.url)?);
    }
    if let Some(data) = req.data.as_ref() {
        req.data = Some(process_data_functions(registry, data)?);
    }
    Ok(())
}

fn process_string(registry: &HandlerRegistry, text: &str) -> Result<Value, ExpressionError> {
    let Some(first) = DATA_FUNCTION.captures(text) else {
        return Ok(Value::String(text.to_string()));
    };

    if first.get(0).is_some_and(|m| m.start() == 0 && m.end() == text.len()) {
        return call_data_function(registry, &first);
    }

    let mut interpolated = String::with_capacity(text.len());
    let mut last = 0;
    for caps in DATA_FUNCTION.captures_iter(text) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        interpolated.push_str(&text[last..whole.start()]);
        interpolated.push_str(&value_to_text(call_data_function(registry, &caps)?));
        last = whole.end();
    }
    interpolated.push_str(&text[last..]);

    Ok(Value::String(interpolated))
}

fn call_data_function(
    registry: &HandlerRegistry,
    caps: &Captures<'_>,
) -> Result<Value, ExpressionError> {
    let name = caps.get(1).map_or("", |m| m.as_str().trim());
    let args = caps.get(2).and_then(|m| split_args(m.as_str()));
    Ok(registry.run_data_function(name, args)?)
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

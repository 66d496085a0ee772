use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::context::{
    AssertionContext, CaptureContext, DataHandlerContext, ExpectHandlerContext,
    InteractionContext, RequestResponseContext, SpecHandlerContext, StateHandlerContext,
    WaitHandlerContext,
};
use super::traits::{
    AssertHandlerFunction, CaptureHandlerFunction, DataHandlerFunction, ExpectHandlerFunction,
    HandlerError, InteractionHandlerFunction, RetryHandlerFunction, SpecHandlerFunction,
    StateHandlerFunction, WaitHandler, WaitHandlerFunction,
};
use super::types::{Interaction, InteractionOutput, ParentHandler, Request, Response, Spec, Store};
use crate::observability::HandlerMetrics;

pub const DEFAULT_REFERENCE_PREFIX: &str = "#";
pub const DEFAULT_MAX_INTERACTION_DEPTH: usize = 10;

/// Handler categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    Spec,
    Expect,
    Retry,
    Capture,
    State,
    DataFunc,
    Interaction,
    Assert,
    Wait,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 9] = [
        HandlerKind::Spec,
        HandlerKind::Expect,
        HandlerKind::Retry,
        HandlerKind::Capture,
        HandlerKind::State,
        HandlerKind::DataFunc,
        HandlerKind::Interaction,
        HandlerKind::Assert,
        HandlerKind::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Spec => "spec",
            HandlerKind::Expect => "expect",
            HandlerKind::Retry => "retry",
            HandlerKind::Capture => "capture",
            HandlerKind::State => "state",
            HandlerKind::DataFunc => "data function",
            HandlerKind::Interaction => "interaction",
            HandlerKind::Assert => "assert",
            HandlerKind::Wait => "wait",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} handler name must not be blank")]
    InvalidName { kind: HandlerKind },
    #[error("{kind} handler not found: {name}")]
    NotFound { kind: HandlerKind, name: String },
    #[error("interaction handler '{name}' exceeds the maximum nesting depth of {max_depth}")]
    InteractionDepthExceeded { name: String, max_depth: usize },
    #[error("{kind} handler '{name}' failed: {source}")]
    Handler {
        kind: HandlerKind,
        name: String,
        #[source]
        source: HandlerError,
    },
    #[error("handler registry lock poisoned")]
    Poisoned,
}

impl RegistryError {
    /// The error reported by the handler itself, if the handler ran and failed
    pub fn handler_error(&self) -> Option<&HandlerError> {
        match self {
            RegistryError::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Registry-wide settings, usually derived from [`crate::config::Config`]
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryOptions {
    /// Marks a string as a handler reference (`#name:args`)
    pub reference_prefix: String,
    pub max_interaction_depth: usize,
    /// Upper bound for a single wait handler run
    pub wait_timeout: Option<Duration>,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            reference_prefix: DEFAULT_REFERENCE_PREFIX.to_string(),
            max_interaction_depth: DEFAULT_MAX_INTERACTION_DEPTH,
            wait_timeout: None,
        }
    }
}

/// Name-keyed handlers of one category
#[derive(Clone)]
struct HandlerTable<H> {
    kind: HandlerKind,
    handlers: BTreeMap<String, H>,
}

impl<H: Clone> HandlerTable<H> {
    fn new(kind: HandlerKind) -> Self {
        Self {
            kind,
            handlers: BTreeMap::new(),
        }
    }

    /// Returns whether an existing handler was replaced
    fn insert(&mut self, name: String, handler: H) -> Result<bool, RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidName { kind: self.kind });
        }

        let replaced = self.handlers.insert(name.clone(), handler).is_some();
        if replaced {
            warn!(kind = %self.kind, name = %name, "Replaced existing handler");
        } else {
            debug!(kind = %self.kind, name = %name, "Handler registered");
        }

        Ok(replaced)
    }

    fn get(&self, name: &str) -> Result<H, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                kind: self.kind,
                name: name.to_string(),
            })
    }
}

/// Category-agnostic view used by the lookup helpers
trait NamedTable {
    fn names(&self) -> Vec<String>;
    fn contains(&self, name: &str) -> bool;
    fn clear(&mut self);
}

impl<H> NamedTable for HandlerTable<H> {
    fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// Registry mapping category + name to handler functions
///
/// Cloning is cheap and shares the registered handlers and metrics.
#[derive(Clone)]
pub struct HandlerRegistry {
    spec: HandlerTable<SpecHandlerFunction>,
    expect: HandlerTable<ExpectHandlerFunction>,
    retry: HandlerTable<RetryHandlerFunction>,
    capture: HandlerTable<CaptureHandlerFunction>,
    state: HandlerTable<StateHandlerFunction>,
    data_func: HandlerTable<DataHandlerFunction>,
    interaction: HandlerTable<InteractionHandlerFunction>,
    assert: HandlerTable<AssertHandlerFunction>,
    wait: HandlerTable<WaitHandlerFunction>,
    options: RegistryOptions,
    metrics: Arc<HandlerMetrics>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::with_options(RegistryOptions::default())
    }

    pub fn with_options(options: RegistryOptions) -> Self {
        Self {
            spec: HandlerTable::new(HandlerKind::Spec),
            expect: HandlerTable::new(HandlerKind::Expect),
            retry: HandlerTable::new(HandlerKind::Retry),
            capture: HandlerTable::new(HandlerKind::Capture),
            state: HandlerTable::new(HandlerKind::State),
            data_func: HandlerTable::new(HandlerKind::DataFunc),
            interaction: HandlerTable::new(HandlerKind::Interaction),
            assert: HandlerTable::new(HandlerKind::Assert),
            wait: HandlerTable::new(HandlerKind::Wait),
            options,
            metrics: Arc::new(HandlerMetrics::new()),
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: RegistryOptions) {
        self.options = options;
    }

    pub fn metrics(&self) -> &HandlerMetrics {
        &self.metrics
    }

    fn table(&self, kind: HandlerKind) -> &dyn NamedTable {
        match kind {
            HandlerKind::Spec => &self.spec,
            HandlerKind::Expect => &self.expect,
            HandlerKind::Retry => &self.retry,
            HandlerKind::Capture => &self.capture,
            HandlerKind::State => &self.state,
            HandlerKind::DataFunc => &self.data_func,
            HandlerKind::Interaction => &self.interaction,
            HandlerKind::Assert => &self.assert,
            HandlerKind::Wait => &self.wait,
        }
    }

    fn table_mut(&mut self, kind: HandlerKind) -> &mut dyn NamedTable {
        match kind {
            HandlerKind::Spec => &mut self.spec,
            HandlerKind::Expect => &mut self.expect,
            HandlerKind::Retry => &mut self.retry,
            HandlerKind::Capture => &mut self.capture,
            HandlerKind::State => &mut self.state,
            HandlerKind::DataFunc => &mut self.data_func,
            HandlerKind::Interaction => &mut self.interaction,
            HandlerKind::Assert => &mut self.assert,
            HandlerKind::Wait => &mut self.wait,
        }
    }

    pub fn has_handler(&self, kind: HandlerKind, name: &str) -> bool {
        self.table(kind).contains(name)
    }

    /// Registered names of one category, in sorted order
    pub fn names(&self, kind: HandlerKind) -> Vec<String> {
        self.table(kind).names()
    }

    pub fn len(&self, kind: HandlerKind) -> usize {
        self.table(kind).names().len()
    }

    pub fn is_empty(&self) -> bool {
        HandlerKind::ALL
            .iter()
            .all(|kind| self.table(*kind).names().is_empty())
    }

    /// Drop every registered handler, keeping options and metrics
    pub fn clear(&mut self) {
        for kind in HandlerKind::ALL {
            self.table_mut(kind).clear();
        }
        debug!("Handler registry cleared");
    }

    // Registration

    pub fn add_spec_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(SpecHandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let replaced = self.spec.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_expect_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(ExpectHandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let replaced = self.expect.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_retry_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(RequestResponseContext<'_>) -> bool + Send + Sync + 'static,
    {
        let replaced = self.retry.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_capture_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(CaptureContext<'_>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        let replaced = self.capture.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_state_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(StateHandlerContext<'_>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        let replaced = self.state.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_data_func_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(DataHandlerContext) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        let replaced = self.data_func.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_interaction_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(InteractionContext) -> Result<InteractionOutput, HandlerError>
            + Send
            + Sync
            + 'static,
    {
        let replaced = self.interaction.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_assert_handler<F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(AssertionContext<'_>) -> bool + Send + Sync + 'static,
    {
        let replaced = self.assert.insert(name.into(), Arc::new(func))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    pub fn add_wait_handler<H>(
        &mut self,
        name: impl Into<String>,
        handler: H,
    ) -> Result<(), RegistryError>
    where
        H: WaitHandler + 'static,
    {
        let replaced = self.wait.insert(name.into(), Arc::new(handler))?;
        self.metrics.handler_registered(replaced);
        Ok(())
    }

    // Lookup

    pub fn get_spec_handler(&self, name: &str) -> Result<SpecHandlerFunction, RegistryError> {
        self.spec.get(name)
    }

    pub fn get_expect_handler(&self, name: &str) -> Result<ExpectHandlerFunction, RegistryError> {
        self.expect.get(name)
    }

    pub fn get_retry_handler(&self, name: &str) -> Result<RetryHandlerFunction, RegistryError> {
        self.retry.get(name)
    }

    pub fn get_capture_handler(&self, name: &str) -> Result<CaptureHandlerFunction, RegistryError> {
        self.capture.get(name)
    }

    pub fn get_state_handler(&self, name: &str) -> Result<StateHandlerFunction, RegistryError> {
        self.state.get(name)
    }

    pub fn get_data_func_handler(&self, name: &str) -> Result<DataHandlerFunction, RegistryError> {
        self.data_func.get(name)
    }

    pub fn get_interaction_handler(
        &self,
        name: &str,
    ) -> Result<InteractionHandlerFunction, RegistryError> {
        self.interaction.get(name)
    }

    pub fn get_assert_handler(&self, name: &str) -> Result<AssertHandlerFunction, RegistryError> {
        self.assert.get(name)
    }

    pub fn get_wait_handler(&self, name: &str) -> Result<WaitHandlerFunction, RegistryError> {
        self.wait.get(name)
    }

    // Invocation

    fn observe<T>(
        &self,
        kind: HandlerKind,
        name: &str,
        result: Result<T, HandlerError>,
    ) -> Result<T, RegistryError> {
        self.metrics.handler_invoked();
        match result {
            Ok(value) => {
                debug!(%kind, name, "Handler completed");
                Ok(value)
            }
            Err(source) => {
                self.metrics.handler_failed();
                warn!(%kind, name, error = %source, "Handler failed");
                Err(RegistryError::Handler {
                    kind,
                    name: name.to_string(),
                    source,
                })
            }
        }
    }

    fn observe_predicate(&self, kind: HandlerKind, name: &str, outcome: bool) -> bool {
        self.metrics.handler_invoked();
        debug!(%kind, name, outcome, "Handler evaluated");
        outcome
    }

    pub fn run_spec_handler(
        &self,
        name: &str,
        spec: &mut Spec,
        data: Option<Value>,
    ) -> Result<(), RegistryError> {
        let handler = self.spec.get(name)?;
        let result = handler(SpecHandlerContext { spec, data });
        self.observe(HandlerKind::Spec, name, result)
    }

    pub fn run_expect_handler(
        &self,
        name: &str,
        req: &Request,
        res: &Response,
        data: Option<&Value>,
    ) -> Result<(), RegistryError> {
        let handler = self.expect.get(name)?;
        let result = handler(ExpectHandlerContext { req, res, data });
        self.observe(HandlerKind::Expect, name, result)
    }

    pub fn should_retry(
        &self,
        name: &str,
        req: &Request,
        res: &Response,
    ) -> Result<bool, RegistryError> {
        let handler = self.retry.get(name)?;
        let outcome = handler(RequestResponseContext { req, res });
        Ok(self.observe_predicate(HandlerKind::Retry, name, outcome))
    }

    pub fn run_capture_handler(
        &self,
        name: &str,
        req: &Request,
        res: &Response,
        store: Option<&Store>,
    ) -> Result<Value, RegistryError> {
        let handler = self.capture.get(name)?;
        let result = handler(CaptureContext { req, res, store });
        self.observe(HandlerKind::Capture, name, result)
    }

    pub fn run_state_handler(
        &self,
        name: &str,
        spec: Option<&mut Spec>,
        data: Option<Value>,
    ) -> Result<Value, RegistryError> {
        let handler = self.state.get(name)?;
        let result = handler(StateHandlerContext { spec, data });
        self.observe(HandlerKind::State, name, result)
    }

    pub fn run_data_function(
        &self,
        name: &str,
        args: Option<Vec<String>>,
    ) -> Result<Value, RegistryError> {
        let handler = self.data_func.get(name)?;
        let result = handler(DataHandlerContext { args });
        self.observe(HandlerKind::DataFunc, name, result)
    }

    pub fn run_assert_handler(
        &self,
        name: &str,
        data: &Value,
        args: Option<Vec<String>>,
    ) -> Result<bool, RegistryError> {
        let handler = self.assert.get(name)?;
        let outcome = handler(AssertionContext { data, args });
        Ok(self.observe_predicate(HandlerKind::Assert, name, outcome))
    }

    /// Run a wait handler, bounded by `wait_timeout` when one is set
    pub async fn run_wait_handler(
        &self,
        name: &str,
        ctx: WaitHandlerContext,
    ) -> Result<Value, RegistryError> {
        let handler = self.wait.get(name)?;
        debug!(kind = %HandlerKind::Wait, name, "Waiting on handler");

        let result = match self.options.wait_timeout {
            Some(limit) => tokio::time::timeout(limit, handler.wait(ctx))
                .await
                .unwrap_or(Err(HandlerError::Timeout(limit))),
            None => handler.wait(ctx).await,
        };

        self.observe(HandlerKind::Wait, name, result)
    }

    /// Invoke an interaction handler and flatten the result, following
    /// parent references depth-first in the order they were returned
    pub fn resolve_interactions(
        &self,
        name: &str,
        data: Option<Value>,
    ) -> Result<Vec<Interaction>, RegistryError> {
        let mut interactions = Vec::new();
        self.resolve_into(
            ParentHandler {
                name: name.to_string(),
                data,
            },
            1,
            &mut interactions,
        )?;
        Ok(interactions)
    }

    fn resolve_into(
        &self,
        parent: ParentHandler,
        depth: usize,
        out: &mut Vec<Interaction>,
    ) -> Result<(), RegistryError> {
        if depth > self.options.max_interaction_depth {
            return Err(RegistryError::InteractionDepthExceeded {
                name: parent.name,
                max_depth: self.options.max_interaction_depth,
            });
        }

        let handler = self.interaction.get(&parent.name)?;
        let result = handler(InteractionContext { data: parent.data });

        match self.observe(HandlerKind::Interaction, &parent.name, result)? {
            InteractionOutput::Interaction(interaction) => out.push(interaction),
            InteractionOutput::Interactions(interactions) => out.extend(interactions),
            InteractionOutput::Parent(next) => self.resolve_into(next, depth + 1, out)?,
            InteractionOutput::Parents(parents) => {
                for next in parents {
                    self.resolve_into(next, depth + 1, out)?;
                }
            }
        }

        Ok(())
    }

    /// Resolve every interaction the spec uses, in declaration order
    pub fn resolve_spec_interactions(
        &self,
        spec: &Spec,
    ) -> Result<Vec<Interaction>, RegistryError> {
        let mut interactions = Vec::new();
        for parent in &spec.interactions {
            self.resolve_into(parent.clone(), 1, &mut interactions)?;
        }
        Ok(interactions)
    }

    /// Run the spec's state handlers in order, handing each the spec itself
    pub fn run_spec_states(&self, spec: &mut Spec) -> Result<Vec<Value>, RegistryError> {
        let states = spec.states.clone();
        states
            .into_iter()
            .map(|call| self.run_state_handler(&call.name, Some(&mut *spec), call.data))
            .collect()
    }

    /// Ask the spec's retry strategy whether `res` warrants another attempt.
    /// Specs without retry options or without a strategy never retry.
    pub fn should_retry_spec(&self, spec: &Spec, res: &Response) -> Result<bool, RegistryError> {
        match spec.retry.as_ref().and_then(|retry| retry.strategy.as_deref()) {
            Some(strategy) => self.should_retry(strategy, &spec.request, res),
            None => Ok(false),
        }
    }

    /// Check the spec's expectations against a response; stops at the first failure
    pub fn run_spec_expectations(&self, spec: &Spec, res: &Response) -> Result<(), RegistryError> {
        for call in &spec.expectations {
            self.run_expect_handler(&call.name, &spec.request, res, call.data.as_ref())?;
        }
        Ok(())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for kind in HandlerKind::ALL {
            map.entry(&kind.as_str(), &self.names(kind));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::types::{MockRequest, MockResponse, RetryOptions};
    use serde_json::json;

    fn interaction(path: &str) -> Interaction {
        Interaction::builder()
            .request(MockRequest::builder().path(path).build())
            .response(MockResponse::builder().build())
            .build()
    }

    fn sample_request() -> Request {
        Request::builder().url("http://localhost:9393/api/users").build()
    }

    fn sample_response(status: u16) -> Response {
        Response {
            status,
            json: Some(json!({"id": 1})),
            body: Some(json!({"id": 1})),
            ..Response::default()
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_assert_handler("positive", |ctx| ctx.data.as_i64().is_some_and(|n| n > 0))
            .unwrap();

        assert!(registry.has_handler(HandlerKind::Assert, "positive"));
        assert!(!registry.has_handler(HandlerKind::Expect, "positive"));
        assert_eq!(registry.names(HandlerKind::Assert), vec!["positive"]);

        let handler = registry.get_assert_handler("positive").unwrap();
        assert!(handler(AssertionContext {
            data: &json!(3),
            args: None
        }));
    }

    #[test]
    fn test_blank_name_rejected() {
        let mut registry = HandlerRegistry::new();
        let result = registry.add_retry_handler("  ", |_| false);

        assert!(matches!(
            result,
            Err(RegistryError::InvalidName {
                kind: HandlerKind::Retry
            })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_handler_names_kind() {
        let registry = HandlerRegistry::new();
        let Err(err) = registry.get_capture_handler("nope") else {
            panic!("expected a missing capture handler");
        };

        assert!(matches!(
            &err,
            RegistryError::NotFound { kind: HandlerKind::Capture, name } if name == "nope"
        ));
        assert_eq!(err.to_string(), "capture handler not found: nope");
    }

    #[test]
    fn test_categories_are_independent() {
        let mut registry = HandlerRegistry::new();
        registry.add_data_func_handler("shared", |_| Ok(json!(1))).unwrap();
        registry
            .add_state_handler("shared", |_| Ok(json!("state")))
            .unwrap();

        assert_eq!(registry.len(HandlerKind::DataFunc), 1);
        assert_eq!(registry.len(HandlerKind::State), 1);
        assert_eq!(registry.run_data_function("shared", None).unwrap(), json!(1));
        assert_eq!(
            registry.run_state_handler("shared", None, None).unwrap(),
            json!("state")
        );
    }

    #[test]
    fn test_reregistering_replaces_handler() {
        let mut registry = HandlerRegistry::new();
        registry.add_data_func_handler("version", |_| Ok(json!(1))).unwrap();
        registry.add_data_func_handler("version", |_| Ok(json!(2))).unwrap();

        assert_eq!(registry.len(HandlerKind::DataFunc), 1);
        assert_eq!(registry.run_data_function("version", None).unwrap(), json!(2));

        let snapshot = registry.metrics().snapshot();
        assert_eq!(snapshot.registrations, 2);
        assert_eq!(snapshot.replacements, 1);
    }

    #[test]
    fn test_clone_shares_handlers() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_data_func_handler("answer", |_| Ok(json!(42)))
            .unwrap();

        let snapshot = registry.clone();
        registry.clear();

        assert!(registry.is_empty());
        assert_eq!(snapshot.run_data_function("answer", None).unwrap(), json!(42));
    }

    #[test]
    fn test_spec_handler_mutates_spec() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_spec_handler("get user", |ctx| {
                let id = ctx
                    .data
                    .as_ref()
                    .and_then(Value::as_u64)
                    .ok_or_else(|| HandlerError::InvalidData("user id required".to_string()))?;
                ctx.spec.request.url = format!("/api/users/{}", id);
                ctx.spec.expect("status-ok", None);
                Ok(())
            })
            .unwrap();

        let mut spec = Spec::new(Request::builder().url("/").build());
        registry
            .run_spec_handler("get user", &mut spec, Some(json!(5)))
            .unwrap();

        assert_eq!(spec.request.url, "/api/users/5");
        assert_eq!(spec.expectations.len(), 1);

        let err = registry
            .run_spec_handler("get user", &mut spec, None)
            .unwrap_err();
        assert!(matches!(
            err.handler_error(),
            Some(HandlerError::InvalidData(_))
        ));
        assert_eq!(registry.metrics().snapshot().failures, 1);
    }

    #[test]
    fn test_expect_handler_failure() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_expect_handler("status", |ctx| {
                let expected = ctx.data.and_then(Value::as_u64).unwrap_or(200);
                if u64::from(ctx.res.status) == expected {
                    Ok(())
                } else {
                    Err(HandlerError::Assertion(format!(
                        "expected status {}, got {}",
                        expected, ctx.res.status
                    )))
                }
            })
            .unwrap();

        let req = sample_request();
        assert!(
            registry
                .run_expect_handler("status", &req, &sample_response(200), None)
                .is_ok()
        );

        let err = registry
            .run_expect_handler("status", &req, &sample_response(500), Some(&json!(201)))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "expect handler 'status' failed: assertion failed: expected status 201, got 500"
        );
    }

    #[test]
    fn test_retry_handler() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_retry_handler("on-server-error", |ctx| ctx.res.status >= 500)
            .unwrap();

        let req = sample_request();
        assert!(registry
            .should_retry("on-server-error", &req, &sample_response(503))
            .unwrap());
        assert!(!registry
            .should_retry("on-server-error", &req, &sample_response(200))
            .unwrap());
        assert!(registry.should_retry("missing", &req, &sample_response(503)).is_err());
    }

    #[test]
    fn test_spec_retry_strategy() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_retry_handler("on-server-error", |ctx| ctx.res.status >= 500)
            .unwrap();

        let mut spec = Spec::new(Request::builder().url("/health").build());
        assert!(!registry
            .should_retry_spec(&spec, &sample_response(503))
            .unwrap());

        spec.retry(RetryOptions::new(3, Duration::from_millis(10)));
        assert!(!registry
            .should_retry_spec(&spec, &sample_response(503))
            .unwrap());

        spec.retry(
            RetryOptions::new(3, Duration::from_millis(10)).with_strategy("on-server-error"),
        );
        assert!(registry
            .should_retry_spec(&spec, &sample_response(503))
            .unwrap());
        assert!(!registry
            .should_retry_spec(&spec, &sample_response(200))
            .unwrap());

        spec.retry(RetryOptions::new(3, Duration::from_millis(10)).with_strategy("missing"));
        assert!(matches!(
            registry.should_retry_spec(&spec, &sample_response(503)),
            Err(RegistryError::NotFound { kind: HandlerKind::Retry, .. })
        ));
    }

    #[test]
    fn test_capture_handler_sees_store() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_capture_handler("user-with-tenant", |ctx| {
                let tenant = ctx
                    .store
                    .and_then(|s| s.get("tenant"))
                    .cloned()
                    .unwrap_or(Value::Null);
                let id = ctx.res.json.as_ref().map(|j| j["id"].clone());
                Ok(json!({ "tenant": tenant, "id": id }))
            })
            .unwrap();

        let mut store = Store::new();
        store.insert("tenant".to_string(), json!("acme"));

        let value = registry
            .run_capture_handler(
                "user-with-tenant",
                &sample_request(),
                &sample_response(200),
                Some(&store),
            )
            .unwrap();
        assert_eq!(value, json!({"tenant": "acme", "id": 1}));
    }

    #[test]
    fn test_spec_states_receive_spec() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_state_handler("logged in", |ctx| {
                if let Some(spec) = ctx.spec {
                    spec.with_header("authorization", "Bearer token");
                }
                Ok(ctx.data.unwrap_or(Value::Null))
            })
            .unwrap();

        let mut spec = Spec::new(sample_request());
        spec.set_state("logged in", Some(json!({"user": "ada"})));

        let results = registry.run_spec_states(&mut spec).unwrap();
        assert_eq!(results, vec![json!({"user": "ada"})]);
        assert_eq!(spec.request.headers["authorization"], "Bearer token");
    }

    #[test]
    fn test_spec_expectations_stop_at_first_failure() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_expect_handler("fail", |_| Err(HandlerError::Assertion("no".to_string())))
            .unwrap();

        let mut spec = Spec::new(sample_request());
        spec.expect("fail", None).expect("never-registered", None);

        let err = registry
            .run_spec_expectations(&spec, &sample_response(200))
            .unwrap_err();
        assert!(matches!(err, RegistryError::Handler { kind: HandlerKind::Expect, .. }));
    }

    #[test]
    fn test_resolve_nested_interactions() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_interaction_handler("health", |_| Ok(interaction("/health").into()))
            .unwrap();
        registry
            .add_interaction_handler("user", |ctx| {
                let id = ctx.data.and_then(|d| d.as_u64()).unwrap_or(1);
                Ok(interaction(&format!("/users/{}", id)).into())
            })
            .unwrap();
        registry
            .add_interaction_handler("service", |_| {
                Ok(vec![
                    ParentHandler::new("health"),
                    ParentHandler::with_data("user", json!(7)),
                ]
                .into())
            })
            .unwrap();
        registry
            .add_interaction_handler("everything", |_| {
                Ok(ParentHandler::new("service").into())
            })
            .unwrap();

        let resolved = registry.resolve_interactions("everything", None).unwrap();
        let paths: Vec<_> = resolved.iter().map(|i| i.request.path.as_str()).collect();
        assert_eq!(paths, vec!["/health", "/users/7"]);
    }

    #[test]
    fn test_interaction_cycle_hits_depth_limit() {
        let mut registry = HandlerRegistry::with_options(RegistryOptions {
            max_interaction_depth: 3,
            ..RegistryOptions::default()
        });
        registry
            .add_interaction_handler("loop", |_| Ok(ParentHandler::new("loop").into()))
            .unwrap();

        let err = registry.resolve_interactions("loop", None).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InteractionDepthExceeded { max_depth: 3, .. }
        ));
        assert_eq!(registry.metrics().snapshot().invocations, 3);
    }

    #[test]
    fn test_resolve_spec_interactions_in_order() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_interaction_handler("many", |_| {
                Ok(vec![interaction("/a"), interaction("/b")].into())
            })
            .unwrap();
        registry
            .add_interaction_handler("one", |_| Ok(interaction("/c").into()))
            .unwrap();

        let mut spec = Spec::new(sample_request());
        spec.use_interaction("many", None).use_interaction("one", None);

        let resolved = registry.resolve_spec_interactions(&spec).unwrap();
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[2].request.path, "/c");
    }

    #[tokio::test]
    async fn test_wait_handler_async() {
        let mut registry = HandlerRegistry::new();
        registry
            .add_wait_handler("settle", |ctx: WaitHandlerContext| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, HandlerError>(json!({ "status": ctx.res.status, "root": ctx.root_data }))
            })
            .unwrap();

        let ctx = WaitHandlerContext {
            req: sample_request(),
            res: sample_response(202),
            data: None,
            root_data: Some(json!("root")),
        };

        let value = registry.run_wait_handler("settle", ctx).await.unwrap();
        assert_eq!(value, json!({"status": 202, "root": "root"}));
    }

    #[tokio::test]
    async fn test_wait_handler_timeout() {
        let mut registry = HandlerRegistry::with_options(RegistryOptions {
            wait_timeout: Some(Duration::from_millis(10)),
            ..RegistryOptions::default()
        });
        registry
            .add_wait_handler("forever", |_ctx: WaitHandlerContext| async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, HandlerError>(Value::Null)
            })
            .unwrap();

        let ctx = WaitHandlerContext {
            req: sample_request(),
            res: sample_response(200),
            data: None,
            root_data: None,
        };

        let err = registry.run_wait_handler("forever", ctx).await.unwrap_err();
        assert_eq!(
            err.handler_error(),
            Some(&HandlerError::Timeout(Duration::from_millis(10)))
        );
    }

    #[test]
    fn test_debug_lists_names() {
        let mut registry = HandlerRegistry::new();
        registry.add_retry_handler("always", |_| true).unwrap();

        let debug = format!("{:?}", registry);
        assert!(debug.contains("\"retry\": [\"always\"]"));
    }
}

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::context::{
    AssertionContext, CaptureContext, DataHandlerContext, ExpectHandlerContext,
    InteractionContext, RequestResponseContext, SpecHandlerContext, StateHandlerContext,
    WaitHandlerContext,
};
use super::types::InteractionOutput;

/// Errors raised by handler functions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HandlerError {
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

pub type SpecHandlerFunction =
    Arc<dyn Fn(SpecHandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Returns `Err(HandlerError::Assertion)` when the expectation does not hold
pub type ExpectHandlerFunction =
    Arc<dyn Fn(ExpectHandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync>;

/// Returns `true` when the request should be sent again
pub type RetryHandlerFunction = Arc<dyn Fn(RequestResponseContext<'_>) -> bool + Send + Sync>;

pub type CaptureHandlerFunction =
    Arc<dyn Fn(CaptureContext<'_>) -> Result<Value, HandlerError> + Send + Sync>;

pub type StateHandlerFunction =
    Arc<dyn Fn(StateHandlerContext<'_>) -> Result<Value, HandlerError> + Send + Sync>;

pub type DataHandlerFunction =
    Arc<dyn Fn(DataHandlerContext) -> Result<Value, HandlerError> + Send + Sync>;

pub type InteractionHandlerFunction =
    Arc<dyn Fn(InteractionContext) -> Result<InteractionOutput, HandlerError> + Send + Sync>;

pub type AssertHandlerFunction = Arc<dyn Fn(AssertionContext<'_>) -> bool + Send + Sync>;

pub type WaitHandlerFunction = Arc<dyn WaitHandler>;

/// Asynchronous handler run before a spec proceeds
///
/// Any `Fn(WaitHandlerContext) -> impl Future<Output = Result<Value, HandlerError>>`
/// implements this, so closures returning `async move { .. }` blocks can be
/// registered directly.
#[async_trait]
pub trait WaitHandler: Send + Sync {
    async fn wait(&self, ctx: WaitHandlerContext) -> Result<Value, HandlerError>;
}

#[async_trait]
impl<F, Fut> WaitHandler for F
where
    F: Fn(WaitHandlerContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn wait(&self, ctx: WaitHandlerContext) -> Result<Value, HandlerError> {
        (self)(ctx).await
    }
}

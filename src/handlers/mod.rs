//! Handler system for probekit
//!
//! Named callbacks are registered under one of nine categories and later
//! looked up by category + name by the engines that build mock
//! interactions, evaluate expectations, decide on retries, capture values,
//! set up state, and wait before proceeding.
//!
//! ## Key Components
//!
//! - [`HandlerRegistry`] - Category-keyed handler storage with lookup and invocation
//! - [`HandlerKind`] - The nine handler categories
//! - [`global`] - Process-wide registry behind the `add_*_handler` functions
//! - Context records ([`SpecHandlerContext`], [`ExpectHandlerContext`], ...) passed to handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use probekit::handlers::{HandlerError, HandlerRegistry};
//!
//! let mut registry = HandlerRegistry::new();
//! registry.add_expect_handler("created", |ctx| {
//!     if ctx.res.status == 201 {
//!         Ok(())
//!     } else {
//!         Err(HandlerError::Assertion(format!("status {}", ctx.res.status)))
//!     }
//! })?;
//!
//! registry.run_expect_handler("created", &req, &res, None)?;
//! ```

mod context;
pub mod global;
mod registry;
mod traits;
pub(crate) mod types;

pub use context::{
    AssertionContext, CaptureContext, DataHandlerContext, ExpectHandlerContext,
    InteractionContext, RequestResponseContext, SpecHandlerContext, StateHandlerContext,
    WaitHandlerContext,
};
pub use registry::{
    DEFAULT_MAX_INTERACTION_DEPTH, DEFAULT_REFERENCE_PREFIX, HandlerKind, HandlerRegistry,
    RegistryError, RegistryOptions,
};
pub use traits::{
    AssertHandlerFunction, CaptureHandlerFunction, DataHandlerFunction, ExpectHandlerFunction,
    HandlerError, InteractionHandlerFunction, RetryHandlerFunction, SpecHandlerFunction,
    StateHandlerFunction, WaitHandler, WaitHandlerFunction,
};
pub use types::{
    DEFAULT_REQUEST_TIMEOUT, HandlerCall, HeadersMap, Interaction, InteractionOutput,
    MockRequest, MockResponse, ParentHandler, Request, Response, RetryOptions, Spec, Store,
};

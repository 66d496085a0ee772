//! Process-wide handler registry
//!
//! The free functions here register into one shared [`HandlerRegistry`].
//! Engines take a [`registry`] snapshot before invoking handlers so no lock
//! is held while user code runs.

use serde_json::Value;
use std::sync::{LazyLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::context::{
    AssertionContext, CaptureContext, DataHandlerContext, ExpectHandlerContext,
    InteractionContext, RequestResponseContext, SpecHandlerContext, StateHandlerContext,
};
use super::registry::{HandlerRegistry, RegistryError, RegistryOptions};
use super::traits::{HandlerError, WaitHandler};
use super::types::InteractionOutput;

static REGISTRY: LazyLock<RwLock<HandlerRegistry>> =
    LazyLock::new(|| RwLock::new(HandlerRegistry::new()));

fn read_guard(
    lock: &RwLock<HandlerRegistry>,
) -> Result<RwLockReadGuard<'_, HandlerRegistry>, RegistryError> {
    lock.read().map_err(|_| RegistryError::Poisoned)
}

fn write_guard(
    lock: &RwLock<HandlerRegistry>,
) -> Result<RwLockWriteGuard<'_, HandlerRegistry>, RegistryError> {
    lock.write().map_err(|_| RegistryError::Poisoned)
}

fn read() -> Result<RwLockReadGuard<'static, HandlerRegistry>, RegistryError> {
    read_guard(&REGISTRY)
}

fn write() -> Result<RwLockWriteGuard<'static, HandlerRegistry>, RegistryError> {
    write_guard(&REGISTRY)
}

/// Snapshot of the shared registry; handlers are shared, not copied
pub fn registry() -> Result<HandlerRegistry, RegistryError> {
    Ok(read()?.clone())
}

/// Replace the shared registry's options; registered handlers are kept
pub fn configure(options: RegistryOptions) -> Result<(), RegistryError> {
    write()?.set_options(options);
    Ok(())
}

/// Drop every handler from the shared registry
pub fn clear_handlers() -> Result<(), RegistryError> {
    write()?.clear();
    Ok(())
}

/// Adds a custom spec handler
pub fn add_spec_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(SpecHandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    write()?.add_spec_handler(name, func)
}

/// Adds a custom expect handler
pub fn add_expect_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(ExpectHandlerContext<'_>) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    write()?.add_expect_handler(name, func)
}

/// Adds a custom retry handler
pub fn add_retry_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(RequestResponseContext<'_>) -> bool + Send + Sync + 'static,
{
    write()?.add_retry_handler(name, func)
}

/// Adds a custom capture handler
pub fn add_capture_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(CaptureContext<'_>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    write()?.add_capture_handler(name, func)
}

/// Adds a custom state handler
pub fn add_state_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(StateHandlerContext<'_>) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    write()?.add_state_handler(name, func)
}

/// Adds a custom data function handler
pub fn add_data_func_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(DataHandlerContext) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    write()?.add_data_func_handler(name, func)
}

/// Adds a custom interaction handler
pub fn add_interaction_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(InteractionContext) -> Result<InteractionOutput, HandlerError> + Send + Sync + 'static,
{
    write()?.add_interaction_handler(name, func)
}

/// Adds a custom assert handler
pub fn add_assert_handler<F>(name: impl Into<String>, func: F) -> Result<(), RegistryError>
where
    F: Fn(AssertionContext<'_>) -> bool + Send + Sync + 'static,
{
    write()?.add_assert_handler(name, func)
}

/// Adds a custom wait handler
pub fn add_wait_handler<H>(name: impl Into<String>, handler: H) -> Result<(), RegistryError>
where
    H: WaitHandler + 'static,
{
    write()?.add_wait_handler(name, handler)
}

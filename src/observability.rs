//! Observability (tracing setup, handler metrics)

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Counters for handler registration and invocation
#[derive(Debug, Default)]
pub struct HandlerMetrics {
    registrations: AtomicU64,
    replacements: AtomicU64,
    invocations: AtomicU64,
    failures: AtomicU64,
}

impl HandlerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handler_registered(&self, replaced: bool) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        if replaced {
            self.replacements.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(counter = "registrations", "Metric incremented");
    }

    pub fn handler_invoked(&self) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "invocations", "Metric incremented");
    }

    pub fn handler_failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "failures", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            invocations: self.invocations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub registrations: u64,
    pub replacements: u64,
    pub invocations: u64,
    pub failures: u64,
}

use crate::handlers::{DEFAULT_MAX_INTERACTION_DEPTH, DEFAULT_REFERENCE_PREFIX};
use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub handlers: HandlerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub wait: WaitSettings,
}

/// Handler registry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HandlerSettings {
    /// Marks assert/capture handler references, e.g. `#isEmail`
    #[serde(default = "default_reference_prefix")]
    pub reference_prefix: String,
    /// How deep interaction handlers may nest parent references
    #[serde(default = "default_max_interaction_depth")]
    pub max_interaction_depth: usize,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            reference_prefix: default_reference_prefix(),
            max_interaction_depth: default_max_interaction_depth(),
        }
    }
}

fn default_reference_prefix() -> String {
    DEFAULT_REFERENCE_PREFIX.to_string()
}

fn default_max_interaction_depth() -> usize {
    DEFAULT_MAX_INTERACTION_DEPTH
}

/// Defaults for specs that enable retries without their own options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrySettings {
    #[serde(default = "default_retry_count")]
    pub count: u32,
    #[serde(default = "default_retry_delay")]
    pub delay: HumanDuration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            count: default_retry_count(),
            delay: default_retry_delay(),
        }
    }
}

fn default_retry_count() -> u32 {
    1
}

fn default_retry_delay() -> HumanDuration {
    HumanDuration::from_secs(1)
}

/// Wait handler settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WaitSettings {
    /// Upper bound for a single wait handler; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<HumanDuration>,
}

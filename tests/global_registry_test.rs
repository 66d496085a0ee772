//! Reconfiguring and clearing the process-wide registry
//!
//! Runs as its own test binary with a single test, since clearing the shared
//! registry would remove handlers other tests depend on.

use probekit::expressions;
use probekit::handlers::{HandlerKind, RegistryOptions, global};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_configure_then_clear_shared_registry() {
    probekit::add_assert_handler("positive", |ctx| {
        ctx.data.as_i64().is_some_and(|n| n > 0)
    })
    .unwrap();
    probekit::add_data_func_handler("token", |_| Ok(json!("t-1"))).unwrap();

    global::configure(RegistryOptions {
        reference_prefix: "@".to_string(),
        max_interaction_depth: 3,
        wait_timeout: Some(Duration::from_millis(250)),
    })
    .unwrap();

    let registry = global::registry().unwrap();
    assert_eq!(registry.options().reference_prefix, "@");
    assert_eq!(registry.options().max_interaction_depth, 3);
    assert_eq!(
        registry.options().wait_timeout,
        Some(Duration::from_millis(250))
    );

    // Handlers survive reconfiguration and answer to the new prefix
    assert!(registry.has_handler(HandlerKind::Assert, "positive"));
    assert!(expressions::evaluate_assertion(&registry, "@positive", &json!(5)).unwrap());
    assert!(expressions::evaluate_assertion(&registry, "#positive", &json!(5)).is_err());

    global::clear_handlers().unwrap();

    let cleared = global::registry().unwrap();
    assert!(cleared.is_empty());
    assert_eq!(cleared.options().reference_prefix, "@");

    // Snapshots taken before clearing keep their handlers
    assert_eq!(registry.run_data_function("token", None).unwrap(), json!("t-1"));
}

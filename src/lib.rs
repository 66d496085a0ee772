pub mod config;
pub mod expressions;
pub mod handlers;
pub mod humanize;
pub mod observability;

pub use handlers::global::{
    add_assert_handler, add_capture_handler, add_data_func_handler, add_expect_handler,
    add_interaction_handler, add_retry_handler, add_spec_handler, add_state_handler,
    add_wait_handler,
};

//! Scenario-based tests for ci-runner

mod helpers;

mod always_cleanup;
mod cache_fallback;
mod continue_on_error;
mod coverage;
mod fail_fast;
mod matrix_expansion;
mod secrets;
mod triggers;

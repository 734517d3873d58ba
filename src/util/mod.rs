//! Utility modules: throttling retry and request spacing.

pub mod rate_limit;
pub mod retry;

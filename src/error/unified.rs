//! Error classification shared by providers and the turn engine.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Budget,
    State,
    Unknown,
}

/// How an error affects the turn it occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Surfaced as an error-status message without any retry.
    FatalImmediate,
    /// Surfaced only once the throttling retry budget is spent.
    FatalAfterRetry,
    /// Folded into a synthetic tool result; the turn continues.
    RecoverablePerCall,
    /// Ignored in favour of the conservative default.
    Advisory,
}

/// Structured details returned by a provider API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ErrorDetails {
    pub provider_code: Option<String>,
    pub param: Option<String>,
    pub request_id: Option<String>,
}

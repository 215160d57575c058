use serde::{Deserialize, Serialize};

/// Retry policy forwarded to the backend. Every field is optional; the
/// backend interprets whatever is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// ISO-8601 duration, e.g. `PT1S`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_interval: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_coefficient: Option<f64>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty policy is never attached to an envelope
    pub fn is_empty(&self) -> bool {
        self.max_attempts.is_none()
            && self.initial_interval.is_none()
            && self.backoff_coefficient.is_none()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_initial_interval(mut self, interval: impl Into<String>) -> Self {
        self.initial_interval = Some(interval.into());
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = Some(coefficient);
        self
    }
}

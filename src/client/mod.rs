//! Backend client boundary. The wire protocol behind it is opaque to this
//! crate; everything above talks to [`JobClient`].

#[cfg(feature = "memory")]
pub mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::classify::ErrorCode;
use crate::error::ClientResult;
use crate::types::{JobEnvelope, JobHandle};

/// Connection parameters for constructing a backend client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
}

/// Operations the backend exposes to this layer. Implementations must be
/// safe for concurrent use by request handlers, background flushes, and
/// the worker loop without external locking.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Submit a single envelope
    async fn enqueue(&self, envelope: JobEnvelope) -> ClientResult<JobHandle>;

    /// Submit several envelopes in one call, preserving order
    async fn enqueue_batch(&self, envelopes: Vec<JobEnvelope>) -> ClientResult<Vec<JobHandle>>;

    /// Fetch the next envelope available on any of the given queues
    async fn fetch(&self, queues: &[String]) -> ClientResult<Option<JobEnvelope>>;

    /// Acknowledge successful execution
    async fn ack(&self, job_id: &str) -> ClientResult<()>;

    /// Report failed execution together with its classification, leaving
    /// the retry/discard decision to the backend
    async fn fail(
        &self,
        job_id: &str,
        code: ErrorCode,
        retryable: bool,
        message: &str,
    ) -> ClientResult<()>;
}

impl std::fmt::Debug for dyn JobClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JobClient")
    }
}

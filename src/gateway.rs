//! The single choke point that reaches the backend client. No retries and
//! no buffering of its own; the request scope and transactional deferral
//! are layered on top.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error};

use crate::buffer::RequestScope;
use crate::config::Resolver;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{JobEnvelope, JobHandle, RetryPolicy};

/// Options accepted by the gateway. `priority` is backend-scale and
/// forwarded verbatim; framework priorities are mapped by the adapter.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub queue: Option<String>,
    pub priority: Option<i32>,
    pub retry: Option<RetryPolicy>,
    pub meta: HashMap<String, String>,
}

impl EnqueueOptions {
    pub fn on_queue(queue: impl Into<String>) -> Self {
        Self { queue: Some(queue.into()), ..Self::default() }
    }
}

/// Outcome of an enqueue call
#[derive(Debug, Clone)]
pub enum Enqueued {
    /// Delivered to the backend; the handle carries the assigned id
    Delivered(JobHandle),

    /// Captured by the active request scope; delivered when it flushes
    Buffered,

    /// Registered on an open transaction's after-commit hook
    Deferred,
}

impl Enqueued {
    pub fn handle(&self) -> Option<&JobHandle> {
        match self {
            Self::Delivered(handle) => Some(handle),
            _ => None,
        }
    }
}

/// Unit-of-work boundary exposed by the host (a database transaction or
/// similar). `after_commit` callbacks must run only when the unit of work
/// completes successfully; a rollback must drop them unrun.
pub trait TransactionBoundary: Send + Sync {
    fn in_transaction(&self) -> bool;

    fn after_commit(&self, callback: Box<dyn FnOnce() + Send + 'static>);
}

/// Enqueue gateway over the resolved configuration and client handle
#[derive(Clone)]
pub struct Gateway {
    resolver: Arc<Resolver>,
}

impl Gateway {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    /// Enqueue for immediate execution
    pub async fn enqueue(
        &self,
        job_type: &str,
        args: Vec<Value>,
        options: EnqueueOptions,
    ) -> BridgeResult<Enqueued> {
        let envelope = self.build_envelope(job_type, args, None, options)?;
        self.dispatch(envelope).await
    }

    /// Enqueue for execution at an absolute instant
    pub async fn enqueue_at(
        &self,
        job_type: &str,
        args: Vec<Value>,
        at: DateTime<Utc>,
        options: EnqueueOptions,
    ) -> BridgeResult<Enqueued> {
        let envelope = self.build_envelope(job_type, args, Some(at), options)?;
        self.dispatch(envelope).await
    }

    /// Enqueue for execution after a delay
    pub async fn enqueue_in(
        &self,
        job_type: &str,
        args: Vec<Value>,
        delay: Duration,
        options: EnqueueOptions,
    ) -> BridgeResult<Enqueued> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|err| BridgeError::Internal(err.to_string()))?;
        self.enqueue_at(job_type, args, Utc::now() + delay, options).await
    }

    /// Enqueue after the surrounding transaction commits; immediate when no
    /// transaction is open. A rollback means the job is never submitted.
    /// The registered callback spawns onto the running Tokio runtime.
    pub async fn enqueue_after_commit(
        &self,
        tx: &dyn TransactionBoundary,
        job_type: &str,
        args: Vec<Value>,
        options: EnqueueOptions,
    ) -> BridgeResult<Enqueued> {
        if !tx.in_transaction() {
            return self.enqueue(job_type, args, options).await;
        }

        let envelope = self.build_envelope(job_type, args, None, options)?;
        let gateway = self.clone();
        tx.after_commit(Box::new(move || {
            tokio::spawn(async move {
                if let Err(err) = gateway.deliver(envelope).await {
                    error!(error = %err, "post-commit enqueue failed");
                }
            });
        }));
        Ok(Enqueued::Deferred)
    }

    fn build_envelope(
        &self,
        job_type: &str,
        args: Vec<Value>,
        at: Option<DateTime<Utc>>,
        options: EnqueueOptions,
    ) -> BridgeResult<JobEnvelope> {
        if job_type.is_empty() {
            return Err(BridgeError::EmptyJobType);
        }

        let config = self.resolver.resolve()?;
        let mut envelope =
            JobEnvelope::new(job_type, args, config.resolve_queue(options.queue.as_deref()));
        envelope.priority = options.priority;
        envelope.retry = options.retry;
        envelope.meta = options.meta;
        if let Some(at) = at {
            envelope = envelope.with_scheduled_at(at);
        }
        Ok(envelope)
    }

    /// Hand the envelope to the active request scope, or deliver directly
    /// when none is open
    pub(crate) async fn dispatch(&self, envelope: JobEnvelope) -> BridgeResult<Enqueued> {
        match RequestScope::try_capture(envelope) {
            Ok(()) => Ok(Enqueued::Buffered),
            Err(envelope) => Ok(Enqueued::Delivered(self.deliver(envelope).await?)),
        }
    }

    /// Direct backend call, bypassing any request scope
    pub(crate) async fn deliver(&self, envelope: JobEnvelope) -> BridgeResult<JobHandle> {
        let client = self.resolver.client()?;
        let handle = client.enqueue(envelope).await?;
        debug!(job_id = %handle.id, "job delivered");
        Ok(handle)
    }

    pub(crate) async fn deliver_batch(
        &self,
        envelopes: Vec<JobEnvelope>,
    ) -> BridgeResult<Vec<JobHandle>> {
        let client = self.resolver.client()?;
        Ok(client.enqueue_batch(envelopes).await?)
    }
}

//! In-process client double. Records every call so tests can assert on
//! delivery counts, ordering, and failure reports; `fetch` drains seeded
//! envelopes the way a real backend would hand them to a worker.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::classify::ErrorCode;
use crate::error::ClientResult;
use crate::types::{JobEnvelope, JobHandle};

use super::JobClient;

/// A failure report recorded by [`JobClient::fail`]
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub job_id: String,
    pub code: ErrorCode,
    pub retryable: bool,
    pub message: String,
}

#[derive(Default)]
struct State {
    pending: VecDeque<JobEnvelope>,
    enqueued: Vec<JobEnvelope>,
    acked: Vec<String>,
    failed: Vec<FailureReport>,
    single_calls: usize,
    batch_calls: usize,
}

/// In-memory [`JobClient`] for tests and local development
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<State>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an envelope for `fetch`, assigning an id when absent. Returns
    /// the envelope's id.
    pub fn seed(&self, mut envelope: JobEnvelope) -> String {
        let id = envelope
            .id
            .get_or_insert_with(|| Uuid::new_v4().to_string())
            .clone();
        self.state.lock().pending.push_back(envelope);
        id
    }

    /// Envelopes delivered via `enqueue` or `enqueue_batch`, in order
    pub fn enqueued(&self) -> Vec<JobEnvelope> {
        self.state.lock().enqueued.clone()
    }

    /// Ids acknowledged as completed
    pub fn acked(&self) -> Vec<String> {
        self.state.lock().acked.clone()
    }

    /// Recorded failure reports
    pub fn failures(&self) -> Vec<FailureReport> {
        self.state.lock().failed.clone()
    }

    /// Number of single-enqueue calls
    pub fn single_calls(&self) -> usize {
        self.state.lock().single_calls
    }

    /// Number of batch-enqueue calls
    pub fn batch_calls(&self) -> usize {
        self.state.lock().batch_calls
    }

    /// Seeded envelopes not yet fetched by a worker
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }
}

#[async_trait]
impl JobClient for MemoryClient {
    async fn enqueue(&self, mut envelope: JobEnvelope) -> ClientResult<JobHandle> {
        let id = Uuid::new_v4().to_string();
        envelope.id = Some(id.clone());

        let mut state = self.state.lock();
        state.single_calls += 1;
        state.enqueued.push(envelope);
        Ok(JobHandle { id })
    }

    async fn enqueue_batch(&self, envelopes: Vec<JobEnvelope>) -> ClientResult<Vec<JobHandle>> {
        let mut state = self.state.lock();
        state.batch_calls += 1;

        let mut handles = Vec::with_capacity(envelopes.len());
        for mut envelope in envelopes {
            let id = Uuid::new_v4().to_string();
            envelope.id = Some(id.clone());
            state.enqueued.push(envelope);
            handles.push(JobHandle { id });
        }
        Ok(handles)
    }

    async fn fetch(&self, queues: &[String]) -> ClientResult<Option<JobEnvelope>> {
        let mut state = self.state.lock();
        let position = state.pending.iter().position(|e| queues.contains(&e.queue));
        Ok(position.and_then(|i| state.pending.remove(i)))
    }

    async fn ack(&self, job_id: &str) -> ClientResult<()> {
        self.state.lock().acked.push(job_id.to_string());
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        code: ErrorCode,
        retryable: bool,
        message: &str,
    ) -> ClientResult<()> {
        self.state.lock().failed.push(FailureReport {
            job_id: job_id.to_string(),
            code,
            retryable,
            message: message.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn assigns_ids_and_records_calls() {
        let client = MemoryClient::new();

        let handle = client
            .enqueue(JobEnvelope::new("email.send", vec![], "default"))
            .await
            .unwrap();
        assert!(!handle.id.is_empty());
        assert_eq!(client.single_calls(), 1);
        assert_eq!(client.enqueued()[0].id.as_deref(), Some(handle.id.as_str()));
    }

    #[tokio::test]
    async fn fetch_only_returns_jobs_on_requested_queues() {
        let client = MemoryClient::new();
        client.seed(JobEnvelope::new("email.send", vec![], "mailers"));
        client.seed(JobEnvelope::new("billing.charge", vec![], "billing"));

        let fetched = client.fetch(&["billing".to_string()]).await.unwrap().unwrap();
        assert_eq!(fetched.job_type, "billing.charge");
        assert!(client.fetch(&["billing".to_string()]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let client = MemoryClient::new();
        let handles = client
            .enqueue_batch(vec![
                JobEnvelope::new("a", vec![], "default"),
                JobEnvelope::new("b", vec![], "default"),
            ])
            .await
            .unwrap();

        assert_eq!(handles.len(), 2);
        assert_eq!(client.batch_calls(), 1);
        let types: Vec<String> = client.enqueued().iter().map(|e| e.job_type.clone()).collect();
        assert_eq!(types, vec!["a", "b"]);
    }
}

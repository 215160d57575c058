//! Framework-side adapter: turns a native job into a backend envelope.
//!
//! Queue resolution, priority mapping, retry policy and identity metadata
//! all happen here, against the current configuration snapshot. Writing the
//! backend-assigned id back onto the job is the builder's one permitted
//! side effect.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::codec;
use crate::error::{BridgeError, BridgeResult};
use crate::gateway::{Enqueued, Gateway};
use crate::types::{meta, JobEnvelope};

/// Framework-native job representation handed to the adapter
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Fully-qualified class name, e.g. `Billing::ChargeJob`
    pub class_name: String,

    /// Framework-assigned job id
    pub job_id: String,

    /// Native queue name; `None` falls back to the configured default
    pub queue: Option<String>,

    pub args: Vec<Value>,

    /// Framework-scale priority (0 = highest), mapped via the priority table
    pub priority: Option<i32>,

    /// Number of previous executions
    pub executions: u32,

    pub locale: Option<String>,

    /// Backend-assigned id, written back after delivery
    pub provider_job_id: Option<String>,
}

impl JobRequest {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            job_id: Uuid::new_v4().to_string(),
            queue: None,
            args: Vec::new(),
            priority: None,
            executions: 0,
            locale: None,
            provider_job_id: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn on_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

/// Builds envelopes from framework jobs and submits them through the
/// gateway
#[derive(Clone)]
pub struct Adapter {
    gateway: Gateway,
}

impl Adapter {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    /// Enqueue for immediate execution
    #[instrument(skip(self, job), fields(job_class = %job.class_name))]
    pub async fn enqueue(&self, job: &mut JobRequest) -> BridgeResult<Enqueued> {
        let envelope = self.build_envelope(job, None)?;
        self.submit(job, envelope).await
    }

    /// Enqueue for execution at `at` (normalized to UTC, second precision)
    #[instrument(skip(self, job), fields(job_class = %job.class_name))]
    pub async fn enqueue_at(
        &self,
        job: &mut JobRequest,
        at: DateTime<Utc>,
    ) -> BridgeResult<Enqueued> {
        let envelope = self.build_envelope(job, Some(at))?;
        self.submit(job, envelope).await
    }

    /// The envelope construction rules in one place
    pub fn build_envelope(
        &self,
        job: &JobRequest,
        at: Option<DateTime<Utc>>,
    ) -> BridgeResult<JobEnvelope> {
        if job.class_name.is_empty() {
            return Err(BridgeError::EmptyJobType);
        }

        let config = self.gateway.resolver().resolve()?;
        let mut envelope = JobEnvelope::new(
            codec::encode(&job.class_name),
            job.args.clone(),
            config.resolve_queue(job.queue.as_deref()),
        );
        envelope.priority = config.resolve_priority(job.priority);
        if !config.retry_policy.is_empty() {
            envelope.retry = Some(config.retry_policy.clone());
        }
        envelope.meta = build_meta(job);
        if let Some(at) = at {
            envelope = envelope.with_scheduled_at(at);
        }
        Ok(envelope)
    }

    async fn submit(&self, job: &mut JobRequest, envelope: JobEnvelope) -> BridgeResult<Enqueued> {
        let outcome = self.gateway.dispatch(envelope).await?;
        if let Some(handle) = outcome.handle() {
            job.provider_job_id = Some(handle.id.clone());
        }
        Ok(outcome)
    }
}

fn build_meta(job: &JobRequest) -> HashMap<String, String> {
    let mut entries = HashMap::new();
    entries.insert(meta::JOB_CLASS.to_string(), job.class_name.clone());
    entries.insert(meta::JOB_ID.to_string(), job.job_id.clone());
    if job.executions > 0 {
        entries.insert(meta::EXECUTIONS.to_string(), job.executions.to_string());
    }
    if let Some(locale) = &job.locale {
        entries.insert(meta::LOCALE.to_string(), locale.clone());
    }
    if let Some(queue) = &job.queue {
        entries.insert(meta::QUEUE_NAME.to_string(), queue.clone());
    }
    entries
}

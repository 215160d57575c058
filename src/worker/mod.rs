//! Worker-side dispatch loop.
//!
//! Consumes envelopes from the backend, reconstructs framework job identity
//! from metadata (falling back to the type-string heuristic), invokes the
//! registered handler, and reports classified failures back to the backend
//! so its retry/discard machinery can act. The loop never swallows a
//! failure and never dies on one.

pub mod registry;

pub use registry::{HandlerRegistry, JobContext, JobHandler};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::classify::{classify, ErrorCode};
use crate::client::JobClient;
use crate::codec;
use crate::config::Resolver;
use crate::error::{BridgeError, BridgeResult};
use crate::types::{meta, JobEnvelope};

/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues to consume, in native (unprefixed) form
    pub queues: Vec<String>,

    /// Maximum concurrent job executions
    pub concurrency: usize,

    /// Sleep between polls when no jobs are available
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: vec!["default".to_string()],
            concurrency: 5,
            poll_interval: Duration::from_secs(2),
        }
    }
}

// Two-stage shutdown: Drain stops polling and lets in-flight executions
// finish; Abort terminates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shutdown {
    Run,
    Drain,
    Abort,
}

/// Handle for a running worker
#[derive(Debug)]
pub struct WorkerHandle {
    signal: watch::Sender<Shutdown>,
    join: tokio::task::JoinHandle<BridgeResult<()>>,
}

impl WorkerHandle {
    /// Stop accepting new work and wait for in-flight executions to finish
    pub async fn stop(self) -> BridgeResult<()> {
        let _ = self.signal.send(Shutdown::Drain);
        self.join
            .await
            .map_err(|err| BridgeError::Internal(format!("worker join error: {err}")))?
    }

    /// Abort in-flight work and stop immediately
    pub async fn abort(self) -> BridgeResult<()> {
        let _ = self.signal.send(Shutdown::Abort);
        self.join
            .await
            .map_err(|err| BridgeError::Internal(format!("worker join error: {err}")))?
    }

    /// Request a drain without waiting (e.g. from a signal handler)
    pub fn request_stop(&self) {
        let _ = self.signal.send(Shutdown::Drain);
    }
}

/// Consumes envelopes from the backend and routes them to registered
/// handlers
pub struct Worker {
    resolver: Arc<Resolver>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(resolver: Arc<Resolver>, registry: HandlerRegistry, config: WorkerConfig) -> Self {
        Self { resolver, registry: Arc::new(registry), config }
    }

    /// Spawn the polling loop and return its handle. Consumed queue names
    /// are resolved through the configured prefix.
    pub fn start(self) -> BridgeResult<WorkerHandle> {
        let client = self.resolver.client()?;
        let snapshot = self.resolver.resolve()?;
        let queues: Vec<String> =
            self.config.queues.iter().map(|q| snapshot.resolve_queue(Some(q))).collect();

        let (signal, signal_rx) = watch::channel(Shutdown::Run);
        let worker_loop = WorkerLoop {
            client,
            registry: self.registry,
            queues,
            concurrency: self.config.concurrency.max(1),
            poll_interval: self.config.poll_interval,
            signal: signal_rx,
        };
        let join = tokio::spawn(worker_loop.run());
        Ok(WorkerHandle { signal, join })
    }
}

struct WorkerLoop {
    client: Arc<dyn JobClient>,
    registry: Arc<HandlerRegistry>,
    queues: Vec<String>,
    concurrency: usize,
    poll_interval: Duration,
    signal: watch::Receiver<Shutdown>,
}

impl WorkerLoop {
    async fn run(mut self) -> BridgeResult<()> {
        info!(queues = ?self.queues, concurrency = self.concurrency, "worker started");
        let slots = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<()> = JoinSet::new();

        let mode = loop {
            while tasks.try_join_next().is_some() {}

            match *self.signal.borrow() {
                Shutdown::Run => {}
                mode => break mode,
            }

            // One slot per in-flight execution bounds concurrency.
            let permit = tokio::select! {
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Shutdown::Drain,
                },
                changed = self.signal.changed() => {
                    if changed.is_err() {
                        break Shutdown::Drain;
                    }
                    continue;
                }
            };

            let fetched = tokio::select! {
                fetched = self.client.fetch(&self.queues) => fetched,
                changed = self.signal.changed() => {
                    drop(permit);
                    if changed.is_err() {
                        break Shutdown::Drain;
                    }
                    continue;
                }
            };

            match fetched {
                Ok(Some(envelope)) => {
                    let client = self.client.clone();
                    let registry = self.registry.clone();
                    tasks.spawn(async move {
                        execute(client, registry, envelope).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    self.idle().await;
                }
                Err(err) => {
                    drop(permit);
                    warn!(error = %err, "poll failed");
                    self.idle().await;
                }
            }
        };

        if mode == Shutdown::Abort {
            warn!(in_flight = tasks.len(), "worker aborting in-flight executions");
            tasks.shutdown().await;
        } else {
            info!(in_flight = tasks.len(), "worker draining");
            while !tasks.is_empty() {
                tokio::select! {
                    _ = tasks.join_next() => {}
                    changed = self.signal.changed() => match changed {
                        Ok(()) if *self.signal.borrow() == Shutdown::Abort => {
                            tasks.shutdown().await;
                        }
                        Ok(()) => {}
                        Err(_) => {
                            while tasks.join_next().await.is_some() {}
                        }
                    },
                }
            }
        }

        info!("worker stopped");
        Ok(())
    }

    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = self.signal.changed() => {}
        }
    }
}

/// Dispatch one envelope: resolve the handler, rebuild the framework job,
/// execute, and report the classified outcome to the backend.
async fn execute(client: Arc<dyn JobClient>, registry: Arc<HandlerRegistry>, envelope: JobEnvelope) {
    let job_type = envelope.job_type.clone();
    let provider_job_id = envelope.id.clone().unwrap_or_default();
    let class_name = envelope
        .meta
        .get(meta::JOB_CLASS)
        .cloned()
        .unwrap_or_else(|| codec::decode(&job_type));

    let Some(handler) = registry.resolve(&class_name) else {
        let err = BridgeError::DispatchResolution {
            class_name: class_name.clone(),
            job_type: job_type.clone(),
        };
        // The handler will not appear without a deploy; report and move on.
        error!(job_id = %provider_job_id, %job_type, error = %err, "dispatch failed");
        report_failure(&client, &provider_job_id, ErrorCode::UnknownError, false, &err.to_string())
            .await;
        return;
    };

    let job = rebuild_job(class_name.clone(), envelope);
    let started = Instant::now();

    match handler.perform(job).await {
        Ok(()) => {
            debug!(
                job_id = %provider_job_id,
                job_class = %class_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job completed"
            );
            if let Err(err) = client.ack(&provider_job_id).await {
                warn!(job_id = %provider_job_id, error = %err, "ack failed");
            }
        }
        Err(failure) => {
            let verdict = classify(&failure);
            if verdict.retryable {
                warn!(
                    job_id = %provider_job_id,
                    job_class = %class_name,
                    code = verdict.code.as_str(),
                    error = %failure,
                    "job failed, retryable"
                );
            } else {
                error!(
                    job_id = %provider_job_id,
                    job_class = %class_name,
                    code = verdict.code.as_str(),
                    error = %failure,
                    "job failed permanently"
                );
            }
            report_failure(
                &client,
                &provider_job_id,
                verdict.code,
                verdict.retryable,
                &failure.to_string(),
            )
            .await;
        }
    }
}

async fn report_failure(
    client: &Arc<dyn JobClient>,
    job_id: &str,
    code: ErrorCode,
    retryable: bool,
    message: &str,
) {
    if let Err(err) = client.fail(job_id, code, retryable, message).await {
        warn!(%job_id, error = %err, "failure report did not reach the backend");
    }
}

// Metadata wins over envelope-level values when both are present.
fn rebuild_job(class_name: String, envelope: JobEnvelope) -> JobContext {
    let executions = envelope
        .meta
        .get(meta::EXECUTIONS)
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);

    JobContext {
        job_id: envelope
            .meta
            .get(meta::JOB_ID)
            .cloned()
            .or_else(|| envelope.id.clone())
            .unwrap_or_default(),
        provider_job_id: envelope.id.clone(),
        queue: envelope
            .meta
            .get(meta::QUEUE_NAME)
            .cloned()
            .unwrap_or_else(|| envelope.queue.clone()),
        locale: envelope.meta.get(meta::LOCALE).cloned(),
        executions,
        args: envelope.args,
        class_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Failure;
    use crate::client::memory::MemoryClient;
    use crate::config::{ConfigOverlay, Resolver};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<JobContext>>,
        fail_with: Option<Failure>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl JobHandler for RecordingHandler {
        async fn perform(&self, job: JobContext) -> Result<(), Failure> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.seen.lock().push(job);
            match &self.fail_with {
                Some(failure) => Err(failure.clone()),
                None => Ok(()),
            }
        }
    }

    fn test_config() -> WorkerConfig {
        WorkerConfig {
            queues: vec!["default".to_string()],
            concurrency: 2,
            poll_interval: Duration::from_millis(5),
        }
    }

    fn resolver_with(client: Arc<MemoryClient>) -> Arc<Resolver> {
        Arc::new(Resolver::builder().client(client).build())
    }

    async fn wait_until(mut check: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn dispatches_by_metadata_class_and_acks_success() {
        let client = Arc::new(MemoryClient::new());
        let handler = Arc::new(RecordingHandler::default());

        let id = client.seed(
            JobEnvelope::new("billing.charge", vec![json!("user-1")], "default")
                .with_meta(meta::JOB_CLASS, "Billing::ChargeJob")
                .with_meta(meta::JOB_ID, "job-42")
                .with_meta(meta::QUEUE_NAME, "billing")
                .with_meta(meta::EXECUTIONS, "2")
                .with_meta(meta::LOCALE, "en"),
        );

        let mut registry = HandlerRegistry::new();
        registry.register("Billing::ChargeJob", handler.clone()).unwrap();

        let worker = Worker::new(resolver_with(client.clone()), registry, test_config());
        let handle = worker.start().unwrap();

        {
            let client = client.clone();
            wait_until(move || client.acked().len() == 1).await;
        }
        handle.stop().await.unwrap();

        assert_eq!(client.acked(), vec![id]);
        let seen = handler.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].class_name, "Billing::ChargeJob");
        assert_eq!(seen[0].job_id, "job-42");
        assert_eq!(seen[0].queue, "billing");
        assert_eq!(seen[0].executions, 2);
        assert_eq!(seen[0].locale.as_deref(), Some("en"));
        assert_eq!(seen[0].args, vec![json!("user-1")]);
    }

    #[tokio::test]
    async fn falls_back_to_the_decode_heuristic_without_metadata() {
        let client = Arc::new(MemoryClient::new());
        let handler = Arc::new(RecordingHandler::default());

        client.seed(JobEnvelope::new("billing.charge", vec![], "default"));

        let mut registry = HandlerRegistry::new();
        registry.register("Billing::ChargeJob", handler.clone()).unwrap();

        let worker = Worker::new(resolver_with(client.clone()), registry, test_config());
        let handle = worker.start().unwrap();

        {
            let client = client.clone();
            wait_until(move || client.acked().len() == 1).await;
        }
        handle.stop().await.unwrap();

        assert_eq!(handler.seen.lock()[0].class_name, "Billing::ChargeJob");
    }

    #[tokio::test]
    async fn unknown_class_is_reported_and_the_loop_continues() {
        let client = Arc::new(MemoryClient::new());
        let handler = Arc::new(RecordingHandler::default());

        client.seed(
            JobEnvelope::new("ghost.job", vec![], "default")
                .with_meta(meta::JOB_CLASS, "GhostJob"),
        );
        client.seed(
            JobEnvelope::new("billing.charge", vec![], "default")
                .with_meta(meta::JOB_CLASS, "Billing::ChargeJob"),
        );

        let mut registry = HandlerRegistry::new();
        registry.register("Billing::ChargeJob", handler.clone()).unwrap();

        let worker = Worker::new(resolver_with(client.clone()), registry, test_config());
        let handle = worker.start().unwrap();

        {
            let client = client.clone();
            wait_until(move || client.acked().len() == 1 && client.failures().len() == 1).await;
        }
        handle.stop().await.unwrap();

        let failures = client.failures();
        assert_eq!(failures[0].code, ErrorCode::UnknownError);
        assert!(!failures[0].retryable);
        assert!(failures[0].message.contains("GhostJob"));
        // the later job still executed
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_classified_and_reported() {
        let client = Arc::new(MemoryClient::new());
        let handler = Arc::new(RecordingHandler {
            fail_with: Some(Failure::timeout("upstream hung")),
            ..Default::default()
        });

        client.seed(
            JobEnvelope::new("email.send", vec![], "default")
                .with_meta(meta::JOB_CLASS, "EmailJob"),
        );

        let mut registry = HandlerRegistry::new();
        registry.register("EmailJob", handler).unwrap();

        let worker = Worker::new(resolver_with(client.clone()), registry, test_config());
        let handle = worker.start().unwrap();

        {
            let client = client.clone();
            wait_until(move || client.failures().len() == 1).await;
        }
        handle.stop().await.unwrap();

        let failures = client.failures();
        assert_eq!(failures[0].code, ErrorCode::Timeout);
        assert!(failures[0].retryable);
        assert!(client.acked().is_empty());
    }

    #[tokio::test]
    async fn worker_queues_are_resolved_through_the_prefix() {
        let client = Arc::new(MemoryClient::new());
        let handler = Arc::new(RecordingHandler::default());

        client.seed(
            JobEnvelope::new("email.send", vec![], "staging_mailers")
                .with_meta(meta::JOB_CLASS, "EmailJob"),
        );

        let resolver = Arc::new(
            Resolver::builder()
                .overlay(ConfigOverlay::new().with_queue_prefix("staging"))
                .client(client.clone())
                .build(),
        );
        let mut registry = HandlerRegistry::new();
        registry.register("EmailJob", handler.clone()).unwrap();

        let config = WorkerConfig { queues: vec!["mailers".to_string()], ..test_config() };
        let handle = Worker::new(resolver, registry, config).start().unwrap();

        {
            let client = client.clone();
            wait_until(move || client.acked().len() == 1).await;
        }
        handle.stop().await.unwrap();

        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn drain_lets_in_flight_executions_finish() {
        let client = Arc::new(MemoryClient::new());
        let handler = Arc::new(RecordingHandler {
            delay: Some(Duration::from_millis(100)),
            ..Default::default()
        });

        client.seed(
            JobEnvelope::new("email.send", vec![], "default")
                .with_meta(meta::JOB_CLASS, "EmailJob"),
        );

        let mut registry = HandlerRegistry::new();
        registry.register("EmailJob", handler.clone()).unwrap();

        let worker = Worker::new(resolver_with(client.clone()), registry, test_config());
        let handle = worker.start().unwrap();

        // wait until the worker has fetched the envelope, then drain while
        // the handler is still sleeping
        {
            let client = client.clone();
            wait_until(move || client.pending_count() == 0).await;
        }
        assert!(client.acked().is_empty());
        handle.stop().await.unwrap();

        assert_eq!(client.acked().len(), 1);
        assert_eq!(handler.seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn worker_requires_a_configured_client() {
        let resolver = Arc::new(Resolver::builder().build());
        let worker = Worker::new(resolver, HandlerRegistry::new(), test_config());
        assert!(matches!(worker.start().unwrap_err(), BridgeError::NotConfigured));
    }
}

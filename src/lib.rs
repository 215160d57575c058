//! # ojs-bridge: host-framework bridging for an OJS job backend
//!
//! Call sites enqueue jobs in their native framework vocabulary (class
//! name, queue, priority, scheduled time) while the OJS backend only
//! understands a flat, normalized job envelope. This crate is the
//! translation and dispatch layer between the two:
//!
//! - **Layered configuration**: built-in defaults < environment-keyed YAML
//!   file < secrets file < application overlay < runtime `configure`,
//!   merged field-by-field into one immutable snapshot that also owns the
//!   backend client handle
//! - **Type-name codec**: `Billing::ChargeJob` ⇄ `billing.charge`
//! - **Envelope building**: queue prefixing, priority mapping, retry
//!   policy, and identity metadata resolved in one place
//! - **Request-scoped buffering**: enqueues inside a unit of work are
//!   delivered as one ordered batch only when it succeeds
//! - **Worker dispatch**: envelopes routed back to registered handlers,
//!   failures classified into a closed retryable/non-retryable taxonomy
//!   and reported to the backend, never swallowed
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use ojs_bridge::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> BridgeResult<()> {
//! let resolver = Arc::new(
//!     Resolver::builder()
//!         .client(Arc::new(MemoryClient::new()))
//!         .build(),
//! );
//! resolver.configure(|config| {
//!     config.queue_prefix = Some("production".into());
//! })?;
//!
//! let adapter = Adapter::new(Gateway::new(resolver));
//! let mut job = JobRequest::new("Billing::ChargeJob").with_priority(0);
//! adapter.enqueue(&mut job).await?;
//! assert!(job.provider_job_id.is_some());
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod buffer;
pub mod classify;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod types;
pub mod worker;

#[cfg(feature = "tracing-basic")]
pub mod observability;

pub use adapter::{Adapter, JobRequest};
pub use buffer::{RequestScope, ScopeOutcome};
pub use classify::{classify, Classification, ErrorCode, Failure};
pub use client::{ClientConfig, JobClient};
pub use config::{ConfigOverlay, OjsConfig, Resolver, ResolverBuilder};
pub use error::{BridgeError, BridgeResult, ClientError, ClientResult};
pub use gateway::{Enqueued, EnqueueOptions, Gateway, TransactionBoundary};
pub use types::{meta, JobEnvelope, JobHandle, PriorityMap, RetryPolicy};
pub use worker::{HandlerRegistry, JobContext, JobHandler, Worker, WorkerConfig, WorkerHandle};

#[cfg(feature = "memory")]
pub use client::memory::MemoryClient;

/// Everything a typical integration needs
pub mod prelude {
    pub use crate::{
        classify, Adapter, BridgeError, BridgeResult, Classification, ClientConfig, ConfigOverlay,
        Enqueued, EnqueueOptions, ErrorCode, Failure, Gateway, HandlerRegistry, JobClient,
        JobContext, JobEnvelope, JobHandle, JobHandler, JobRequest, OjsConfig, RequestScope,
        Resolver, RetryPolicy, Worker, WorkerConfig,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryClient;

    pub use async_trait::async_trait;
}

//! Request-scoped enqueue buffering.
//!
//! Per unit of work the buffer moves `INACTIVE → ACTIVE → {FLUSHED,
//! DISCARDED}`. Entries live in task-local storage, so concurrent units of
//! work never see each other's buffers and no locking is involved. On a
//! successful outcome one entry goes out as a single enqueue and several
//! as one ordered batch; on failure nothing reaches the backend. The slot
//! is cleared unconditionally, even when the flush itself fails.

use std::cell::RefCell;
use std::future::Future;

use tracing::debug;

use crate::error::BridgeResult;
use crate::gateway::Gateway;
use crate::types::JobEnvelope;

tokio::task_local! {
    static SCOPE: RefCell<Vec<JobEnvelope>>;
}

/// Decides whether a completed unit of work flushes its buffer
pub trait ScopeOutcome {
    /// `true` when the unit of work completed successfully
    fn should_flush(&self) -> bool;
}

impl ScopeOutcome for () {
    fn should_flush(&self) -> bool {
        true
    }
}

impl ScopeOutcome for bool {
    fn should_flush(&self) -> bool {
        *self
    }
}

/// HTTP-ish status code; anything below 500 flushes
impl ScopeOutcome for u16 {
    fn should_flush(&self) -> bool {
        *self < 500
    }
}

impl<T: ScopeOutcome, E> ScopeOutcome for Result<T, E> {
    fn should_flush(&self) -> bool {
        match self {
            Ok(value) => value.should_flush(),
            Err(_) => false,
        }
    }
}

/// The request-scoped buffer
pub struct RequestScope;

impl RequestScope {
    /// Run `fut` with an active buffer. Gateway enqueues inside it are
    /// captured instead of delivered; when the outcome flushes they are
    /// submitted in original order. Delivery errors propagate to this
    /// caller, never into the unit of work.
    pub async fn run<F, T>(gateway: &Gateway, fut: F) -> BridgeResult<T>
    where
        F: Future<Output = T>,
        T: ScopeOutcome,
    {
        // Entries are taken out of the task-local slot before any delivery,
        // so a failed flush cannot leak them into a later unit of work and
        // the flush itself is never re-captured.
        let (outcome, entries) = SCOPE
            .scope(RefCell::new(Vec::new()), async move {
                let outcome = fut.await;
                let entries = SCOPE.with(|cell| cell.take());
                (outcome, entries)
            })
            .await;

        if outcome.should_flush() {
            Self::flush(gateway, entries).await?;
        } else if !entries.is_empty() {
            debug!(discarded = entries.len(), "request scope discarded buffered jobs");
        }
        Ok(outcome)
    }

    /// Whether the current task has an active buffer
    pub fn is_active() -> bool {
        SCOPE.try_with(|_| ()).is_ok()
    }

    /// Number of jobs buffered in the current unit of work
    pub fn len() -> usize {
        SCOPE.try_with(|cell| cell.borrow().len()).unwrap_or(0)
    }

    /// Capture an envelope into the active buffer; hands it back when no
    /// unit of work is in progress.
    pub(crate) fn try_capture(envelope: JobEnvelope) -> Result<(), JobEnvelope> {
        let mut slot = Some(envelope);
        let captured = SCOPE.try_with(|cell| {
            if let Some(envelope) = slot.take() {
                cell.borrow_mut().push(envelope);
            }
        });

        match (captured, slot.take()) {
            (Err(_), Some(envelope)) => Err(envelope),
            _ => Ok(()),
        }
    }

    async fn flush(gateway: &Gateway, mut entries: Vec<JobEnvelope>) -> BridgeResult<()> {
        match entries.len() {
            0 => Ok(()),
            1 => {
                if let Some(envelope) = entries.pop() {
                    gateway.deliver(envelope).await?;
                }
                Ok(())
            }
            count => {
                debug!(jobs = count, "flushing request scope as one batch");
                gateway.deliver_batch(entries).await?;
                Ok(())
            }
        }
    }
}

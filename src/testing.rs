//! Deterministic stub work capabilities for tests.
//!
//! The coordination core treats agent reasoning as an injected capability,
//! so the whole state machine is exercisable with these stubs and no real
//! reasoning process.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::mailbox::Message;
use crate::runtime::{ShutdownDecision, ShutdownSignal, WorkCapability, WorkOutcome};
use crate::task::Task;

/// Completes every task immediately.
#[derive(Debug, Default)]
pub struct NoopWork;

#[async_trait]
impl WorkCapability for NoopWork {
    async fn perform(
        &self,
        task: &Task,
        _inbox: &[Message],
        _shutdown: ShutdownSignal,
    ) -> WorkOutcome {
        WorkOutcome::Completed {
            summary: format!("noop: {}", task.description),
        }
    }
}

/// Completes after a fixed delay, counting performed tasks. Ignores the
/// cancellation signal, which exercises the never-force-terminate rule.
#[derive(Debug)]
pub struct SlowWork {
    pub delay: Duration,
    pub performed: AtomicUsize,
}

impl SlowWork {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            performed: AtomicUsize::new(0),
        }
    }

    pub fn performed(&self) -> usize {
        self.performed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkCapability for SlowWork {
    async fn perform(
        &self,
        task: &Task,
        _inbox: &[Message],
        _shutdown: ShutdownSignal,
    ) -> WorkOutcome {
        tokio::time::sleep(self.delay).await;
        self.performed.fetch_add(1, Ordering::SeqCst);
        WorkOutcome::Completed {
            summary: format!("slow: {}", task.description),
        }
    }
}

/// Fails the first attempt and completes the retry, for exercising the
/// release-then-reclaim path after a failed work attempt.
#[derive(Debug, Default)]
pub struct FailOnceWork {
    failed: AtomicBool,
}

#[async_trait]
impl WorkCapability for FailOnceWork {
    async fn perform(
        &self,
        task: &Task,
        _inbox: &[Message],
        _shutdown: ShutdownSignal,
    ) -> WorkOutcome {
        if self.failed.swap(true, Ordering::SeqCst) {
            WorkOutcome::Completed {
                summary: format!("second try: {}", task.description),
            }
        } else {
            WorkOutcome::Failed {
                reason: "transient".into(),
            }
        }
    }
}

/// Defers the first shutdown request and approves the second, for testing
/// the defer-and-re-evaluate path.
#[derive(Debug, Default)]
pub struct DeferOnceWork {
    deferred: AtomicBool,
}

#[async_trait]
impl WorkCapability for DeferOnceWork {
    async fn perform(
        &self,
        task: &Task,
        _inbox: &[Message],
        _shutdown: ShutdownSignal,
    ) -> WorkOutcome {
        WorkOutcome::Completed {
            summary: format!("done: {}", task.description),
        }
    }

    fn decide_shutdown(&self) -> ShutdownDecision {
        if self.deferred.swap(true, Ordering::SeqCst) {
            ShutdownDecision::Approve
        } else {
            ShutdownDecision::Defer
        }
    }
}

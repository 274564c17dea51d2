//! Seams between the coordination core and the opaque agent.
//!
//! The core never reasons about task content. It hands a claimed task and a
//! mailbox snapshot to a [`WorkCapability`] and waits for the completion
//! signal; tests plug in deterministic stubs here.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::mailbox::Message;
use crate::task::Task;

/// Outcome of one work attempt.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    Completed { summary: String },
    Failed { reason: String },
}

/// The agent's answer to a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDecision {
    /// Emit `ApproveShutdown` and terminate.
    Approve,
    /// Keep working; the request is re-evaluated at the next idle point.
    Defer,
}

/// Cooperative cancellation signal handed to a running capability.
///
/// Flips to requested when a shutdown request arrives mid-work. Purely
/// advisory: the runtime never force-terminates, and a capability that
/// ignores the signal simply runs to completion.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub(crate) fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until shutdown is requested. Returns immediately if it
    /// already is, and also returns if the runtime side goes away.
    pub async fn requested(&mut self) {
        let _ = self.rx.wait_for(|requested| *requested).await;
    }
}

/// The opaque work capability of one agent.
#[async_trait]
pub trait WorkCapability: Send + Sync {
    /// Perform a claimed task. `inbox` is the agent's mailbox at the moment
    /// work starts; messages arriving later do not preempt and are consulted
    /// at the next poll.
    async fn perform(&self, task: &Task, inbox: &[Message], shutdown: ShutdownSignal)
    -> WorkOutcome;

    /// Decide on a pending shutdown request, evaluated only outside of work.
    fn decide_shutdown(&self) -> ShutdownDecision {
        ShutdownDecision::Approve
    }
}

/// Role filter an agent applies to the claimable list. Opaque to the core.
pub trait RoleFilter: Send + Sync {
    fn accepts(&self, task: &Task) -> bool;
}

/// Accepts every task; the lead's filter.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyTask;

impl RoleFilter for AnyTask {
    fn accepts(&self, _task: &Task) -> bool {
        true
    }
}

/// [`RoleFilter`] backed by a predicate closure. Built with [`filter_fn`].
pub struct FilterFn<F>(F);

/// Wrap a predicate closure as a [`RoleFilter`].
pub fn filter_fn<F>(predicate: F) -> FilterFn<F>
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    FilterFn(predicate)
}

impl<F> RoleFilter for FilterFn<F>
where
    F: Fn(&Task) -> bool + Send + Sync,
{
    fn accepts(&self, task: &Task) -> bool {
        (self.0)(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::TaskId;

    fn task(description: &str) -> Task {
        Task::new(TaskId::default(), description.into(), Vec::new())
    }

    #[test]
    fn test_any_task_filter() {
        assert!(AnyTask.accepts(&task("anything")));
    }

    #[test]
    fn test_closure_filter() {
        let filter = filter_fn(|t: &Task| t.description.starts_with("docs:"));
        assert!(filter.accepts(&task("docs: write readme")));
        assert!(!filter.accepts(&task("code: refactor")));
    }

    #[tokio::test]
    async fn test_shutdown_signal_flips() {
        let (tx, rx) = watch::channel(false);
        let mut signal = ShutdownSignal::new(rx);
        assert!(!signal.is_requested());

        tx.send_replace(true);
        signal.requested().await;
        assert!(signal.is_requested());
    }
}

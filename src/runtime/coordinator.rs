//! Per-agent control loop.
//!
//! One coordinator runs per teammate (and one for the lead). It cooperates
//! with the rest of the team only through the task store and the mailbox
//! hub, and reports its transitions to the session over the event channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::capability::{RoleFilter, ShutdownDecision, ShutdownSignal, WorkCapability, WorkOutcome};
use crate::config::TeamConfig;
use crate::error::{Result, TeamError};
use crate::mailbox::{MailboxHub, Message, MessageKind};
use crate::session::SessionEvent;
use crate::task::{Task, TaskStore};
use crate::team::{AgentId, AgentLifecycle};

/// States of the per-agent machine. `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Active,
    AwaitingWork,
    Working,
    Idle,
    ShutdownRequested,
    Terminated,
}

impl RuntimeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AwaitingWork => "awaiting_work",
            Self::Working => "working",
            Self::Idle => "idle",
            Self::ShutdownRequested => "shutdown_requested",
            Self::Terminated => "terminated",
        }
    }

    /// Roster lifecycle this state maps to.
    pub fn lifecycle(&self) -> AgentLifecycle {
        match self {
            Self::Active | Self::AwaitingWork | Self::Working => AgentLifecycle::Active,
            Self::Idle => AgentLifecycle::Idle,
            Self::ShutdownRequested => AgentLifecycle::ShutdownRequested,
            Self::Terminated => AgentLifecycle::Terminated,
        }
    }
}

pub(crate) struct Coordinator {
    id: AgentId,
    filter: Arc<dyn RoleFilter>,
    capability: Arc<dyn WorkCapability>,
    tasks: Arc<TaskStore>,
    mail: Arc<MailboxHub>,
    events: mpsc::UnboundedSender<SessionEvent>,
    idle_repoll: Duration,
    work_poll: Duration,
    shutdown_tx: watch::Sender<bool>,
    state: RuntimeState,
    current: Option<Task>,
    pending_shutdown: Option<AgentId>,
}

impl Coordinator {
    pub(crate) fn new(
        id: AgentId,
        filter: Arc<dyn RoleFilter>,
        capability: Arc<dyn WorkCapability>,
        tasks: Arc<TaskStore>,
        mail: Arc<MailboxHub>,
        events: mpsc::UnboundedSender<SessionEvent>,
        config: &TeamConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            id,
            filter,
            capability,
            tasks,
            mail,
            events,
            idle_repoll: config.idle_repoll(),
            work_poll: config.work_poll(),
            shutdown_tx,
            state: RuntimeState::Active,
            current: None,
            pending_shutdown: None,
        }
    }

    pub(crate) async fn run(mut self) {
        info!(agent = %self.id, "Coordinator started");
        self.transition(RuntimeState::AwaitingWork);

        loop {
            let next = match self.state {
                RuntimeState::Active => RuntimeState::AwaitingWork,
                RuntimeState::AwaitingWork => self.poll_for_work(),
                RuntimeState::Working => self.run_working().await,
                RuntimeState::Idle => self.idle_wait().await,
                RuntimeState::ShutdownRequested => self.settle_shutdown(),
                RuntimeState::Terminated => break,
            };
            self.transition(next);
        }

        info!(agent = %self.id, "Coordinator terminated");
    }

    fn transition(&mut self, next: RuntimeState) {
        if next == self.state {
            return;
        }
        debug!(
            agent = %self.id,
            from = self.state.as_str(),
            to = next.as_str(),
            "State transition"
        );
        self.state = next;
        let _ = self.events.send(SessionEvent::StateChanged {
            agent: self.id.clone(),
            state: next,
        });
    }

    /// `AwaitingWork`: consume inbound messages, then try to claim work. A
    /// pending shutdown request is settled only once no work is claimable,
    /// so a deferring agent keeps picking up tasks.
    fn poll_for_work(&mut self) -> RuntimeState {
        if self.drain_mailbox().is_err() {
            // Our own queue is gone; nothing left to coordinate.
            return RuntimeState::Terminated;
        }

        for candidate in self.tasks.list_claimable() {
            if !self.filter.accepts(&candidate) {
                continue;
            }
            match self.tasks.claim(candidate.id, &self.id) {
                Ok(task) => {
                    self.current = Some(task);
                    return RuntimeState::Working;
                }
                // Losing a claim race is steady-state, not an anomaly; move
                // on to the next candidate.
                Err(
                    TeamError::AlreadyOwned { .. }
                    | TeamError::NotClaimable { .. }
                    | TeamError::DependenciesUnmet { .. },
                ) => continue,
                Err(e) => {
                    warn!(agent = %self.id, task = %candidate.id, error = %e, "Claim failed");
                    continue;
                }
            }
        }

        if self.pending_shutdown.is_some() {
            return RuntimeState::ShutdownRequested;
        }
        RuntimeState::Idle
    }

    /// `Working`: invoke the capability with the claimed task and the mailbox
    /// snapshot. Messages arriving mid-work never preempt; a shutdown request
    /// only flips the advisory cancellation signal.
    async fn run_working(&mut self) -> RuntimeState {
        let Some(task) = self.current.take() else {
            return RuntimeState::AwaitingWork;
        };
        let task_id = task.id;

        self.shutdown_tx.send_replace(false);
        let inbox = self.mail.peek_all(&self.id).unwrap_or_default();
        let signal = ShutdownSignal::new(self.shutdown_tx.subscribe());

        let work = {
            let capability = Arc::clone(&self.capability);
            async move { capability.perform(&task, &inbox, signal).await }
        };
        tokio::pin!(work);

        let outcome = loop {
            tokio::select! {
                outcome = &mut work => break outcome,
                _ = tokio::time::sleep(self.work_poll) => {
                    if self.shutdown_request_arrived() {
                        self.shutdown_tx.send_replace(true);
                    }
                }
            }
        };

        match outcome {
            WorkOutcome::Completed { summary } => {
                match self.tasks.complete(task_id, &self.id) {
                    Ok(()) => {
                        debug!(agent = %self.id, task = %task_id, summary = %summary, "Task completed");
                        let _ = self.events.send(SessionEvent::TaskCompleted {
                            agent: self.id.clone(),
                            task: task_id,
                        });
                    }
                    Err(e) => {
                        warn!(agent = %self.id, task = %task_id, error = %e, "Completion rejected");
                    }
                }
            }
            WorkOutcome::Failed { reason } => {
                warn!(agent = %self.id, task = %task_id, reason = %reason, "Work failed; releasing task");
                if let Err(e) = self.tasks.release(task_id) {
                    warn!(agent = %self.id, task = %task_id, error = %e, "Release failed");
                }
            }
        }

        RuntimeState::AwaitingWork
    }

    /// `Idle`: park on the mailbox, bounded by a re-poll timer so tasks
    /// unblocked by peers are noticed even without a message.
    async fn idle_wait(&mut self) -> RuntimeState {
        let mail = Arc::clone(&self.mail);
        let tasks = Arc::clone(&self.tasks);
        let id = self.id.clone();

        tokio::select! {
            received = mail.receive_blocking(&id) => {
                match received {
                    Ok(message) => self.note_message(&message),
                    Err(_) => return RuntimeState::Terminated,
                }
            }
            _ = tokio::time::sleep(self.idle_repoll) => {}
            _ = tasks.wait_changed() => {}
        }

        RuntimeState::AwaitingWork
    }

    /// `ShutdownRequested`: consult the capability's decision. A deferred
    /// request stays pending and is settled again at the next idle point; it
    /// never needs to be re-sent.
    fn settle_shutdown(&mut self) -> RuntimeState {
        match self.capability.decide_shutdown() {
            ShutdownDecision::Approve => {
                if let Some(requester) = self.pending_shutdown.take() {
                    if let Err(e) = self.mail.send(
                        &self.id,
                        &requester,
                        MessageKind::ApproveShutdown,
                        "shutting down",
                    ) {
                        debug!(
                            agent = %self.id,
                            requester = %requester,
                            error = %e,
                            "Shutdown requester no longer addressable"
                        );
                    }
                }
                RuntimeState::Terminated
            }
            ShutdownDecision::Defer => {
                debug!(agent = %self.id, "Shutdown deferred");
                self.shutdown_tx.send_replace(false);
                RuntimeState::Idle
            }
        }
    }

    fn drain_mailbox(&mut self) -> Result<()> {
        while let Some(message) = self.mail.receive(&self.id)? {
            self.note_message(&message);
        }
        Ok(())
    }

    fn note_message(&mut self, message: &Message) {
        debug!(
            agent = %self.id,
            from = %message.sender,
            kind = message.kind.as_str(),
            sequence = message.sequence,
            "Message received"
        );
        if message.is_shutdown_request() {
            self.pending_shutdown = Some(message.sender.clone());
        }
    }

    fn shutdown_request_arrived(&self) -> bool {
        self.mail
            .unread(&self.id)
            .map(|unread| unread.iter().any(Message::is_shutdown_request))
            .unwrap_or(false)
    }
}

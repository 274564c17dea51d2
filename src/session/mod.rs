//! Team session: formation, the roster, and shutdown consensus.
//!
//! The session owns the shared services (task store, mailbox hub) and the
//! roster. It is the only writer of agent lifecycle status; coordinators
//! report over the event channel and the session applies the transitions.

mod archive;

pub use archive::{AgentSummary, SessionDescriptor, TeamArchive};

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::TeamConfig;
use crate::error::{Result, TeamError};
use crate::mailbox::{MailboxHub, MessageKind};
use crate::runtime::{AnyTask, Coordinator, RoleFilter, RuntimeState, WorkCapability};
use crate::task::{TaskSpec, TaskStore};
use crate::team::{AgentId, Roster, TaskId, Teammate};

/// Bounded wait used when re-checking a condition that a notification may
/// have raced past.
const RECHECK_INTERVAL: Duration = Duration::from_millis(200);

/// What coordinators report to the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged { agent: AgentId, state: RuntimeState },
    TaskCompleted { agent: AgentId, task: TaskId },
}

/// Process-wide state of one team, from formation to full termination.
#[derive(Debug)]
pub struct TeamSession {
    name: String,
    created_at: DateTime<Utc>,
    config: TeamConfig,
    tasks: Arc<TaskStore>,
    mail: Arc<MailboxHub>,
    roster: Arc<Mutex<Roster>>,
    roster_changed: Arc<Notify>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    pump: Mutex<Option<JoinHandle<()>>>,
    runtimes: Mutex<Vec<JoinHandle<()>>>,
}

impl TeamSession {
    /// Form a team. Fails with `TeamsDisabled` when the feature flag is off.
    pub fn form(name: impl Into<String>, config: TeamConfig) -> Result<Arc<Self>> {
        if !config.enabled {
            return Err(TeamError::TeamsDisabled);
        }
        config.validate()?;

        let name = name.into();
        let roster = Arc::new(Mutex::new(Roster::new()));
        let roster_changed = Arc::new(Notify::new());
        let mail = Arc::new(MailboxHub::new());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(Self::pump_events(
            events_rx,
            Arc::clone(&roster),
            Arc::clone(&roster_changed),
            Arc::clone(&mail),
        ));

        info!(team = %name, "Team session formed");
        Ok(Arc::new(Self {
            name,
            created_at: Utc::now(),
            config,
            tasks: Arc::new(TaskStore::new()),
            mail,
            roster,
            roster_changed,
            events_tx,
            pump: Mutex::new(Some(pump)),
            runtimes: Mutex::new(Vec::new()),
        }))
    }

    /// Applies coordinator-reported transitions to the roster. Termination
    /// also closes the agent's mailbox, removing it from the addressable set
    /// so future broadcasts exclude it.
    async fn pump_events(
        mut events_rx: mpsc::UnboundedReceiver<SessionEvent>,
        roster: Arc<Mutex<Roster>>,
        roster_changed: Arc<Notify>,
        mail: Arc<MailboxHub>,
    ) {
        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::StateChanged { agent, state } => {
                    roster.lock().set_lifecycle(&agent, state.lifecycle());
                    if state == RuntimeState::Terminated {
                        mail.close(&agent);
                    }
                    roster_changed.notify_waiters();
                }
                SessionEvent::TaskCompleted { agent, task } => {
                    debug!(agent = %agent, task = %task, "Task completion observed");
                }
            }
        }
    }

    /// Add a teammate: roster entry, mailbox, and a spawned coordinator.
    pub fn add_teammate(
        &self,
        id: AgentId,
        role: impl Into<String>,
        filter: Arc<dyn RoleFilter>,
        capability: Arc<dyn WorkCapability>,
    ) -> Result<()> {
        {
            let mut roster = self.roster.lock();
            if roster.len() >= self.config.max_teammates {
                return Err(TeamError::Session(format!(
                    "team is full ({} members)",
                    roster.len()
                )));
            }
            if !roster.register(Teammate::new(id.clone(), role)) {
                return Err(TeamError::Session(format!("agent {} already on team", id)));
            }
        }
        self.mail.register(&id)?;

        let coordinator = Coordinator::new(
            id.clone(),
            filter,
            capability,
            Arc::clone(&self.tasks),
            Arc::clone(&self.mail),
            self.events_tx.clone(),
            &self.config,
        );
        self.runtimes.lock().push(tokio::spawn(coordinator.run()));

        info!(team = %self.name, agent = %id, "Teammate joined");
        Ok(())
    }

    /// Add the team lead: same runtime, accept-anything filter, plus a
    /// handle for lead-only duties.
    pub fn add_lead(&self, id: AgentId, capability: Arc<dyn WorkCapability>) -> Result<LeadHandle> {
        self.add_teammate(id.clone(), "lead", Arc::new(AnyTask), capability)?;
        Ok(LeadHandle {
            id,
            tasks: Arc::clone(&self.tasks),
            mail: Arc::clone(&self.mail),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn tasks(&self) -> Arc<TaskStore> {
        Arc::clone(&self.tasks)
    }

    pub fn mailboxes(&self) -> Arc<MailboxHub> {
        Arc::clone(&self.mail)
    }

    pub fn roster_snapshot(&self) -> Vec<Teammate> {
        self.roster.lock().members().cloned().collect()
    }

    /// Suspend until every task on the list is completed.
    pub async fn await_all_tasks_completed(&self) {
        loop {
            if self.tasks.all_completed() {
                return;
            }
            let _ = tokio::time::timeout(RECHECK_INTERVAL, self.tasks.wait_changed()).await;
        }
    }

    /// Suspend until every roster member is terminated.
    pub async fn await_termination(&self) {
        loop {
            if self.roster.lock().all_terminated() {
                return;
            }
            let _ = tokio::time::timeout(RECHECK_INTERVAL, self.roster_changed.notified()).await;
        }
    }

    /// Tear the session down after shutdown consensus, writing the archive.
    ///
    /// Fails while any agent is still active: teardown never forces
    /// termination.
    pub async fn teardown(&self) -> Result<TeamArchive> {
        if !self.roster.lock().all_terminated() {
            return Err(TeamError::Session(
                "cannot tear down: agents still active".into(),
            ));
        }

        for handle in self.runtimes.lock().drain(..) {
            handle.abort();
        }
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }

        let descriptor = SessionDescriptor {
            name: self.name.clone(),
            created_at: self.created_at,
            torn_down_at: Utc::now(),
            agents: self
                .roster
                .lock()
                .members()
                .map(|m| AgentSummary {
                    id: m.id.clone(),
                    role: m.role.clone(),
                    lifecycle: m.lifecycle,
                })
                .collect(),
        };

        let archive = TeamArchive {
            descriptor,
            tasks: self.tasks.snapshot(),
            mailboxes: self.mail.logs(),
        };
        archive.write_to(&self.config.archive_dir).await?;

        info!(team = %self.name, "Team session torn down");
        Ok(archive)
    }
}

/// Lead-only operations: seeding the task list, plan verdicts, and driving
/// the shutdown protocol.
pub struct LeadHandle {
    id: AgentId,
    tasks: Arc<TaskStore>,
    mail: Arc<MailboxHub>,
}

impl LeadHandle {
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn create_task(
        &self,
        description: impl Into<String>,
        dependencies: Vec<TaskId>,
    ) -> Result<TaskId> {
        self.tasks.create(description, dependencies)
    }

    pub fn create_batch(&self, specs: Vec<TaskSpec>) -> Result<Vec<TaskId>> {
        self.tasks.create_batch(specs)
    }

    pub fn send(
        &self,
        to: &AgentId,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Result<String> {
        self.mail.send(&self.id, to, kind, payload)
    }

    pub fn broadcast(&self, kind: MessageKind, payload: impl Into<String>) -> Result<Vec<String>> {
        self.mail.broadcast(&self.id, kind, payload)
    }

    pub fn approve_plan(
        &self,
        to: &AgentId,
        plan_message_id: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<String> {
        self.mail
            .send_reply(&self.id, to, MessageKind::ApprovePlan, note, plan_message_id)
    }

    pub fn reject_plan(
        &self,
        to: &AgentId,
        plan_message_id: impl Into<String>,
        note: impl Into<String>,
    ) -> Result<String> {
        self.mail
            .send_reply(&self.id, to, MessageKind::RejectPlan, note, plan_message_id)
    }

    /// Ask every other active teammate to wind down. Advisory: each agent
    /// finishes its current task and decides for itself.
    pub fn request_shutdown_all(&self) -> Result<Vec<String>> {
        self.mail
            .broadcast(&self.id, MessageKind::RequestShutdown, "wrap up")
    }

    /// Ask the lead's own runtime to wind down (a self-addressed shutdown
    /// request), used once the rest of the team has terminated.
    pub fn retire(&self) -> Result<String> {
        self.mail
            .send(&self.id, &self.id, MessageKind::RequestShutdown, "wrap up")
    }
}

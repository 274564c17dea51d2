//! Per-agent mailboxes behind a directory, plus broadcast fan-out.
//!
//! Agents never hold references to each other; they address peers through
//! this hub. Terminating an agent closes its queue, which removes it from
//! the addressable set while keeping the delivered log for audit.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use super::message::{Message, MessageKind};
use crate::error::{Result, TeamError};
use crate::team::AgentId;

#[derive(Debug)]
struct Queue {
    entries: Vec<Message>,
    /// Index of the oldest undelivered entry.
    cursor: usize,
    next_sequence: u64,
    /// Closed queues reject sends but keep their log until teardown.
    closed: bool,
    bell: Arc<Notify>,
}

impl Queue {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            next_sequence: 0,
            closed: false,
            bell: Arc::new(Notify::new()),
        }
    }

    fn push(&mut self, mut message: Message) -> (String, u64) {
        message.sequence = self.next_sequence;
        self.next_sequence += 1;
        let id = message.id.clone();
        let sequence = message.sequence;
        self.entries.push(message);
        self.bell.notify_one();
        (id, sequence)
    }

    fn pop(&mut self) -> Option<Message> {
        let message = self.entries.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(message)
    }
}

/// Directory of per-agent message queues.
#[derive(Debug, Default)]
pub struct MailboxHub {
    queues: Mutex<BTreeMap<AgentId, Queue>>,
}

impl MailboxHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an agent addressable. Idempotent for an open queue; reopening a
    /// closed queue is refused because termination is final.
    pub fn register(&self, agent: &AgentId) -> Result<()> {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get(agent) {
            if queue.closed {
                return Err(TeamError::UnknownRecipient(agent.clone()));
            }
            return Ok(());
        }
        queues.insert(agent.clone(), Queue::new());
        debug!(agent = %agent, "Mailbox registered");
        Ok(())
    }

    /// Remove an agent from the addressable set, retaining its log.
    pub fn close(&self, agent: &AgentId) {
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get_mut(agent) {
            queue.closed = true;
            // Wake a parked receiver so it can observe termination.
            queue.bell.notify_one();
            debug!(agent = %agent, "Mailbox closed");
        }
    }

    /// Append a message to the recipient's queue with the next sequence
    /// number. `UnknownRecipient` is the only failure mode.
    pub fn send(
        &self,
        from: &AgentId,
        to: &AgentId,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Result<String> {
        self.enqueue(from, to, kind, payload.into(), None)
    }

    /// Like [`MailboxHub::send`], with a correlation id referencing a prior
    /// message (plan approvals and rejections use this).
    pub fn send_reply(
        &self,
        from: &AgentId,
        to: &AgentId,
        kind: MessageKind,
        payload: impl Into<String>,
        correlates_to: impl Into<String>,
    ) -> Result<String> {
        self.enqueue(from, to, kind, payload.into(), Some(correlates_to.into()))
    }

    fn enqueue(
        &self,
        from: &AgentId,
        to: &AgentId,
        kind: MessageKind,
        payload: String,
        correlation_id: Option<String>,
    ) -> Result<String> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(to)
            .filter(|q| !q.closed)
            .ok_or_else(|| TeamError::UnknownRecipient(to.clone()))?;

        let (id, sequence) = queue.push(Message {
            id: Uuid::new_v4().to_string(),
            sequence: 0,
            sender: from.clone(),
            recipient: to.clone(),
            kind,
            payload,
            correlation_id,
            sent_at: Utc::now(),
        });
        drop(queues);

        debug!(from = %from, to = %to, kind = kind.as_str(), sequence, "Message enqueued");
        Ok(id)
    }

    /// Atomically enqueue one copy per currently open queue except the
    /// sender's. Membership is evaluated under the lock, so an agent that
    /// joins after the call never receives the broadcast retroactively.
    pub fn broadcast(
        &self,
        from: &AgentId,
        kind: MessageKind,
        payload: impl Into<String>,
    ) -> Result<Vec<String>> {
        let payload = payload.into();
        let mut queues = self.queues.lock();
        let mut ids = Vec::new();

        for (recipient, queue) in queues.iter_mut() {
            if recipient == from || queue.closed {
                continue;
            }
            let (id, _) = queue.push(Message {
                id: Uuid::new_v4().to_string(),
                sequence: 0,
                sender: from.clone(),
                recipient: recipient.clone(),
                kind,
                payload: payload.clone(),
                correlation_id: None,
                sent_at: Utc::now(),
            });
            ids.push(id);
        }
        drop(queues);

        debug!(from = %from, kind = kind.as_str(), recipients = ids.len(), "Broadcast enqueued");
        Ok(ids)
    }

    /// Oldest undelivered message, advancing the read cursor. The entry is
    /// retained for audit until teardown.
    pub fn receive(&self, agent: &AgentId) -> Result<Option<Message>> {
        let mut queues = self.queues.lock();
        let queue = queues
            .get_mut(agent)
            .ok_or_else(|| TeamError::UnknownAgent(agent.clone()))?;
        Ok(queue.pop())
    }

    /// Suspend until a message is available, then deliver it.
    ///
    /// Cancel-safe: a message is only consumed when the future returns it.
    /// Callers bound the wait (select against a re-poll timer) to guarantee
    /// periodic task-list polling even without traffic.
    pub async fn receive_blocking(&self, agent: &AgentId) -> Result<Message> {
        loop {
            let bell = {
                let mut queues = self.queues.lock();
                let queue = queues
                    .get_mut(agent)
                    .ok_or_else(|| TeamError::UnknownAgent(agent.clone()))?;
                if let Some(message) = queue.pop() {
                    return Ok(message);
                }
                if queue.closed {
                    return Err(TeamError::UnknownAgent(agent.clone()));
                }
                Arc::clone(&queue.bell)
            };
            bell.notified().await;
        }
    }

    /// Non-destructive view of an agent's full queue, delivered and pending.
    pub fn peek_all(&self, agent: &AgentId) -> Result<Vec<Message>> {
        let queues = self.queues.lock();
        let queue = queues
            .get(agent)
            .ok_or_else(|| TeamError::UnknownAgent(agent.clone()))?;
        Ok(queue.entries.clone())
    }

    /// Undelivered messages, without advancing the cursor.
    pub fn unread(&self, agent: &AgentId) -> Result<Vec<Message>> {
        let queues = self.queues.lock();
        let queue = queues
            .get(agent)
            .ok_or_else(|| TeamError::UnknownAgent(agent.clone()))?;
        Ok(queue.entries[queue.cursor..].to_vec())
    }

    /// Agents currently addressable (open queues).
    pub fn recipients(&self) -> Vec<AgentId> {
        self.queues
            .lock()
            .iter()
            .filter(|(_, q)| !q.closed)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every agent that ever had a queue, with its full log. Used by the
    /// teardown archive.
    pub fn logs(&self) -> BTreeMap<AgentId, Vec<Message>> {
        self.queues
            .lock()
            .iter()
            .map(|(id, q)| (id.clone(), q.entries.clone()))
            .collect()
    }
}

//! Message types for teammate-to-teammate communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::team::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary peer-to-peer text.
    Chat,
    /// Fan-out to every active teammate except the sender.
    Broadcast,
    /// Lead approves a plan; correlates to the plan submission message.
    ApprovePlan,
    /// Lead rejects a plan; correlates to the plan submission message.
    RejectPlan,
    /// Advisory request that the recipient wind down.
    RequestShutdown,
    /// Recipient's consent to terminate, addressed to the requester.
    ApproveShutdown,
}

impl MessageKind {
    /// Shutdown-protocol kinds must be observed by the coordinator runtime,
    /// never just buffered for the work capability.
    pub fn is_shutdown_control(&self) -> bool {
        matches!(self, Self::RequestShutdown | Self::ApproveShutdown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Broadcast => "broadcast",
            Self::ApprovePlan => "approve_plan",
            Self::RejectPlan => "reject_plan",
            Self::RequestShutdown => "request_shutdown",
            Self::ApproveShutdown => "approve_shutdown",
        }
    }
}

/// One delivered-or-pending entry in a recipient's queue.
///
/// `sequence` is monotonic per recipient; delivery order to a recipient is
/// exactly non-decreasing sequence, with no reordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sequence: u64,
    pub sender: AgentId,
    pub recipient: AgentId,
    pub kind: MessageKind,
    /// Opaque text; the core never interprets it.
    pub payload: String,
    /// References a prior message, e.g. the plan submission an
    /// `ApprovePlan`/`RejectPlan` answers.
    pub correlation_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn is_shutdown_request(&self) -> bool {
        self.kind == MessageKind::RequestShutdown
    }
}

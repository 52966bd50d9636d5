use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Background job kinds the Task Manager accepts. `Enqueue` access
/// control (admin-only vs any user) is enforced by the caller, not by
/// this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskKind {
    ResetMonthlyFreeTurns,
    SendBulkEmail { template: String, recipient_ids: Vec<Uuid> },
    SendSingleEmail { template: String, recipient_id: Uuid },
    ProcessDailyReminders,
    SendSystemNotification { message: String },
    CleanupTasks { older_than_days: u32 },
    RecoverPendingPayments,
}

impl TaskKind {
    /// Queue a kind is routed to, matching spec.md §4.7.
    pub fn queue(&self) -> &'static str {
        match self {
            Self::SendBulkEmail { .. } | Self::SendSingleEmail { .. } => "email",
            Self::ResetMonthlyFreeTurns
            | Self::ProcessDailyReminders
            | Self::SendSystemNotification { .. }
            | Self::CleanupTasks { .. }
            | Self::RecoverPendingPayments => "notifications",
        }
    }

    /// Only administrators may enqueue these kinds.
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Self::ResetMonthlyFreeTurns
                | Self::SendSystemNotification { .. }
                | Self::CleanupTasks { .. }
                | Self::RecoverPendingPayments
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub kind: TaskKind,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub owner_id: Option<Uuid>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(id: Uuid, kind: TaskKind, owner_id: Option<Uuid>, now: DateTime<Utc>) -> Self {
        Self { id, kind, state: TaskState::Pending, created_at: now, owner_id, result: None, error: None }
    }
}

/// Default retention window for completed tasks, per spec.md §3.
pub const DEFAULT_TASK_RETENTION_DAYS: u32 = 30;

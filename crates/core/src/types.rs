//! Domain records shared across the automation and experimentation engines.
//!
//! Status enums keep the SCREAMING_SNAKE_CASE wire casing used by the
//! surrounding CRM API so persisted records round-trip unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

/// A CRM lead record. `status` is free-form because workflow actions may set
/// organization-defined pipeline stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: String,
    pub source: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub tags: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A CRM user (agent) that leads can be assigned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Read-only projection of a lead with its assignee and tags resolved,
/// fetched once per workflow execution. Used for template substitution and
/// as the target of status/tag actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSnapshot {
    pub lead: Lead,
    pub assignee: Option<User>,
    pub tags: Vec<Tag>,
}

impl LeadSnapshot {
    /// Look up a lead field by template name. Unknown names return `None`
    /// so the resolver can leave the token verbatim.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.lead.id.to_string()),
            "name" => Some(
                format!("{} {}", self.lead.first_name, self.lead.last_name)
                    .trim()
                    .to_string(),
            ),
            "first_name" => Some(self.lead.first_name.clone()),
            "last_name" => Some(self.lead.last_name.clone()),
            "email" => Some(self.lead.email.clone()),
            "phone" => self.lead.phone.clone(),
            "status" => Some(self.lead.status.clone()),
            "source" => self.lead.source.clone(),
            "assignee" => self.assignee.as_ref().map(|u| u.name.clone()),
            _ => None,
        }
    }
}

/// A tag that can be linked to leads (many-to-many, unique by name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tasks & activities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

/// A follow-up task, optionally linked to a lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub lead_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// The kind of activity appended to a lead's timeline by the engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    EmailSent,
    SmsSent,
    StatusChanged,
    Note,
}

/// An entry in a lead's activity timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub activity_type: ActivityType,
    pub title: String,
    pub description: Option<String>,
    pub lead_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

/// What causes an execution of this workflow to be created by the trigger
/// service. Metadata only as far as this core is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerKind {
    LeadCreated,
    LeadStatusChanged,
    EmailOpened,
    ScoreThreshold,
    CampaignCompleted,
    TimeBased,
    Manual,
}

/// One typed step of a workflow. `config` stays a generic JSON map here;
/// the dispatcher decodes it into a typed action at the execution boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(default)]
    pub config: serde_json::Value,
    /// Requested delay before the next action, in seconds. Recorded as
    /// intent only; this core does not schedule.
    #[serde(default)]
    pub delay: Option<u64>,
}

/// A workflow definition: trigger descriptor plus an ordered action list.
/// Immutable once read by an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub trigger: TriggerKind,
    pub is_active: bool,
    pub actions: Vec<WorkflowAction>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Success,
    Failed,
}

/// One triggered run of a workflow. Created PENDING by the trigger service;
/// completed exactly once by the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// A/B tests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbTestType {
    EmailSubject,
    EmailContent,
    SmsMessage,
    SendTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbTestStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

/// One of the two treatments in an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    A,
    B,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::A => write!(f, "A"),
            Variant::B => write!(f, "B"),
        }
    }
}

/// An A/B test comparing two opaque variant payloads (e.g. message content).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTest {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub test_type: AbTestType,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub variant_a: serde_json::Value,
    pub variant_b: serde_json::Value,
    pub status: AbTestStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub participant_count: u64,
    pub winner: Option<Variant>,
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Per-participant tracking row. Created once at assignment; each interaction
/// stamps at most one field; never deleted while its test exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestResult {
    pub id: Uuid,
    pub test_id: Uuid,
    pub variant: Variant,
    pub lead_id: Option<Uuid>,
    pub campaign_id: Option<Uuid>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub converted: bool,
    pub created_at: DateTime<Utc>,
}

/// A behavioral interaction recorded against a test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Open,
    Click,
    Reply,
    Conversion,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lead() -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            first_name: "Amy".to_string(),
            last_name: "Nguyen".to_string(),
            email: "amy@example.com".to_string(),
            phone: None,
            status: "NEW".to_string(),
            source: Some("website".to_string()),
            assigned_to: None,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_snapshot_field_lookup() {
        let snapshot = LeadSnapshot {
            lead: sample_lead(),
            assignee: None,
            tags: vec![],
        };

        assert_eq!(snapshot.field("name").unwrap(), "Amy Nguyen");
        assert_eq!(snapshot.field("email").unwrap(), "amy@example.com");
        assert_eq!(snapshot.field("status").unwrap(), "NEW");
        assert!(snapshot.field("phone").is_none());
        assert!(snapshot.field("no_such_field").is_none());
    }

    #[test]
    fn test_status_enum_wire_casing() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Pending).unwrap(),
            "\"PENDING\""
        );
        assert_eq!(
            serde_json::to_string(&AbTestStatus::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(
            serde_json::to_string(&ActivityType::EmailSent).unwrap(),
            "\"EMAIL_SENT\""
        );
        let status: TaskPriority = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(status, TaskPriority::Medium);
    }

    #[test]
    fn test_workflow_action_round_trip() {
        let json = serde_json::json!({
            "type": "SEND_EMAIL",
            "config": {"to": "{{lead.email}}", "subject": "Hi"},
            "delay": 300
        });
        let action: WorkflowAction = serde_json::from_value(json).unwrap();
        assert_eq!(action.action_type, "SEND_EMAIL");
        assert_eq!(action.delay, Some(300));
        assert_eq!(action.config["to"], "{{lead.email}}");
    }
}

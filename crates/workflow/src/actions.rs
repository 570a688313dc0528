//! Action dispatch — decodes generic `{type, config}` payloads into typed
//! actions at the execution boundary and runs the matching handler.
//!
//! Failure semantics are deliberately asymmetric: an unrecognized action
//! type is skipped with a warning (forward-compatible with newer workflow
//! definitions), while a recognized action that fails aborts the run.
//! UPDATE_STATUS and ADD_TAG soft-fail when no lead is in context.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_channels::MessagingProvider;
use leadflow_core::error::{CrmError, CrmResult};
use leadflow_core::types::{
    ActivityType, LeadSnapshot, Task, TaskPriority, TaskStatus, WorkflowAction,
};
use leadflow_store::CrmStore;

use crate::dates::parse_due_date;
use crate::template::resolve;

/// Per-execution context threaded through every handler.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: Uuid,
    pub execution_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub event_data: HashMap<String, serde_json::Value>,
    pub lead: Option<LeadSnapshot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailConfig {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsConfig {
    pub to: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskConfig {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusConfig {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagConfig {
    pub tag_name: Option<String>,
    pub tag_color: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WaitConfig {
    /// Requested wait in seconds. Logged only; scheduling is out of scope.
    pub duration: Option<u64>,
}

/// The six typed action kinds, decoded from a generic config map.
#[derive(Debug, Clone)]
pub enum ActionKind {
    SendEmail(EmailConfig),
    SendSms(SmsConfig),
    CreateTask(TaskConfig),
    UpdateStatus(StatusConfig),
    AddTag(TagConfig),
    Wait(WaitConfig),
}

impl ActionKind {
    /// Decode a raw workflow action. Returns `Ok(None)` for unrecognized
    /// types so the dispatcher can skip them without failing the run.
    pub fn decode(action: &WorkflowAction) -> CrmResult<Option<ActionKind>> {
        // A definition may omit `config` entirely, which deserializes to
        // null; every config struct accepts the empty map.
        let config = if action.config.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            action.config.clone()
        };
        let kind = match action.action_type.as_str() {
            "SEND_EMAIL" => Some(ActionKind::SendEmail(serde_json::from_value(config)?)),
            "SEND_SMS" => Some(ActionKind::SendSms(serde_json::from_value(config)?)),
            "CREATE_TASK" => Some(ActionKind::CreateTask(serde_json::from_value(config)?)),
            "UPDATE_STATUS" => Some(ActionKind::UpdateStatus(serde_json::from_value(config)?)),
            "ADD_TAG" => Some(ActionKind::AddTag(serde_json::from_value(config)?)),
            "WAIT" => Some(ActionKind::Wait(serde_json::from_value(config)?)),
            _ => None,
        };
        Ok(kind)
    }
}

/// Outcome of a single dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Executed,
    /// The action type was not recognized and the step was skipped.
    Skipped,
}

/// Maps typed actions to handlers against the store and messaging
/// collaborators. Stateless between dispatches.
pub struct ActionDispatcher {
    store: Arc<CrmStore>,
    messaging: Arc<dyn MessagingProvider>,
}

impl ActionDispatcher {
    pub fn new(store: Arc<CrmStore>, messaging: Arc<dyn MessagingProvider>) -> Self {
        Self { store, messaging }
    }

    /// Execute one action in the given context.
    pub fn dispatch(
        &self,
        action: &WorkflowAction,
        ctx: &ExecutionContext,
    ) -> CrmResult<DispatchOutcome> {
        let Some(kind) = ActionKind::decode(action)? else {
            warn!(
                action_type = %action.action_type,
                execution_id = %ctx.execution_id,
                "Unknown action type, skipping"
            );
            return Ok(DispatchOutcome::Skipped);
        };

        match kind {
            ActionKind::SendEmail(config) => self.send_email(&config, ctx)?,
            ActionKind::SendSms(config) => self.send_sms(&config, ctx)?,
            ActionKind::CreateTask(config) => self.create_task(&config, ctx)?,
            ActionKind::UpdateStatus(config) => self.update_status(&config, ctx)?,
            ActionKind::AddTag(config) => self.add_tag(&config, ctx)?,
            ActionKind::Wait(config) => self.wait(&config, ctx),
        }

        metrics::counter!(
            "workflow.actions_executed",
            "type" => action.action_type.clone()
        )
        .increment(1);

        Ok(DispatchOutcome::Executed)
    }

    fn resolve_field(&self, template: Option<&str>, ctx: &ExecutionContext) -> String {
        resolve(template, ctx.lead.as_ref(), &ctx.event_data)
    }

    fn send_email(&self, config: &EmailConfig, ctx: &ExecutionContext) -> CrmResult<()> {
        let to = self.resolve_field(config.to.as_deref(), ctx);
        let subject = self.resolve_field(config.subject.as_deref(), ctx);
        let body = self.resolve_field(config.body.as_deref(), ctx);

        self.messaging
            .send_email(&to, &subject, &body)
            .map_err(CrmError::Action)?;

        // Activity logging is best-effort: no lead, no timeline entry.
        if ctx.lead_id.is_some() {
            self.store.record_activity(
                ActivityType::EmailSent,
                "Workflow email sent",
                Some(format!("Email sent via workflow: {}", subject)),
                ctx.lead_id,
                serde_json::json!({
                    "workflow_id": ctx.workflow_id,
                    "execution_id": ctx.execution_id,
                    "to": to,
                    "subject": subject,
                }),
            );
        }
        Ok(())
    }

    fn send_sms(&self, config: &SmsConfig, ctx: &ExecutionContext) -> CrmResult<()> {
        let to = self.resolve_field(config.to.as_deref(), ctx);
        let message = self.resolve_field(config.message.as_deref(), ctx);

        self.messaging
            .send_sms(&to, &message)
            .map_err(CrmError::Action)?;

        if ctx.lead_id.is_some() {
            let preview: String = message.chars().take(50).collect();
            self.store.record_activity(
                ActivityType::SmsSent,
                "Workflow SMS sent",
                Some(format!("SMS sent via workflow: {}", preview)),
                ctx.lead_id,
                serde_json::json!({
                    "workflow_id": ctx.workflow_id,
                    "execution_id": ctx.execution_id,
                    "to": to,
                    "message": message,
                }),
            );
        }
        Ok(())
    }

    fn create_task(&self, config: &TaskConfig, ctx: &ExecutionContext) -> CrmResult<()> {
        let title = self.resolve_field(config.title.as_deref(), ctx);
        let description = config
            .description
            .as_deref()
            .map(|d| self.resolve_field(Some(d), ctx));

        // A malformed optional due date downgrades to "no due date" rather
        // than failing the whole workflow.
        let due_date = match config.due_date.as_deref() {
            Some(raw) => match parse_due_date(raw) {
                Ok(date) => Some(date),
                Err(e) => {
                    warn!(
                        due_date = %raw,
                        error = %e,
                        "Unparseable due date, creating task without one"
                    );
                    None
                }
            },
            None => None,
        };

        let task = self.store.create_task(Task {
            id: Uuid::new_v4(),
            title,
            description,
            due_date,
            priority: config.priority.unwrap_or_default(),
            status: TaskStatus::Pending,
            lead_id: ctx.lead_id,
            created_at: Utc::now(),
        });

        info!(task_id = %task.id, title = %task.title, "Created task");
        Ok(())
    }

    fn update_status(&self, config: &StatusConfig, ctx: &ExecutionContext) -> CrmResult<()> {
        let Some(lead_id) = ctx.lead_id else {
            warn!(
                execution_id = %ctx.execution_id,
                "Cannot update status: no lead in context"
            );
            return Ok(());
        };
        let status = config
            .status
            .as_deref()
            .ok_or_else(|| CrmError::Action("UPDATE_STATUS requires a status".to_string()))?;

        self.store.update_lead_status(lead_id, status)?;
        self.store.record_activity(
            ActivityType::StatusChanged,
            "Status changed by workflow",
            Some(format!("Lead status changed to {} by workflow", status)),
            Some(lead_id),
            serde_json::json!({
                "workflow_id": ctx.workflow_id,
                "execution_id": ctx.execution_id,
                "new_status": status,
            }),
        );

        info!(lead_id = %lead_id, status = %status, "Updated lead status");
        Ok(())
    }

    fn add_tag(&self, config: &TagConfig, ctx: &ExecutionContext) -> CrmResult<()> {
        let Some(lead_id) = ctx.lead_id else {
            warn!(
                execution_id = %ctx.execution_id,
                "Cannot add tag: no lead in context"
            );
            return Ok(());
        };
        let name = config
            .tag_name
            .as_deref()
            .ok_or_else(|| CrmError::Action("ADD_TAG requires a tag_name".to_string()))?;
        let color = config.tag_color.as_deref().unwrap_or("blue");

        let tag = self.store.find_or_create_tag(name, color);
        let linked = self.store.link_tag(lead_id, tag.id)?;
        if linked {
            info!(lead_id = %lead_id, tag = %tag.name, "Tag added");
        } else {
            info!(lead_id = %lead_id, tag = %tag.name, "Tag already linked");
        }
        Ok(())
    }

    fn wait(&self, config: &WaitConfig, ctx: &ExecutionContext) {
        info!(
            execution_id = %ctx.execution_id,
            duration_secs = config.duration.unwrap_or(0),
            "Wait action (no-op, scheduling is out of scope)"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_channels::{CaptureProvider, SentMessage};
    use leadflow_core::types::Lead;

    fn sample_lead() -> Lead {
        let now = Utc::now();
        Lead {
            id: Uuid::new_v4(),
            first_name: "Amy".to_string(),
            last_name: "Tran".to_string(),
            email: "amy@example.com".to_string(),
            phone: Some("+15550003333".to_string()),
            status: "NEW".to_string(),
            source: None,
            assigned_to: None,
            tags: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    struct Fixture {
        store: Arc<CrmStore>,
        provider: Arc<CaptureProvider>,
        dispatcher: ActionDispatcher,
        ctx: ExecutionContext,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(CrmStore::new());
        let provider = Arc::new(CaptureProvider::new());
        let dispatcher = ActionDispatcher::new(store.clone(), provider.clone());

        let lead_id = store.insert_lead(sample_lead());
        let execution = store.create_execution(Uuid::new_v4(), Some(lead_id));
        let ctx = ExecutionContext {
            workflow_id: execution.workflow_id,
            execution_id: execution.id,
            lead_id: Some(lead_id),
            event_data: HashMap::new(),
            lead: store.lead_snapshot(lead_id),
        };

        Fixture {
            store,
            provider,
            dispatcher,
            ctx,
        }
    }

    fn action(action_type: &str, config: serde_json::Value) -> WorkflowAction {
        WorkflowAction {
            action_type: action_type.to_string(),
            config,
            delay: None,
        }
    }

    #[test]
    fn test_send_email_resolves_templates_and_logs_activity() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(
                &action(
                    "SEND_EMAIL",
                    serde_json::json!({
                        "to": "{{lead.email}}",
                        "subject": "Hello {{lead.name}}",
                        "body": "Welcome!"
                    }),
                ),
                &f.ctx,
            )
            .unwrap();

        assert_eq!(outcome, DispatchOutcome::Executed);
        assert_eq!(
            f.provider.sent(),
            vec![SentMessage::Email {
                to: "amy@example.com".into(),
                subject: "Hello Amy Tran".into(),
                body: "Welcome!".into(),
            }]
        );

        let activities = f.store.activities_for_lead(f.ctx.lead_id.unwrap());
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::EmailSent);
    }

    #[test]
    fn test_send_email_without_lead_skips_activity() {
        let f = fixture();
        let ctx = ExecutionContext {
            lead_id: None,
            lead: None,
            ..f.ctx.clone()
        };

        f.dispatcher
            .dispatch(
                &action("SEND_EMAIL", serde_json::json!({"to": "x@example.com"})),
                &ctx,
            )
            .unwrap();

        assert_eq!(f.provider.count(), 1);
        // No lead, no timeline entry anywhere.
        assert!(f.store.activities_for_lead(f.ctx.lead_id.unwrap()).is_empty());
    }

    #[test]
    fn test_create_task_with_relative_due_date() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                &action(
                    "CREATE_TASK",
                    serde_json::json!({
                        "title": "Call {{lead.name}}",
                        "due_date": "+3 days",
                        "priority": "HIGH"
                    }),
                ),
                &f.ctx,
            )
            .unwrap();

        let tasks = f.store.tasks_for_lead(f.ctx.lead_id.unwrap());
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.title, "Call Amy Tran");
        assert_eq!(task.priority, TaskPriority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        let due = task.due_date.unwrap();
        let expected = Utc::now() + chrono::Duration::days(3);
        assert!((due - expected).num_seconds().abs() <= 1);
    }

    #[test]
    fn test_create_task_bad_due_date_downgrades() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                &action(
                    "CREATE_TASK",
                    serde_json::json!({"title": "Follow up", "due_date": "whenever"}),
                ),
                &f.ctx,
            )
            .unwrap();

        let tasks = f.store.tasks_for_lead(f.ctx.lead_id.unwrap());
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].due_date.is_none());
        assert_eq!(tasks[0].priority, TaskPriority::Medium);
    }

    #[test]
    fn test_update_status_soft_fails_without_lead() {
        let f = fixture();
        let ctx = ExecutionContext {
            lead_id: None,
            lead: None,
            ..f.ctx.clone()
        };

        let outcome = f
            .dispatcher
            .dispatch(
                &action("UPDATE_STATUS", serde_json::json!({"status": "CONTACTED"})),
                &ctx,
            )
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Executed);
    }

    #[test]
    fn test_update_status_changes_lead_and_records_activity() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                &action("UPDATE_STATUS", serde_json::json!({"status": "QUALIFIED"})),
                &f.ctx,
            )
            .unwrap();

        let lead = f.store.get_lead(f.ctx.lead_id.unwrap()).unwrap();
        assert_eq!(lead.status, "QUALIFIED");
        let activities = f.store.activities_for_lead(lead.id);
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].activity_type, ActivityType::StatusChanged);
    }

    #[test]
    fn test_add_tag_twice_links_once() {
        let f = fixture();
        let tag_action = action(
            "ADD_TAG",
            serde_json::json!({"tag_name": "hot-lead", "tag_color": "red"}),
        );

        f.dispatcher.dispatch(&tag_action, &f.ctx).unwrap();
        f.dispatcher.dispatch(&tag_action, &f.ctx).unwrap();

        let lead = f.store.get_lead(f.ctx.lead_id.unwrap()).unwrap();
        assert_eq!(lead.tags.len(), 1);
        let tag = f.store.find_tag_by_name("hot-lead").unwrap();
        assert_eq!(tag.color, "red");
    }

    #[test]
    fn test_unknown_action_type_skipped() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&action("LAUNCH_ROCKET", serde_json::json!({})), &f.ctx)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped);
    }

    #[test]
    fn test_wait_is_noop() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&action("WAIT", serde_json::json!({"duration": 300})), &f.ctx)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Executed);
    }

    #[test]
    fn test_send_sms_failure_propagates() {
        let f = fixture();
        f.provider.fail_after(0);

        let err = f
            .dispatcher
            .dispatch(
                &action(
                    "SEND_SMS",
                    serde_json::json!({"to": "{{lead.phone}}", "message": "Hi {{lead.first_name}}"}),
                ),
                &f.ctx,
            )
            .unwrap_err();
        assert!(matches!(err, CrmError::Action(_)));
    }
}

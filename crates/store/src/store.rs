use chrono::{Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use leadflow_core::error::{CrmError, CrmResult};
use leadflow_core::types::{
    AbTest, AbTestResult, AbTestStatus, Activity, ActivityType, ExecutionStatus, Lead,
    LeadSnapshot, Tag, Task, TriggerKind, User, Variant, WorkflowAction, WorkflowDefinition,
    WorkflowExecution,
};

/// Aggregate workflow execution statistics over a trailing window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub pending: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
}

/// Thread-safe in-memory store for leads, tasks, tags, activities, workflow
/// definitions/executions, A/B tests, and test results.
pub struct CrmStore {
    leads: DashMap<Uuid, Lead>,
    users: DashMap<Uuid, User>,
    tags: DashMap<Uuid, Tag>,
    tasks: DashMap<Uuid, Task>,
    activities: DashMap<Uuid, Activity>,
    workflows: DashMap<Uuid, WorkflowDefinition>,
    executions: DashMap<Uuid, WorkflowExecution>,
    tests: DashMap<Uuid, AbTest>,
    results: DashMap<Uuid, AbTestResult>,
}

impl CrmStore {
    pub fn new() -> Self {
        info!("CRM store initialized (in-memory, development mode)");
        Self {
            leads: DashMap::new(),
            users: DashMap::new(),
            tags: DashMap::new(),
            tasks: DashMap::new(),
            activities: DashMap::new(),
            workflows: DashMap::new(),
            executions: DashMap::new(),
            tests: DashMap::new(),
            results: DashMap::new(),
        }
    }

    // ─── Leads & users ─────────────────────────────────────────────────────

    pub fn insert_lead(&self, lead: Lead) -> Uuid {
        let id = lead.id;
        self.leads.insert(id, lead);
        id
    }

    pub fn get_lead(&self, id: Uuid) -> Option<Lead> {
        self.leads.get(&id).map(|r| r.value().clone())
    }

    pub fn insert_user(&self, user: User) -> Uuid {
        let id = user.id;
        self.users.insert(id, user);
        id
    }

    pub fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).map(|r| r.value().clone())
    }

    /// Fetch a lead with its assignee and tags resolved. One call per
    /// workflow execution; the engine never re-reads the lead mid-run.
    pub fn lead_snapshot(&self, id: Uuid) -> Option<LeadSnapshot> {
        let lead = self.get_lead(id)?;
        let assignee = lead.assigned_to.and_then(|uid| self.get_user(uid));
        let tags = lead
            .tags
            .iter()
            .filter_map(|tid| self.tags.get(tid).map(|r| r.value().clone()))
            .collect();
        Some(LeadSnapshot {
            lead,
            assignee,
            tags,
        })
    }

    pub fn update_lead_status(&self, id: Uuid, status: &str) -> CrmResult<Lead> {
        let mut entry = self.leads.get_mut(&id).ok_or(CrmError::LeadNotFound(id))?;
        let lead = entry.value_mut();
        lead.status = status.to_string();
        lead.updated_at = Utc::now();
        Ok(lead.clone())
    }

    // ─── Tags ──────────────────────────────────────────────────────────────

    pub fn find_tag_by_name(&self, name: &str) -> Option<Tag> {
        self.tags
            .iter()
            .find(|r| r.value().name == name)
            .map(|r| r.value().clone())
    }

    /// Find a tag by name, creating it with the given color if absent.
    pub fn find_or_create_tag(&self, name: &str, color: &str) -> Tag {
        if let Some(tag) = self.find_tag_by_name(name) {
            return tag;
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            color: color.to_string(),
            created_at: Utc::now(),
        };
        info!(tag = %tag.name, "Created tag");
        self.tags.insert(tag.id, tag.clone());
        tag
    }

    /// Link a tag to a lead. Idempotent: returns `true` only when the link
    /// was newly created.
    pub fn link_tag(&self, lead_id: Uuid, tag_id: Uuid) -> CrmResult<bool> {
        let mut entry = self
            .leads
            .get_mut(&lead_id)
            .ok_or(CrmError::LeadNotFound(lead_id))?;
        let lead = entry.value_mut();
        if lead.tags.contains(&tag_id) {
            return Ok(false);
        }
        lead.tags.push(tag_id);
        lead.updated_at = Utc::now();
        Ok(true)
    }

    // ─── Tasks & activities ────────────────────────────────────────────────

    pub fn create_task(&self, task: Task) -> Task {
        self.tasks.insert(task.id, task.clone());
        task
    }

    pub fn tasks_for_lead(&self, lead_id: Uuid) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|r| r.value().lead_id == Some(lead_id))
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn record_activity(
        &self,
        activity_type: ActivityType,
        title: &str,
        description: Option<String>,
        lead_id: Option<Uuid>,
        metadata: serde_json::Value,
    ) -> Activity {
        let activity = Activity {
            id: Uuid::new_v4(),
            activity_type,
            title: title.to_string(),
            description,
            lead_id,
            metadata,
            created_at: Utc::now(),
        };
        self.activities.insert(activity.id, activity.clone());
        activity
    }

    pub fn activities_for_lead(&self, lead_id: Uuid) -> Vec<Activity> {
        let mut activities: Vec<Activity> = self
            .activities
            .iter()
            .filter(|r| r.value().lead_id == Some(lead_id))
            .map(|r| r.value().clone())
            .collect();
        activities.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        activities
    }

    // ─── Workflows ─────────────────────────────────────────────────────────

    pub fn insert_workflow(&self, workflow: WorkflowDefinition) -> Uuid {
        let id = workflow.id;
        self.workflows.insert(id, workflow);
        id
    }

    pub fn get_workflow(&self, id: Uuid) -> Option<WorkflowDefinition> {
        self.workflows.get(&id).map(|r| r.value().clone())
    }

    // ─── Workflow executions ───────────────────────────────────────────────

    /// Create a PENDING execution record. Called by the trigger service
    /// before the engine runs; the engine itself never creates one.
    pub fn create_execution(
        &self,
        workflow_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> WorkflowExecution {
        let execution = WorkflowExecution {
            id: Uuid::new_v4(),
            workflow_id,
            lead_id,
            status: ExecutionStatus::Pending,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.executions.insert(execution.id, execution.clone());
        execution
    }

    pub fn get_execution(&self, id: Uuid) -> Option<WorkflowExecution> {
        self.executions.get(&id).map(|r| r.value().clone())
    }

    /// Most recent PENDING execution for the (workflow, lead) pair, ordered
    /// by `started_at` descending.
    pub fn find_pending_execution(
        &self,
        workflow_id: Uuid,
        lead_id: Option<Uuid>,
    ) -> Option<WorkflowExecution> {
        self.executions
            .iter()
            .filter(|r| {
                let e = r.value();
                e.workflow_id == workflow_id
                    && e.lead_id == lead_id
                    && e.status == ExecutionStatus::Pending
            })
            .map(|r| r.value().clone())
            .max_by_key(|e| e.started_at)
    }

    /// Complete an execution exactly once. PENDING is the only state this
    /// accepts; SUCCESS and FAILED are terminal.
    pub fn complete_execution(
        &self,
        id: Uuid,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> CrmResult<WorkflowExecution> {
        let mut entry = self
            .executions
            .get_mut(&id)
            .ok_or(CrmError::ExecutionNotFound)?;
        let execution = entry.value_mut();
        if execution.status != ExecutionStatus::Pending {
            return Err(CrmError::InvalidTransition(format!(
                "execution {} already completed as {:?}",
                id, execution.status
            )));
        }
        if status == ExecutionStatus::Pending {
            return Err(CrmError::InvalidTransition(
                "cannot complete an execution back to PENDING".to_string(),
            ));
        }
        execution.status = status;
        execution.error = error;
        execution.completed_at = Some(Utc::now());
        Ok(execution.clone())
    }

    /// Aggregate execution statistics over the trailing `days` window.
    pub fn execution_stats(&self, days: i64) -> ExecutionStats {
        let since = Utc::now() - Duration::days(days);
        let mut total = 0u64;
        let mut success = 0u64;
        let mut failed = 0u64;
        let mut pending = 0u64;
        let mut total_duration_ms = 0f64;
        let mut completed = 0u64;

        for entry in self.executions.iter() {
            let e = entry.value();
            if e.started_at < since {
                continue;
            }
            total += 1;
            match e.status {
                ExecutionStatus::Success => success += 1,
                ExecutionStatus::Failed => failed += 1,
                ExecutionStatus::Pending => pending += 1,
            }
            if let Some(completed_at) = e.completed_at {
                total_duration_ms +=
                    (completed_at - e.started_at).num_milliseconds() as f64;
                completed += 1;
            }
        }

        ExecutionStats {
            total,
            success,
            failed,
            pending,
            success_rate: if total > 0 {
                success as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            avg_duration_ms: if completed > 0 {
                total_duration_ms / completed as f64
            } else {
                0.0
            },
        }
    }

    // ─── A/B tests ─────────────────────────────────────────────────────────

    pub fn insert_test(&self, test: AbTest) -> Uuid {
        let id = test.id;
        self.tests.insert(id, test);
        id
    }

    pub fn get_test(&self, id: Uuid) -> Option<AbTest> {
        self.tests.get(&id).map(|r| r.value().clone())
    }

    /// Tests for an organization, optionally filtered by status, newest first.
    pub fn list_tests(
        &self,
        organization_id: Uuid,
        status: Option<AbTestStatus>,
    ) -> Vec<AbTest> {
        let mut tests: Vec<AbTest> = self
            .tests
            .iter()
            .filter(|r| {
                let t = r.value();
                t.organization_id == organization_id
                    && status.map_or(true, |s| t.status == s)
            })
            .map(|r| r.value().clone())
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tests
    }

    /// Apply a mutation to a test under the entry lock.
    pub fn update_test<F>(&self, id: Uuid, f: F) -> Option<AbTest>
    where
        F: FnOnce(&mut AbTest),
    {
        self.tests.get_mut(&id).map(|mut entry| {
            f(entry.value_mut());
            entry.value().clone()
        })
    }

    /// Remove a test and all of its result rows, so every surviving result
    /// still references an existing test.
    pub fn delete_test(&self, id: Uuid) -> bool {
        let removed = self.tests.remove(&id).is_some();
        if removed {
            let result_ids: Vec<Uuid> = self
                .results
                .iter()
                .filter(|r| r.value().test_id == id)
                .map(|r| *r.key())
                .collect();
            for rid in result_ids {
                self.results.remove(&rid);
            }
            info!(test_id = %id, "Deleted A/B test");
        }
        removed
    }

    /// Increment the participant counter. The mutation happens under the
    /// DashMap entry lock, so concurrent assignments never lose updates.
    pub fn increment_participants(&self, id: Uuid) -> CrmResult<u64> {
        let mut entry = self.tests.get_mut(&id).ok_or(CrmError::TestNotFound(id))?;
        let test = entry.value_mut();
        test.participant_count += 1;
        Ok(test.participant_count)
    }

    // ─── A/B test results ──────────────────────────────────────────────────

    pub fn insert_result(&self, result: AbTestResult) -> Uuid {
        let id = result.id;
        self.results.insert(id, result);
        id
    }

    pub fn get_result(&self, id: Uuid) -> Option<AbTestResult> {
        self.results.get(&id).map(|r| r.value().clone())
    }

    pub fn update_result<F>(&self, id: Uuid, f: F) -> Option<AbTestResult>
    where
        F: FnOnce(&mut AbTestResult),
    {
        self.results.get_mut(&id).map(|mut entry| {
            f(entry.value_mut());
            entry.value().clone()
        })
    }

    pub fn results_for_test(&self, test_id: Uuid) -> Vec<AbTestResult> {
        self.results
            .iter()
            .filter(|r| r.value().test_id == test_id)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn results_for_variant(&self, test_id: Uuid, variant: Variant) -> Vec<AbTestResult> {
        self.results
            .iter()
            .filter(|r| {
                let res = r.value();
                res.test_id == test_id && res.variant == variant
            })
            .map(|r| r.value().clone())
            .collect()
    }

    // ─── Demo data ─────────────────────────────────────────────────────────

    /// Seed a demo agent, lead, and follow-up workflow for development.
    /// Returns the (workflow_id, lead_id) pair.
    pub fn seed_demo_data(&self) -> (Uuid, Uuid) {
        info!("Seeding demo CRM data");
        let now = Utc::now();

        let agent = User {
            id: Uuid::new_v4(),
            name: "Dana Reyes".to_string(),
            email: "dana@example-realty.com".to_string(),
        };
        let agent_id = self.insert_user(agent);

        let lead = Lead {
            id: Uuid::new_v4(),
            first_name: "Jordan".to_string(),
            last_name: "Blake".to_string(),
            email: "jordan.blake@example.com".to_string(),
            phone: Some("+15550100200".to_string()),
            status: "NEW".to_string(),
            source: Some("open-house".to_string()),
            assigned_to: Some(agent_id),
            tags: vec![],
            created_at: now,
            updated_at: now,
        };
        let lead_id = self.insert_lead(lead);

        let workflow = WorkflowDefinition {
            id: Uuid::new_v4(),
            name: "New Lead Follow-up".to_string(),
            trigger: TriggerKind::LeadCreated,
            is_active: true,
            actions: vec![
                WorkflowAction {
                    action_type: "SEND_EMAIL".to_string(),
                    config: serde_json::json!({
                        "to": "{{lead.email}}",
                        "subject": "Welcome {{lead.name}}!",
                        "body": "Hi {{lead.first_name}}, thanks for visiting {{property}}."
                    }),
                    delay: None,
                },
                WorkflowAction {
                    action_type: "CREATE_TASK".to_string(),
                    config: serde_json::json!({
                        "title": "Call {{lead.name}}",
                        "due_date": "+2 days",
                        "priority": "HIGH"
                    }),
                    delay: None,
                },
                WorkflowAction {
                    action_type: "ADD_TAG".to_string(),
                    config: serde_json::json!({"tag_name": "hot-lead", "tag_color": "red"}),
                    delay: None,
                },
            ],
            created_at: now,
        };
        let workflow_id = self.insert_workflow(workflow);

        info!(%workflow_id, %lead_id, "Seeded demo data");
        (workflow_id, lead_id)
    }
}

impl Default for CrmStore {
    fn default() -> Self {
        Self::new()
    }
}

//! Workflow engine — runs a workflow's ordered actions against a lead and
//! completes the matching PENDING execution record.
//!
//! The engine resolves executions, it never creates them: the trigger
//! service inserts a PENDING record before handing off, and the engine
//! finds the most recent one for the (workflow, lead) pair. Actions run
//! strictly in definition order; the first failure marks the execution
//! FAILED and propagates, and a full pass marks it SUCCESS.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use leadflow_channels::MessagingProvider;
use leadflow_core::error::{CrmError, CrmResult};
use leadflow_core::event_bus::{make_event, noop_sink, EngineEventKind, EventSink};
use leadflow_core::types::{ExecutionStatus, WorkflowExecution};
use leadflow_store::CrmStore;

use crate::actions::{ActionDispatcher, DispatchOutcome, ExecutionContext};

pub struct WorkflowEngine {
    store: Arc<CrmStore>,
    dispatcher: ActionDispatcher,
    event_sink: Arc<dyn EventSink>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<CrmStore>, messaging: Arc<dyn MessagingProvider>) -> Self {
        Self {
            dispatcher: ActionDispatcher::new(store.clone(), messaging),
            store,
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Run a workflow for a trigger event. Resolves the most recent PENDING
    /// execution for the (workflow, lead) pair, runs every action in order,
    /// and completes the record exactly once.
    pub fn execute_workflow(
        &self,
        workflow_id: Uuid,
        event_data: HashMap<String, serde_json::Value>,
        lead_id: Option<Uuid>,
    ) -> CrmResult<WorkflowExecution> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .ok_or(CrmError::WorkflowNotFound(workflow_id))?;

        let execution = self
            .store
            .find_pending_execution(workflow_id, lead_id)
            .ok_or(CrmError::ExecutionNotFound)?;

        let lead = lead_id.and_then(|id| self.store.lead_snapshot(id));
        if lead_id.is_some() && lead.is_none() {
            warn!(
                workflow_id = %workflow_id,
                lead_id = ?lead_id,
                "Lead not found, lead-scoped placeholders will stay verbatim"
            );
        }

        let ctx = ExecutionContext {
            workflow_id,
            execution_id: execution.id,
            lead_id,
            event_data,
            lead,
        };

        info!(
            workflow = %workflow.name,
            execution_id = %execution.id,
            actions = workflow.actions.len(),
            "Executing workflow"
        );

        for (index, action) in workflow.actions.iter().enumerate() {
            self.emit(
                EngineEventKind::ActionStarted,
                &ctx,
                Some(action.action_type.clone()),
                None,
            );

            if let Some(delay) = action.delay {
                // Delays are advisory in the synchronous engine: logged and
                // evented, never slept on.
                info!(
                    execution_id = %execution.id,
                    action = %action.action_type,
                    delay_secs = delay,
                    "Delay requested (not scheduled)"
                );
                self.emit(
                    EngineEventKind::DelayRequested,
                    &ctx,
                    Some(action.action_type.clone()),
                    Some(format!("{}s", delay)),
                );
            }

            match self.dispatcher.dispatch(action, &ctx) {
                Ok(DispatchOutcome::Executed) => {
                    self.emit(
                        EngineEventKind::ActionCompleted,
                        &ctx,
                        Some(action.action_type.clone()),
                        None,
                    );
                }
                Ok(DispatchOutcome::Skipped) => {
                    self.emit(
                        EngineEventKind::ActionSkipped,
                        &ctx,
                        Some(action.action_type.clone()),
                        None,
                    );
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(
                        execution_id = %execution.id,
                        action = %action.action_type,
                        index,
                        error = %message,
                        "Action failed, aborting workflow"
                    );
                    self.emit(
                        EngineEventKind::ActionFailed,
                        &ctx,
                        Some(action.action_type.clone()),
                        Some(message.clone()),
                    );
                    metrics::counter!("workflow.executions_failed").increment(1);

                    if let Err(persist_err) = self.store.complete_execution(
                        execution.id,
                        ExecutionStatus::Failed,
                        Some(message.clone()),
                    ) {
                        error!(
                            execution_id = %execution.id,
                            error = %persist_err,
                            "Failed to persist FAILED execution state"
                        );
                    }
                    self.emit(EngineEventKind::ExecutionFailed, &ctx, None, Some(message));
                    return Err(e);
                }
            }
        }

        let completed =
            self.store
                .complete_execution(execution.id, ExecutionStatus::Success, None)?;
        metrics::counter!("workflow.executions_succeeded").increment(1);
        self.emit(EngineEventKind::ExecutionCompleted, &ctx, None, None);
        info!(execution_id = %execution.id, "Workflow completed");

        Ok(completed)
    }

    fn emit(
        &self,
        kind: EngineEventKind,
        ctx: &ExecutionContext,
        reference: Option<String>,
        detail: Option<String>,
    ) {
        self.event_sink
            .emit(make_event(kind, ctx.execution_id.to_string(), reference, detail));
    }
}

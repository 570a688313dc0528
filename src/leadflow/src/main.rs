//! LeadFlow — automation and experimentation core for a real-estate CRM.
//!
//! Development entry point: seeds demo data, runs the follow-up workflow
//! once, then drives an A/B test through its full lifecycle.

use clap::Parser;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_abtest::{AbTestEngine, NewTest};
use leadflow_channels::mock_provider;
use leadflow_core::config::AppConfig;
use leadflow_core::types::{AbTestType, InteractionKind};
use leadflow_store::CrmStore;
use leadflow_workflow::WorkflowEngine;

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(about = "Automation and A/B testing engine for a real-estate CRM")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "LEADFLOW__NODE_ID")]
    node_id: Option<String>,

    /// Participants to simulate in the demo A/B test
    #[arg(long, default_value_t = 200)]
    participants: u64,

    /// Skip the A/B test demo (workflow only)
    #[arg(long, default_value_t = false)]
    workflow_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadflow=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("LeadFlow starting up");

    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    info!(
        node_id = %config.node_id,
        min_sample = config.abtest.min_sample_size,
        "Configuration loaded"
    );

    let store = Arc::new(CrmStore::new());
    let (workflow_id, lead_id) = store.seed_demo_data();

    // The trigger service creates the PENDING record; the engine resolves it.
    store.create_execution(workflow_id, Some(lead_id));

    let workflow_engine = WorkflowEngine::new(store.clone(), mock_provider());
    let mut event_data = HashMap::new();
    event_data.insert(
        "property".to_string(),
        serde_json::Value::String("14 Maple Crescent".to_string()),
    );

    let execution =
        workflow_engine.execute_workflow(workflow_id, event_data, Some(lead_id))?;
    info!(
        execution_id = %execution.id,
        status = ?execution.status,
        "Demo workflow run finished"
    );

    let stats = store.execution_stats(7);
    info!(
        total = stats.total,
        success = stats.success,
        success_rate = stats.success_rate,
        "Execution stats (7 days)"
    );

    if cli.workflow_only {
        return Ok(());
    }

    let abtest_engine = AbTestEngine::new(store.clone(), config.abtest.clone());
    let org = Uuid::new_v4();
    let test = abtest_engine.create_test(NewTest {
        name: "Welcome email subject".to_string(),
        description: Some("Tests a benefit-led subject against a listing digest".to_string()),
        test_type: AbTestType::EmailSubject,
        organization_id: org,
        created_by: Uuid::new_v4(),
        variant_a: serde_json::json!({"subject": "Your dream home awaits"}),
        variant_b: serde_json::json!({"subject": "New listings this week"}),
    });
    abtest_engine.start_test(org, test.id)?;

    // Simulated engagement: variant A converts noticeably better.
    for i in 0..cli.participants {
        let result = abtest_engine.assign_variant(test.id, None, None)?;
        let convert = match result.variant {
            leadflow_core::types::Variant::A => i % 3 == 0,
            leadflow_core::types::Variant::B => i % 8 == 0,
        };
        if i % 2 == 0 {
            abtest_engine.record_interaction(result.id, InteractionKind::Open)?;
        }
        if convert {
            abtest_engine.record_interaction(result.id, InteractionKind::Conversion)?;
        }
    }

    let (completed, analysis) = abtest_engine.stop_test(org, test.id)?;
    info!(
        test_id = %completed.id,
        participants = analysis.total_participants,
        winner = ?completed.winner,
        confidence = analysis.significance.confidence,
        improvement = ?analysis.improvement,
        conversion_a = analysis.variant_a.conversion_rate,
        conversion_b = analysis.variant_b.conversion_rate,
        "Demo A/B test completed"
    );

    Ok(())
}

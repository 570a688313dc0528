//! A/B test lifecycle engine.
//!
//! State machine: DRAFT -> RUNNING <-> PAUSED -> COMPLETED. Stopping a test
//! runs the significance analysis synchronously and persists the outcome on
//! the test record. A RUNNING test cannot be deleted.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use leadflow_core::config::AbTestConfig;
use leadflow_core::error::{CrmError, CrmResult};
use leadflow_core::event_bus::{make_event, noop_sink, EngineEventKind, EventSink};
use leadflow_core::types::{
    AbTest, AbTestResult, AbTestStatus, AbTestType, InteractionKind, Variant,
};
use leadflow_store::CrmStore;

use crate::stats::{
    calculate_significance, duration_days, improvement, AbTestAnalysis, VariantStats,
};

/// Parameters for creating a test. New tests always start in DRAFT.
#[derive(Debug, Clone)]
pub struct NewTest {
    pub name: String,
    pub description: Option<String>,
    pub test_type: AbTestType,
    pub organization_id: Uuid,
    pub created_by: Uuid,
    pub variant_a: serde_json::Value,
    pub variant_b: serde_json::Value,
}

pub struct AbTestEngine {
    store: Arc<CrmStore>,
    config: AbTestConfig,
    event_sink: Arc<dyn EventSink>,
}

impl AbTestEngine {
    pub fn new(store: Arc<CrmStore>, config: AbTestConfig) -> Self {
        Self {
            store,
            config,
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    pub fn create_test(&self, params: NewTest) -> AbTest {
        let test = AbTest {
            id: Uuid::new_v4(),
            name: params.name,
            description: params.description,
            test_type: params.test_type,
            organization_id: params.organization_id,
            created_by: params.created_by,
            variant_a: params.variant_a,
            variant_b: params.variant_b,
            status: AbTestStatus::Draft,
            start_date: None,
            end_date: None,
            participant_count: 0,
            winner: None,
            confidence: None,
            created_at: Utc::now(),
        };
        self.store.insert_test(test.clone());
        info!(test_id = %test.id, name = %test.name, "Created A/B test");
        test
    }

    pub fn list_tests(
        &self,
        organization_id: Uuid,
        status: Option<AbTestStatus>,
    ) -> Vec<AbTest> {
        self.store.list_tests(organization_id, status)
    }

    /// Fetch a test scoped to its organization. A test belonging to another
    /// organization is indistinguishable from a missing one.
    pub fn get_test(&self, organization_id: Uuid, test_id: Uuid) -> CrmResult<AbTest> {
        self.store
            .get_test(test_id)
            .filter(|t| t.organization_id == organization_id)
            .ok_or(CrmError::TestNotFound(test_id))
    }

    /// DRAFT or PAUSED -> RUNNING. `start_date` is stamped only the first
    /// time; resuming a paused test keeps the original start.
    pub fn start_test(&self, organization_id: Uuid, test_id: Uuid) -> CrmResult<AbTest> {
        let test = self.get_test(organization_id, test_id)?;
        match test.status {
            AbTestStatus::Draft | AbTestStatus::Paused => {}
            other => {
                return Err(CrmError::InvalidTransition(format!(
                    "cannot start test in {:?} state",
                    other
                )))
            }
        }

        let updated = self
            .store
            .update_test(test_id, |t| {
                t.status = AbTestStatus::Running;
                if t.start_date.is_none() {
                    t.start_date = Some(Utc::now());
                }
            })
            .ok_or(CrmError::TestNotFound(test_id))?;

        info!(test_id = %test_id, "A/B test started");
        Ok(updated)
    }

    /// RUNNING -> PAUSED.
    pub fn pause_test(&self, organization_id: Uuid, test_id: Uuid) -> CrmResult<AbTest> {
        let test = self.get_test(organization_id, test_id)?;
        if test.status != AbTestStatus::Running {
            return Err(CrmError::InvalidTransition(format!(
                "cannot pause test in {:?} state",
                test.status
            )));
        }

        let updated = self
            .store
            .update_test(test_id, |t| t.status = AbTestStatus::Paused)
            .ok_or(CrmError::TestNotFound(test_id))?;

        info!(test_id = %test_id, "A/B test paused");
        Ok(updated)
    }

    /// RUNNING or PAUSED -> COMPLETED. Runs the analysis synchronously and
    /// persists end date, winner, and confidence on the test record.
    pub fn stop_test(
        &self,
        organization_id: Uuid,
        test_id: Uuid,
    ) -> CrmResult<(AbTest, AbTestAnalysis)> {
        let test = self.get_test(organization_id, test_id)?;
        match test.status {
            AbTestStatus::Running | AbTestStatus::Paused => {}
            other => {
                return Err(CrmError::InvalidTransition(format!(
                    "cannot stop test in {:?} state",
                    other
                )))
            }
        }

        let analysis = self.analyze_test(organization_id, test_id)?;

        let updated = self
            .store
            .update_test(test_id, |t| {
                t.status = AbTestStatus::Completed;
                t.end_date = Some(Utc::now());
                t.winner = analysis.significance.winner;
                t.confidence = Some(analysis.significance.confidence);
            })
            .ok_or(CrmError::TestNotFound(test_id))?;

        info!(
            test_id = %test_id,
            winner = ?updated.winner,
            confidence = analysis.significance.confidence,
            "A/B test completed"
        );
        Ok((updated, analysis))
    }

    /// Delete a test and its result rows. Refused while RUNNING.
    pub fn delete_test(&self, organization_id: Uuid, test_id: Uuid) -> CrmResult<()> {
        let test = self.get_test(organization_id, test_id)?;
        if test.status == AbTestStatus::Running {
            return Err(CrmError::InvalidTransition(
                "cannot delete a running test, stop it first".to_string(),
            ));
        }
        self.store.delete_test(test_id);
        Ok(())
    }

    /// Assign a participant to a variant, uniformly at random. Each draw is
    /// independent; there is no duplicate guard, so callers that assign the
    /// same lead twice get two result rows.
    pub fn assign_variant(
        &self,
        test_id: Uuid,
        lead_id: Option<Uuid>,
        campaign_id: Option<Uuid>,
    ) -> CrmResult<AbTestResult> {
        // Resolve the test first so a deleted test never gains orphan rows.
        self.store
            .get_test(test_id)
            .ok_or(CrmError::TestNotFound(test_id))?;

        let variant = if rand::thread_rng().gen_bool(0.5) {
            Variant::A
        } else {
            Variant::B
        };

        let result = AbTestResult {
            id: Uuid::new_v4(),
            test_id,
            variant,
            lead_id,
            campaign_id,
            opened_at: None,
            clicked_at: None,
            replied_at: None,
            converted: false,
            created_at: Utc::now(),
        };
        self.store.insert_result(result.clone());
        self.store.increment_participants(test_id)?;

        metrics::counter!("abtest.participants_assigned", "variant" => variant.to_string())
            .increment(1);
        self.event_sink.emit(make_event(
            EngineEventKind::VariantAssigned,
            test_id.to_string(),
            Some(variant.to_string()),
            lead_id.map(|id| id.to_string()),
        ));

        Ok(result)
    }

    /// Record one interaction on a result row. Each call stamps exactly one
    /// field; repeat interactions of the same kind overwrite the timestamp.
    pub fn record_interaction(
        &self,
        result_id: Uuid,
        kind: InteractionKind,
    ) -> CrmResult<AbTestResult> {
        let now = Utc::now();
        let updated = self
            .store
            .update_result(result_id, |r| match kind {
                InteractionKind::Open => r.opened_at = Some(now),
                InteractionKind::Click => r.clicked_at = Some(now),
                InteractionKind::Reply => r.replied_at = Some(now),
                InteractionKind::Conversion => r.converted = true,
            })
            .ok_or(CrmError::ResultNotFound(result_id))?;

        self.event_sink.emit(make_event(
            EngineEventKind::InteractionRecorded,
            updated.test_id.to_string(),
            Some(format!("{:?}", kind)),
            Some(result_id.to_string()),
        ));

        Ok(updated)
    }

    /// Compute the full analysis snapshot for a test without mutating it.
    pub fn analyze_test(
        &self,
        organization_id: Uuid,
        test_id: Uuid,
    ) -> CrmResult<AbTestAnalysis> {
        let test = self.get_test(organization_id, test_id)?;

        let results_a = self.store.results_for_variant(test_id, Variant::A);
        let results_b = self.store.results_for_variant(test_id, Variant::B);
        let stats_a = VariantStats::from_results(Variant::A, &results_a);
        let stats_b = VariantStats::from_results(Variant::B, &results_b);

        let significance = calculate_significance(
            stats_a.conversions,
            stats_a.total_participants,
            stats_b.conversions,
            stats_b.total_participants,
            self.config.min_sample_size,
            self.config.winner_confidence,
        );
        if significance.confidence == 0.0 && significance.z_score == 0.0 {
            warn!(
                test_id = %test_id,
                participants_a = stats_a.total_participants,
                participants_b = stats_b.total_participants,
                "Analysis inconclusive"
            );
        }

        let lift = improvement(&stats_a, &stats_b, significance.winner);
        let duration = duration_days(test.start_date, test.end_date);

        self.event_sink.emit(make_event(
            EngineEventKind::SignificanceComputed,
            test_id.to_string(),
            significance.winner.map(|w| w.to_string()),
            Some(format!("confidence={}", significance.confidence)),
        ));

        Ok(AbTestAnalysis {
            test_id,
            status: test.status,
            total_participants: stats_a.total_participants + stats_b.total_participants,
            variant_a: stats_a,
            variant_b: stats_b,
            significance,
            improvement: lift,
            duration_days: duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadflow_core::event_bus::capture_sink;

    struct Fixture {
        store: Arc<CrmStore>,
        engine: AbTestEngine,
        sink: Arc<leadflow_core::event_bus::CaptureSink>,
        org: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(CrmStore::new());
        let sink = capture_sink();
        let engine = AbTestEngine::new(store.clone(), AbTestConfig::default())
            .with_event_sink(sink.clone());
        Fixture {
            store,
            engine,
            sink,
            org: Uuid::new_v4(),
        }
    }

    fn new_test(org: Uuid) -> NewTest {
        NewTest {
            name: "Subject line test".to_string(),
            description: None,
            test_type: AbTestType::EmailSubject,
            organization_id: org,
            created_by: Uuid::new_v4(),
            variant_a: serde_json::json!({"subject": "Your dream home awaits"}),
            variant_b: serde_json::json!({"subject": "New listings this week"}),
        }
    }

    /// Force `count` results onto a variant, converting the first
    /// `conversions` of them.
    fn seed_results(store: &CrmStore, test_id: Uuid, variant: Variant, count: u64, conversions: u64) {
        for i in 0..count {
            store.insert_result(AbTestResult {
                id: Uuid::new_v4(),
                test_id,
                variant,
                lead_id: None,
                campaign_id: None,
                opened_at: None,
                clicked_at: None,
                replied_at: None,
                converted: i < conversions,
                created_at: Utc::now(),
            });
        }
    }

    #[test]
    fn test_lifecycle_draft_running_paused_completed() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        assert_eq!(test.status, AbTestStatus::Draft);
        assert!(test.start_date.is_none());

        let running = f.engine.start_test(f.org, test.id).unwrap();
        assert_eq!(running.status, AbTestStatus::Running);
        let started_at = running.start_date.unwrap();

        let paused = f.engine.pause_test(f.org, test.id).unwrap();
        assert_eq!(paused.status, AbTestStatus::Paused);

        // Resuming keeps the original start date.
        let resumed = f.engine.start_test(f.org, test.id).unwrap();
        assert_eq!(resumed.start_date, Some(started_at));

        let (completed, _) = f.engine.stop_test(f.org, test.id).unwrap();
        assert_eq!(completed.status, AbTestStatus::Completed);
        assert!(completed.end_date.is_some());
    }

    #[test]
    fn test_stop_draft_refused() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        let err = f.engine.stop_test(f.org, test.id).unwrap_err();
        assert!(matches!(err, CrmError::InvalidTransition(_)));
    }

    #[test]
    fn test_pause_requires_running() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        assert!(f.engine.pause_test(f.org, test.id).is_err());
    }

    #[test]
    fn test_delete_running_refused() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        f.engine.start_test(f.org, test.id).unwrap();

        let err = f.engine.delete_test(f.org, test.id).unwrap_err();
        assert!(matches!(err, CrmError::InvalidTransition(_)));

        f.engine.pause_test(f.org, test.id).unwrap();
        f.engine.delete_test(f.org, test.id).unwrap();
        assert!(f.store.get_test(test.id).is_none());
    }

    #[test]
    fn test_org_scoping() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        let other_org = Uuid::new_v4();

        assert!(matches!(
            f.engine.get_test(other_org, test.id),
            Err(CrmError::TestNotFound(_))
        ));
        assert!(f.engine.start_test(other_org, test.id).is_err());
    }

    #[test]
    fn test_assignment_to_missing_test_fails() {
        let f = fixture();
        assert!(matches!(
            f.engine.assign_variant(Uuid::new_v4(), None, None),
            Err(CrmError::TestNotFound(_))
        ));
    }

    #[test]
    fn test_assignment_roughly_uniform() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        f.engine.start_test(f.org, test.id).unwrap();

        let draws = 10_000;
        let mut a_count = 0u64;
        for _ in 0..draws {
            let result = f.engine.assign_variant(test.id, None, None).unwrap();
            if result.variant == Variant::A {
                a_count += 1;
            }
        }

        assert_eq!(
            f.store.get_test(test.id).unwrap().participant_count,
            draws
        );
        assert_eq!(f.sink.count_kind(EngineEventKind::VariantAssigned), draws as usize);
        // 10k fair coin flips land within 40-60% with overwhelming probability.
        let share = a_count as f64 / draws as f64;
        assert!(share > 0.40 && share < 0.60, "variant A share {}", share);
    }

    #[test]
    fn test_record_interaction_stamps_one_field() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        f.engine.start_test(f.org, test.id).unwrap();
        let result = f.engine.assign_variant(test.id, None, None).unwrap();

        let after_open = f
            .engine
            .record_interaction(result.id, InteractionKind::Open)
            .unwrap();
        assert!(after_open.opened_at.is_some());
        assert!(after_open.clicked_at.is_none());
        assert!(!after_open.converted);

        let after_convert = f
            .engine
            .record_interaction(result.id, InteractionKind::Conversion)
            .unwrap();
        assert!(after_convert.converted);
        assert!(after_convert.opened_at.is_some());
        assert!(after_convert.replied_at.is_none());
    }

    #[test]
    fn test_record_interaction_unknown_result() {
        let f = fixture();
        assert!(matches!(
            f.engine.record_interaction(Uuid::new_v4(), InteractionKind::Click),
            Err(CrmError::ResultNotFound(_))
        ));
    }

    #[test]
    fn test_stop_persists_winner_and_confidence() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        f.engine.start_test(f.org, test.id).unwrap();
        seed_results(&f.store, test.id, Variant::A, 30, 20);
        seed_results(&f.store, test.id, Variant::B, 30, 5);

        let (completed, analysis) = f.engine.stop_test(f.org, test.id).unwrap();
        assert_eq!(completed.winner, Some(Variant::A));
        assert_eq!(completed.confidence, Some(99.0));
        assert_eq!(analysis.significance.winner, Some(Variant::A));
        assert_eq!(analysis.total_participants, 60);
        // 66.7% vs 16.7% conversion: 300% relative lift.
        assert!((analysis.improvement.unwrap() - 300.0).abs() < 1.0);
        assert_eq!(f.sink.count_kind(EngineEventKind::SignificanceComputed), 1);
    }

    #[test]
    fn test_analysis_inconclusive_below_sample_floor() {
        let f = fixture();
        let test = f.engine.create_test(new_test(f.org));
        f.engine.start_test(f.org, test.id).unwrap();
        seed_results(&f.store, test.id, Variant::A, 29, 20);
        seed_results(&f.store, test.id, Variant::B, 30, 5);

        let analysis = f.engine.analyze_test(f.org, test.id).unwrap();
        assert_eq!(analysis.significance.confidence, 0.0);
        assert!(analysis.significance.winner.is_none());
        assert!(analysis.improvement.is_none());
    }
}

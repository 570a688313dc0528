//! Statistical analysis for A/B tests.
//!
//! Significance uses a pooled two-proportion z-test on conversion rates,
//! mapped to conventional confidence buckets (99/95/90/80). Below the
//! minimum sample size per variant no z-score is computed at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use leadflow_core::types::{AbTestResult, AbTestStatus, Variant};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Aggregate engagement metrics for one variant. Rates are percentages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStats {
    pub variant: Variant,
    pub total_participants: u64,
    pub opens: u64,
    pub clicks: u64,
    pub replies: u64,
    pub conversions: u64,
    pub open_rate: f64,
    pub click_rate: f64,
    pub reply_rate: f64,
    pub conversion_rate: f64,
}

impl VariantStats {
    /// Aggregate the result rows belonging to one variant.
    pub fn from_results(variant: Variant, results: &[AbTestResult]) -> Self {
        let total = results.len() as u64;
        let opens = results.iter().filter(|r| r.opened_at.is_some()).count() as u64;
        let clicks = results.iter().filter(|r| r.clicked_at.is_some()).count() as u64;
        let replies = results.iter().filter(|r| r.replied_at.is_some()).count() as u64;
        let conversions = results.iter().filter(|r| r.converted).count() as u64;

        let rate = |count: u64| {
            if total > 0 {
                count as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };

        Self {
            variant,
            total_participants: total,
            opens,
            clicks,
            replies,
            conversions,
            open_rate: rate(opens),
            click_rate: rate(clicks),
            reply_rate: rate(replies),
            conversion_rate: rate(conversions),
        }
    }
}

/// Outcome of the two-proportion z-test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Significance {
    /// Confidence level in percent (0, 80, 90, 95, 99, or a sub-80 estimate).
    pub confidence: f64,
    pub winner: Option<Variant>,
    pub z_score: f64,
}

impl Significance {
    fn inconclusive() -> Self {
        Self {
            confidence: 0.0,
            winner: None,
            z_score: 0.0,
        }
    }
}

/// Pooled two-proportion z-test on conversion counts.
///
/// A winner is declared only when the confidence reaches
/// `winner_confidence` percent. Either variant below `min_sample`
/// participants short-circuits to inconclusive.
pub fn calculate_significance(
    conversions_a: u64,
    total_a: u64,
    conversions_b: u64,
    total_b: u64,
    min_sample: u64,
    winner_confidence: f64,
) -> Significance {
    if total_a < min_sample || total_b < min_sample {
        return Significance::inconclusive();
    }

    let n_a = total_a as f64;
    let n_b = total_b as f64;
    let p_a = conversions_a as f64 / n_a;
    let p_b = conversions_b as f64 / n_b;

    let p_pool = (conversions_a + conversions_b) as f64 / (n_a + n_b);
    let se_pool = (p_pool * (1.0 - p_pool) * (1.0 / n_a + 1.0 / n_b)).sqrt();
    if se_pool == 0.0 {
        return Significance::inconclusive();
    }

    let z = (p_a - p_b).abs() / se_pool;
    let confidence = if z >= 2.58 {
        99.0
    } else if z >= 1.96 {
        95.0
    } else if z >= 1.65 {
        90.0
    } else if z >= 1.28 {
        80.0
    } else {
        (z * 40.0).min(80.0)
    };

    let winner = if confidence >= winner_confidence && p_a != p_b {
        Some(if p_a > p_b { Variant::A } else { Variant::B })
    } else {
        None
    };

    Significance {
        confidence,
        winner,
        z_score: z,
    }
}

/// Relative conversion-rate lift of the winner over the loser, in percent.
/// `None` when there is no winner or the loser never converted.
pub fn improvement(stats_a: &VariantStats, stats_b: &VariantStats, winner: Option<Variant>) -> Option<f64> {
    let winner = winner?;
    let (winning, losing) = match winner {
        Variant::A => (stats_a, stats_b),
        Variant::B => (stats_b, stats_a),
    };
    if losing.conversion_rate > 0.0 {
        Some((winning.conversion_rate - losing.conversion_rate) / losing.conversion_rate * 100.0)
    } else {
        None
    }
}

/// Whole days the test has run, rounded up. `None` before the test starts.
pub fn duration_days(
    start_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
) -> Option<i64> {
    let start = start_date?;
    let end = end_date.unwrap_or_else(Utc::now);
    let elapsed_ms = (end - start).num_milliseconds() as f64;
    Some((elapsed_ms / MS_PER_DAY).ceil() as i64)
}

/// Full analysis snapshot for one test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbTestAnalysis {
    pub test_id: Uuid,
    pub status: AbTestStatus,
    pub total_participants: u64,
    pub variant_a: VariantStats,
    pub variant_b: VariantStats,
    pub significance: Significance,
    pub improvement: Option<f64>,
    pub duration_days: Option<i64>,
}

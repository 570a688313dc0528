//! A/B test experimentation — test lifecycle, uniform variant assignment,
//! interaction tracking, and two-proportion significance analysis.

pub mod lifecycle;
pub mod stats;

pub use lifecycle::{AbTestEngine, NewTest};
pub use stats::{calculate_significance, AbTestAnalysis, Significance, VariantStats};

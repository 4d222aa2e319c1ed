//! Weekly aggregation and trend classification.
//!
//! Weekly records are derived on demand from completed visits and replaced whole
//! on every recompute.

mod aggregator;
mod service;
mod trend;

pub use aggregator::{WeekWindow, WeeklyAggregator, WeeklyChecklistScore};
pub use service::WeeklyScoreService;
pub use trend::{TrendAnalyzer, TrendIndicator, TREND_THRESHOLD, TREND_WINDOW};

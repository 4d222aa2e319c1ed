use serde::{Deserialize, Serialize};

use super::aggregator::WeeklyChecklistScore;

/// Percentage-point change beyond which a trend is no longer stable.
pub const TREND_THRESHOLD: f64 = 5.0;

/// Maximum number of weekly records considered.
pub const TREND_WINDOW: usize = 4;

/// Direction of a recipient's weekly score over recent weeks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendIndicator {
    Improving,
    Declining,
    Stable,
    #[default]
    InsufficientData,
}

impl TrendIndicator {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendIndicator::Improving => "improving",
            TrendIndicator::Declining => "declining",
            TrendIndicator::Stable => "stable",
            TrendIndicator::InsufficientData => "insufficient_data",
        }
    }
}

impl std::fmt::Display for TrendIndicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TrendIndicator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "improving" => Ok(TrendIndicator::Improving),
            "declining" => Ok(TrendIndicator::Declining),
            "stable" => Ok(TrendIndicator::Stable),
            "insufficient_data" => Ok(TrendIndicator::InsufficientData),
            _ => Err(format!("Unknown trend indicator: {}", s)),
        }
    }
}

/// Classifies weekly score direction.
///
/// Input must already be ascending by week start; the analyzer never sorts, so
/// "first" and "last" are exactly what the caller passed. Only the trailing
/// [`TREND_WINDOW`] records are considered.
pub struct TrendAnalyzer;

impl TrendAnalyzer {
    /// Classify a chronologically ordered series of weekly records.
    pub fn classify(records: &[WeeklyChecklistScore]) -> TrendIndicator {
        let percentages: Vec<f64> = records.iter().map(|r| r.score_percentage).collect();
        Self::classify_percentages(&percentages)
    }

    /// Classify a chronologically ordered series of weekly percentages.
    pub fn classify_percentages(percentages: &[f64]) -> TrendIndicator {
        let window = &percentages[percentages.len().saturating_sub(TREND_WINDOW)..];
        let (Some(first), Some(last)) = (window.first(), window.last()) else {
            return TrendIndicator::InsufficientData;
        };
        if window.len() < 2 {
            return TrendIndicator::InsufficientData;
        }

        let delta = last - first;
        if delta > TREND_THRESHOLD {
            TrendIndicator::Improving
        } else if delta < -TREND_THRESHOLD {
            TrendIndicator::Declining
        } else {
            TrendIndicator::Stable
        }
    }
}

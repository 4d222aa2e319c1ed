use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::trend::TrendIndicator;
use crate::checklist::{round2, VisitScore};

/// A Monday-to-Sunday calendar week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekWindow {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
}

impl WeekWindow {
    /// The week containing `date`.
    pub fn containing(date: NaiveDate) -> Self {
        let week_start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        Self {
            week_start,
            week_end: week_start + Duration::days(6),
        }
    }

    /// The week containing the instant (UTC calendar).
    pub fn containing_instant(at: DateTime<Utc>) -> Self {
        Self::containing(at.date_naive())
    }

    /// The week `n` weeks before this one.
    pub fn weeks_before(&self, n: i64) -> Self {
        Self::containing(self.week_start - Duration::weeks(n))
    }

    /// Inclusive start instant.
    pub fn start_instant(&self) -> DateTime<Utc> {
        self.week_start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// Exclusive end instant (Monday 00:00 of the following week).
    pub fn end_instant(&self) -> DateTime<Utc> {
        (self.week_end + Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
    }

    /// Whether the instant falls in this week.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_instant() && at < self.end_instant()
    }
}

/// Aggregated quality score for one recipient over one calendar week.
///
/// Keyed by `(recipient_id, week_start)` and always recomputed whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyChecklistScore {
    pub recipient_id: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub total_score: i64,
    pub score_percentage: f64,
    pub checklist_count: u32,
    pub score_breakdown: BTreeMap<String, f64>,
    pub trend_indicator: TrendIndicator,
}

impl WeeklyChecklistScore {
    /// The week this record covers.
    pub fn window(&self) -> WeekWindow {
        WeekWindow {
            week_start: self.week_start,
            week_end: self.week_end,
        }
    }

    /// Set the trend indicator.
    pub fn with_trend(mut self, trend: TrendIndicator) -> Self {
        self.trend_indicator = trend;
        self
    }
}

/// Combines visit scores within a week into one weekly record.
pub struct WeeklyAggregator;

impl WeeklyAggregator {
    /// Aggregate the visit scores of one recipient's week.
    ///
    /// Returns `None` when there are no visits, distinguishing "no data" from a
    /// week that scored zero. The trend starts as `insufficient_data`; callers
    /// classify it against neighbouring weeks.
    pub fn aggregate(
        recipient_id: &str,
        window: WeekWindow,
        visits: &[VisitScore],
    ) -> Option<WeeklyChecklistScore> {
        if visits.is_empty() {
            return None;
        }

        // Fixed summation order keeps float results identical across runs.
        let mut ordered: Vec<&VisitScore> = visits.iter().collect();
        ordered.sort_by(|a, b| a.visit_id.cmp(&b.visit_id));

        let count = ordered.len();
        let mut total = 0.0;
        let mut percentage_sum = 0.0;
        let mut category_sums: BTreeMap<&str, (f64, u32)> = BTreeMap::new();

        for visit in &ordered {
            total += visit.total_score;
            percentage_sum += visit.score_percentage;
            for (category, subtotal) in &visit.category_breakdown {
                let entry = category_sums.entry(category.as_str()).or_insert((0.0, 0));
                entry.0 += subtotal;
                entry.1 += 1;
            }
        }

        let score_breakdown = category_sums
            .into_iter()
            .map(|(category, (sum, n))| (category.to_string(), round2(sum / n as f64)))
            .collect();

        Some(WeeklyChecklistScore {
            recipient_id: recipient_id.to_string(),
            week_start: window.week_start,
            week_end: window.week_end,
            total_score: total.round() as i64,
            score_percentage: round2(percentage_sum / count as f64),
            checklist_count: count as u32,
            score_breakdown,
            trend_indicator: TrendIndicator::InsufficientData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn visit(id: &str, total: f64, pct: f64, breakdown: &[(&str, f64)]) -> VisitScore {
        VisitScore {
            visit_id: id.to_string(),
            total_score: total,
            max_possible: 0.0,
            score_percentage: pct,
            category_breakdown: breakdown.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            answered: breakdown.len(),
            skipped: 0,
            partial: false,
        }
    }

    fn window() -> WeekWindow {
        WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 5, 15).unwrap())
    }

    #[test]
    fn test_week_window_is_monday_to_sunday() {
        let w = window();
        assert_eq!(w.week_start, NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!(w.week_end, NaiveDate::from_ymd_opt(2024, 5, 19).unwrap());

        let sunday = WeekWindow::containing(NaiveDate::from_ymd_opt(2024, 5, 19).unwrap());
        assert_eq!(sunday, w);
        assert_eq!(w.weeks_before(1).week_start, NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
    }

    #[test]
    fn test_window_contains_bounds() {
        let w = window();
        assert!(w.contains(w.start_instant()));
        assert!(!w.contains(w.end_instant()));
        assert!(w.contains(w.end_instant() - Duration::seconds(1)));
    }

    #[test]
    fn test_no_visits_produces_no_record() {
        assert!(WeeklyAggregator::aggregate("r-1", window(), &[]).is_none());
    }

    #[test]
    fn test_simple_mean_of_percentages() {
        let visits = vec![
            visit("v1", 10.0, 50.0, &[("meal", 4.0), ("mood", 6.0)]),
            visit("v2", 21.0, 100.0, &[("meal", 6.0)]),
            visit("v3", 3.4, 33.33, &[("mood", 3.4)]),
        ];

        let record = WeeklyAggregator::aggregate("r-1", window(), &visits).unwrap();

        assert_eq!(record.checklist_count, 3);
        assert_eq!(record.total_score, 34);
        assert_eq!(record.score_percentage, 61.11);
        assert_eq!(record.score_breakdown["meal"], 5.0);
        assert_eq!(record.score_breakdown["mood"], 4.7);
        assert_eq!(record.trend_indicator, TrendIndicator::InsufficientData);
    }

    #[test]
    fn test_aggregation_is_order_independent_and_idempotent() {
        let a = visit("a", 1.1, 10.1, &[("x", 0.1)]);
        let b = visit("b", 2.2, 20.2, &[("x", 0.2)]);
        let c = visit("c", 3.3, 30.3, &[("x", 0.3)]);

        let first = WeeklyAggregator::aggregate("r", window(), &[a.clone(), b.clone(), c.clone()]);
        let second = WeeklyAggregator::aggregate("r", window(), &[c, a, b]);

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_serialization_shape() {
        let record = WeeklyAggregator::aggregate("r-1", window(), &[visit("v", 7.0, 70.0, &[])])
            .unwrap()
            .with_trend(TrendIndicator::Stable);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["week_start"], "2024-05-13");
        assert_eq!(json["week_end"], "2024-05-19");
        assert_eq!(json["total_score"], 7);
        assert_eq!(json["checklist_count"], 1);
        assert_eq!(json["trend_indicator"], "stable");
    }
}

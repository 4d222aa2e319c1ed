use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::aggregator::{WeekWindow, WeeklyAggregator, WeeklyChecklistScore};
use super::trend::{TrendAnalyzer, TREND_WINDOW};
use crate::checklist::ChecklistScorer;
use crate::error::{AppError, AppResult};
use crate::storage::Storage;

/// Recompute-and-replace access to a recipient's weekly records.
#[derive(Clone)]
pub struct WeeklyScoreService {
    storage: Arc<dyn Storage>,
    scorer: ChecklistScorer,
}

impl WeeklyScoreService {
    /// Create a new weekly score service.
    pub fn new(storage: Arc<dyn Storage>, scorer: ChecklistScorer) -> Self {
        Self { storage, scorer }
    }

    /// Recompute the week containing `date` and replace the stored record.
    ///
    /// The trend is classified over up to three prior stored weeks plus the
    /// recomputed one. A week without completed visits has its record removed
    /// and yields `None`.
    pub async fn refresh(
        &self,
        recipient_id: &str,
        date: NaiveDate,
    ) -> AppResult<Option<WeeklyChecklistScore>> {
        let start = Instant::now();

        if self.storage.get_recipient(recipient_id).await?.is_none() {
            return Err(AppError::not_found("recipient", recipient_id));
        }

        let window = WeekWindow::containing(date);
        let visits = self
            .storage
            .list_completed_visits(recipient_id, window.start_instant(), window.end_instant())
            .await?;

        let catalog = self.storage.load_catalog().await?;
        let mut scores = Vec::with_capacity(visits.len());
        for visit in &visits {
            let responses = self.storage.get_visit_responses(&visit.id).await?;
            scores.push(self.scorer.score(&visit.id, &catalog, &responses));
        }

        let Some(record) = WeeklyAggregator::aggregate(recipient_id, window, &scores) else {
            debug!(
                recipient_id = %recipient_id,
                week_start = %window.week_start,
                "No completed visits, removing weekly record"
            );
            self.storage
                .delete_weekly_score(recipient_id, window.week_start)
                .await?;
            return Ok(None);
        };

        let lookback = (TREND_WINDOW - 1) as i64;
        let mut series = self
            .storage
            .list_weekly_scores(
                recipient_id,
                window.weeks_before(lookback).week_start,
                window.weeks_before(1).week_start,
            )
            .await?;
        series.push(record.clone());

        let record = record.with_trend(TrendAnalyzer::classify(&series));
        self.storage.upsert_weekly_score(&record).await?;

        info!(
            recipient_id = %recipient_id,
            week_start = %record.week_start,
            checklist_count = record.checklist_count,
            score_percentage = record.score_percentage,
            trend = %record.trend_indicator,
            latency_ms = start.elapsed().as_millis() as u64,
            "Weekly score refreshed"
        );

        Ok(Some(record))
    }

    /// Stored records of the last `weeks` weeks up to the current one, ascending.
    pub async fn recent(&self, recipient_id: &str, weeks: u32) -> AppResult<Vec<WeeklyChecklistScore>> {
        self.recent_as_of(recipient_id, weeks, Utc::now().date_naive())
            .await
    }

    /// Stored records of the `weeks` weeks ending with the week containing `date`.
    pub async fn recent_as_of(
        &self,
        recipient_id: &str,
        weeks: u32,
        date: NaiveDate,
    ) -> AppResult<Vec<WeeklyChecklistScore>> {
        if weeks == 0 {
            return Err(AppError::validation("weeks", "must be at least 1"));
        }

        let current = WeekWindow::containing(date);
        let first = current.weeks_before(i64::from(weeks) - 1);

        Ok(self
            .storage
            .list_weekly_scores(recipient_id, first.week_start, current.week_start)
            .await?)
    }
}

//! Integration tests for SQLite storage layer
//!
//! Tests database operations using an in-memory SQLite database.

use chrono::{DateTime, Duration, TimeZone, Utc};

use care_quality_engine::checklist::{
    AnswerKind, AnswerValue, ChecklistQuestion, ChecklistResponse, NumericScale, ScaleBand,
};
use care_quality_engine::error::StorageError;
use care_quality_engine::generator::GeneratedContent;
use care_quality_engine::notes::{NoteDraft, PriorityLevel, SpecialNote};
use care_quality_engine::reports::{Report, ReportStatus};
use care_quality_engine::storage::{
    CareNote, CatalogStore, Recipient, ReportCommit, ReportStore, SqliteStorage, Visit, VisitStatus,
    VisitStore,
};

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
}

async fn recipient_with_visit(storage: &SqliteStorage) -> (Recipient, Visit) {
    let recipient = Recipient::new("Lee Mi").with_guardian("guardian-1");
    storage.create_recipient(&recipient).await.unwrap();
    let visit = Visit::new(&recipient.id, "caregiver-1", at(13, 9)).completed_at(at(13, 12));
    storage.create_visit(&visit).await.unwrap();
    (recipient, visit)
}

fn generated(text: &str) -> GeneratedContent {
    GeneratedContent {
        keywords: vec!["calm".to_string(), "ate well".to_string()],
        content: text.to_string(),
        ai_comment: "Keep the schedule.".to_string(),
    }
}

fn draft(note_type: &str) -> NoteDraft {
    NoteDraft {
        note_type: note_type.to_string(),
        summary: "Pain reported: knee".to_string(),
        detail: "care note (health_observation): \"knee pain\"".to_string(),
        priority: PriorityLevel::Medium,
        matches: 1,
    }
}

#[cfg(test)]
mod visit_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_visit_round_trip() {
        let storage = create_test_storage().await;
        let (recipient, visit) = recipient_with_visit(&storage).await;

        let stored_recipient = storage.get_recipient(&recipient.id).await.unwrap().unwrap();
        assert_eq!(stored_recipient, recipient);

        let stored = storage.get_visit(&visit.id).await.unwrap().unwrap();
        assert_eq!(stored, visit);
        assert_eq!(stored.status, VisitStatus::Completed);

        assert!(storage.get_visit("nonexistent-id").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completed_visits_window_uses_checkout_time() {
        let storage = create_test_storage().await;
        let recipient = Recipient::new("Lee Mi");
        storage.create_recipient(&recipient).await.unwrap();

        let late = Visit::new(&recipient.id, "c-1", at(12, 22)).completed_at(at(13, 1));
        let inside = Visit::new(&recipient.id, "c-1", at(15, 9)).completed_at(at(15, 11));
        let active = Visit::new(&recipient.id, "c-1", at(16, 9));
        let outside = Visit::new(&recipient.id, "c-1", at(20, 9)).completed_at(at(20, 11));
        for v in [&late, &inside, &active, &outside] {
            storage.create_visit(v).await.unwrap();
        }

        let visits = storage
            .list_completed_visits(&recipient.id, at(13, 0), at(20, 0))
            .await
            .unwrap();

        let ids: Vec<&str> = visits.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec![late.id.as_str(), inside.id.as_str()]);
    }

    #[tokio::test]
    async fn test_responses_and_care_notes_round_trip() {
        let storage = create_test_storage().await;
        let (_, visit) = recipient_with_visit(&storage).await;

        let responses = vec![
            ChecklistResponse::new(&visit.id, "meal_amount", AnswerValue::option("light_meal")),
            ChecklistResponse::new(&visit.id, "sleep_hours", AnswerValue::Numeric(6.5)),
            ChecklistResponse::new(&visit.id, "favorite_food", AnswerValue::Text("Porridge".into()))
                .with_note("Asked for seconds"),
            ChecklistResponse::new(&visit.id, "walked", AnswerValue::Boolean(true)),
        ];
        for r in &responses {
            storage.add_checklist_response(r).await.unwrap();
        }
        storage
            .add_care_note(&CareNote::new(&visit.id, "health_observation", "Mild knee pain"))
            .await
            .unwrap();

        assert_eq!(storage.get_visit_responses(&visit.id).await.unwrap(), responses);

        let notes = storage.get_visit_care_notes(&visit.id).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "Mild knee pain");
    }

    #[tokio::test]
    async fn test_duplicate_response_is_unique_violation() {
        let storage = create_test_storage().await;
        let (_, visit) = recipient_with_visit(&storage).await;

        let response = ChecklistResponse::new(&visit.id, "meal_amount", AnswerValue::option("full_meal"));
        storage.add_checklist_response(&response).await.unwrap();
        let again = storage.add_checklist_response(&response).await;

        assert!(matches!(again, Err(StorageError::UniqueViolation { .. })));
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_upsert_question_replaces_by_key() {
        let storage = create_test_storage().await;

        let question = ChecklistQuestion::new("sleep_hours", "sleep", "Hours slept?", AnswerKind::Numeric)
            .with_scale(NumericScale {
                bands: vec![
                    ScaleBand { min: 0.0, max: 4.0, score: 0.0 },
                    ScaleBand { min: 4.0, max: 7.0, score: 1.0 },
                ],
            });
        storage.upsert_question(&question).await.unwrap();

        let revised = question.clone().with_weight(2.0);
        storage.upsert_question(&revised).await.unwrap();

        let catalog = storage.load_catalog().await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("sleep_hours"), Some(&revised));
    }
}

#[cfg(test)]
mod report_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_commit_new_report_with_notes() {
        let storage = create_test_storage().await;
        let (recipient, visit) = recipient_with_visit(&storage).await;

        let report = Report::new(&visit.id, generated("Quiet morning."));
        let note = SpecialNote::open(&recipient.id, &visit.id, visit.timestamp(), &draft("pain"));
        storage
            .commit_report(&ReportCommit {
                report: report.clone(),
                is_new: true,
                created_notes: vec![note.clone()],
                updated_notes: Vec::new(),
            })
            .await
            .unwrap();

        let stored = storage.get_report_by_visit(&visit.id).await.unwrap().unwrap();
        assert_eq!(stored.id, report.id);
        assert_eq!(stored.keywords, report.keywords);
        assert_eq!(stored.status, ReportStatus::Generated);

        let open = storage.list_open_special_notes(&recipient.id).await.unwrap();
        assert_eq!(open, vec![note]);
    }

    #[tokio::test]
    async fn test_commit_is_atomic() {
        let storage = create_test_storage().await;
        let (recipient, visit) = recipient_with_visit(&storage).await;

        // Two open notes of one type violate the open-note index.
        let first = SpecialNote::open(&recipient.id, &visit.id, visit.timestamp(), &draft("pain"));
        let second = SpecialNote::open(&recipient.id, &visit.id, visit.timestamp(), &draft("pain"));
        let result = storage
            .commit_report(&ReportCommit {
                report: Report::new(&visit.id, generated("Quiet morning.")),
                is_new: true,
                created_notes: vec![first, second],
                updated_notes: Vec::new(),
            })
            .await;

        assert!(matches!(result, Err(StorageError::UniqueViolation { .. })));
        assert!(storage.get_report_by_visit(&visit.id).await.unwrap().is_none());
        assert!(storage.list_open_special_notes(&recipient.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_report_for_visit_is_rejected() {
        let storage = create_test_storage().await;
        let (_, visit) = recipient_with_visit(&storage).await;

        let commit = |text: &str| ReportCommit {
            report: Report::new(&visit.id, generated(text)),
            is_new: true,
            created_notes: Vec::new(),
            updated_notes: Vec::new(),
        };

        storage.commit_report(&commit("first")).await.unwrap();
        let result = storage.commit_report(&commit("second")).await;

        assert!(matches!(result, Err(StorageError::UniqueViolation { .. })));
        let stored = storage.get_report_by_visit(&visit.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "first");
    }

    #[tokio::test]
    async fn test_regenerate_and_resolve_in_place() {
        let storage = create_test_storage().await;
        let (recipient, visit) = recipient_with_visit(&storage).await;

        let mut report = Report::new(&visit.id, generated("v1"));
        let mut note = SpecialNote::open(&recipient.id, &visit.id, visit.timestamp(), &draft("pain"));
        storage
            .commit_report(&ReportCommit {
                report: report.clone(),
                is_new: true,
                created_notes: vec![note.clone()],
                updated_notes: Vec::new(),
            })
            .await
            .unwrap();

        report.regenerate(generated("v2"));
        note.is_resolved = true;
        note.resolved_at = Some(at(14, 12));
        storage
            .commit_report(&ReportCommit {
                report: report.clone(),
                is_new: false,
                created_notes: Vec::new(),
                updated_notes: vec![note.clone()],
            })
            .await
            .unwrap();

        let stored = storage.get_report(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "v2");
        assert_eq!(stored.regeneration_count, 1);

        let stored_note = storage.get_special_note(&note.id).await.unwrap().unwrap();
        assert!(stored_note.is_resolved);
        assert_eq!(stored_note.resolved_at, Some(at(14, 12)));
        assert!(storage.list_open_special_notes(&recipient.id).await.unwrap().is_empty());

        let same_visit = storage
            .list_resolved_special_notes_covering(&recipient.id, &visit.id, at(20, 12))
            .await
            .unwrap();
        assert_eq!(same_visit.len(), 1);

        let before_resolution = storage
            .list_resolved_special_notes_covering(&recipient.id, "other-visit", at(14, 9))
            .await
            .unwrap();
        assert_eq!(before_resolution.len(), 1);

        let after_resolution = storage
            .list_resolved_special_notes_covering(&recipient.id, "other-visit", at(15, 9))
            .await
            .unwrap();
        assert!(after_resolution.is_empty());
    }

    #[tokio::test]
    async fn test_status_update_and_listing() {
        let storage = create_test_storage().await;
        let (_, visit) = recipient_with_visit(&storage).await;
        let report = Report::new(&visit.id, generated("Quiet morning."));
        storage
            .commit_report(&ReportCommit {
                report: report.clone(),
                is_new: true,
                created_notes: Vec::new(),
                updated_notes: Vec::new(),
            })
            .await
            .unwrap();

        storage
            .update_report_status(&report.id, ReportStatus::Read, Utc::now())
            .await
            .unwrap();
        let stored = storage.get_report(&report.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReportStatus::Read);

        let missing = storage
            .update_report_status("nonexistent-id", ReportStatus::Read, Utc::now())
            .await;
        assert!(missing.is_err());

        let recent = storage
            .list_reports_since(Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        let future = storage
            .list_reports_since(Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert!(future.is_empty());
    }

    #[tokio::test]
    async fn test_special_notes_newest_first() {
        let storage = create_test_storage().await;
        let (recipient, visit) = recipient_with_visit(&storage).await;

        let older = SpecialNote::open(&recipient.id, &visit.id, at(13, 12), &draft("pain"));
        let newer = SpecialNote::open(&recipient.id, &visit.id, at(14, 12), &draft("fall_risk"));
        storage
            .commit_report(&ReportCommit {
                report: Report::new(&visit.id, generated("Quiet morning.")),
                is_new: true,
                created_notes: vec![older.clone(), newer.clone()],
                updated_notes: Vec::new(),
            })
            .await
            .unwrap();

        let notes = storage.list_special_notes(&recipient.id, 10).await.unwrap();
        let ids: Vec<&str> = notes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec![newer.id.as_str(), older.id.as_str()]);

        let limited = storage.list_special_notes(&recipient.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}

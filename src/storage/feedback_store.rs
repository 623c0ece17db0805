//! Feedback records: one review (human or AI generated) per submission.

use crate::storage::db::Db;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const FEEDBACK_COLUMNS: &str =
    "id, submission_id, template_id, content, grade, created_at, updated_at";

/// Review feedback attached to a submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub template_id: Option<Uuid>,
    pub content: String,
    pub grade: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
}

fn row_to_feedback(row: &Row<'_>) -> rusqlite::Result<Feedback> {
    let id_str: String = row.get(0)?;
    let submission_str: String = row.get(1)?;
    let template_str: Option<String> = row.get(2)?;

    let conversion = |e: Box<dyn std::error::Error + Send + Sync>, idx: usize| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    let template_id = match template_str {
        Some(s) => Some(Uuid::parse_str(&s).map_err(|e| conversion(Box::new(e), 2))?),
        None => None,
    };

    Ok(Feedback {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion(Box::new(e), 0))?,
        submission_id: Uuid::parse_str(&submission_str)
            .map_err(|e| conversion(Box::new(e), 1))?,
        template_id,
        content: row.get(3)?,
        grade: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Feedback storage over the shared SQLite handle
#[derive(Clone)]
pub struct FeedbackStore {
    db: Db,
}

impl FeedbackStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert feedback for a submission. The unique constraint on
    /// `submission_id` enforces at most one per submission.
    pub fn create(
        &self,
        submission_id: &Uuid,
        template_id: Option<&Uuid>,
        content: &str,
        grade: Option<&str>,
    ) -> Result<Feedback> {
        let feedback = Feedback {
            id: Uuid::new_v4(),
            submission_id: *submission_id,
            template_id: template_id.copied(),
            content: content.to_string(),
            grade: grade.map(|g| g.to_string()),
            created_at: Utc::now().to_rfc3339(),
            updated_at: None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO feedback (id, submission_id, template_id, content, grade, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    feedback.id.to_string(),
                    feedback.submission_id.to_string(),
                    feedback.template_id.map(|t| t.to_string()),
                    feedback.content,
                    feedback.grade,
                    feedback.created_at,
                ],
            )
            .context("Failed to insert feedback")?;
            Ok(())
        })?;

        Ok(feedback)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Feedback>> {
        self.db.with_conn(|conn| {
            let feedback = conn
                .query_row(
                    &format!("SELECT {} FROM feedback WHERE id = ?1", FEEDBACK_COLUMNS),
                    params![id.to_string()],
                    row_to_feedback,
                )
                .optional()
                .context("Failed to query feedback")?;
            Ok(feedback)
        })
    }

    pub fn get_by_submission(&self, submission_id: &Uuid) -> Result<Option<Feedback>> {
        self.db.with_conn(|conn| {
            let feedback = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM feedback WHERE submission_id = ?1",
                        FEEDBACK_COLUMNS
                    ),
                    params![submission_id.to_string()],
                    row_to_feedback,
                )
                .optional()
                .context("Failed to query feedback by submission")?;
            Ok(feedback)
        })
    }

    /// All feedback left on submissions owned by `owner_id`.
    pub fn list_for_owner(&self, owner_id: &Uuid) -> Result<Vec<Feedback>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM feedback f
                 JOIN submissions s ON s.id = f.submission_id
                 WHERE s.user_id = ?1
                 ORDER BY f.created_at DESC",
                FEEDBACK_COLUMNS
                    .split(", ")
                    .map(|c| format!("f.{}", c))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![owner_id.to_string()], row_to_feedback)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update(&self, id: &Uuid, content: &str, grade: Option<&str>) -> Result<Option<Feedback>> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE feedback SET content = ?1, grade = ?2, updated_at = ?3 WHERE id = ?4",
                    params![content, grade, Utc::now().to_rfc3339(), id.to_string()],
                )
                .context("Failed to update feedback")?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// Delete feedback; returns the submission it belonged to so the caller
    /// can reset that submission's status.
    pub fn delete(&self, id: &Uuid) -> Result<Option<Uuid>> {
        let Some(feedback) = self.get(id)? else {
            return Ok(None);
        };

        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM feedback WHERE id = ?1", params![id.to_string()])
                .context("Failed to delete feedback")?;
            Ok(())
        })?;

        Ok(Some(feedback.submission_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;
    use crate::auth::user_store::UserStore;
    use crate::storage::submission_store::{NewSubmission, SubmissionStore};

    fn setup() -> (FeedbackStore, SubmissionStore, Uuid, Uuid) {
        let db = Db::open_in_memory().unwrap();
        let users = UserStore::new(db.clone());
        let owner = users
            .create_user("o@school.edu", "O", "pw", UserRole::Student)
            .unwrap();
        let submissions = SubmissionStore::new(db.clone());
        let submission = submissions
            .create(NewSubmission {
                title: "hw".to_string(),
                description: None,
                file_path: "user/f.txt".to_string(),
                original_filename: "f.txt".to_string(),
                file_type: "text/plain".to_string(),
                user_id: owner.id,
            })
            .unwrap();
        (FeedbackStore::new(db), submissions, owner.id, submission.id)
    }

    #[test]
    fn test_create_and_lookup() {
        let (store, _, owner, submission) = setup();
        let created = store
            .create(&submission, None, "Good work", Some("A"))
            .unwrap();

        let by_submission = store.get_by_submission(&submission).unwrap().unwrap();
        assert_eq!(by_submission.id, created.id);
        assert_eq!(by_submission.grade.as_deref(), Some("A"));

        let for_owner = store.list_for_owner(&owner).unwrap();
        assert_eq!(for_owner.len(), 1);
    }

    #[test]
    fn test_one_feedback_per_submission() {
        let (store, _, _, submission) = setup();
        store.create(&submission, None, "First", None).unwrap();
        assert!(store.create(&submission, None, "Second", None).is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let (store, _, _, submission) = setup();
        let created = store.create(&submission, None, "Draft", None).unwrap();

        let updated = store
            .update(&created.id, "Final", Some("B+"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "Final");
        assert_eq!(updated.grade.as_deref(), Some("B+"));

        let deleted_submission = store.delete(&created.id).unwrap();
        assert_eq!(deleted_submission, Some(submission));

        // Second delete finds nothing
        assert_eq!(store.delete(&created.id).unwrap(), None);
    }
}

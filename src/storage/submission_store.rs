//! Submission records: uploaded homework and its review status.

use crate::storage::db::Db;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SUBMISSION_COLUMNS: &str =
    "id, title, description, file_path, original_filename, file_type, status, user_id, created_at, updated_at";

/// Review lifecycle of a submission
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubmissionStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "reviewed")]
    Reviewed,
    #[serde(rename = "rejected")]
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Reviewed => "reviewed",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(SubmissionStatus::Pending),
            "reviewed" => Some(SubmissionStatus::Reviewed),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }
}

/// A homework submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub file_path: Option<String>,
    pub original_filename: Option<String>,
    pub file_type: Option<String>,
    pub status: SubmissionStatus,
    pub user_id: Uuid,
    pub created_at: String,
    pub updated_at: Option<String>,
}

/// Fields needed to insert a submission
#[derive(Debug)]
pub struct NewSubmission {
    pub title: String,
    pub description: Option<String>,
    pub file_path: String,
    pub original_filename: String,
    pub file_type: String,
    pub user_id: Uuid,
}

/// Admin-side list filters
#[derive(Debug, Default)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub user_id: Option<Uuid>,
}

/// Aggregate counts for the admin dashboard
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmissionStats {
    pub total_submissions: i64,
    pub pending: i64,
    pub reviewed: i64,
    pub rejected: i64,
    pub with_feedback: i64,
    pub without_feedback: i64,
}

fn row_to_submission(row: &Row<'_>) -> rusqlite::Result<Submission> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(6)?;
    let user_id_str: String = row.get(7)?;

    let conversion = |e: Box<dyn std::error::Error + Send + Sync>, idx: usize| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(Submission {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion(Box::new(e), 0))?,
        title: row.get(1)?,
        description: row.get(2)?,
        file_path: row.get(3)?,
        original_filename: row.get(4)?,
        file_type: row.get(5)?,
        status: SubmissionStatus::from_str(&status_str).unwrap_or(SubmissionStatus::Pending),
        user_id: Uuid::parse_str(&user_id_str).map_err(|e| conversion(Box::new(e), 7))?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn filter_clause(filter: &SubmissionFilter) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if let Some(status) = filter.status {
        values.push(status.as_str().to_string());
        clauses.push(format!("status = ?{}", values.len()));
    }
    if let Some(user_id) = filter.user_id {
        values.push(user_id.to_string());
        clauses.push(format!("user_id = ?{}", values.len()));
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    (sql, values)
}

/// Submission storage over the shared SQLite handle
#[derive(Clone)]
pub struct SubmissionStore {
    db: Db,
}

impl SubmissionStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn create(&self, new: NewSubmission) -> Result<Submission> {
        let submission = Submission {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            file_path: Some(new.file_path),
            original_filename: Some(new.original_filename),
            file_type: Some(new.file_type),
            status: SubmissionStatus::Pending,
            user_id: new.user_id,
            created_at: Utc::now().to_rfc3339(),
            updated_at: None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO submissions (id, title, description, file_path, original_filename, file_type, status, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    submission.id.to_string(),
                    submission.title,
                    submission.description,
                    submission.file_path,
                    submission.original_filename,
                    submission.file_type,
                    submission.status.as_str(),
                    submission.user_id.to_string(),
                    submission.created_at,
                ],
            )
            .context("Failed to insert submission")?;
            Ok(())
        })?;

        Ok(submission)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Submission>> {
        self.db.with_conn(|conn| {
            let submission = conn
                .query_row(
                    &format!("SELECT {} FROM submissions WHERE id = ?1", SUBMISSION_COLUMNS),
                    params![id.to_string()],
                    row_to_submission,
                )
                .optional()
                .context("Failed to query submission")?;
            Ok(submission)
        })
    }

    /// One user's submissions, newest first, optionally narrowed by status.
    pub fn list_for_user(
        &self,
        user_id: &Uuid,
        status: Option<SubmissionStatus>,
    ) -> Result<Vec<Submission>> {
        let filter = SubmissionFilter {
            status,
            user_id: Some(*user_id),
        };
        let (where_sql, values) = filter_clause(&filter);

        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM submissions{} ORDER BY created_at DESC",
                SUBMISSION_COLUMNS, where_sql
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), row_to_submission)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Admin-side page over all submissions, newest first.
    pub fn list_paginated(
        &self,
        filter: &SubmissionFilter,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Submission>> {
        let (where_sql, values) = filter_clause(filter);

        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM submissions{} ORDER BY created_at DESC LIMIT {} OFFSET {}",
                SUBMISSION_COLUMNS, where_sql, limit, offset
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), row_to_submission)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count(&self, filter: &SubmissionFilter) -> Result<i64> {
        let (where_sql, values) = filter_clause(filter);

        self.db.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM submissions{}", where_sql);
            let count = conn.query_row(
                &sql,
                rusqlite::params_from_iter(values.iter()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    pub fn set_status(&self, id: &Uuid, status: SubmissionStatus) -> Result<bool> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE submissions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                    params![status.as_str(), Utc::now().to_rfc3339(), id.to_string()],
                )
                .context("Failed to update submission status")?;
            Ok(changed)
        })?;
        Ok(changed > 0)
    }

    pub fn delete(&self, id: &Uuid) -> Result<bool> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute("DELETE FROM submissions WHERE id = ?1", params![id.to_string()])
                .context("Failed to delete submission")?;
            Ok(changed)
        })?;
        Ok(changed > 0)
    }

    pub fn stats(&self) -> Result<SubmissionStats> {
        self.db.with_conn(|conn| {
            let count_status = |status: &str| -> Result<i64> {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM submissions WHERE status = ?1",
                    params![status],
                    |row| row.get(0),
                )?)
            };

            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM submissions", [], |row| row.get(0))?;
            let with_feedback: i64 = conn.query_row(
                "SELECT COUNT(*) FROM submissions s JOIN feedback f ON f.submission_id = s.id",
                [],
                |row| row.get(0),
            )?;

            Ok(SubmissionStats {
                total_submissions: total,
                pending: count_status("pending")?,
                reviewed: count_status("reviewed")?,
                rejected: count_status("rejected")?,
                with_feedback,
                without_feedback: total - with_feedback,
            })
        })
    }
}

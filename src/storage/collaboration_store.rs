//! Collaboration records: submissions shared with other users.

use crate::storage::db::Db;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const COLLABORATION_COLUMNS: &str = "id, submission_id, user_id, permission, created_at";

/// Access level granted to a collaborator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Permission {
    #[serde(rename = "read")]
    Read,
    #[serde(rename = "write")]
    Write,
    #[serde(rename = "admin")]
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" => Some(Permission::Read),
            "write" => Some(Permission::Write),
            "admin" => Some(Permission::Admin),
            _ => None,
        }
    }
}

/// A grant of access to someone else's submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaboration {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub user_id: Uuid,
    pub permission: Permission,
    pub created_at: String,
}

fn row_to_collaboration(row: &Row<'_>) -> rusqlite::Result<Collaboration> {
    let id_str: String = row.get(0)?;
    let submission_str: String = row.get(1)?;
    let user_str: String = row.get(2)?;
    let permission_str: String = row.get(3)?;

    let conversion = |e: Box<dyn std::error::Error + Send + Sync>, idx: usize| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(Collaboration {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion(Box::new(e), 0))?,
        submission_id: Uuid::parse_str(&submission_str)
            .map_err(|e| conversion(Box::new(e), 1))?,
        user_id: Uuid::parse_str(&user_str).map_err(|e| conversion(Box::new(e), 2))?,
        permission: Permission::from_str(&permission_str).unwrap_or(Permission::Read),
        created_at: row.get(4)?,
    })
}

/// Collaboration storage over the shared SQLite handle
#[derive(Clone)]
pub struct CollaborationStore {
    db: Db,
}

impl CollaborationStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create a grant, or update the permission if the pair already exists.
    pub fn upsert(
        &self,
        submission_id: &Uuid,
        user_id: &Uuid,
        permission: Permission,
    ) -> Result<Collaboration> {
        if let Some(existing) = self.find(submission_id, user_id)? {
            self.db.with_conn(|conn| {
                conn.execute(
                    "UPDATE collaborations SET permission = ?1 WHERE id = ?2",
                    params![permission.as_str(), existing.id.to_string()],
                )
                .context("Failed to update collaboration")?;
                Ok(())
            })?;
            return Ok(Collaboration {
                permission,
                ..existing
            });
        }

        let collaboration = Collaboration {
            id: Uuid::new_v4(),
            submission_id: *submission_id,
            user_id: *user_id,
            permission,
            created_at: Utc::now().to_rfc3339(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO collaborations (id, submission_id, user_id, permission, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    collaboration.id.to_string(),
                    collaboration.submission_id.to_string(),
                    collaboration.user_id.to_string(),
                    collaboration.permission.as_str(),
                    collaboration.created_at,
                ],
            )
            .context("Failed to insert collaboration")?;
            Ok(())
        })?;

        Ok(collaboration)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Collaboration>> {
        self.db.with_conn(|conn| {
            let collaboration = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM collaborations WHERE id = ?1",
                        COLLABORATION_COLUMNS
                    ),
                    params![id.to_string()],
                    row_to_collaboration,
                )
                .optional()
                .context("Failed to query collaboration")?;
            Ok(collaboration)
        })
    }

    pub fn find(&self, submission_id: &Uuid, user_id: &Uuid) -> Result<Option<Collaboration>> {
        self.db.with_conn(|conn| {
            let collaboration = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM collaborations WHERE submission_id = ?1 AND user_id = ?2",
                        COLLABORATION_COLUMNS
                    ),
                    params![submission_id.to_string(), user_id.to_string()],
                    row_to_collaboration,
                )
                .optional()
                .context("Failed to query collaboration pair")?;
            Ok(collaboration)
        })
    }

    /// Grants on every submission owned by `owner_id`.
    pub fn list_for_owner(&self, owner_id: &Uuid) -> Result<Vec<Collaboration>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM collaborations c
                 JOIN submissions s ON s.id = c.submission_id
                 WHERE s.user_id = ?1
                 ORDER BY c.created_at DESC",
                COLLABORATION_COLUMNS
                    .split(", ")
                    .map(|col| format!("c.{}", col))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![owner_id.to_string()], row_to_collaboration)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn list_for_submission(&self, submission_id: &Uuid) -> Result<Vec<Collaboration>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM collaborations WHERE submission_id = ?1 ORDER BY created_at DESC",
                COLLABORATION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![submission_id.to_string()], row_to_collaboration)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete(&self, id: &Uuid) -> Result<bool> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM collaborations WHERE id = ?1",
                    params![id.to_string()],
                )
                .context("Failed to delete collaboration")?;
            Ok(changed)
        })?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;
    use crate::auth::user_store::UserStore;
    use crate::storage::submission_store::{NewSubmission, SubmissionStore};

    fn setup() -> (CollaborationStore, Uuid, Uuid, Uuid) {
        let db = Db::open_in_memory().unwrap();
        let users = UserStore::new(db.clone());
        let owner = users
            .create_user("owner@school.edu", "O", "pw", UserRole::Student)
            .unwrap();
        let peer = users
            .create_user("peer@school.edu", "P", "pw", UserRole::Student)
            .unwrap();
        let submissions = SubmissionStore::new(db.clone());
        let submission = submissions
            .create(NewSubmission {
                title: "shared".to_string(),
                description: None,
                file_path: "user/f.txt".to_string(),
                original_filename: "f.txt".to_string(),
                file_type: "text/plain".to_string(),
                user_id: owner.id,
            })
            .unwrap();
        (
            CollaborationStore::new(db),
            owner.id,
            peer.id,
            submission.id,
        )
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let (store, owner, peer, submission) = setup();

        let created = store.upsert(&submission, &peer, Permission::Read).unwrap();
        assert_eq!(created.permission, Permission::Read);

        // Same pair again only bumps the permission
        let updated = store.upsert(&submission, &peer, Permission::Write).unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.permission, Permission::Write);

        assert_eq!(store.list_for_submission(&submission).unwrap().len(), 1);
        assert_eq!(store.list_for_owner(&owner).unwrap().len(), 1);
    }

    #[test]
    fn test_find_and_delete() {
        let (store, _, peer, submission) = setup();
        let created = store.upsert(&submission, &peer, Permission::Admin).unwrap();

        let found = store.find(&submission, &peer).unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.permission, Permission::Admin);

        assert!(store.delete(&created.id).unwrap());
        assert!(!store.delete(&created.id).unwrap());
        assert!(store.find(&submission, &peer).unwrap().is_none());
    }

    #[test]
    fn test_permission_string_conversion() {
        assert_eq!(Permission::from_str("WRITE"), Some(Permission::Write));
        assert_eq!(Permission::from_str("bogus"), None);
        assert_eq!(Permission::Admin.as_str(), "admin");
    }
}

//! Correction templates: reusable grading structures teachers maintain.

use crate::storage::db::Db;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TEMPLATE_COLUMNS: &str =
    "id, title, description, structure, is_public, is_default, creator_id, created_at";

/// A correction template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub structure: String,
    pub is_public: bool,
    pub is_default: bool,
    pub creator_id: Uuid,
    pub created_at: String,
}

/// Per-template usage numbers for the admin dashboard
#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateStats {
    pub template_id: Uuid,
    pub title: String,
    pub creator: String,
    pub usage_count: i64,
    pub is_public: bool,
    pub is_default: bool,
}

fn row_to_template(row: &Row<'_>) -> rusqlite::Result<Template> {
    let id_str: String = row.get(0)?;
    let creator_str: String = row.get(6)?;

    let conversion = |e: Box<dyn std::error::Error + Send + Sync>, idx: usize| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(Template {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion(Box::new(e), 0))?,
        title: row.get(1)?,
        description: row.get(2)?,
        structure: row.get(3)?,
        is_public: row.get(4)?,
        is_default: row.get(5)?,
        creator_id: Uuid::parse_str(&creator_str).map_err(|e| conversion(Box::new(e), 6))?,
        created_at: row.get(7)?,
    })
}

/// Template storage over the shared SQLite handle
#[derive(Clone)]
pub struct TemplateStore {
    db: Db,
}

impl TemplateStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        title: &str,
        description: Option<&str>,
        structure: &str,
        is_public: bool,
        creator_id: &Uuid,
    ) -> Result<Template> {
        let template = Template {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: description.map(|d| d.to_string()),
            structure: structure.to_string(),
            is_public,
            is_default: false,
            creator_id: *creator_id,
            created_at: Utc::now().to_rfc3339(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO templates (id, title, description, structure, is_public, is_default, creator_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                params![
                    template.id.to_string(),
                    template.title,
                    template.description,
                    template.structure,
                    template.is_public,
                    template.creator_id.to_string(),
                    template.created_at,
                ],
            )
            .context("Failed to insert template")?;
            Ok(())
        })?;

        Ok(template)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<Template>> {
        self.db.with_conn(|conn| {
            let template = conn
                .query_row(
                    &format!("SELECT {} FROM templates WHERE id = ?1", TEMPLATE_COLUMNS),
                    params![id.to_string()],
                    row_to_template,
                )
                .optional()
                .context("Failed to query template")?;
            Ok(template)
        })
    }

    pub fn list_public(&self) -> Result<Vec<Template>> {
        self.collect(&format!(
            "SELECT {} FROM templates WHERE is_public = 1 ORDER BY created_at DESC",
            TEMPLATE_COLUMNS
        ))
    }

    pub fn list_all(&self) -> Result<Vec<Template>> {
        self.collect(&format!(
            "SELECT {} FROM templates ORDER BY created_at DESC",
            TEMPLATE_COLUMNS
        ))
    }

    /// The template AI grading falls back to when none is specified.
    pub fn get_default(&self) -> Result<Option<Template>> {
        self.db.with_conn(|conn| {
            let template = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM templates WHERE is_default = 1 LIMIT 1",
                        TEMPLATE_COLUMNS
                    ),
                    [],
                    row_to_template,
                )
                .optional()
                .context("Failed to query default template")?;
            Ok(template)
        })
    }

    /// Archive: hide from the public list. Keeps the row for old feedback.
    pub fn archive(&self, id: &Uuid) -> Result<Option<Template>> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE templates SET is_public = 0, is_default = 0 WHERE id = ?1",
                    params![id.to_string()],
                )
                .context("Failed to archive template")?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// Make one template the default; clears the flag everywhere else.
    pub fn set_default(&self, id: &Uuid) -> Result<Option<Template>> {
        let changed = self.db.with_conn(|conn| {
            conn.execute("UPDATE templates SET is_default = 0", [])
                .context("Failed to clear default templates")?;
            let changed = conn
                .execute(
                    "UPDATE templates SET is_default = 1, is_public = 1 WHERE id = ?1",
                    params![id.to_string()],
                )
                .context("Failed to set default template")?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    /// Usage counts: how many feedback rows were produced with each template.
    pub fn stats(&self) -> Result<Vec<TemplateStats>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.title, u.email, COUNT(f.id), t.is_public, t.is_default
                 FROM templates t
                 JOIN users u ON u.id = t.creator_id
                 LEFT JOIN feedback f ON f.template_id = t.id
                 GROUP BY t.id
                 ORDER BY t.created_at DESC",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    let id_str: String = row.get(0)?;
                    Ok(TemplateStats {
                        template_id: Uuid::parse_str(&id_str).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                0,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?,
                        title: row.get(1)?,
                        creator: row.get(2)?,
                        usage_count: row.get(3)?,
                        is_public: row.get(4)?,
                        is_default: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn collect(&self, sql: &str) -> Result<Vec<Template>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map([], row_to_template)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;
    use crate::auth::user_store::UserStore;

    fn setup() -> (TemplateStore, Uuid) {
        let db = Db::open_in_memory().unwrap();
        let users = UserStore::new(db.clone());
        let teacher = users
            .create_user("t@school.edu", "T", "pw", UserRole::Teacher)
            .unwrap();
        (TemplateStore::new(db), teacher.id)
    }

    #[test]
    fn test_public_listing_excludes_private() {
        let (store, teacher) = setup();
        store
            .create("Rubric A", None, "intro/body/conclusion", true, &teacher)
            .unwrap();
        store
            .create("Draft rubric", None, "wip", false, &teacher)
            .unwrap();

        assert_eq!(store.list_public().unwrap().len(), 1);
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_set_default_is_exclusive() {
        let (store, teacher) = setup();
        let a = store.create("A", None, "s", true, &teacher).unwrap();
        let b = store.create("B", None, "s", false, &teacher).unwrap();

        store.set_default(&a.id).unwrap().unwrap();
        let b = store.set_default(&b.id).unwrap().unwrap();
        assert!(b.is_default);
        assert!(b.is_public); // default implies visible

        let a = store.get(&a.id).unwrap().unwrap();
        assert!(!a.is_default);
        assert_eq!(store.get_default().unwrap().unwrap().id, b.id);
    }

    #[test]
    fn test_archive_clears_flags() {
        let (store, teacher) = setup();
        let t = store.create("T", None, "s", true, &teacher).unwrap();
        store.set_default(&t.id).unwrap();

        let archived = store.archive(&t.id).unwrap().unwrap();
        assert!(!archived.is_public);
        assert!(!archived.is_default);

        assert!(store.archive(&Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_stats_counts_usage() {
        let (store, teacher) = setup();
        let t = store.create("Used", None, "s", true, &teacher).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].template_id, t.id);
        assert_eq!(stats[0].usage_count, 0);
        assert_eq!(stats[0].creator, "t@school.edu");
    }
}

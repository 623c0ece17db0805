//! Credential Store
//! Mission: Own the user records - registration, lookup, role and activity flags

use crate::auth::models::{User, UserRole};
use crate::storage::db::Db;
use anyhow::{Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, name, password_hash, role, is_active, is_verified, is_admin, created_at, updated_at";

/// User storage over the shared SQLite handle
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let role_str: String = row.get(4)?;
    Ok(User {
        id: Uuid::parse_str(&id_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        role: UserRole::from_str(&role_str).unwrap_or(UserRole::Student),
        is_active: row.get(5)?,
        is_verified: row.get(6)?,
        is_admin: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl UserStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create the bootstrap admin account when no admin exists yet.
    pub fn ensure_admin(&self, email: &str, password: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM users WHERE is_admin = 1", [], |row| {
                    row.get(0)
                })
                .context("Failed to check for admin users")?;

            if count > 0 {
                return Ok(());
            }

            let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;
            let now = Utc::now().to_rfc3339();

            conn.execute(
                "INSERT INTO users (id, email, name, password_hash, role, is_active, is_verified, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, 1, 1, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    email,
                    "Administrator",
                    password_hash,
                    UserRole::Teacher.as_str(),
                    now,
                ],
            )
            .context("Failed to insert admin user")?;

            info!("🔐 Bootstrap admin account created ({})", email);
            if password == "admin123" {
                warn!("⚠️  Default admin password in use - set ADMIN_PASSWORD!");
            }

            Ok(())
        })
    }

    /// Register a new account. New users start inactive until their email is
    /// verified.
    pub fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        role: UserRole,
    ) -> Result<User> {
        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            role,
            is_active: false,
            is_verified: false,
            is_admin: false,
            created_at: Utc::now().to_rfc3339(),
            updated_at: None,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, password_hash, role, is_active, is_verified, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 0, ?6)",
                params![
                    user.id.to_string(),
                    user.email,
                    user.name,
                    user.password_hash,
                    user.role.as_str(),
                    user.created_at,
                ],
            )
            .context("Failed to insert user")?;
            Ok(())
        })?;

        info!("✅ Registered {} account: {}", role.as_str(), user.email);

        Ok(user)
    }

    pub fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.db.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                    params![email],
                    row_to_user,
                )
                .optional()
                .context("Failed to query user by email")?;
            Ok(user)
        })
    }

    pub fn get_by_id(&self, id: &Uuid) -> Result<Option<User>> {
        self.db.with_conn(|conn| {
            let user = conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                    params![id.to_string()],
                    row_to_user,
                )
                .optional()
                .context("Failed to query user by id")?;
            Ok(user)
        })
    }

    /// Check credentials; returns the user only when the password matches.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.get_by_email(email)? else {
            return Ok(None);
        };

        let valid = verify(password, &user.password_hash).context("Failed to verify password")?;
        Ok(valid.then_some(user))
    }

    /// Page through users, optionally filtering by email substring.
    pub fn list(&self, offset: u32, limit: u32, search: Option<&str>) -> Result<Vec<User>> {
        self.db.with_conn(|conn| {
            let users = match search {
                Some(needle) => {
                    let pattern = format!("%{}%", needle);
                    Self::collect_users(
                        conn,
                        &format!(
                            "SELECT {} FROM users WHERE email LIKE ?1
                             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                            USER_COLUMNS
                        ),
                        params![pattern, limit, offset],
                    )?
                }
                None => Self::collect_users(
                    conn,
                    &format!(
                        "SELECT {} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                        USER_COLUMNS
                    ),
                    params![limit, offset],
                )?,
            };
            Ok(users)
        })
    }

    pub fn count(&self, search: Option<&str>) -> Result<i64> {
        self.db.with_conn(|conn| {
            let count = match search {
                Some(needle) => {
                    let pattern = format!("%{}%", needle);
                    conn.query_row(
                        "SELECT COUNT(*) FROM users WHERE email LIKE ?1",
                        params![pattern],
                        |row| row.get(0),
                    )?
                }
                None => conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?,
            };
            Ok(count)
        })
    }

    pub fn set_admin(&self, id: &Uuid, is_admin: bool) -> Result<Option<User>> {
        self.update_flag(id, "is_admin", is_admin)
    }

    /// Flip the active flag. Deactivation is the soft delete; live tokens are
    /// revoked by the caller.
    pub fn set_active(&self, id: &Uuid, is_active: bool) -> Result<Option<User>> {
        self.update_flag(id, "is_active", is_active)
    }

    /// Mark the account's email as verified, which also activates it.
    pub fn mark_verified(&self, id: &Uuid) -> Result<Option<User>> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET is_verified = 1, is_active = 1, updated_at = ?1 WHERE id = ?2",
                    params![Utc::now().to_rfc3339(), id.to_string()],
                )
                .context("Failed to mark user verified")?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_by_id(id)
    }

    fn update_flag(&self, id: &Uuid, column: &str, value: bool) -> Result<Option<User>> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    &format!("UPDATE users SET {} = ?1, updated_at = ?2 WHERE id = ?3", column),
                    params![value, Utc::now().to_rfc3339(), id.to_string()],
                )
                .with_context(|| format!("Failed to update {}", column))?;
            Ok(changed)
        })?;

        if changed == 0 {
            return Ok(None);
        }
        self.get_by_id(id)
    }

    fn collect_users(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<User>> {
        let mut stmt = conn.prepare(sql)?;
        let users = stmt
            .query_map(params, row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> UserStore {
        UserStore::new(Db::open_in_memory().unwrap())
    }

    #[test]
    fn test_ensure_admin_is_idempotent() {
        let store = store();
        store.ensure_admin("admin@test.local", "hunter22").unwrap();
        store.ensure_admin("admin@test.local", "hunter22").unwrap();

        let admin = store.get_by_email("admin@test.local").unwrap().unwrap();
        assert!(admin.is_admin);
        assert!(admin.is_active);
        assert_eq!(store.count(None).unwrap(), 1);
    }

    #[test]
    fn test_register_and_authenticate() {
        let store = store();
        let user = store
            .create_user("ada@school.edu", "Ada", "correct-horse", UserRole::Student)
            .unwrap();
        assert!(!user.is_active);
        assert!(!user.is_admin);

        // Right password, wrong password, unknown user
        assert!(store
            .authenticate("ada@school.edu", "correct-horse")
            .unwrap()
            .is_some());
        assert!(store
            .authenticate("ada@school.edu", "wrong")
            .unwrap()
            .is_none());
        assert!(store.authenticate("ghost@school.edu", "x").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = store();
        store
            .create_user("dup@school.edu", "One", "pw", UserRole::Student)
            .unwrap();
        assert!(store
            .create_user("dup@school.edu", "Two", "pw", UserRole::Teacher)
            .is_err());
    }

    #[test]
    fn test_verification_activates_account() {
        let store = store();
        let user = store
            .create_user("new@school.edu", "New", "pw", UserRole::Teacher)
            .unwrap();

        let verified = store.mark_verified(&user.id).unwrap().unwrap();
        assert!(verified.is_verified);
        assert!(verified.is_active);
    }

    #[test]
    fn test_flag_updates() {
        let store = store();
        let user = store
            .create_user("flags@school.edu", "F", "pw", UserRole::Student)
            .unwrap();

        let promoted = store.set_admin(&user.id, true).unwrap().unwrap();
        assert!(promoted.is_admin);

        let deactivated = store.set_active(&user.id, false).unwrap().unwrap();
        assert!(!deactivated.is_active);

        // Unknown id is a clean None, not an error
        assert!(store.set_admin(&Uuid::new_v4(), true).unwrap().is_none());
    }

    #[test]
    fn test_list_pagination_and_search() {
        let store = store();
        for i in 0..15 {
            store
                .create_user(
                    &format!("student{}@school.edu", i),
                    "S",
                    "pw",
                    UserRole::Student,
                )
                .unwrap();
        }
        store
            .create_user("teacher@faculty.edu", "T", "pw", UserRole::Teacher)
            .unwrap();

        assert_eq!(store.count(None).unwrap(), 16);
        assert_eq!(store.list(0, 10, None).unwrap().len(), 10);
        assert_eq!(store.list(10, 10, None).unwrap().len(), 6);
        assert_eq!(store.list(100, 10, None).unwrap().len(), 0);

        assert_eq!(store.count(Some("faculty")).unwrap(), 1);
        let found = store.list(0, 10, Some("faculty")).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "teacher@faculty.edu");
    }
}

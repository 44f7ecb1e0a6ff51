//! Binding repository: `(user_id, thread_id)` → agent session.
//!
//! A row may exist with no session — `/model` can record a preference
//! before the first message — so [`BindingStore::get`] only yields rows
//! that actually carry a session id.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use sqlx::Row;

use super::db::Database;
use crate::Result;

/// One thread's persistent session binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// The agent's opaque session identifier.
    pub session_id: String,
    /// Workspace directory the session was created in.
    pub workspace_path: PathBuf,
    /// Model override, `"auto"` when the agent default applies.
    pub model: String,
}

/// Repository wrapper around `SQLite` for binding records.
#[derive(Debug, Clone)]
pub struct BindingStore {
    db: Arc<Database>,
}

impl BindingStore {
    /// Wrap a connected database.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch the binding for a thread, if a session is recorded.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on query failure.
    pub async fn get(&self, user_id: i64, thread_id: i64) -> Result<Option<Binding>> {
        let row = sqlx::query(
            "SELECT session_id, workspace_path, model FROM bindings \
             WHERE user_id = ? AND thread_id = ? AND session_id IS NOT NULL",
        )
        .bind(user_id)
        .bind(thread_id)
        .fetch_optional(self.db.as_ref())
        .await?;

        Ok(row.map(|row| Binding {
            session_id: row.get::<String, _>(0),
            workspace_path: PathBuf::from(row.get::<String, _>(1)),
            model: row.get::<String, _>(2),
        }))
    }

    /// Record (or replace) the session bound to a thread, preserving any
    /// stored model preference.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on write failure.
    pub async fn upsert(
        &self,
        user_id: i64,
        thread_id: i64,
        session_id: &str,
        workspace_path: &std::path::Path,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO bindings (user_id, thread_id, session_id, workspace_path, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (user_id, thread_id) DO UPDATE SET \
               session_id = excluded.session_id, \
               workspace_path = excluded.workspace_path, \
               updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(thread_id)
        .bind(session_id)
        .bind(workspace_path.to_string_lossy().as_ref())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// Delete a thread's binding. The workspace is left in place.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on write failure.
    pub async fn delete(&self, user_id: i64, thread_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM bindings WHERE user_id = ? AND thread_id = ?")
            .bind(user_id)
            .bind(thread_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Store the model preference for a thread, creating the row when the
    /// thread has no session yet.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on write failure.
    pub async fn set_model(&self, user_id: i64, thread_id: i64, model: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO bindings (user_id, thread_id, model, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id, thread_id) DO UPDATE SET \
               model = excluded.model, \
               updated_at = excluded.updated_at",
        )
        .bind(user_id)
        .bind(thread_id)
        .bind(model)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// The model preference for a thread; `"auto"` when none is stored.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` on query failure.
    pub async fn get_model(&self, user_id: i64, thread_id: i64) -> Result<String> {
        let row = sqlx::query("SELECT model FROM bindings WHERE user_id = ? AND thread_id = ?")
            .bind(user_id)
            .bind(thread_id)
            .fetch_optional(self.db.as_ref())
            .await?;
        Ok(row.map_or_else(|| "auto".to_owned(), |row| row.get::<String, _>(0)))
    }
}

//! SQLite-backed session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use jobgate_auth::{Session, SessionPolicy, SessionStore, SessionStoreError};
use jobgate_core::SessionId;

use crate::db::{Database, describe, is_unique_violation};

#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    db: Database,
    policy: SessionPolicy,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            policy: SessionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
        self.policy = policy;
        self
    }
}

fn storage(operation: &str, err: sqlx::Error) -> SessionStoreError {
    SessionStoreError::Storage(describe(operation, &err))
}

fn session_from_row(row: &SqliteRow) -> Result<Session, SessionStoreError> {
    let decode = |e: sqlx::Error| storage("decode session", e);
    let id: String = row.try_get("id").map_err(decode)?;
    let user_id: String = row.try_get("user_id").map_err(decode)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode)?;

    Ok(Session {
        id: id
            .parse()
            .map_err(|e| SessionStoreError::Storage(format!("corrupt session id: {e}")))?,
        identity_token: row.try_get("identity_token").map_err(decode)?,
        user_id: user_id
            .parse()
            .map_err(|e| SessionStoreError::Storage(format!("corrupt session owner: {e}")))?,
        created_at,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), SessionStoreError> {
        sqlx::query(
            "INSERT INTO sessions (id, identity_token, user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(&session.identity_token)
        .bind(session.user_id.to_string())
        .bind(session.created_at)
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                SessionStoreError::Conflict(session.id)
            } else {
                storage("insert session", e)
            }
        })?;
        Ok(())
    }

    async fn fetch(&self, id: SessionId) -> Result<Option<Session>, SessionStoreError> {
        let row = sqlx::query(
            "SELECT id, identity_token, user_id, created_at FROM sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| storage("fetch session", e))?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn revoke(&self, id: SessionId) -> Result<bool, SessionStoreError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(self.db.pool())
            .await
            .map_err(|e| storage("revoke session", e))?;
        Ok(result.rows_affected() > 0)
    }

    fn policy(&self) -> SessionPolicy {
        self.policy
    }
}

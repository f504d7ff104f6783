//! Postgres-backed refresh token registry.
//!
//! ## Rotation
//!
//! `rotate` runs in one transaction:
//! 1. `UPDATE ... SET revoked = TRUE, replaced_by = $new WHERE jti = $old AND
//!    subject = $subject AND revoked = FALSE`
//! 2. zero rows updated: rollback, `ReuseDetected`
//! 3. `INSERT` the successor, commit
//!
//! Under READ COMMITTED a concurrent rotation of the same row blocks on the row
//! lock and then re-evaluates `revoked = FALSE` against the committed value, so
//! exactly one transaction updates the row. A transaction dropped before
//! commit (cancellation, deadline) rolls back and leaves the old entry usable.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | RegistryError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `Duplicate` (on insert) |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / other | N/A | `Backend` |

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::{instrument, Span};

use sessiongate_auth::{RefreshTokenRegistry, RegistryEntry, RegistryError};
use sessiongate_core::{TokenId, UserId};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS refresh_tokens (
        jti         UUID PRIMARY KEY,
        subject     UUID NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        expires_at  TIMESTAMPTZ NOT NULL,
        revoked     BOOLEAN NOT NULL DEFAULT FALSE,
        replaced_by UUID NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS refresh_tokens_active_subject_idx ON refresh_tokens (subject) WHERE revoked = FALSE",
    "CREATE INDEX IF NOT EXISTS refresh_tokens_expires_at_idx ON refresh_tokens (expires_at)",
];

/// Durable refresh token registry.
///
/// `Send + Sync`; all access goes through the SQLx pool. No in-process locks
/// are held, so concurrency control is entirely the database's.
#[derive(Debug, Clone)]
pub struct PostgresRefreshRegistry {
    pool: Arc<PgPool>,
}

impl PostgresRefreshRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(database_url: &str) -> Result<Self, RegistryError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `refresh_tokens` table and its indexes if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenRegistry for PostgresRefreshRegistry {
    #[instrument(skip(self, entry), fields(jti = %entry.jti, subject = %entry.subject), err)]
    async fn create(&self, entry: RegistryEntry) -> Result<(), RegistryError> {
        let jti = entry.jti;
        insert_entry(&*self.pool, &entry)
            .await
            .map_err(|e| map_insert_error(jti, e))
    }

    #[instrument(skip(self), fields(jti = %jti, found = tracing::field::Empty), err)]
    async fn find(&self, jti: TokenId) -> Result<Option<RegistryEntry>, RegistryError> {
        let row = sqlx::query(
            r#"
            SELECT jti, subject, created_at, expires_at, revoked, replaced_by
            FROM refresh_tokens
            WHERE jti = $1
            "#,
        )
        .bind(jti.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find", e))?;

        Span::current().record("found", row.is_some());
        row.map(|r| entry_from_row(&r))
            .transpose()
            .map_err(|e| map_sqlx_error("decode_entry", e))
    }

    #[instrument(skip(self), fields(jti = %jti), err)]
    async fn revoke(&self, jti: TokenId) -> Result<(), RegistryError> {
        sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE jti = $1")
            .bind(jti.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke", e))?;
        Ok(())
    }

    #[instrument(
        skip(self, successor),
        fields(old_jti = %old_jti, new_jti = %successor.jti, subject = %subject),
        err
    )]
    async fn rotate(
        &self,
        old_jti: TokenId,
        subject: UserId,
        successor: RegistryEntry,
    ) -> Result<(), RegistryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let updated = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, replaced_by = $2
            WHERE jti = $1 AND subject = $3 AND revoked = FALSE
            "#,
        )
        .bind(old_jti.as_uuid())
        .bind(successor.jti.as_uuid())
        .bind(subject.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("rotate_revoke", e))?
        .rows_affected();

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(RegistryError::ReuseDetected(old_jti));
        }

        let new_jti = successor.jti;
        insert_entry(&mut *tx, &successor)
            .await
            .map_err(|e| map_insert_error(new_jti, e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(subject = %subject), err)]
    async fn revoke_all_for_subject(&self, subject: UserId) -> Result<u64, RegistryError> {
        let result = sqlx::query("UPDATE refresh_tokens SET revoked = TRUE WHERE subject = $1 AND revoked = FALSE")
            .bind(subject.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("revoke_all_for_subject", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), err)]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RegistryError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("purge_expired", e))?;
        Ok(result.rows_affected())
    }
}

async fn insert_entry<'e, E>(executor: E, entry: &RegistryEntry) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (jti, subject, created_at, expires_at, revoked, replaced_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(*entry.jti.as_uuid())
    .bind(*entry.subject.as_uuid())
    .bind(entry.created_at)
    .bind(entry.expires_at)
    .bind(entry.revoked)
    .bind(entry.replaced_by.map(uuid::Uuid::from))
    .execute(executor)
    .await?;
    Ok(())
}

fn entry_from_row(row: &sqlx::postgres::PgRow) -> Result<RegistryEntry, sqlx::Error> {
    Ok(RegistryEntry {
        jti: TokenId::from_uuid(row.try_get("jti")?),
        subject: UserId::from_uuid(row.try_get("subject")?),
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        revoked: row.try_get("revoked")?,
        replaced_by: row
            .try_get::<Option<uuid::Uuid>, _>("replaced_by")?
            .map(TokenId::from_uuid),
    })
}

fn map_insert_error(jti: TokenId, err: sqlx::Error) -> RegistryError {
    if is_unique_violation(&err) {
        RegistryError::Duplicate(jti)
    } else {
        map_sqlx_error("insert_entry", err)
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> RegistryError {
    match err {
        sqlx::Error::Database(db_err) => RegistryError::backend(format!(
            "database error in {}: {} (code {})",
            operation,
            db_err.message(),
            db_err.code().as_deref().unwrap_or("none")
        )),
        sqlx::Error::PoolClosed => RegistryError::backend(format!("connection pool closed in {operation}")),
        other => RegistryError::backend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

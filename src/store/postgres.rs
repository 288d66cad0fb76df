//! Postgres-backed store.
//!
//! Multi-statement writes (user + identity, identity link, rotation) run inside one
//! transaction. Rotation revokes with a conditional `UPDATE` and only inserts the
//! successor when exactly one row changed; a concurrent refresh of the same token sees
//! zero rows and rolls back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::{AuthStore, StoreError};
use crate::auth::models::{
    AuthIdentity, NewIdentity, NewSession, NewUser, ProfilePatch, Role, Session, User,
};

const USER_COLUMNS: &str =
    "u.id, u.email, u.name, u.avatar_url, u.role::text AS role, u.created_at, u.updated_at";

const SESSION_COLUMNS: &str = "id, user_id, refresh_token_hash, user_agent, ip, expires_at, \
     revoked_at, replaced_session_id, created_at";

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn parse_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse()
        .map_err(|err| StoreError::InvalidRow(format!("users.role: {err}")))
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        avatar_url: row.get("avatar_url"),
        role: parse_role(&role)?,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn session_from_row(row: &PgRow) -> Session {
    Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        refresh_token_hash: row.get("refresh_token_hash"),
        user_agent: row.get("user_agent"),
        ip: row.get("ip"),
        expires_at: row.get("expires_at"),
        revoked_at: row.get("revoked_at"),
        replaced_session_id: row.get("replaced_session_id"),
        created_at: row.get("created_at"),
    }
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn patch_user<'e, E>(executor: E, id: Uuid, patch: &ProfilePatch) -> Result<User, StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    // COALESCE keeps the stored value when the patch field is absent.
    let query = format!(
        r"
        UPDATE users AS u
        SET email = COALESCE($2, u.email),
            name = COALESCE($3, u.name),
            avatar_url = COALESCE($4, u.avatar_url),
            updated_at = NOW()
        WHERE u.id = $1
        RETURNING {USER_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(id)
        .bind(patch.email.as_deref())
        .bind(patch.name.as_deref())
        .bind(patch.avatar_url.as_deref())
        .fetch_optional(executor)
        .instrument(db_span("UPDATE", &query))
        .await?;

    let row = row.ok_or(StoreError::NotFound("user"))?;
    user_from_row(&row)
}

async fn insert_identity<'e, E>(
    executor: E,
    user_id: Uuid,
    identity: &NewIdentity,
) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = r"
        INSERT INTO auth_identities
            (user_id, provider, provider_user_id, email_at_provider, hosted_domain)
        VALUES ($1, $2, $3, $4, $5)
    ";
    sqlx::query(query)
        .bind(user_id)
        .bind(&identity.provider)
        .bind(&identity.provider_user_id)
        .bind(&identity.email_at_provider)
        .bind(identity.hosted_domain.as_deref())
        .execute(executor)
        .instrument(db_span("INSERT", query))
        .await?;
    Ok(())
}

async fn insert_session<'e, E>(executor: E, session: &NewSession) -> Result<Session, StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let query = format!(
        r"
        INSERT INTO sessions
            (id, user_id, refresh_token_hash, user_agent, ip, expires_at, replaced_session_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {SESSION_COLUMNS}
        "
    );
    let row = sqlx::query(&query)
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.refresh_token_hash)
        .bind(session.user_agent.as_deref())
        .bind(session.ip.as_deref())
        .bind(session.expires_at)
        .bind(session.replaced_session_id)
        .fetch_one(executor)
        .instrument(db_span("INSERT", &query))
        .await?;
    Ok(session_from_row(&row))
}

#[async_trait]
impl AuthStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users AS u WHERE u.id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users AS u WHERE u.email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<User>, StoreError> {
        let query = format!(
            r"
            SELECT {USER_COLUMNS}
            FROM auth_identities AS i
            JOIN users AS u ON u.id = i.user_id
            WHERE i.provider = $1 AND i.provider_user_id = $2
            "
        );
        let row = sqlx::query(&query)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn identities_for_user(&self, user_id: Uuid) -> Result<Vec<AuthIdentity>, StoreError> {
        let query = r"
            SELECT id, user_id, provider, provider_user_id, email_at_provider, hosted_domain, created_at
            FROM auth_identities
            WHERE user_id = $1
            ORDER BY created_at ASC
        ";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(rows
            .iter()
            .map(|row| AuthIdentity {
                id: row.get("id"),
                user_id: row.get("user_id"),
                provider: row.get("provider"),
                provider_user_id: row.get("provider_user_id"),
                email_at_provider: row.get("email_at_provider"),
                hosted_domain: row.get("hosted_domain"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn create_user(
        &self,
        user: &NewUser,
        identity: Option<&NewIdentity>,
    ) -> Result<User, StoreError> {
        // User and first identity commit together or not at all.
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r"
            INSERT INTO users AS u (email, name, avatar_url)
            VALUES ($1, $2, $3)
            RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(&user.email)
            .bind(user.name.as_deref())
            .bind(user.avatar_url.as_deref())
            .fetch_one(&mut *tx)
            .instrument(db_span("INSERT", &query))
            .await?;
        let created = user_from_row(&row)?;

        if let Some(identity) = identity {
            insert_identity(&mut *tx, created.id, identity).await?;
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn update_user_profile(
        &self,
        id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<User, StoreError> {
        patch_user(&self.pool, id, patch).await
    }

    async fn link_identity(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
        identity: &NewIdentity,
    ) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user = patch_user(&mut *tx, user_id, patch).await?;
        insert_identity(&mut *tx, user_id, identity).await?;
        tx.commit().await?;
        Ok(user)
    }

    async fn create_session(&self, session: &NewSession) -> Result<Session, StoreError> {
        insert_session(&self.pool, session).await
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<Session>, StoreError> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(row.map(|row| session_from_row(&row)))
    }

    async fn revoke_session(&self, id: Uuid) -> Result<bool, StoreError> {
        let query = "UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn rotate_session(
        &self,
        old: Uuid,
        next: &NewSession,
    ) -> Result<Option<Session>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = r"
            UPDATE sessions
            SET revoked_at = NOW()
            WHERE id = $1
              AND revoked_at IS NULL
              AND expires_at > NOW()
        ";
        let result = sqlx::query(query)
            .bind(old)
            .execute(&mut *tx)
            .instrument(db_span("UPDATE", query))
            .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Ok(None);
        }

        let created = insert_session(&mut *tx, next).await?;
        tx.commit().await?;
        Ok(Some(created))
    }

    async fn delete_expired_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = "DELETE FROM sessions WHERE expires_at < $1";
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }
}

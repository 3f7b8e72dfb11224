use crate::models::token::{Token, TokenScope};
use crate::repositories::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait TokenRepository: Send + Sync {
    async fn insert(&self, token: &Token) -> RepositoryResult<()>;
    /// Fails with [`RepositoryError::NotFound`] when no token of `scope` has this hash.
    async fn find_by_hash(&self, hash: &[u8], scope: TokenScope) -> RepositoryResult<Token>;
    async fn delete_all_for_user(&self, user_id: i64, scope: TokenScope) -> RepositoryResult<()>;
    /// Removes every token that expired before `now`, returning how many went.
    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64>;
}

#[derive(FromRow)]
struct TokenRow {
    user_id: i64,
    scope: String,
    token_hash: Vec<u8>,
    expires_at: i64,
}

impl TryFrom<TokenRow> for Token {
    type Error = RepositoryError;

    fn try_from(row: TokenRow) -> Result<Self, Self::Error> {
        let scope = row
            .scope
            .parse::<TokenScope>()
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        let expires_at = DateTime::from_timestamp_millis(row.expires_at).ok_or_else(|| {
            RepositoryError::Corrupt(format!("Invalid token expiry: {}", row.expires_at))
        })?;

        Ok(Token {
            user_id: row.user_id,
            scope,
            hash: row.token_hash,
            expires_at,
        })
    }
}

pub struct SqliteTokenRepository {
    pool: SqlitePool,
}

impl SqliteTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenRepository for SqliteTokenRepository {
    async fn insert(&self, token: &Token) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (user_id, scope, token_hash, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(token.user_id)
        .bind(token.scope.as_str())
        .bind(&token.hash)
        .bind(token.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_hash(&self, hash: &[u8], scope: TokenScope) -> RepositoryResult<Token> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, scope, token_hash, expires_at
            FROM tokens
            WHERE token_hash = ? AND scope = ?
            "#,
        )
        .bind(hash)
        .bind(scope.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    async fn delete_all_for_user(&self, user_id: i64, scope: TokenScope) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM tokens WHERE user_id = ? AND scope = ?")
            .bind(user_id)
            .bind(scope.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE expires_at < ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

use crate::models::user::User;
use crate::repositories::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait UserRepository: Send + Sync {
    /// Inserts a not-yet-activated user and returns its id.
    ///
    /// Fails with [`RepositoryError::AlreadyExists`] when the email is taken.
    async fn insert(&self, name: &str, email: &str, password_hash: &str) -> RepositoryResult<i64>;
    /// Marks the user activated. Activating an active user is not an error.
    async fn activate(&self, id: i64) -> RepositoryResult<()>;
    async fn find_by_id(&self, id: i64) -> RepositoryResult<User>;
}

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn insert(&self, name: &str, email: &str, password_hash: &str) -> RepositoryResult<i64> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, activated, created_at, updated_at)
            VALUES (?, ?, ?, FALSE, ?, ?)
            "#,
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(res) => Ok(res.last_insert_rowid()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RepositoryError::AlreadyExists)
            }
            Err(e) => Err(RepositoryError::Database(e)),
        }
    }

    async fn activate(&self, id: i64) -> RepositoryResult<()> {
        let result = sqlx::query("UPDATE users SET activated = TRUE, updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> RepositoryResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, activated, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }
}

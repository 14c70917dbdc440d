//! Users repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::user::{StaffRole, User},
};

const USER_COLUMNS: &str = "id, username, password_hash, name, email, role, created_at, updated_at";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by username (case-sensitive, as typed at login)
    pub async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE username = $1", USER_COLUMNS);
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// List all users ordered by username
    pub async fn list(&self) -> AppResult<Vec<User>> {
        let query = format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS);
        let users = sqlx::query_as::<_, User>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Whether a username is used by someone other than `exclude_id`
    pub async fn username_taken(&self, username: &str, exclude_id: Option<i32>) -> AppResult<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 AND ($2::int IS NULL OR id <> $2))",
        )
        .bind(username)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(taken)
    }

    /// Create a user with an already hashed password
    pub async fn create(
        &self,
        username: &str,
        password_hash: &str,
        name: Option<&str>,
        email: Option<&str>,
        role: StaffRole,
    ) -> AppResult<User> {
        let query = format!(
            r#"
            INSERT INTO users (username, password_hash, name, email, role, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING {}
            "#,
            USER_COLUMNS
        );
        let user = sqlx::query_as::<_, User>(&query)
            .bind(username)
            .bind(password_hash)
            .bind(name)
            .bind(email)
            .bind(role)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    pub async fn update_username(&self, id: i32, username: &str) -> AppResult<User> {
        let query = format!(
            "UPDATE users SET username = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn update_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }
        Ok(())
    }
}

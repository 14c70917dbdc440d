//! Staff authentication and account management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use super::notifier::{ChangeAction, ChangeNotifier, ChangeTable};
use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{ChangePassword, CreateUser, StaffRole, UpdateUsername, User, UserClaims},
    repository::users::UsersRepository,
};

#[derive(Clone)]
pub struct UsersService {
    users: UsersRepository,
    config: AuthConfig,
    notifier: ChangeNotifier,
}

impl UsersService {
    pub fn new(users: UsersRepository, config: AuthConfig, notifier: ChangeNotifier) -> Self {
        Self {
            users,
            config,
            notifier,
        }
    }

    /// Authenticate by username and password and return a JWT token
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .users
            .get_by_username(username.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

        if !verify_password(&user.password_hash, password)? {
            tracing::warn!("Failed login for {}", user.username);
            return Err(AppError::Authentication("Invalid username or password".to_string()));
        }

        let token = self.issue_token(&user)?;
        tracing::info!("{} logged in", user.username);
        Ok((token, user))
    }

    /// Token lifetime in seconds
    pub fn token_lifetime(&self) -> i64 {
        self.config.jwt_expiration_hours as i64 * 3600
    }

    fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + self.token_lifetime(),
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.users.get_by_id(id).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.users.list().await
    }

    /// Create a staff account (admin only)
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()?;

        let username = user.username.trim();
        if self.users.username_taken(username, None).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let hash = hash_password(&user.password)?;
        let created = self
            .users
            .create(
                username,
                &hash,
                user.name.as_deref(),
                user.email.as_deref(),
                user.role.unwrap_or(StaffRole::Librarian),
            )
            .await?;
        self.notifier
            .publish(ChangeTable::Users, ChangeAction::Insert, Some(created.id));
        Ok(created)
    }

    /// Change the caller's own username
    pub async fn update_username(&self, user_id: i32, request: UpdateUsername) -> AppResult<User> {
        request.validate()?;

        let username = request.username.trim();
        if self.users.username_taken(username, Some(user_id)).await? {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let user = self.users.update_username(user_id, username).await?;
        self.notifier
            .publish(ChangeTable::Users, ChangeAction::Update, Some(user_id));
        tracing::info!("User {} renamed to {}", user_id, user.username);
        Ok(user)
    }

    /// Change the caller's own password after checking the current one
    pub async fn change_password(&self, user_id: i32, request: ChangePassword) -> AppResult<()> {
        request.validate()?;

        let user = self.users.get_by_id(user_id).await?;
        if !verify_password(&user.password_hash, &request.current_password)? {
            return Err(AppError::Validation("Current password is incorrect".to_string()));
        }

        let hash = hash_password(&request.new_password)?;
        self.users.update_password(user_id, &hash).await?;
        tracing::info!("User {} changed their password", user_id);
        Ok(())
    }

    /// Create the first admin account when no user exists yet
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<Option<User>> {
        if self.users.count().await? > 0 {
            return Ok(None);
        }

        let (Some(username), Some(password)) = (
            self.config.bootstrap_admin_username.as_deref(),
            self.config.bootstrap_admin_password.as_deref(),
        ) else {
            tracing::warn!("No users exist and no bootstrap admin is configured");
            return Ok(None);
        };

        let hash = hash_password(password)?;
        let admin = self
            .users
            .create(username, &hash, None, None, StaffRole::Admin)
            .await?;
        tracing::warn!("Created bootstrap admin account {}; change its password", admin.username);
        Ok(Some(admin))
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

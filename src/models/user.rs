//! Staff user model, JWT claims and the acting principal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::AppError;

/// Staff role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Admin,
    Librarian,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "admin",
            StaffRole::Librarian => "librarian",
        }
    }
}

impl std::str::FromStr for StaffRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(StaffRole::Admin),
            "librarian" => Ok(StaffRole::Librarian),
            _ => Err(format!("Invalid staff role: {}", s)),
        }
    }
}

impl_pg_text_enum!(StaffRole);

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: StaffRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create user request (admin only)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub role: Option<StaffRole>,
}

/// Change own username
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUsername {
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
}

/// Change own password
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePassword {
    #[validate(length(min = 1, message = "Please enter your current password"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
    #[validate(must_match(other = "new_password", message = "New passwords do not match"))]
    pub confirm_password: String,
}

/// JWT Claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: StaffRole,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_admin(&self) -> bool {
        self.role == StaffRole::Admin
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Forbidden: Admin access required".to_string()))
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: Some(self.user_id),
            username: self.sub.clone(),
            role: Some(self.role),
        }
    }
}

/// Principal performing a catalog or ledger operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// `None` for background work such as the expiry sweep
    pub user_id: Option<i32>,
    pub username: String,
    pub role: Option<StaffRole>,
}

impl Actor {
    /// The server itself (sweeper, start-up tasks)
    pub fn system() -> Self {
        Self {
            user_id: None,
            username: "system".to_string(),
            role: None,
        }
    }
}

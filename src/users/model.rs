use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database. Tokens and avatar bytes live beside the
/// row and are loaded only by the calls that need them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub age: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated input for inserting a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub age: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name is required")]
    NameRequired,
    #[error("email is invalid")]
    InvalidEmail,
    #[error("password must be at least 7 characters")]
    PasswordTooShort,
    #[error("password cannot contain \"password\"")]
    PasswordContainsPassword,
    #[error("age must be a positive number")]
    NegativeAge,
}

pub const MIN_PASSWORD_LEN: usize = 7;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub fn normalize_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    Ok(name.to_string())
}

pub fn normalize_email(email: &str) -> Result<String, ValidationError> {
    let email = email.trim().to_lowercase();
    if !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

/// Returns the trimmed password if it is acceptable.
pub fn check_password(password: &str) -> Result<&str, ValidationError> {
    let password = password.trim();
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    if password.to_lowercase().contains("password") {
        return Err(ValidationError::PasswordContainsPassword);
    }
    Ok(password)
}

pub fn check_age(age: i32) -> Result<i32, ValidationError> {
    if age < 0 {
        return Err(ValidationError::NegativeAge);
    }
    Ok(age)
}

use axum::extract::FromRef;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{
    dto::{ProfileUpdate, RegisterRequest},
    model::{check_age, check_password, normalize_email, normalize_name, NewUser, User},
};
use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    emails,
    error::AppError,
    state::AppState,
};

/// Keys accepted by `PATCH /users/me`.
pub const ALLOWED_UPDATES: [&str; 4] = ["name", "age", "password", "email"];

const LOGIN_FAILED: &str = "Unable to login";

pub async fn register(st: &AppState, req: RegisterRequest) -> Result<(User, String), AppError> {
    let name = normalize_name(&req.name)?;
    let email = normalize_email(&req.email)?;
    let password = check_password(&req.password)?;
    let age = check_age(req.age.unwrap_or(0))?;

    let password_hash = hash_password(password)?;
    let user = st
        .users
        .create(NewUser {
            name,
            email,
            password_hash,
            age,
        })
        .await?;

    st.mailer
        .dispatch(emails::welcome(&st.config.mail.from, &user.email, &user.name));

    let token = issue_token(st, &user).await?;
    info!(user_id = %user.id, "user registered");
    Ok((user, token))
}

/// Looks a user up by email and checks the password. Every failure is
/// reported the same way so callers cannot tell which accounts exist.
pub async fn find_by_credentials(
    st: &AppState,
    email: &str,
    password: &str,
) -> Result<User, AppError> {
    let email = normalize_email(email).map_err(|_| AppError::bad_request(LOGIN_FAILED))?;

    let Some(user) = st.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::bad_request(LOGIN_FAILED));
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::bad_request(LOGIN_FAILED));
    }
    Ok(user)
}

/// Signs a new session token and appends it to the user's active set.
pub async fn issue_token(st: &AppState, user: &User) -> Result<String, AppError> {
    let token = JwtKeys::from_ref(st).sign(user.id)?;
    st.users.add_token(user.id, &token).await?;
    Ok(token)
}

pub fn check_update_keys(body: &Map<String, Value>) -> Result<(), AppError> {
    if body.keys().all(|k| ALLOWED_UPDATES.contains(&k.as_str())) {
        Ok(())
    } else {
        Err(AppError::bad_request("invalid update"))
    }
}

pub async fn apply_update(
    st: &AppState,
    mut user: User,
    body: Map<String, Value>,
) -> Result<User, AppError> {
    check_update_keys(&body)?;
    let update: ProfileUpdate = serde_json::from_value(Value::Object(body))
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    // An explicit null fails the same rule an empty value would.
    if let Some(name) = update.name {
        user.name = normalize_name(name.as_deref().unwrap_or_default())?;
    }
    if let Some(email) = update.email {
        user.email = normalize_email(email.as_deref().unwrap_or_default())?;
    }
    if let Some(age) = update.age {
        // null resets to the registration default
        user.age = check_age(age.unwrap_or(0))?;
    }
    if let Some(password) = update.password {
        let password = check_password(password.as_deref().unwrap_or_default())?;
        user.password_hash = hash_password(password)?;
    }

    Ok(st.users.update(&user).await?)
}

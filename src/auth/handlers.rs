use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::password;
use crate::db::accounts;
use crate::error::{AppError, AppResult};
use crate::extractors::JsonBody;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct SignUpRequest {
    #[serde(rename = "User_name")]
    pub username: Option<String>,
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Password")]
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(rename = "Email")]
    pub email: Option<String>,
    #[serde(rename = "Password")]
    pub password: Option<String>,
}

/// Trimmed value, or `None` when absent or blank.
fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Passwords are taken verbatim; only an absent or empty one is missing.
fn required_password(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

// -- Handlers --

/// POST /sign_up — create an account
pub async fn sign_up(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SignUpRequest>,
) -> AppResult<impl IntoResponse> {
    let (Some(username), Some(email), Some(password)) = (
        required(req.username),
        required(req.email),
        required_password(req.password),
    ) else {
        return Err(AppError::BadRequest(
            "User_name, Email and Password are required".into(),
        ));
    };

    let password_hash = password::hash(password, state.config.auth.bcrypt_cost).await?;

    let conn = state.db.get()?;
    let id = accounts::insert_account(&conn, &username, &email, &password_hash)?;
    tracing::info!("Created account {}", id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "Message": "User created successfully" })),
    ))
}

/// POST /login — check email and password
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let (Some(email), Some(password)) =
        (required(req.email), required_password(req.password))
    else {
        return Err(AppError::BadRequest("Email and Password are required".into()));
    };

    let candidates = {
        let conn = state.db.get()?;
        accounts::credentials_by_email(&conn, &email)?
    };

    if candidates.is_empty() {
        // Spend the same bcrypt work as a failed verify so an unknown email
        // is not distinguishable by response time.
        password::hash(password, state.config.auth.bcrypt_cost).await?;
        return Err(AppError::Unauthorized);
    }

    for candidate in candidates {
        if password::verify(password.clone(), candidate.password_hash).await? {
            return Ok(Json(json!({
                "Message": "Login successful",
                "id": candidate.id,
            })));
        }
    }

    Err(AppError::Unauthorized)
}

/// GET /api/tables — every username, in registration order
pub async fn list_usernames(State(state): State<AppState>) -> AppResult<Json<Vec<String>>> {
    let conn = state.db.get()?;
    let names = accounts::list_usernames(&conn)?;
    Ok(Json(names))
}

//! Session authentication middleware and account endpoints
//!
//! Protected routes expect `Authorization: Bearer <token>` where the token
//! comes from `POST /auth/login`. The middleware resolves the session and
//! stores the [`CurrentUser`] in the request extensions for handlers.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::{self, LoginOutcome, Registration};
use crate::db::users::User;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Authenticated caller of a protected route
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

fn bearer_token(request: &Request) -> Option<String> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Reject requests without a live session (401)
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request)
        .ok_or_else(|| ApiError::Unauthorized("Authentication required.".to_string()))?;

    let user = auth::authenticate(&state.db, &token).await?.ok_or_else(|| {
        debug!("Rejected unknown or expired session token");
        ApiError::Unauthorized("Session expired or invalid. Please log in again.".to_string())
    })?;

    request.extensions_mut().insert(CurrentUser { user, token });
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(form): Json<Registration>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = auth::register(&state.db, &form).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginOutcome>> {
    let outcome = auth::login(&state.db, &state.config.session, &req.email, &req.password, req.remember).await?;
    Ok(Json(outcome))
}

/// POST /auth/logout
///
/// Ends the session and clears the caller's session workspace.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> ApiResult<Json<Value>> {
    auth::logout(&state.db, &state.workspace, &current.token, current.user.id).await?;
    Ok(Json(json!({ "message": "You have been logged out." })))
}

/// GET /auth/me
pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.user)
}

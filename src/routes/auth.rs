//! Account endpoints: register, login, token refresh, logout, profile,
//! and password change.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};

use crate::middleware::auth::{require_auth, CurrentUser};
use crate::middleware::rate_limiter::{rate_limit_by_user, RateLimiter};
use crate::models::{
    AppState, AuthResponse, ChangePasswordRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, RegisterRequest, TokenResponse, UserProfile,
};
use crate::types::AppResult;

const PASSWORD_CHANGE_LIMIT: usize = 5;
const PASSWORD_CHANGE_WINDOW: Duration = Duration::from_secs(15 * 60);

pub fn router(state: AppState) -> Router<AppState> {
    let password_limiter = Arc::new(RateLimiter::new(
        PASSWORD_CHANGE_LIMIT,
        PASSWORD_CHANGE_WINDOW,
    ));

    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh));

    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Auth runs before the limiter so hits are attributed to a verified user.
    let sensitive = Router::new()
        .route("/change-password", post(change_password))
        .route_layer(middleware::from_fn_with_state(
            password_limiter,
            rate_limit_by_user,
        ))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    public.merge(protected).merge(sensitive)
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let (user, pair) = state
        .auth
        .register(&body.username, &body.email, &body.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            user,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let (user, pair) = state.auth.login(&body.email, &body.password).await?;

    Ok(Json(AuthResponse {
        message: "Login successful".to_string(),
        user,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let pair = state.auth.refresh(&body.refresh_token).await?;

    Ok(Json(TokenResponse {
        message: "Token refreshed successfully".to_string(),
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    }))
}

async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    body: Option<Json<LogoutRequest>>,
) -> AppResult<Json<MessageResponse>> {
    let token = body.as_ref().and_then(|b| b.refresh_token.as_deref());
    state.auth.logout(current.0.id, token).await?;

    Ok(Json(MessageResponse {
        message: "Logged out successfully".to_string(),
    }))
}

async fn me(Extension(current): Extension<CurrentUser>) -> Json<UserProfile> {
    Json(current.0)
}

async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .auth
        .change_password(current.0.id, &body.current_password, &body.new_password)
        .await?;

    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}

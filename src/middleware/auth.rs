//! Bearer-token authentication and role checks.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;
use uuid::Uuid;

use crate::models::{AppState, UserProfile, UserRole};
use crate::types::{AppError, AppResult};

/// The authenticated caller, attached to the request by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserProfile);

fn bearer_token(req: &Request) -> AppResult<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("No token provided".to_string()))
}

/// Verify the `Authorization: Bearer` header and attach [`CurrentUser`].
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> AppResult<Response> {
    let token = bearer_token(&req)?;
    let user = state.auth.verify_access_token(token).await?;
    req.extensions_mut().insert(CurrentUser((&user).into()));
    Ok(next.run(req).await)
}

/// Admin-only gate. Must run after [`require_auth`].
pub async fn require_admin(
    Extension(current): Extension<CurrentUser>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    if current.0.role != UserRole::Admin {
        return Err(AppError::Forbidden(
            "Admin privileges required".to_string(),
        ));
    }
    Ok(next.run(req).await)
}

/// Ownership check for handlers operating on a user-scoped resource:
/// the caller must be the target user or an admin.
pub fn ensure_self_or_admin(current: &CurrentUser, target_user_id: Uuid) -> AppResult<()> {
    if current.0.role == UserRole::Admin || current.0.id == target_user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You can only access your own resources".to_string(),
        ))
    }
}

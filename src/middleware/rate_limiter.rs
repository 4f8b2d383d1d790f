//! Sliding-window per-user rate limiter.
//!
//! State is an injected, explicitly-scoped map rather than a module global,
//! so each sensitive route gets its own limiter instance. Entries outside
//! the window are evicted on every check.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::types::{AppError, AppResult};

use super::auth::CurrentUser;

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<uuid::Uuid, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a hit for `user_id`, or fail with the seconds until the
    /// oldest in-window hit expires.
    pub fn check(&self, user_id: uuid::Uuid) -> AppResult<()> {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: uuid::Uuid, now: Instant) -> AppResult<()> {
        let mut hits = self.hits.lock().expect("rate limiter poisoned");

        // Evict expired hits everywhere and drop users whose window has
        // fully drained, so the map does not grow with every user ever seen.
        hits.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < self.window);
            !timestamps.is_empty()
        });

        let timestamps = hits.entry(user_id).or_default();

        if timestamps.len() >= self.max_requests {
            let oldest = timestamps[0];
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Err(AppError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            });
        }

        timestamps.push(now);
        Ok(())
    }
}

/// Middleware form. Must run after `require_auth`; unauthenticated
/// requests pass through (the auth layer rejects them anyway).
pub async fn rate_limit_by_user(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> AppResult<Response> {
    if let Some(current) = req.extensions().get::<CurrentUser>() {
        limiter.check(current.0.id)?;
    }
    Ok(next.run(req).await)
}

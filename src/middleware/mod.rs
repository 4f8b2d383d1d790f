pub mod auth;
pub mod cors;
pub mod rate_limiter;

pub use auth::{ensure_self_or_admin, require_admin, require_auth, CurrentUser};
pub use rate_limiter::{rate_limit_by_user, RateLimiter};

//! Request middleware

pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, require_admin, AuthUser, CurrentUser};
pub use rate_limit::{rate_limit_middleware, RateLimiter};

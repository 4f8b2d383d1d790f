//! Token-based authentication: JWT access/refresh pairs with rotation,
//! bcrypt password storage, and account/session operations.

pub mod service;
pub mod tokens;

pub use service::AuthService;
pub use tokens::{Claims, TokenManager, TokenPair, TokenType};

//! Authentication Module
//! Mission: Credential storage, revocable bearer tokens, and role gating

pub mod api;
pub mod middleware;
pub mod models;
pub mod token_store;
pub mod user_store;
pub mod verification;

pub use middleware::{require_admin, require_auth, AuthError};
pub use token_store::TokenStore;
pub use user_store::UserStore;
pub use verification::VerificationCodec;

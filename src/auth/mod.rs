//! Authentication module
//!
//! Bearer credentials backed by an OAuth2 refresh token.
//!
//! The `AuthRefresher` owns the in-memory credential of one source and
//! refreshes it on demand; a `CredentialStore` keeps the refreshed
//! credential across runs.

mod refresher;
mod store;
mod types;

pub use refresher::AuthRefresher;
pub use store::{CredentialStore, EnvFileCredentialStore, MemoryCredentialStore};
pub use types::{CredentialState, OAuthClient};

#[cfg(test)]
mod tests;

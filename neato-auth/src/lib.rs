//! # neato-auth
//!
//! OAuth 2.0 plumbing for Neato Beehive cloud accounts:
//! - OAuth provider abstraction and the Neato Beehive provider
//! - Per-account token lifecycle (connection state, exchanges, auto refresh)
//! - Storage contracts for refresh tokens and client credentials
//! - HTTP client building
//!
//! ## Usage
//!
//! ```rust,ignore
//! use neato_auth::{
//!     oauth::{providers::neato, token::TokenManager},
//!     providers::neato_config,
//! };
//!
//! let provider = neato::Provider::new(client_id, client_secret, neato_config(), http_client);
//! let manager = TokenManager::new(provider);
//! println!("{}", manager.authorization_url().url);
//! manager.exchange_authorization_code(&code).await?;
//! ```

pub mod credentials;
pub mod error;
pub mod http;
pub mod oauth;
pub mod providers;

// Re-export commonly used types
pub use error::{Error, ErrorKind};

//! OAuth 2.0 authentication infrastructure.
//!
//! Provides the authorization-code and refresh-token flows for Neato cloud accounts.

mod connection;
mod provider;

pub mod providers;
pub mod token;

pub use connection::ConnectionState;
pub use provider::{AuthorizationRequest, Provider};

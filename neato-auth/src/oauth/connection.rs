//! Connection state of an OAuth-bound account.

use std::fmt;

use serde::Serialize;

/// Where an account stands in the token lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No usable access token.
    #[default]
    Disconnected,
    /// A token exchange is in flight.
    Authenticating,
    /// Holding a valid access token; the refresh timer is armed when the
    /// server reported an expiry.
    Connected,
    /// The cloud rejected our access token. Stays here until a new
    /// authorization-code or refresh-token exchange is started.
    InvalidToken,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Connected => "connected",
            ConnectionState::InvalidToken => "invalid_token",
        }
    }

    pub fn is_connected(&self) -> bool {
        *self == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! OAuth token types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::SecretString;

/// How long before the reported expiry the access token gets refreshed.
pub const REFRESH_MARGIN_SECS: i64 = 20;

/// OAuth tokens with metadata, as issued by one successful token exchange.
#[derive(Debug, Clone)]
pub struct Tokens {
    /// Access token for API requests.
    pub access_token: SecretString,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: SecretString,
    /// Lifetime of the access token in seconds, as reported by the server.
    pub expires_in: Option<i64>,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Tokens {
    /// Create tokens issued now, deriving `expires_at` from `expires_in`.
    pub fn issued_now(
        access_token: SecretString,
        refresh_token: SecretString,
        expires_in: Option<i64>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_in,
            expires_at: expires_in.and_then(|secs| {
                chrono::Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            }),
        }
    }

    /// Check if the access token is past its reported expiry.
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|expires| expires <= Utc::now())
            .unwrap_or(false)
    }

    /// Get the remaining time until expiration.
    pub fn time_until_expiry(&self) -> Option<chrono::Duration> {
        self.expires_at.map(|expires| expires - Utc::now())
    }
}

/// Delay after which a token living `expires_in` seconds must be refreshed:
/// `max(0, expires_in - 20)` seconds.
pub fn refresh_delay(expires_in: i64) -> Duration {
    let secs = expires_in.saturating_sub(REFRESH_MARGIN_SECS).max(0);
    Duration::from_secs(secs as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(value: &str) -> SecretString {
        SecretString::new(value.to_string())
    }

    #[test]
    fn test_token_not_expired() {
        let tokens = Tokens::issued_now(secret("access"), secret("refresh"), Some(3600));
        assert!(!tokens.is_expired());
        assert!(tokens.time_until_expiry().unwrap() > chrono::Duration::minutes(59));
    }

    #[test]
    fn test_token_expired() {
        let mut tokens = Tokens::issued_now(secret("access"), secret("refresh"), Some(3600));
        tokens.expires_at = Some(Utc::now() - chrono::Duration::hours(1));
        assert!(tokens.is_expired());
    }

    #[test]
    fn test_token_without_expiry_never_expires() {
        let tokens = Tokens::issued_now(secret("access"), secret("refresh"), None);
        assert!(!tokens.is_expired());
        assert!(tokens.time_until_expiry().is_none());
    }

    #[test]
    fn test_unrepresentable_expiry_is_dropped() {
        let tokens = Tokens::issued_now(secret("access"), secret("refresh"), Some(i64::MAX));
        assert_eq!(tokens.expires_in, Some(i64::MAX));
        assert!(tokens.expires_at.is_none());
        assert!(!tokens.is_expired());

        let tokens = Tokens::issued_now(secret("access"), secret("refresh"), Some(i64::MIN));
        assert!(tokens.expires_at.is_none());
    }

    #[test]
    fn test_refresh_delay_keeps_margin() {
        assert_eq!(refresh_delay(3600), Duration::from_secs(3580));
        assert_eq!(refresh_delay(21), Duration::from_secs(1));
    }

    #[test]
    fn test_refresh_delay_never_negative() {
        assert_eq!(refresh_delay(20), Duration::ZERO);
        assert_eq!(refresh_delay(5), Duration::ZERO);
        assert_eq!(refresh_delay(-100), Duration::ZERO);
        assert_eq!(refresh_delay(i64::MIN), Duration::ZERO);
    }
}

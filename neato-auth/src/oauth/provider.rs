//! OAuth provider trait and types.

use async_trait::async_trait;

use super::token::Tokens;
use crate::error::Error;

/// Authorization request with URL and state management data.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequest {
    /// Authorization URL to send the user to.
    pub url: String,
    /// CSRF state parameter embedded in the URL.
    pub state: String,
}

/// Trait for OAuth 2.0 providers.
///
/// Implementations handle the provider-specific parts of the flow:
/// - Authorization URL generation
/// - Authorization code exchange for tokens
/// - Token refresh
///
/// Every call is a single attempt; callers decide whether to try again.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider identifier, used as the credential storage key.
    fn id(&self) -> &'static str;

    /// Build the authorization URL. Pure, no network access.
    fn authorization_url(&self) -> AuthorizationRequest;

    /// Exchange an authorization code for access and refresh tokens.
    async fn exchange_code(&self, code: &str) -> Result<Tokens, Error>;

    /// Obtain new tokens with a refresh token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens, Error>;
}

//! Pre-configured provider settings.

/// Default Neato authorization endpoint users are sent to for consent.
pub const NEATO_AUTHORIZE_URL: &str = "https://apps.neatorobotics.com/oauth2/authorize";

/// Default Beehive API base URL (token endpoint and robot listing).
pub const BEEHIVE_BASE_URL: &str = "https://beehive.neatocloud.com";

/// Loopback redirect URI registered for the hub's OAuth client.
/// Neato requires redirect URIs to start with `https://127.0.0.1`.
pub const NEATO_REDIRECT_URI: &str = "https://127.0.0.1:8888";

/// Scopes requested from Neato.
pub const NEATO_SCOPES: &[&str] = &["public_profile", "control_robots", "maps"];

/// Provider configuration with endpoints and settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Authorization (consent) endpoint.
    pub authorize_url: String,
    /// Base URL of the API hosting `/oauth2/token`.
    pub api_base_url: String,
    /// OAuth redirect URI.
    pub redirect_uri: String,
    /// Scopes requested during authorization.
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/token", self.api_base_url.trim_end_matches('/'))
    }

    /// Override the API base URL (used to point at a test server).
    pub fn with_api_base_url(mut self, api_base_url: &str) -> Self {
        self.api_base_url = api_base_url.to_string();
        self
    }

    /// Override the authorization endpoint.
    pub fn with_authorize_url(mut self, authorize_url: &str) -> Self {
        self.authorize_url = authorize_url.to_string();
        self
    }

    /// Override the redirect URI.
    pub fn with_redirect_uri(mut self, redirect_uri: &str) -> Self {
        self.redirect_uri = redirect_uri.to_string();
        self
    }
}

/// Get the Neato Beehive configuration.
pub fn neato_config() -> ProviderConfig {
    ProviderConfig {
        authorize_url: NEATO_AUTHORIZE_URL.to_string(),
        api_base_url: BEEHIVE_BASE_URL.to_string(),
        redirect_uri: NEATO_REDIRECT_URI.to_string(),
        scopes: NEATO_SCOPES.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neato_config() {
        let config = neato_config();
        assert_eq!(config.authorize_url, "https://apps.neatorobotics.com/oauth2/authorize");
        assert_eq!(config.token_url(), "https://beehive.neatocloud.com/oauth2/token");
        assert_eq!(config.redirect_uri, "https://127.0.0.1:8888");
        assert_eq!(config.scopes, vec!["public_profile", "control_robots", "maps"]);
    }

    #[test]
    fn test_token_url_with_trailing_slash() {
        let config = neato_config().with_api_base_url("http://127.0.0.1:1234/");
        assert_eq!(config.token_url(), "http://127.0.0.1:1234/oauth2/token");
    }
}

//! Neato Beehive OAuth provider implementation.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{oauth_error, Error, ErrorKind, OAuthErrorKind};
use crate::oauth::token::Tokens;
use crate::oauth::AuthorizationRequest;
use crate::providers::ProviderConfig;

/// Constant `state` value sent with the authorization request.
pub const OAUTH_STATE: &str = "neato-hub";

/// Largest token lifetime accepted from the token endpoint (ten years).
pub const MAX_EXPIRES_IN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Request body for the Beehive token endpoint.
#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
    client_id: &'a str,
    client_secret: &'a str,
    redirect_uri: &'a str,
}

/// Token endpoint response. Every field is optional so incomplete answers
/// can be told apart from malformed ones.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<serde_json::Value>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Neato Beehive OAuth provider.
pub struct Provider {
    client_id: String,
    client_secret: SecretString,
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl Provider {
    /// Create a new Neato OAuth provider.
    ///
    /// # Arguments
    ///
    /// * `client_id` - Neato OAuth client ID
    /// * `client_secret` - Neato OAuth client secret
    /// * `config` - Endpoints, redirect URI and scopes
    /// * `http_client` - Shared HTTP client
    pub fn new(
        client_id: String,
        client_secret: SecretString,
        config: ProviderConfig,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            client_id,
            client_secret,
            config,
            http_client,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn request_tokens(&self, request: &TokenRequest<'_>) -> Result<Tokens, Error> {
        let response = self
            .http_client
            .post(self.config.token_url())
            .form(request)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach Neato token endpoint: {:?}", e);
                Error::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            let detail = serde_json::from_str::<TokenResponse>(&body)
                .ok()
                .and_then(|r| r.error_description.or(r.error))
                .unwrap_or_else(|| status.to_string());
            warn!("Access token error ({}): {}", status.as_u16(), detail);
            return Err(oauth_error(
                OAuthErrorKind::TokenExchangeFailed {
                    status: status.as_u16(),
                },
                &detail,
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse Neato token response: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::OAuth(OAuthErrorKind::InvalidResponse),
            }
        })?;

        let access_token = parsed.access_token.filter(|t| !t.is_empty());
        let refresh_token = parsed.refresh_token.filter(|t| !t.is_empty());
        let (Some(access_token), Some(refresh_token)) = (access_token, refresh_token) else {
            warn!("Auth error: token missing from answer");
            return Err(oauth_error(
                OAuthErrorKind::MissingToken,
                "access_token or refresh_token missing from token response",
            ));
        };

        let expires_in = parsed.expires_in.as_ref().and_then(parse_expires_in);
        if let Some(secs) = expires_in {
            if secs.abs() > MAX_EXPIRES_IN_SECS {
                warn!("Auth error: expires_in {} out of range", secs);
                return Err(oauth_error(
                    OAuthErrorKind::InvalidResponse,
                    "expires_in out of range in token response",
                ));
            }
            debug!("Access token expires in {}s", secs);
        }

        Ok(Tokens::issued_now(
            SecretString::new(access_token),
            SecretString::new(refresh_token),
            expires_in,
        ))
    }
}

/// `expires_in` is a number of seconds; some servers send it as a string.
fn parse_expires_in(value: &serde_json::Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|secs| secs as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[async_trait]
impl crate::oauth::Provider for Provider {
    fn id(&self) -> &'static str {
        "neato"
    }

    fn authorization_url(&self) -> AuthorizationRequest {
        let scopes = self.config.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scopes.as_str()),
            ("state", OAUTH_STATE),
        ];

        let url = match url::Url::parse_with_params(&self.config.authorize_url, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                // Fall back to plain concatenation; the configured endpoint is not a valid base.
                warn!("Invalid authorize URL {}: {}", self.config.authorize_url, e);
                let query = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(params.iter())
                    .finish();
                format!("{}?{}", self.config.authorize_url, query)
            }
        };

        AuthorizationRequest {
            url,
            state: OAUTH_STATE.to_string(),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<Tokens, Error> {
        debug!("Requesting new token via authorization code");
        let tokens = self
            .request_tokens(&TokenRequest {
                grant_type: "authorization_code",
                code: Some(code),
                refresh_token: None,
                client_id: &self.client_id,
                client_secret: self.client_secret.expose_secret(),
                redirect_uri: &self.config.redirect_uri,
            })
            .await?;
        info!("Exchanged Neato authorization code for tokens");
        Ok(tokens)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens, Error> {
        debug!("Requesting new token via refresh token");
        let tokens = self
            .request_tokens(&TokenRequest {
                grant_type: "refresh_token",
                code: None,
                refresh_token: Some(refresh_token),
                client_id: &self.client_id,
                client_secret: self.client_secret.expose_secret(),
                redirect_uri: &self.config.redirect_uri,
            })
            .await?;
        info!("Refreshed Neato access token");
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpErrorKind;
    use crate::oauth::Provider as _;
    use crate::providers::neato_config;
    use mockito::{Matcher, Server};

    fn provider_for(base_url: &str) -> Provider {
        Provider::new(
            "client-id".to_string(),
            SecretString::new("client-secret".to_string()),
            neato_config().with_api_base_url(base_url),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_authorization_url() {
        let provider = provider_for("https://beehive.neatocloud.com");
        let request = provider.authorization_url();

        assert_eq!(request.state, OAUTH_STATE);
        assert_eq!(
            request.url,
            "https://apps.neatorobotics.com/oauth2/authorize?\
             client_id=client-id&\
             redirect_uri=https%3A%2F%2F127.0.0.1%3A8888&\
             response_type=code&\
             scope=public_profile+control_robots+maps&\
             state=neato-hub"
        );
    }

    #[test]
    fn test_authorization_url_is_deterministic() {
        let provider = provider_for("https://beehive.neatocloud.com");
        assert_eq!(provider.authorization_url(), provider.authorization_url());
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "auth-code".into()),
                Matcher::UrlEncoded("client_id".into(), "client-id".into()),
                Matcher::UrlEncoded("client_secret".into(), "client-secret".into()),
                Matcher::UrlEncoded("redirect_uri".into(), "https://127.0.0.1:8888".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"access","refresh_token":"refresh","expires_in":3600}"#)
            .create_async()
            .await;

        let tokens = provider_for(&server.url())
            .exchange_code("auth-code")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(tokens.access_token.expose_secret(), "access");
        assert_eq!(tokens.refresh_token.expose_secret(), "refresh");
        assert_eq!(tokens.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn test_refresh_token_sends_refresh_grant() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-refresh".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"access_token":"a2","refresh_token":"r2","expires_in":"7200"}"#)
            .create_async()
            .await;

        let tokens = provider_for(&server.url())
            .refresh_token("old-refresh")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(tokens.refresh_token.expose_secret(), "r2");
        assert_eq!(tokens.expires_in, Some(7200));
    }

    #[tokio::test]
    async fn test_error_status_surfaces_description() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"The code has expired"}"#)
            .create_async()
            .await;

        let err = provider_for(&server.url())
            .exchange_code("stale")
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::OAuth(OAuthErrorKind::TokenExchangeFailed { status: 400 })
        );
        assert!(err.is_rejected_grant());
        assert!(err.to_string().contains("The code has expired"));
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"access","expires_in":3600}"#)
            .create_async()
            .await;

        let err = provider_for(&server.url())
            .exchange_code("code")
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::OAuth(OAuthErrorKind::MissingToken));
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body("<html>not json</html>")
            .create_async()
            .await;

        let err = provider_for(&server.url())
            .exchange_code("code")
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::OAuth(OAuthErrorKind::InvalidResponse));
    }

    #[tokio::test]
    async fn test_out_of_range_expiry_is_invalid_response() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(r#"{"access_token":"a","refresh_token":"r","expires_in":10000000000000}"#)
            .expect(2)
            .create_async()
            .await;
        let provider = provider_for(&server.url());

        let err = provider.exchange_code("code").await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::OAuth(OAuthErrorKind::InvalidResponse));

        let err = provider.refresh_token("refresh").await.unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::OAuth(OAuthErrorKind::InvalidResponse));
    }

    #[tokio::test]
    async fn test_longest_accepted_expiry() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/oauth2/token")
            .with_status(200)
            .with_body(format!(
                r#"{{"access_token":"a","refresh_token":"r","expires_in":{MAX_EXPIRES_IN_SECS}}}"#
            ))
            .create_async()
            .await;

        let tokens = provider_for(&server.url())
            .exchange_code("code")
            .await
            .unwrap();

        assert_eq!(tokens.expires_in, Some(MAX_EXPIRES_IN_SECS));
        assert!(tokens.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        // Nothing listens on port 1.
        let err = provider_for("http://127.0.0.1:1")
            .exchange_code("code")
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::Http(HttpErrorKind::HostUnreachable));
    }

    #[test]
    fn test_parse_expires_in_variants() {
        assert_eq!(parse_expires_in(&serde_json::json!(3600)), Some(3600));
        assert_eq!(parse_expires_in(&serde_json::json!(3600.0)), Some(3600));
        assert_eq!(parse_expires_in(&serde_json::json!(" 60 ")), Some(60));
        assert_eq!(parse_expires_in(&serde_json::json!(null)), None);
        assert_eq!(parse_expires_in(&serde_json::json!("soon")), None);
    }
}

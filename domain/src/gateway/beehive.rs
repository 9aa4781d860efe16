//! Beehive cloud API client.
//!
//! Lists the robots of the account that owns the access token.

use crate::error::{DomainErrorKind, Error, ExternalErrorKind};
use log::*;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

/// Path of the robot list, relative to the Beehive base URL.
pub const ROBOTS_PATH: &str = "/users/me/robots";

/// Versioned media type every Beehive request must accept.
pub const BEEHIVE_ACCEPT: &str = "application/vnd.neato.beehive.v1+json";

/// Error body Beehive sends along with non-2xx statuses.
#[derive(Debug, Deserialize)]
struct BeehiveErrorBody {
    message: Option<String>,
}

/// Beehive client bound to one base URL.
#[derive(Clone)]
pub struct BeehiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl BeehiveClient {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn robots_url(&self) -> String {
        format!("{}{}", self.base_url, ROBOTS_PATH)
    }

    /// Fetch the raw robot list.
    ///
    /// Each element is returned undecoded; a response that is not a JSON
    /// array is a protocol error. 400 and 401 mean the access token was
    /// rejected and map to an authentication error.
    pub async fn list_robots(&self, access_token: &SecretString) -> Result<Vec<Value>, Error> {
        let url = self.robots_url();
        debug!("Loading robots from {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token.expose_secret())
            .header(ACCEPT, BEEHIVE_ACCEPT)
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach Beehive: {:?}", e);
                Error::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Array(elements)) => {
                debug!("Beehive returned {} robot entries", elements.len());
                Ok(elements)
            }
            Ok(other) => {
                warn!("Beehive robot list is not an array: {}", other);
                Err(Error::new(
                    DomainErrorKind::External(ExternalErrorKind::Protocol),
                    "robot list is not a JSON array",
                ))
            }
            Err(e) => {
                warn!("Failed to parse Beehive robot list: {:?}", e);
                Err(Error {
                    source: Some(Box::new(e)),
                    error_kind: DomainErrorKind::External(ExternalErrorKind::Protocol),
                })
            }
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<BeehiveErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .unwrap_or_else(|| status.to_string());
    warn!("Beehive error ({}): {}", status.as_u16(), message);

    let kind = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => ExternalErrorKind::Authentication,
        _ => ExternalErrorKind::Network,
    };
    Error::new(DomainErrorKind::External(kind), &message)
}

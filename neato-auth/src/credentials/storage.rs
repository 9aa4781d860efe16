//! Credential storage trait for OAuth client credentials.

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{credential_error, CredentialErrorKind, Error};

/// OAuth client credentials of an integration.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: SecretString,
}

impl ClientCredentials {
    /// Build credentials, rejecting blank values.
    pub fn new(client_id: &str, client_secret: SecretString) -> Result<Self, Error> {
        if client_id.trim().is_empty() || client_secret.expose_secret().trim().is_empty() {
            return Err(credential_error(
                CredentialErrorKind::Incomplete,
                "client id and client secret must both be set",
            ));
        }
        Ok(Self {
            client_id: client_id.to_string(),
            client_secret,
        })
    }
}

/// Trait for the host's secure store of OAuth client credentials.
///
/// Credentials are keyed by integration name (e.g. `"neato"`).
#[async_trait]
pub trait CredentialStorage: Send + Sync {
    /// Retrieve the client credentials registered for an integration.
    async fn get(&self, integration: &str) -> Result<Option<ClientCredentials>, Error>;

    /// Store client credentials for an integration.
    async fn store(&self, integration: &str, credentials: ClientCredentials) -> Result<(), Error>;
}

/// Process-local credential store.
#[derive(Default)]
pub struct MemoryCredentialStorage {
    credentials: DashMap<String, ClientCredentials>,
}

impl MemoryCredentialStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStorage for MemoryCredentialStorage {
    async fn get(&self, integration: &str) -> Result<Option<ClientCredentials>, Error> {
        Ok(self
            .credentials
            .get(integration)
            .map(|entry| entry.value().clone()))
    }

    async fn store(&self, integration: &str, credentials: ClientCredentials) -> Result<(), Error> {
        self.credentials.insert(integration.to_string(), credentials);
        Ok(())
    }
}

/// Look up credentials, turning an absent entry into a `NotFound` error.
pub async fn require_credentials(
    storage: &dyn CredentialStorage,
    integration: &str,
) -> Result<ClientCredentials, Error> {
    storage.get(integration).await?.ok_or_else(|| {
        credential_error(
            CredentialErrorKind::NotFound,
            &format!("no client credentials registered for {integration}"),
        )
    })
}

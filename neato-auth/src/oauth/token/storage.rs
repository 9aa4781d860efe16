//! Token storage trait for persisting refresh tokens across restarts.

use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;

use crate::error::Error;

/// Trait for the host-owned key-value store holding each account's refresh token.
///
/// Only the refresh token is persisted; access tokens are short lived and are
/// re-issued from it when an account is reloaded.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store the refresh token for an account, replacing any previous one.
    ///
    /// # Arguments
    ///
    /// * `account_id` - Host identifier of the account
    /// * `refresh_token` - The refresh token to persist
    async fn store(&self, account_id: &str, refresh_token: &SecretString) -> Result<(), Error>;

    /// Retrieve the refresh token of an account.
    ///
    /// # Returns
    ///
    /// `Some(token)` if found, `None` if not found.
    async fn get(&self, account_id: &str) -> Result<Option<SecretString>, Error>;

    /// Delete the refresh token of an account.
    async fn delete(&self, account_id: &str) -> Result<(), Error>;
}

/// Process-local token store.
#[derive(Default)]
pub struct MemoryStorage {
    tokens: DashMap<String, SecretString>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, account_id: &str, refresh_token: &SecretString) -> Result<(), Error> {
        self.tokens
            .insert(account_id.to_string(), refresh_token.clone());
        Ok(())
    }

    async fn get(&self, account_id: &str) -> Result<Option<SecretString>, Error> {
        Ok(self.tokens.get(account_id).map(|entry| entry.value().clone()))
    }

    async fn delete(&self, account_id: &str) -> Result<(), Error> {
        self.tokens.remove(account_id);
        Ok(())
    }
}

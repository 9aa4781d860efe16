//! The Neato integration: pairing, setup, robot reloads and removal of accounts.
//!
//! This is the layer the host talks to. Every operation returns a
//! `Result`; the host maps the error kind onto its own finish codes and
//! shows `Error::user_message()` to the user.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use events::{DomainEvent, EventPublisher, Id};
use log::*;
use neato_auth::credentials::{require_credentials, CredentialStorage};
use neato_auth::oauth::providers::neato;
use neato_auth::oauth::token::{ExchangeTrigger, Storage, TokenManager};
use neato_auth::providers::ProviderConfig;
use secrecy::ExposeSecret;
use tokio::sync::broadcast::error::RecvError;
use url::Url;

use crate::account::Account;
use crate::device_registry::DeviceRegistry;
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use crate::gateway::beehive::BeehiveClient;
use crate::reconcile::Reconciliation;
use crate::robot_directory::RobotDirectory;

/// Key of the Neato client credentials in the host's credential store.
pub const INTEGRATION_NAME: &str = "neato";

/// The host services an account needs after setup.
#[derive(Clone)]
struct Host {
    registry: Arc<dyn DeviceRegistry>,
    token_store: Arc<dyn Storage>,
    publisher: EventPublisher,
}

impl Host {
    /// Work following a successful background refresh.
    async fn after_refresh(&self, account: &Account) {
        if let Err(e) = account
            .persist_refresh_token(self.token_store.as_ref())
            .await
        {
            warn!("Failed to store refreshed token of account {}: {}", account.id(), e);
        }
        if let Err(e) = account
            .load_robots(self.registry.as_ref(), &self.publisher)
            .await
        {
            warn!("Robot reload after refresh failed for account {}: {}", account.id(), e);
        }
    }
}

pub struct NeatoIntegration {
    config: ProviderConfig,
    http_client: reqwest::Client,
    credentials: Arc<dyn CredentialStorage>,
    host: Host,
    accounts: DashMap<Id, Arc<Account>>,
}

impl NeatoIntegration {
    pub fn new(
        config: ProviderConfig,
        http_client: reqwest::Client,
        credentials: Arc<dyn CredentialStorage>,
        token_store: Arc<dyn Storage>,
        registry: Arc<dyn DeviceRegistry>,
        publisher: EventPublisher,
    ) -> Self {
        Self {
            config,
            http_client,
            credentials,
            host: Host {
                registry,
                token_store,
                publisher,
            },
            accounts: DashMap::new(),
        }
    }

    pub fn account(&self, account_id: Id) -> Option<Arc<Account>> {
        self.accounts
            .get(&account_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn account_ids(&self) -> Vec<Id> {
        self.accounts.iter().map(|entry| *entry.key()).collect()
    }

    /// Begin pairing and return the authorization URL to show the user.
    ///
    /// Pairing an account that is already registered is a `DuplicateSetup`
    /// error unless `reconfigure` is set, in which case the existing token
    /// manager is reused.
    pub async fn start_pairing(&self, account_id: Id, reconfigure: bool) -> Result<String, Error> {
        if let Some(existing) = self.account(account_id) {
            return Self::reuse_for_pairing(&existing, reconfigure);
        }

        let account = self.create_account(account_id).await?;
        match self.accounts.entry(account_id) {
            Entry::Occupied(entry) => {
                // Lost a race against another pairing of the same account.
                account.shutdown();
                Self::reuse_for_pairing(entry.get(), reconfigure)
            }
            Entry::Vacant(entry) => {
                let url = account.token_manager().authorization_url().url;
                info!("Started pairing of account {}", account_id);
                entry.insert(account);
                Ok(url)
            }
        }
    }

    fn reuse_for_pairing(account: &Account, reconfigure: bool) -> Result<String, Error> {
        if !reconfigure {
            warn!("Account {} is already set up", account.id());
            return Err(Error::new(
                DomainErrorKind::Internal(InternalErrorKind::DuplicateSetup),
                "account is already registered",
            ));
        }
        info!("Reconfiguring account {}", account.id());
        Ok(account.token_manager().authorization_url().url)
    }

    /// Finish pairing with the OAuth callback the user was redirected to.
    ///
    /// Accepts the full redirect URL or the bare authorization code. When the
    /// exchange fails for an account that never completed setup, the account
    /// is discarded so pairing can start over.
    pub async fn confirm_pairing(&self, account_id: Id, callback: &str) -> Result<(), Error> {
        let account = self.require_account(account_id)?;

        let result = match authorization_code(callback) {
            Ok(code) => account
                .token_manager()
                .exchange_authorization_code(&code)
                .await
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!("Pairing of account {} failed: {}", account_id, e);
            if !account.is_setup_complete() {
                self.discard(&account);
            }
            return Err(e);
        }

        info!("Pairing of account {} confirmed", account_id);
        Ok(())
    }

    /// Set up an account: right after pairing, or on host startup from the
    /// stored refresh token. Loads and reconciles the robots on success.
    pub async fn setup_account(&self, account_id: Id) -> Result<(), Error> {
        if let Some(account) = self.account(account_id) {
            if account.token_manager().access_token().is_none() {
                self.discard(&account);
                return Err(Error::new(
                    DomainErrorKind::External(ExternalErrorKind::Authentication),
                    "pairing was not confirmed",
                ));
            }
            debug!("Setting up freshly paired account {}", account_id);
            return self.finish_setup(&account).await;
        }

        debug!("Setting up account {} from stored refresh token", account_id);
        let account = self.create_account(account_id).await?;

        // Registered before the exchange so a removal in the meantime finds it.
        match self.accounts.entry(account_id) {
            Entry::Occupied(_) => {
                account.shutdown();
                warn!("Account {} is already being set up", account_id);
                return Err(Error::new(
                    DomainErrorKind::Internal(InternalErrorKind::DuplicateSetup),
                    "account is already registered",
                ));
            }
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&account));
            }
        }

        if let Err(e) = self.exchange_stored_token(&account).await {
            warn!("Setup of account {} failed: {}", account_id, e);
            self.discard(&account);
            return Err(e);
        }
        self.finish_setup(&account).await
    }

    async fn exchange_stored_token(&self, account: &Account) -> Result<(), Error> {
        let refresh_token = self
            .host
            .token_store
            .get(&account.id().to_string())
            .await?
            .map(|token| token.expose_secret().clone())
            .unwrap_or_default();

        account
            .token_manager()
            .exchange_refresh_token(&refresh_token)
            .await?;
        Ok(())
    }

    async fn finish_setup(&self, account: &Arc<Account>) -> Result<(), Error> {
        let account_id = account.id();
        if let Err(e) = account
            .persist_refresh_token(self.host.token_store.as_ref())
            .await
        {
            warn!("Failed to store refresh token of account {}: {}", account_id, e);
            self.discard(account);
            return Err(e);
        }
        account.mark_setup_complete();
        info!("Account {} set up", account_id);

        self.host
            .publisher
            .publish(DomainEvent::AuthenticationStatusChanged {
                account_id,
                authenticated: true,
            })
            .await;
        self.host
            .publisher
            .publish(DomainEvent::ConnectionChanged {
                account_id,
                connected: true,
            })
            .await;

        // Robots are best effort; the account itself is set up.
        if let Err(e) = account
            .load_robots(self.host.registry.as_ref(), &self.host.publisher)
            .await
        {
            warn!("Initial robot load for account {} failed: {}", account_id, e);
        }
        if account.is_shut_down() {
            return Err(Error::new(
                DomainErrorKind::Internal(InternalErrorKind::UnknownAccount),
                &format!("account {account_id} was removed during setup"),
            ));
        }
        Ok(())
    }

    /// Fetch the account's robots and reconcile them with the device registry.
    pub async fn reload_robots(&self, account_id: Id) -> Result<Reconciliation, Error> {
        let account = self.require_account(account_id)?;
        account
            .load_robots(self.host.registry.as_ref(), &self.host.publisher)
            .await
    }

    /// Remove an account: stop its timers, forget its refresh token and
    /// remove its robot devices. Removing an unknown account only clears
    /// leftovers in the host stores. An account still being set up is
    /// removed as well, and its setup fails.
    pub async fn remove_account(&self, account_id: Id) -> Result<(), Error> {
        let removed = self.accounts.remove(&account_id);
        match removed {
            Some((_, account)) => {
                account.close().await;
                info!("Removed account {}", account_id);
            }
            None => debug!("Account {} was not registered", account_id),
        }

        self.host
            .token_store
            .delete(&account_id.to_string())
            .await?;

        let robots = self.host.registry.robots_of(account_id).await?;
        if !robots.is_empty() {
            self.host
                .registry
                .remove_robots(robots.into_iter().map(|r| r.id).collect())
                .await?;
        }
        Ok(())
    }

    /// Stop every account. The registry stays as it is.
    pub fn shutdown(&self) {
        for entry in self.accounts.iter() {
            entry.value().shutdown();
        }
    }

    fn require_account(&self, account_id: Id) -> Result<Arc<Account>, Error> {
        self.account(account_id).ok_or_else(|| {
            warn!("Unknown account {}", account_id);
            Error::new(
                DomainErrorKind::Internal(InternalErrorKind::UnknownAccount),
                &format!("account {account_id} is not registered"),
            )
        })
    }

    /// Unregister and stop `account`, unless another instance has taken its place.
    fn discard(&self, account: &Arc<Account>) {
        account.shutdown();
        if self
            .accounts
            .remove_if(&account.id(), |_, current| Arc::ptr_eq(current, account))
            .is_some()
        {
            debug!("Discarded account {}", account.id());
        }
    }

    async fn create_account(&self, account_id: Id) -> Result<Arc<Account>, Error> {
        let credentials =
            require_credentials(self.credentials.as_ref(), INTEGRATION_NAME).await?;
        let provider = neato::Provider::new(
            credentials.client_id,
            credentials.client_secret,
            self.config.clone(),
            self.http_client.clone(),
        );
        let directory = RobotDirectory::new(BeehiveClient::new(
            self.http_client.clone(),
            &self.config.api_base_url,
        ));

        let account = Arc::new(Account::new(
            account_id,
            TokenManager::new(provider),
            directory,
        ));
        spawn_token_watcher(&account, self.host.clone());
        Ok(account)
    }
}

/// Forward token events of an account to the host, and reload robots after
/// every successful background refresh. Stops with the account.
fn spawn_token_watcher(account: &Arc<Account>, host: Host) {
    let weak = Arc::downgrade(account);
    let account_id = account.id();
    let cancel = account.cancellation();
    let mut states = account.token_manager().subscribe_state();
    let mut outcomes = account.token_manager().subscribe();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = states.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let state = states.borrow_and_update().to_string();
                    host.publisher
                        .publish(DomainEvent::AccountStateChanged { account_id, state })
                        .await;
                }
                outcome = outcomes.recv() => match outcome {
                    Ok(outcome) => {
                        host.publisher
                            .publish(DomainEvent::AccountAuthenticated {
                                account_id,
                                success: outcome.success,
                            })
                            .await;
                        if outcome.success && outcome.trigger == ExchangeTrigger::ScheduledRefresh {
                            let Some(account) = weak.upgrade() else {
                                break;
                            };
                            host.after_refresh(&account).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Token watcher of account {} skipped {} events", account_id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("Token watcher of account {} stopped", account_id);
    });
}

/// Authorization code from an OAuth redirect URL, or the input itself when
/// it already is a bare code.
fn authorization_code(callback: &str) -> Result<String, Error> {
    let callback = callback.trim();
    let code = match Url::parse(callback) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned()),
        Err(_) if !callback.contains(['?', '&', '=', '/']) => Some(callback.to_string()),
        Err(_) => None,
    };

    code.filter(|c| !c.is_empty()).ok_or_else(|| {
        Error::new(
            DomainErrorKind::External(ExternalErrorKind::Authentication),
            "OAuth callback carries no authorization code",
        )
    })
}

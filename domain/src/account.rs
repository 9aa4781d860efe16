//! A Neato cloud account registered with the hub.

use std::sync::atomic::{AtomicBool, Ordering};

use events::{DomainEvent, EventPublisher, Id};
use log::*;
use neato_auth::oauth::{providers::neato, token::Storage, token::TokenManager};
use tokio::sync::Mutex;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::device_registry::DeviceRegistry;
use crate::error::{DomainErrorKind, Error, ExternalErrorKind, InternalErrorKind};
use crate::reconcile::{reconcile, Reconciliation};
use crate::robot_directory::{RobotDirectory, StatusSignals};

pub type NeatoTokenManager = TokenManager<neato::Provider>;

/// One Neato account: its token manager and its robot directory.
///
/// Background work tied to the account (the token watcher) stops when
/// the account is shut down or dropped. Writes to the host stores happen
/// under `store_lock` and never after shutdown.
pub struct Account {
    id: Id,
    tokens: NeatoTokenManager,
    directory: RobotDirectory,
    setup_complete: AtomicBool,
    store_lock: Mutex<()>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl Account {
    pub fn new(id: Id, tokens: NeatoTokenManager, directory: RobotDirectory) -> Self {
        let cancel = CancellationToken::new();
        Self {
            id,
            tokens,
            directory,
            setup_complete: AtomicBool::new(false),
            store_lock: Mutex::new(()),
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn token_manager(&self) -> &NeatoTokenManager {
        &self.tokens
    }

    pub fn directory(&self) -> &RobotDirectory {
        &self.directory
    }

    /// Cancelled once the account goes away.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.load(Ordering::Acquire)
    }

    pub(crate) fn mark_setup_complete(&self) {
        self.setup_complete.store(true, Ordering::Release);
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Write the current refresh token to the host's token store.
    pub async fn persist_refresh_token(&self, store: &dyn Storage) -> Result<(), Error> {
        let _guard = self.store_lock.lock().await;
        self.ensure_active()?;

        let Some(refresh_token) = self.tokens.refresh_token() else {
            return Ok(());
        };
        store
            .store(&self.id.to_string(), &refresh_token)
            .await
            .map_err(Error::from)?;
        debug!("Stored refresh token for account {}", self.id);
        Ok(())
    }

    /// Fetch the robot list and bring the device registry in line with it.
    ///
    /// Connectivity and authentication signals are published for every
    /// fetch. A rejected access token moves the token manager to
    /// `InvalidToken`. A failed fetch leaves the registry untouched.
    pub async fn load_robots(
        &self,
        registry: &dyn DeviceRegistry,
        publisher: &EventPublisher,
    ) -> Result<Reconciliation, Error> {
        let _guard = self.store_lock.lock().await;
        self.ensure_active()?;

        let Some(access_token) = self.tokens.access_token() else {
            return Err(Error::new(
                DomainErrorKind::External(ExternalErrorKind::Authentication),
                "account has no access token",
            ));
        };

        let result = self.directory.fetch_robots(&access_token).await;
        self.ensure_active()?;
        self.publish_signals(StatusSignals::from_fetch(&result), publisher)
            .await;

        let robots = match result {
            Ok(robots) => robots,
            Err(e) => {
                warn!("Failed to load robots for account {}: {}", self.id, e);
                if e.is_authentication() {
                    self.tokens.mark_token_invalid();
                }
                return Err(e);
            }
        };

        let known = registry.robots_of(self.id).await?;
        let reconciliation = reconcile(&robots, &known);
        self.apply(registry, &reconciliation).await?;

        publisher
            .publish(DomainEvent::RobotsLoaded {
                account_id: self.id,
                added: reconciliation.to_add.len(),
                updated: reconciliation.to_update.len(),
                removed: reconciliation.to_remove.len(),
            })
            .await;
        Ok(reconciliation)
    }

    async fn apply(
        &self,
        registry: &dyn DeviceRegistry,
        reconciliation: &Reconciliation,
    ) -> Result<(), Error> {
        for (record, robot) in &reconciliation.to_update {
            if record.name != robot.name {
                info!("Robot {} renamed to {}", record.serial, robot.name);
                registry.rename_robot(record.id, &robot.name).await?;
            }
            if record.secret_key != robot.secret_key {
                info!("Secret key of robot {} changed", record.serial);
                registry
                    .set_robot_secret(record.id, &robot.secret_key)
                    .await?;
            }
        }

        if !reconciliation.to_add.is_empty() {
            info!(
                "Adding {} robots to account {}",
                reconciliation.to_add.len(),
                self.id
            );
            registry
                .add_robots(reconciliation.descriptors(self.id))
                .await?;
        }

        if !reconciliation.to_remove.is_empty() {
            info!(
                "Removing {} robots from account {}",
                reconciliation.to_remove.len(),
                self.id
            );
            registry
                .remove_robots(reconciliation.to_remove.iter().map(|r| r.id).collect())
                .await?;
        }
        Ok(())
    }

    async fn publish_signals(&self, signals: StatusSignals, publisher: &EventPublisher) {
        if let Some(connected) = signals.connected {
            publisher
                .publish(DomainEvent::ConnectionChanged {
                    account_id: self.id,
                    connected,
                })
                .await;
        }
        if let Some(authenticated) = signals.authenticated {
            publisher
                .publish(DomainEvent::AuthenticationStatusChanged {
                    account_id: self.id,
                    authenticated,
                })
                .await;
        }
    }

    /// Stop the refresh timer and all background work of this account.
    pub fn shutdown(&self) {
        self.tokens.shutdown();
        self.cancel.cancel();
    }

    /// Shut down, then wait for a store write or robot load in flight to
    /// finish. Nothing touches the host stores for this account afterwards.
    pub async fn close(&self) {
        self.shutdown();
        let _ = self.store_lock.lock().await;
    }

    fn ensure_active(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            debug!("Account {} is shut down, skipping store update", self.id);
            return Err(Error::new(
                DomainErrorKind::Internal(InternalErrorKind::UnknownAccount),
                &format!("account {} was removed", self.id),
            ));
        }
        Ok(())
    }
}

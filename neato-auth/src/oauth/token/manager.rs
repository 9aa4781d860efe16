//! Per-account token manager: connection state, token exchanges and auto refresh.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::{refresh_delay, RefreshSchedule, Tokens};
use crate::error::{token_error, Error, TokenErrorKind};
use crate::oauth::{AuthorizationRequest, ConnectionState, Provider};

/// What started a token exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeTrigger {
    AuthorizationCode,
    RefreshToken,
    /// The expiry timer fired.
    ScheduledRefresh,
}

/// Result of one token exchange, broadcast to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeOutcome {
    pub trigger: ExchangeTrigger,
    pub success: bool,
}

enum Grant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

/// Token manager owning the OAuth credential lifecycle of one account.
///
/// Exchanges for the same account are serialized: a second exchange waits
/// for the one in flight and then runs, so results land in issue order and
/// the latest request wins. The refresh timer lives as long as the manager;
/// dropping the last handle or calling [`TokenManager::shutdown`] stops it.
pub struct TokenManager<P: Provider + 'static> {
    inner: Arc<Inner<P>>,
}

impl<P: Provider + 'static> Clone for TokenManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P> {
    provider: P,
    tokens: RwLock<Option<Tokens>>,
    exchange_lock: Mutex<()>,
    state: watch::Sender<ConnectionState>,
    outcomes: broadcast::Sender<ExchangeOutcome>,
    schedule: RefreshSchedule,
    _stop_timer_on_drop: DropGuard,
}

impl<P: Provider + 'static> TokenManager<P> {
    /// Create a disconnected token manager. Must be called inside a Tokio runtime.
    pub fn new(provider: P) -> Self {
        let cancel = CancellationToken::new();
        let inner = Arc::new_cyclic(|weak: &std::sync::Weak<Inner<P>>| {
            let weak = weak.clone();
            let schedule = RefreshSchedule::spawn(cancel.clone(), move |generation| {
                let inner = weak.upgrade()?;
                Some(async move { inner.run_scheduled_refresh(generation).await })
            });
            let (state, _) = watch::channel(ConnectionState::Disconnected);
            let (outcomes, _) = broadcast::channel(16);
            Inner {
                provider,
                tokens: RwLock::new(None),
                exchange_lock: Mutex::new(()),
                state,
                outcomes,
                schedule,
                _stop_timer_on_drop: cancel.drop_guard(),
            }
        });
        Self { inner }
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    /// Authorization URL the user has to visit to grant access.
    pub fn authorization_url(&self) -> AuthorizationRequest {
        self.inner.provider.authorization_url()
    }

    /// Exchange an authorization code for tokens.
    ///
    /// On success both tokens are replaced, the refresh timer is armed when
    /// the server reported an expiry, and the state becomes `Connected`. On
    /// failure the state becomes `Disconnected` and held tokens are untouched.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<(), Error> {
        let _guard = self.inner.exchange_lock.lock().await;
        self.inner
            .exchange_locked(
                Grant::AuthorizationCode(code),
                ExchangeTrigger::AuthorizationCode,
            )
            .await
    }

    /// Exchange a refresh token for new tokens. Same contract as
    /// [`TokenManager::exchange_authorization_code`]; an empty token fails
    /// right away without a request and without a state change.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<(), Error> {
        if refresh_token.is_empty() {
            warn!("No refresh token given");
            self.inner.publish(ExchangeTrigger::RefreshToken, false);
            return Err(token_error(
                TokenErrorKind::EmptyRefreshToken,
                "No refresh token given",
            ));
        }

        let _guard = self.inner.exchange_lock.lock().await;
        self.inner
            .exchange_locked(
                Grant::RefreshToken(refresh_token),
                ExchangeTrigger::RefreshToken,
            )
            .await
    }

    /// Arm the one-shot refresh timer for a token living `expires_in` seconds.
    /// Returns the delay actually armed, `max(0, expires_in - 20)` seconds.
    pub fn schedule_auto_refresh(&self, expires_in: i64) -> Duration {
        self.inner.schedule_auto_refresh(expires_in)
    }

    /// Record that the cloud rejected the current access token.
    ///
    /// Only applies while `Connected`: the state moves to `InvalidToken` and
    /// the pending refresh is dropped, so nothing retries behind the user's
    /// back. Returns whether the transition happened.
    pub fn mark_token_invalid(&self) -> bool {
        let changed = self.inner.set_state_if(ConnectionState::Connected, ConnectionState::InvalidToken);
        if changed {
            warn!("Access token rejected by the cloud, re-authentication required");
            self.inner.schedule.clear();
        }
        changed
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.inner
            .read_tokens()
            .as_ref()
            .map(|t| t.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<SecretString> {
        self.inner
            .read_tokens()
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    /// Snapshot of the tokens from the last successful exchange.
    pub fn tokens(&self) -> Option<Tokens> {
        self.inner.read_tokens().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver notified on every actual state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Receiver for the outcome of every exchange, scheduled ones included.
    pub fn subscribe(&self) -> broadcast::Receiver<ExchangeOutcome> {
        self.inner.outcomes.subscribe()
    }

    /// Time left until the scheduled refresh, if one is armed.
    pub fn next_refresh_in(&self) -> Option<Duration> {
        self.inner.schedule.remaining()
    }

    /// Stop the refresh timer permanently. In-flight requests still complete,
    /// but no refresh will be scheduled or fired afterwards.
    pub fn shutdown(&self) {
        debug!("Shutting down token manager");
        self.inner.schedule.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.schedule.is_cancelled()
    }
}

impl<P: Provider + 'static> Inner<P> {
    async fn exchange_locked(&self, grant: Grant<'_>, trigger: ExchangeTrigger) -> Result<(), Error> {
        self.set_state(ConnectionState::Authenticating);

        let result = match grant {
            Grant::AuthorizationCode(code) => self.provider.exchange_code(code).await,
            Grant::RefreshToken(refresh_token) => self.provider.refresh_token(refresh_token).await,
        };

        match result {
            Ok(tokens) => {
                let expires_in = tokens.expires_in;
                *self.write_tokens() = Some(tokens);

                match expires_in {
                    Some(expires_in) => {
                        self.schedule_auto_refresh(expires_in);
                    }
                    None => self.schedule.clear(),
                }

                self.set_state(ConnectionState::Connected);
                self.publish(trigger, true);
                Ok(())
            }
            Err(e) => {
                warn!("Token exchange ({:?}) failed: {}", trigger, e);
                self.schedule.clear();
                self.set_state(ConnectionState::Disconnected);
                self.publish(trigger, false);
                Err(e)
            }
        }
    }

    async fn run_scheduled_refresh(&self, generation: u64) {
        let _guard = self.exchange_lock.lock().await;

        // A manual exchange may have rearmed or cleared the timer while we waited.
        if !self.schedule.is_current(generation) {
            debug!("Scheduled refresh superseded, skipping");
            return;
        }

        let Some(refresh_token) = self.read_tokens().as_ref().map(|t| t.refresh_token.clone()) else {
            warn!("Refresh timer fired without a refresh token");
            return;
        };

        info!("Refreshing access token before it expires");
        let _ = self
            .exchange_locked(
                Grant::RefreshToken(refresh_token.expose_secret()),
                ExchangeTrigger::ScheduledRefresh,
            )
            .await;
    }

    fn schedule_auto_refresh(&self, expires_in: i64) -> Duration {
        let delay = refresh_delay(expires_in);
        match self.schedule.arm(delay) {
            Some(_) => debug!("Access token refresh scheduled in {}s", delay.as_secs()),
            None => debug!("Token manager shut down, not scheduling a refresh"),
        }
        delay
    }

    fn set_state(&self, new_state: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == new_state {
                false
            } else {
                *state = new_state;
                true
            }
        });
        if changed {
            debug!("Connection state changed to {}", new_state);
        }
    }

    fn set_state_if(&self, expected: ConnectionState, new_state: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == expected {
                *state = new_state;
                true
            } else {
                false
            }
        })
    }

    fn publish(&self, trigger: ExchangeTrigger, success: bool) {
        // No subscribers is fine.
        let _ = self.outcomes.send(ExchangeOutcome { trigger, success });
    }

    fn read_tokens(&self) -> RwLockReadGuard<'_, Option<Tokens>> {
        self.tokens.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_tokens(&self) -> RwLockWriteGuard<'_, Option<Tokens>> {
        self.tokens.write().unwrap_or_else(PoisonError::into_inner)
    }
}

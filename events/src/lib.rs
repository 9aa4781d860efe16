//! Event system infrastructure for the Neato hub integration.
//!
//! This crate provides the event system that decouples the integration logic
//! from whatever the host does with account and robot changes (update thing
//! states, show notifications, log).
//!
//! # Architecture
//!
//! - **DomainEvent**: Enum representing everything the host may want to react to
//! - **EventHandler**: Trait for implementing event handlers
//! - **EventPublisher**: Publishes events to registered handlers
//!
//! This crate has no dependencies on internal crates (neato-auth, domain),
//! avoiding circular dependencies. Connection states are carried as their
//! string form.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// A type alias for the host's account and device identifiers.
pub type Id = Uuid;

/// Events emitted by the integration for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// The token manager of an account changed connection state
    /// (`disconnected`, `authenticating`, `connected`, `invalid_token`).
    AccountStateChanged { account_id: Id, state: String },
    /// A token exchange finished. Raised for the initial exchange as well as
    /// for every background refresh.
    AccountAuthenticated { account_id: Id, success: bool },
    /// Whether the Beehive cloud could be reached on the last robot fetch.
    ConnectionChanged { account_id: Id, connected: bool },
    /// Whether the cloud accepted the account's access token on the last robot fetch.
    AuthenticationStatusChanged { account_id: Id, authenticated: bool },
    /// A robot list was fetched and applied to the device registry.
    RobotsLoaded {
        account_id: Id,
        added: usize,
        updated: usize,
        removed: usize,
    },
}

impl DomainEvent {
    pub fn account_id(&self) -> Id {
        match self {
            DomainEvent::AccountStateChanged { account_id, .. }
            | DomainEvent::AccountAuthenticated { account_id, .. }
            | DomainEvent::ConnectionChanged { account_id, .. }
            | DomainEvent::AuthenticationStatusChanged { account_id, .. }
            | DomainEvent::RobotsLoaded { account_id, .. } => *account_id,
        }
    }
}

/// Trait for handling domain events.
/// Implementations can perform side effects like updating host thing states,
/// sending notifications, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DomainEvent);
}

/// Publishes domain events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional handler.
    /// Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers.
    pub async fn publish(&self, event: DomainEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

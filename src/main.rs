use async_trait::async_trait;
use domain::device_registry::{DeviceRegistry, MemoryDeviceRegistry};
use domain::integration::{NeatoIntegration, INTEGRATION_NAME};
use events::{DomainEvent, EventHandler, EventPublisher, Id};
use log::{error, info, warn};
use neato_auth::credentials::{ClientCredentials, CredentialStorage, MemoryCredentialStorage};
use neato_auth::http::HttpClientBuilder;
use neato_auth::oauth::token::{MemoryStorage, Storage};
use neato_auth::providers::neato_config;
use secrecy::{ExposeSecret, SecretString};
use service::{config::Config, logging::Logger};
use std::error::Error;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

/// Writes every integration event to the log.
struct LogEvents;

#[async_trait]
impl EventHandler for LogEvents {
    async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::ConnectionChanged {
                connected: false, ..
            }
            | DomainEvent::AuthenticationStatusChanged {
                authenticated: false,
                ..
            }
            | DomainEvent::AccountAuthenticated { success: false, .. } => {
                warn!("{event:?}")
            }
            _ => info!("{event:?}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::new();
    Logger::init_logger(&config)?;

    info!("Starting Neato hub against {}", config.beehive_url());

    let (Some(client_id), Some(client_secret)) =
        (config.neato_client_id(), config.neato_client_secret())
    else {
        error!("NEATO_CLIENT_ID and NEATO_CLIENT_SECRET must both be set");
        return Err("missing Neato client credentials".into());
    };

    let credentials = Arc::new(MemoryCredentialStorage::new());
    credentials
        .store(
            INTEGRATION_NAME,
            ClientCredentials::new(client_id, SecretString::new(client_secret.to_string()))?,
        )
        .await?;

    let mut http_client = HttpClientBuilder::new()
        .with_user_agent(format!("neato_hub_rs/{}", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = config.http_timeout() {
        http_client = http_client.with_timeout(timeout);
    }

    let token_store = Arc::new(MemoryStorage::new());
    let registry = Arc::new(MemoryDeviceRegistry::new());
    let integration = NeatoIntegration::new(
        neato_config()
            .with_api_base_url(config.beehive_url())
            .with_authorize_url(config.authorize_url())
            .with_redirect_uri(config.redirect_uri()),
        http_client.build()?,
        credentials,
        token_store.clone(),
        registry.clone(),
        EventPublisher::new().with_handler(Arc::new(LogEvents)),
    );

    let account_id = config.account_id.unwrap_or_else(Uuid::new_v4);
    match config.refresh_token() {
        Some(refresh_token) => {
            info!("Reloading account {} from refresh token", account_id);
            token_store
                .store(
                    &account_id.to_string(),
                    &SecretString::new(refresh_token.to_string()),
                )
                .await?;
        }
        None => pair(&integration, account_id).await?,
    }

    if let Err(e) = integration.setup_account(account_id).await {
        error!("Setup failed: {}", e.user_message());
        return Err(e.into());
    }

    for robot in registry.robots_of(account_id).await? {
        println!("{}  {}", robot.serial, robot.name);
    }

    info!("Account {} is set up, press Ctrl-C to stop", account_id);
    tokio::signal::ctrl_c().await?;

    if let Some(refresh_token) = token_store.get(&account_id.to_string()).await? {
        println!(
            "Reload later with --account-id {} --refresh-token {}",
            account_id,
            refresh_token.expose_secret()
        );
    }
    integration.remove_account(account_id).await?;
    info!("Stopped");
    Ok(())
}

/// Interactive OAuth pairing on the terminal.
async fn pair(integration: &NeatoIntegration, account_id: Id) -> Result<(), Box<dyn Error>> {
    let url = integration.start_pairing(account_id, false).await?;
    println!("Open this URL and grant access to your Neato account:\n\n  {url}\n");
    println!("Then paste the URL your browser was redirected to:");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let Some(callback) = lines.next_line().await? else {
        return Err("no callback URL given".into());
    };

    if let Err(e) = integration.confirm_pairing(account_id, &callback).await {
        error!("Pairing failed: {}", e.user_message());
        return Err(e.into());
    }
    Ok(())
}

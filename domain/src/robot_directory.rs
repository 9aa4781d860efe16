//! Cached view of an account's robots as last reported by the cloud.

use crate::error::Error;
use crate::gateway::beehive::BeehiveClient;
use crate::robot::{decode_list, Robot};
use log::*;
use secrecy::SecretString;
use tokio::sync::RwLock;

/// Status signals a robot fetch produces for the host.
///
/// `None` means the fetch says nothing about that status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSignals {
    pub connected: Option<bool>,
    pub authenticated: Option<bool>,
}

impl StatusSignals {
    /// A successful fetch confirms both; an unreachable host clears
    /// `connected`; a rejected token clears `authenticated`.
    pub fn from_fetch<T>(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => Self {
                connected: Some(true),
                authenticated: Some(true),
            },
            Err(e) if e.is_host_unreachable() => Self {
                connected: Some(false),
                authenticated: None,
            },
            Err(e) if e.is_authentication() => Self {
                connected: None,
                authenticated: Some(false),
            },
            Err(_) => Self::default(),
        }
    }
}

pub struct RobotDirectory {
    gateway: BeehiveClient,
    robots: RwLock<Vec<Robot>>,
}

impl RobotDirectory {
    pub fn new(gateway: BeehiveClient) -> Self {
        Self {
            gateway,
            robots: RwLock::new(Vec::new()),
        }
    }

    /// Fetch and decode the robot list. The cached snapshot is replaced only
    /// when the fetch succeeds.
    pub async fn fetch_robots(&self, access_token: &SecretString) -> Result<Vec<Robot>, Error> {
        let elements = self.gateway.list_robots(access_token).await?;
        let robots = decode_list(&elements);
        info!("Loaded {} robots", robots.len());
        *self.robots.write().await = robots.clone();
        Ok(robots)
    }

    /// Robots from the last successful fetch.
    pub async fn robots(&self) -> Vec<Robot> {
        self.robots.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DomainErrorKind, ExternalErrorKind};
    use crate::gateway::beehive::ROBOTS_PATH;

    fn token() -> SecretString {
        SecretString::new("access-token".to_string())
    }

    const TWO_ROBOTS: &str = r#"[
        {"serial":"SN1","prefix":"P1","name":"Kitchen","model":"botvacD7","secret_key":"k1"},
        {"serial":"SN2","prefix":"P2","name":"Hall","model":"botvacD5","secret_key":"k2"},
        {"serial":"SN3","name":"Broken"}
    ]"#;

    #[tokio::test]
    async fn test_fetch_replaces_snapshot_and_skips_invalid_entries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ROBOTS_PATH)
            .with_status(200)
            .with_body(TWO_ROBOTS)
            .create_async()
            .await;
        let directory = RobotDirectory::new(BeehiveClient::new(reqwest::Client::new(), &server.url()));

        let robots = directory.fetch_robots(&token()).await.unwrap();

        assert_eq!(robots.len(), 2);
        assert_eq!(directory.robots().await, robots);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", ROBOTS_PATH)
            .with_status(200)
            .with_body(TWO_ROBOTS)
            .expect(1)
            .create_async()
            .await;
        let directory = RobotDirectory::new(BeehiveClient::new(reqwest::Client::new(), &server.url()));
        directory.fetch_robots(&token()).await.unwrap();

        server.reset_async().await;
        server
            .mock("GET", ROBOTS_PATH)
            .with_status(401)
            .create_async()
            .await;

        let err = directory.fetch_robots(&token()).await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(directory.robots().await.len(), 2);
    }

    #[test]
    fn test_status_signals() {
        let ok: Result<(), Error> = Ok(());
        assert_eq!(
            StatusSignals::from_fetch(&ok),
            StatusSignals {
                connected: Some(true),
                authenticated: Some(true)
            }
        );

        let unreachable: Result<(), Error> = Err(Error::new(
            DomainErrorKind::External(ExternalErrorKind::HostUnreachable),
            "dns",
        ));
        assert_eq!(
            StatusSignals::from_fetch(&unreachable),
            StatusSignals {
                connected: Some(false),
                authenticated: None
            }
        );

        let rejected: Result<(), Error> = Err(Error::new(
            DomainErrorKind::External(ExternalErrorKind::Authentication),
            "401",
        ));
        assert_eq!(
            StatusSignals::from_fetch(&rejected),
            StatusSignals {
                connected: None,
                authenticated: Some(false)
            }
        );

        let server_error: Result<(), Error> = Err(Error::new(
            DomainErrorKind::External(ExternalErrorKind::Network),
            "503",
        ));
        assert_eq!(StatusSignals::from_fetch(&server_error), StatusSignals::default());
    }
}

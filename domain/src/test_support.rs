//! Helpers shared by the unit tests of this crate.

use async_trait::async_trait;
use events::{DomainEvent, EventHandler};
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

/// Event handler keeping every event it sees.
#[derive(Default)]
pub(crate) struct Recorder {
    events: Mutex<Vec<DomainEvent>>,
}

impl Recorder {
    pub(crate) fn take(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub(crate) fn snapshot(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for Recorder {
    async fn handle(&self, event: &DomainEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub(crate) const TOKEN_BODY: &str =
    r#"{"access_token":"access","refresh_token":"refresh","expires_in":3600}"#;

pub(crate) const ROBOTS_BODY: &str = r#"[
    {"serial":"SN1","prefix":"P","name":"Kitchen","model":"botvacD7","secret_key":"k1"},
    {"serial":"SN2","prefix":"P","name":"Hall","model":"botvacD5","secret_key":"k2"}
]"#;

/// A token endpoint that holds back its answer to the first request until
/// released, leaving the exchange in flight in between.
pub(crate) struct HeldTokenEndpoint {
    pub(crate) url: String,
    /// Fires once the request has been read.
    pub(crate) received: oneshot::Receiver<()>,
    /// Send to let the response go out.
    pub(crate) release: oneshot::Sender<()>,
}

impl HeldTokenEndpoint {
    pub(crate) async fn start(body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (received_tx, received) = oneshot::channel();
        let (release, release_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            let _ = received_tx.send(());
            let _ = release_rx.await;

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        Self {
            url,
            received,
            release,
        }
    }
}

/// Read one HTTP request, headers and `content-length` bytes of body.
async fn read_request(socket: &mut TcpStream) {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            return;
        }
        request.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if request.len() >= header_end + 4 + content_length {
            return;
        }
    }
}

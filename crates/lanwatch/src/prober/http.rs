use std::time::Duration;

use reqwest::redirect::Policy;
use tracing::debug;

use super::checker::{Checker, ProbeFailure, Reply};
use crate::error::{Error, Result};
use crate::types::ProbeTarget;

/// HTTP health checker.
///
/// Only the status code decides liveness. Response time is not measured, so
/// `latency_ms` is always left unset for HTTP checks.
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()
            .map_err(|e| Error::ProbeSetup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &ProbeTarget) -> std::result::Result<Reply, ProbeFailure> {
        let url = target.url();

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return Err(ProbeFailure::Deadline),
            Err(e) => return Err(ProbeFailure::Transport(e.to_string())),
        };

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "HTTP response");

        if status.is_success() {
            Ok(Reply { latency_ms: None, status_code: Some(status.as_u16()) })
        } else {
            Err(ProbeFailure::Status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve a single canned HTTP response on a random local port
    async fn serve_once(status_line: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response =
                    format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        port
    }

    fn target(port: u16) -> ProbeTarget {
        let mut target = ProbeTarget::icmp("127.0.0.1");
        target.protocol = crate::types::Protocol::Http;
        target.port = Some(port);
        target
    }

    #[tokio::test]
    async fn test_2xx_is_alive() {
        let port = serve_once("204 No Content").await;
        let checker = HttpChecker::new(Duration::from_secs(5)).unwrap();

        let reply = checker.check(&target(port)).await.unwrap();
        assert_eq!(reply.status_code, Some(204));
        assert_eq!(reply.latency_ms, None);
    }

    #[tokio::test]
    async fn test_503_is_rejected() {
        let port = serve_once("503 Service Unavailable").await;
        let checker = HttpChecker::new(Duration::from_secs(5)).unwrap();

        let failure = checker.check(&target(port)).await.unwrap_err();
        assert_eq!(failure, ProbeFailure::Status(503));
    }

    #[tokio::test]
    async fn test_redirect_is_not_followed() {
        let port = serve_once("302 Found").await;
        let checker = HttpChecker::new(Duration::from_secs(5)).unwrap();

        let failure = checker.check(&target(port)).await.unwrap_err();
        assert_eq!(failure, ProbeFailure::Status(302));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let checker = HttpChecker::new(Duration::from_secs(5)).unwrap();
        let failure = checker.check(&target(port)).await.unwrap_err();
        assert!(matches!(failure, ProbeFailure::Transport(_)));
    }

    #[tokio::test]
    async fn test_silent_server_hits_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept and hold the connection without answering
            let held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(held);
        });

        let checker = HttpChecker::new(Duration::from_millis(200)).unwrap();
        let failure = checker.check(&target(port)).await.unwrap_err();
        assert_eq!(failure, ProbeFailure::Deadline);
        assert_eq!(failure.to_string(), "Timeout");
    }
}

//! Control socket client utilities.
//!
//! The Agent (C7) listens on a Unix domain socket per run and speaks a
//! minimal HTTP/1.0-shaped protocol: `GET /status` and `POST /stop`, no
//! persistent connection, no chunked transfer. This module provides the
//! client half, used by `dagu-cli` and by a parent Agent polling a
//! nested-run's child socket.
//!
//! # Example
//!
//! ```rust,ignore
//! use dagu_support::client::{ControlClient, ControlClientConfig};
//!
//! let client = ControlClient::new(ControlClientConfig::default());
//! let body = client.get("/tmp/dagu/sockets/run.sock", "/status").await?;
//! client.post("/tmp/dagu/sockets/run.sock", "/stop", "").await?;
//! ```

use crate::error::{Result, UtilsError};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// Configuration for the control socket client.
#[derive(Debug, Clone)]
pub struct ControlClientConfig {
    /// Timeout for the connect + request + response round trip.
    pub timeout: Duration,

    /// Maximum number of retries for a connection that fails outright
    /// (e.g. the socket file exists but no process is listening yet).
    pub max_retries: u32,

    /// Delay between connection retries.
    pub retry_delay: Duration,
}

impl ControlClientConfig {
    /// Create a new client configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the round-trip timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of connection retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

impl Default for ControlClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_delay: Duration::from_millis(100),
        }
    }
}

/// A minimal HTTP/1.0 response read off a control socket.
#[derive(Debug, Clone)]
pub struct ControlResponse {
    /// The status code parsed from the response's first line.
    pub status: u16,
    /// The response body (everything after the blank line).
    pub body: String,
}

/// Client for the Agent's per-run control socket.
pub struct ControlClient {
    config: ControlClientConfig,
}

impl ControlClient {
    /// Create a new control socket client.
    pub fn new(config: ControlClientConfig) -> Self {
        Self { config }
    }

    /// Send a `GET` request and return the decoded response.
    pub async fn get(&self, socket_path: impl AsRef<Path>, path: &str) -> Result<ControlResponse> {
        self.request(socket_path, "GET", path, "").await
    }

    /// Send a `POST` request with a string body and return the decoded response.
    pub async fn post(
        &self,
        socket_path: impl AsRef<Path>,
        path: &str,
        body: &str,
    ) -> Result<ControlResponse> {
        self.request(socket_path, "POST", path, body).await
    }

    async fn request(
        &self,
        socket_path: impl AsRef<Path>,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<ControlResponse> {
        let socket_path = socket_path.as_ref();
        let mut attempt = 0;

        loop {
            match tokio::time::timeout(self.config.timeout, self.roundtrip(socket_path, method, path, body))
                .await
            {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) if attempt < self.config.max_retries => {
                    tracing::debug!(attempt, error = %e, "control socket request failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(UtilsError::ClientError(format!(
                        "timed out talking to control socket at {:?}",
                        socket_path
                    )))
                }
            }
        }
    }

    async fn roundtrip(
        &self,
        socket_path: &Path,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<ControlResponse> {
        let mut stream = UnixStream::connect(socket_path).await.map_err(|e| {
            UtilsError::ClientError(format!(
                "failed to connect to control socket {:?}: {}",
                socket_path, e
            ))
        })?;

        let request = format!(
            "{method} {path} HTTP/1.0\r\nContent-Length: {len}\r\n\r\n{body}",
            method = method,
            path = path,
            len = body.len(),
            body = body,
        );

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(UtilsError::IoError)?;
        stream.shutdown().await.ok();

        let mut raw = String::new();
        stream
            .read_to_string(&mut raw)
            .await
            .map_err(UtilsError::IoError)?;

        parse_response(&raw)
    }
}

impl Default for ControlClient {
    fn default() -> Self {
        Self::new(ControlClientConfig::default())
    }
}

fn parse_response(raw: &str) -> Result<ControlResponse> {
    let mut parts = raw.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap_or_default();
    let body = parts.next().unwrap_or_default().to_string();

    let status_line = head.lines().next().ok_or_else(|| {
        UtilsError::ClientError("empty control socket response".to_string())
    })?;

    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| {
            UtilsError::ClientError(format!("malformed status line: {:?}", status_line))
        })?;

    Ok(ControlResponse { status, body })
}

/// Helper for building authenticated requests against remote node credentials.
///
/// Only the header-construction helpers are implemented; credential storage
/// and encryption are out of scope.
pub struct AuthHelper;

impl AuthHelper {
    /// Create a bearer token authorization header value.
    pub fn bearer_token(token: &str) -> String {
        format!("Bearer {}", token)
    }

    /// Create a basic auth authorization header value.
    pub fn basic_auth(username: &str, password: &str) -> String {
        use base64::Engine;
        let credentials = format!("{}:{}", username, password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        format!("Basic {}", encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_ok() {
        let raw = "HTTP/1.0 200 OK\r\nContent-Length: 13\r\n\r\n{\"status\":0}\n";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, "{\"status\":0}\n");
    }

    #[test]
    fn test_parse_response_no_body() {
        let raw = "HTTP/1.0 204 No Content\r\n\r\n";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.status, 204);
        assert_eq!(resp.body, "");
    }

    #[test]
    fn test_parse_response_malformed() {
        let raw = "not a status line\r\n\r\n";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn test_parse_response_empty() {
        assert!(parse_response("").is_err());
    }

    #[test]
    fn test_client_config_builder() {
        let config = ControlClientConfig::new()
            .with_timeout(Duration::from_secs(1))
            .with_max_retries(2);

        assert_eq!(config.timeout, Duration::from_secs(1));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_auth_helper() {
        let bearer = AuthHelper::bearer_token("my-token");
        assert_eq!(bearer, "Bearer my-token");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let client = ControlClient::default();
        let result = client.get("/nonexistent/dagu.sock", "/status").await;
        assert!(result.is_err());
    }
}

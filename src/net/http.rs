use axum::http::HeaderMap;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::address::AddressBook;
use crate::error::{ClusterError, Result};
use crate::wal::Sequence;

/// Per-shard write sequence attached to every mutation.
pub const HEADER_REQUEST_COUNT: &str = "Request-Count";
/// Replay cursor of the replica that produced a snapshot.
pub const HEADER_COMMIT_INDEX: &str = "Commit-Index";

/// Parses an optional `Request-Count` header.
pub fn sequence_header(headers: &HeaderMap) -> Result<Option<Sequence>> {
    let Some(value) = headers.get(HEADER_REQUEST_COUNT) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<Sequence>().ok())
        .map(Some)
        .ok_or_else(|| ClusterError::invalid("Invalid Request-Count header"))
}

/// Shared reqwest client plus the address book used to reach peers by name.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    addresses: Arc<AddressBook>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(addresses: Arc<AddressBook>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            addresses,
            timeout,
        }
    }

    pub fn addresses(&self) -> &Arc<AddressBook> {
        &self.addresses
    }

    pub fn request(
        &self,
        method: reqwest::Method,
        server: &str,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.addresses.url(server, path))
            .timeout(self.timeout)
    }

    /// Sends the request and maps transport failures and non-2xx answers onto
    /// [`ClusterError`].
    pub async fn send(
        &self,
        server: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| ClusterError::Unreachable {
                server: server.to_string(),
                reason: e.to_string(),
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ClusterError::Remote {
            server: server.to_string(),
            status,
            message: error_message(&body),
        })
    }

    pub async fn decode<T: DeserializeOwned>(
        &self,
        server: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        response.json::<T>().await.map_err(|e| ClusterError::Remote {
            server: server.to_string(),
            status: 502,
            message: format!("invalid response body: {}", e),
        })
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        server: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.send(server, request).await?;
        self.decode(server, response).await
    }
}

/// Extracts `message` or `error` from a JSON error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    parsed
        .as_ref()
        .and_then(|v| v.get("message").or_else(|| v.get("error")))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

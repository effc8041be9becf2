//! Petal HTTP Client
//!
//! A simple, type-safe HTTP client for communicating with the Petal exec server.
//!
//! Both the CLI and the runner talk to the exec server through this crate.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use petal_client::ExecClient;
//! use petal_core::domain::bundle::Bundle;
//! use petal_core::dto::run::StartRunRequest;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ExecClient::new("http://localhost:9093");
//!
//!     let run = client
//!         .start_run(StartRunRequest {
//!             fab: Bundle::new(std::fs::read("app.fab")?),
//!             override_config: Default::default(),
//!         })
//!         .await?;
//!
//!     let mut logs = client.stream_logs(run.run_id, None).await?;
//!     while let Some(chunk) = logs.next().await {
//!         print!("{}", chunk?.log_output);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod logs;
mod runs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use logs::{LogStream, NdjsonDecoder};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Petal exec server API
///
/// Methods are grouped into:
/// - Run submission and inspection (start, get, list, stop)
/// - Log streaming
/// - Runner-side lifecycle (claim, send logs, complete)
#[derive(Debug, Clone)]
pub struct ExecClient {
    /// Base URL of the exec server (e.g., "http://localhost:9093")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ExecClient {
    /// Create a new exec client
    ///
    /// # Example
    /// ```
    /// use petal_client::ExecClient;
    ///
    /// let client = ExecClient::new("http://localhost:9093");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new exec client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    /// A request timeout also bounds log streams, so streaming clients
    /// should leave it unset.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the exec server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the exec server is up
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Turn a non-success status into an `ApiError` carrying the server's message
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ClientError::api_error(
            status.as_u16(),
            extract_error_message(&error_text),
        ))
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        self.check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        self.check_status(response).await.map(|_| ())
    }
}

/// Pull the message out of an `{"error": "..."}` body, falling back to the raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

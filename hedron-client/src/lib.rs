//! Hedron HTTP Client
//!
//! A small, typed HTTP client for the Hedron controller API.
//!
//! Used by the CLI to manage Projects and inspect what the controller made of
//! them, and by execution backends to report Job counters.
//!
//! # Example
//!
//! ```no_run
//! use hedron_client::ControllerClient;
//! use hedron_core::domain::project::ProjectSpec;
//! use hedron_core::dto::project::CreateProject;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), hedron_client::ClientError> {
//!     let client = ControllerClient::new("http://localhost:8080");
//!
//!     let mut spec = ProjectSpec::default();
//!     spec.image.name = "alpine:3".to_string();
//!     spec.repository.url = "https://github.com/example/demo.git".to_string();
//!
//!     let project = client
//!         .create_project(CreateProject {
//!             name: "demo".to_string(),
//!             namespace: None,
//!             spec,
//!         })
//!         .await?;
//!
//!     println!("Created project: {}", project.metadata.key());
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod projects;
mod revisions;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Hedron controller API
///
/// Methods are grouped by kind:
/// - Projects: create, update, list, get, delete and their revisions
/// - Revisions: get
/// - Jobs: get and status reports
#[derive(Debug, Clone)]
pub struct ControllerClient {
    /// Base URL of the controller (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl ControllerClient {
    /// Create a new controller client
    ///
    /// # Example
    /// ```
    /// use hedron_client::ControllerClient;
    ///
    /// let client = ControllerClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new controller client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    ///
    /// # Example
    /// ```
    /// use hedron_client::ControllerClient;
    /// use reqwest::Client;
    /// use std::time::Duration;
    ///
    /// let http_client = Client::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .build()
    ///     .unwrap();
    ///
    /// let client = ControllerClient::with_client("http://localhost:8080", http_client);
    /// ```
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the controller
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize the JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Request failed with {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code of a response without a body (e.g., DELETE)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

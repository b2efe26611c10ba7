//! HTTP implementation of the remote authority
//!
//! JSON over HTTP with `reqwest`. Every request carries the configured
//! timeout, and transport failures are classified so callers can tell a
//! transient outage from a rejected request.

use crate::authority::{IdentifierRequest, RemoteAuthority, RemoteError, RemoteVisitor};
use crate::config::RemoteConfig;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tt_split::{Assignment, SplitRegistry};

#[derive(Debug, Deserialize)]
struct IdentifierResponse {
    visitor: RemoteVisitor,
}

#[derive(Debug, Serialize)]
struct AssignmentBody<'a> {
    visitor_id: &'a str,
    split_name: &'a str,
    variant: &'a str,
}

/// Remote authority reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpAuthority {
    config: RemoteConfig,
    base_url: Url,
    client: Client,
}

impl HttpAuthority {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns [`RemoteError::InvalidRequest`] if the base URL cannot be
    /// parsed or the HTTP client cannot be built
    pub fn new(config: RemoteConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| RemoteError::InvalidRequest(format!("{}: {e}", config.base_url)))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
        Ok(Self {
            config,
            base_url,
            client,
        })
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// URL for a path below the base URL
    ///
    /// Each segment is percent-encoded, so identifier values may contain
    /// arbitrary characters.
    ///
    /// # Errors
    /// Returns [`RemoteError::InvalidRequest`] if the base URL cannot carry
    /// a path
    pub fn url(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RemoteError::InvalidRequest(format!("{} cannot be a base", self.config.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn classify(&self, err: &reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if err.is_builder() {
            RemoteError::InvalidRequest(err.to_string())
        } else {
            RemoteError::Unreachable(err.to_string())
        }
    }

    fn check_status(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_server_error() {
            Err(RemoteError::Server {
                status: status.as_u16(),
            })
        } else if status.is_client_error() {
            Err(RemoteError::Rejected {
                status: status.as_u16(),
            })
        } else {
            Ok(response)
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: Response) -> Result<T, RemoteError> {
        let body = response.bytes().await.map_err(|e| self.classify(&e))?;
        serde_json::from_slice(&body).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, RemoteError> {
        let url = self.url(segments)?;
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        let response = Self::check_status(response)?;
        self.decode(response).await
    }

    async fn post<B: Serialize + Sync>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<Response, RemoteError> {
        let url = self.url(segments)?;
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.classify(&e))?;
        Self::check_status(response)
    }
}

#[async_trait::async_trait]
impl RemoteAuthority for HttpAuthority {
    async fn fetch_visitor(&self, id: &str) -> Result<RemoteVisitor, RemoteError> {
        self.get(&["api", "v1", "visitors", id]).await
    }

    async fn fetch_split_registry(&self) -> Result<SplitRegistry, RemoteError> {
        self.get(&["api", "v1", "split_registry"]).await
    }

    async fn create_identifier(
        &self,
        request: &IdentifierRequest,
    ) -> Result<RemoteVisitor, RemoteError> {
        let response = self.post(&["api", "v1", "identifier"], request).await?;
        let body: IdentifierResponse = self.decode(response).await?;
        Ok(body.visitor)
    }

    async fn resolve_visitor_by_identifier(
        &self,
        identifier_type: &str,
        identifier_value: &str,
    ) -> Result<RemoteVisitor, RemoteError> {
        self.get(&[
            "api",
            "v1",
            "identifier_types",
            identifier_type,
            "identifiers",
            identifier_value,
            "visitor",
        ])
        .await
    }

    async fn persist_assignment(
        &self,
        visitor_id: &str,
        assignment: &Assignment,
    ) -> Result<(), RemoteError> {
        let body = AssignmentBody {
            visitor_id,
            split_name: assignment.split_name(),
            variant: assignment.variant(),
        };
        self.post(&["api", "v1", "assignment"], &body).await?;
        Ok(())
    }
}

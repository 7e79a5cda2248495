//! HTTP implementation of [`RemoteStore`].
//!
//! Shapes requests to the REST surface and maps response statuses onto the
//! error taxonomy. Timeouts and retries belong to the transport / caller;
//! nothing here retries.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use crate::error::SyncError;
use crate::graph::models::{GoalNode, NodeDraft, NodePatch, PositionUpdate, TrackRecord};
use crate::remote::traits::RemoteStore;

/// Remote CRUD client over HTTP with a bearer credential.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct PositionsBody<'a> {
    positions: &'a [PositionUpdate],
}

impl HttpRemoteStore {
    /// Create a client for `base_url` using an externally supplied bearer
    /// token. The token is never refreshed here; session management is the
    /// caller's concern.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
    }

    /// Map a non-success response onto the error taxonomy.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let reason = if body.is_empty() {
            format!("status {status}")
        } else {
            format!("status {status}: {body}")
        };
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Authorization(reason),
            StatusCode::NOT_FOUND => SyncError::NotFound(reason),
            _ => SyncError::Network(reason),
        })
    }

    fn transport(e: reqwest::Error) -> SyncError {
        SyncError::Network(e.to_string())
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(&self) -> Result<Vec<GoalNode>, SyncError> {
        let response = self
            .request(reqwest::Method::GET, "/api/nodes")
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)
    }

    async fn create(&self, draft: &NodeDraft) -> Result<GoalNode, SyncError> {
        let response = self
            .request(reqwest::Method::POST, "/api/nodes")
            .json(draft)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)
    }

    async fn update(&self, id: &str, patch: &NodePatch) -> Result<(), SyncError> {
        let response = self
            .request(reqwest::Method::PUT, &format!("/api/nodes/{id}"))
            .json(patch)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }

    async fn delete(&self, id: &str) -> Result<(), SyncError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/api/nodes/{id}"))
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }

    async fn bulk_update_positions(&self, positions: &[PositionUpdate]) -> Result<(), SyncError> {
        let response = self
            .request(reqwest::Method::POST, "/api/nodes/positions")
            .json(&PositionsBody { positions })
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }

    async fn fetch_tracks(&self) -> Result<Vec<TrackRecord>, SyncError> {
        let response = self
            .request(reqwest::Method::GET, "/api/track")
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)
    }

    async fn bulk_create_for(
        &self,
        owner_id: &str,
        drafts: &[NodeDraft],
    ) -> Result<(), SyncError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/api/admin/users/{owner_id}/nodes"),
            )
            .json(drafts)
            .send()
            .await
            .map_err(Self::transport)?;
        Self::check(response).await.map(|_| ())
    }
}

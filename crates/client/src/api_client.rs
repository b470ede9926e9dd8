//! HTTP API client for the REST collaborators of the real-time core.

use std::sync::Arc;

use async_trait::async_trait;
use hirewire_shared::{ApiError, ChatMessage, Notification};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth_session::SessionProvider;

/// Request/response operations the core needs from the REST API.
#[async_trait]
pub trait RealtimeApi: Send + Sync {
    /// Conversation history with `partner_id` (snapshot for one conversation).
    async fn fetch_conversation(&self, partner_id: &str) -> Result<Vec<ChatMessage>, ApiError>;

    /// Every notification addressed to the current user.
    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError>;

    /// Persist the read state of one notification. Authoritative.
    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ApiError>;
}

/// HTTP client sending bearer-authenticated JSON requests.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<dyn SessionProvider>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            session,
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.current() {
            Some(session) => rb.bearer_auth(session.access_token),
            None => rb,
        }
    }

    async fn read_response(resp: reqwest::Response) -> Result<String, ApiError> {
        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;
        if !is_success {
            return Err(ApiError::Http { status, body: text });
        }
        Ok(text)
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let resp = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let text = Self::read_response(resp).await?;
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }

    /// Make an authenticated PUT request with a JSON body; an empty response
    /// body decodes as `null`.
    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let url = self.url(path);
        tracing::debug!(%url, "PUT");
        let resp = self
            .authorize(self.client.put(&url))
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        let text = Self::read_response(resp).await?;
        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }
}

#[async_trait]
impl RealtimeApi for ApiClient {
    async fn fetch_conversation(&self, partner_id: &str) -> Result<Vec<ChatMessage>, ApiError> {
        self.get_json(&format!("/api/messages/{}", urlencoding::encode(partner_id)))
            .await
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>, ApiError> {
        self.get_json("/api/notifications").await
    }

    async fn mark_notification_read(&self, notification_id: &str) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .put_json(
                &format!(
                    "/api/notifications/{}/read",
                    urlencoding::encode(notification_id)
                ),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }
}

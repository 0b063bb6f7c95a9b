//! REST client for the app backend.
//!
//! `BackendApi` is the seam the sync manager talks through; tests swap in an
//! in-crate fake. `HttpBackendApi` is the real reqwest client with an
//! installable bearer token.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::SyncError;

// ============================================================================
// Wire DTOs
// ============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiUser {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub firebase_uid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiEvent {
    pub event_id: i64,
    pub user_id: i64,
    pub event_title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub date: String,
    #[serde(default = "default_true")]
    pub is_event: bool,
    pub recurring: bool,
}

impl Default for ApiEvent {
    fn default() -> Self {
        Self {
            event_id: 0,
            user_id: 0,
            event_title: String::new(),
            description: String::new(),
            start_time: String::new(),
            end_time: String::new(),
            date: String::new(),
            is_event: true,
            recurring: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiFriend {
    pub user_id: i64,
    pub friend_id: i64,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiRsvp {
    pub event_id: i64,
    pub event_owner_id: i64,
    pub invite_recipient_id: i64,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiNotification {
    pub user_id: i64,
    pub notif_msg: String,
    pub notif_type: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiPreferences {
    pub user_id: i64,
    pub theme: Option<i64>,
    pub notification_enabled: Option<bool>,
    pub color_scheme: Option<String>,
}

// ============================================================================
// BackendApi
// ============================================================================

#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<ApiUser>, SyncError>;
    async fn fetch_events(&self, user_id: i64) -> Result<Vec<ApiEvent>, SyncError>;
    async fn fetch_friends(&self, user_id: i64) -> Result<Vec<ApiFriend>, SyncError>;
    async fn fetch_rsvps(&self, user_id: i64) -> Result<Vec<ApiRsvp>, SyncError>;
    async fn fetch_notifications(&self, user_id: i64)
        -> Result<Vec<ApiNotification>, SyncError>;
    /// `Ok(None)` when the user has no stored preferences (404).
    async fn fetch_preferences(&self, user_id: i64)
        -> Result<Option<ApiPreferences>, SyncError>;
}

// ============================================================================
// HttpBackendApi
// ============================================================================

pub struct HttpBackendApi {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl HttpBackendApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: RwLock::new(None),
        }
    }

    /// Install (or clear) the bearer token sent with every request.
    pub fn set_auth_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.client.get(format!("{}{}", self.base_url, path));
        if let Some(token) = self.token.read().clone() {
            req = req.bearer_auth(token);
        }
        req
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SyncError> {
        let resp = self.request(path).send().await?.error_for_status()?;
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl BackendApi for HttpBackendApi {
    async fn fetch_users(&self) -> Result<Vec<ApiUser>, SyncError> {
        self.get_json("/api/users").await
    }

    async fn fetch_events(&self, user_id: i64) -> Result<Vec<ApiEvent>, SyncError> {
        self.get_json(&format!("/api/events/user/{user_id}")).await
    }

    async fn fetch_friends(&self, user_id: i64) -> Result<Vec<ApiFriend>, SyncError> {
        self.get_json(&format!("/api/friends/user/{user_id}")).await
    }

    async fn fetch_rsvps(&self, user_id: i64) -> Result<Vec<ApiRsvp>, SyncError> {
        self.get_json(&format!("/api/rsvps/user/{user_id}")).await
    }

    async fn fetch_notifications(
        &self,
        user_id: i64,
    ) -> Result<Vec<ApiNotification>, SyncError> {
        self.get_json(&format!("/api/notifications/user/{user_id}"))
            .await
    }

    async fn fetch_preferences(
        &self,
        user_id: i64,
    ) -> Result<Option<ApiPreferences>, SyncError> {
        let resp = self
            .request(&format!("/api/preferences/{user_id}"))
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp.error_for_status()?;
        Ok(Some(resp.json().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_event_defaults_is_event_true() {
        let e: ApiEvent =
            serde_json::from_value(json!({ "eventId": 1, "userId": 2 })).unwrap();
        assert!(e.is_event);
        assert!(!e.recurring);
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let api = HttpBackendApi::new("https://api.example.com/");
        assert_eq!(api.base_url, "https://api.example.com");
    }
}

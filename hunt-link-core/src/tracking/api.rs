//! REST client for the tracking collaborator.
//!
//! The backend owns durability and history; this client only shapes the
//! requests and parses the responses. Everything speaks JSON over the same
//! server the WebSocket channel connects to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::models::Position;
use crate::sync::{build_http_url, SyncError};

/// Default period for pushing the local position and refetching peers.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 30_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How position sharing is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Every fix is shared as it arrives.
    Auto,
    /// Fixes stay local until the member shares explicitly.
    Manual,
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrackingMode::Auto => "auto",
            TrackingMode::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// Tracking preferences for one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingSettings {
    /// Start the tracker together with the session.
    pub auto_start: bool,
    pub update_interval_ms: u64,
    pub mode: TrackingMode,
    /// When false, shared positions are blurred to roughly street level
    /// before leaving the device; the local store keeps the exact fix.
    pub share_exact_position: bool,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            auto_start: false,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            mode: TrackingMode::Auto,
            share_exact_position: true,
        }
    }
}

/// One peer's last known position, as returned by the group positions
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberPosition {
    pub user_id: String,
    pub position: Position,
}

/// HTTP client for the tracking endpoints.
#[derive(Debug, Clone)]
pub struct TrackingApi {
    server_url: String,
    client: reqwest::Client,
}

impl TrackingApi {
    pub fn new(server_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            server_url: server_url.into(),
            client,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        build_http_url(&self.server_url, path)
    }

    /// Announces a tracking session for this member.
    pub async fn start_session(
        &self,
        user_id: &str,
        group_id: &str,
        settings: &TrackingSettings,
    ) -> Result<(), SyncError> {
        let url = self.url(&format!(
            "/tracking/session/start/{}",
            urlencoding::encode(user_id)
        ));
        let body = serde_json::json!({
            "group_id": group_id,
            "settings": {
                "mode": settings.mode,
                "share_exact_position": settings.share_exact_position,
                "update_interval": settings.update_interval_ms,
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Self::check_status(response).map(|_| ())
    }

    pub async fn stop_session(&self, user_id: &str, group_id: &str) -> Result<(), SyncError> {
        let url = self.url(&format!(
            "/tracking/session/stop/{}?group_id={}",
            urlencoding::encode(user_id),
            urlencoding::encode(group_id)
        ));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Self::check_status(response).map(|_| ())
    }

    /// Pushes the member's last known position to the backend store.
    pub async fn push_position(
        &self,
        user_id: &str,
        group_id: &str,
        position: &Position,
    ) -> Result<(), SyncError> {
        let url = self.url(&format!(
            "/tracking/position/{}?group_id={}",
            urlencoding::encode(user_id),
            urlencoding::encode(group_id)
        ));
        let response = self
            .client
            .post(&url)
            .json(position)
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Self::check_status(response).map(|_| ())
    }

    /// Fetches the last known position of every member in the group.
    pub async fn group_positions(
        &self,
        group_id: &str,
        user_id: &str,
    ) -> Result<Vec<MemberPosition>, SyncError> {
        let url = self.url(&format!(
            "/tracking/group/{}/positions?user_id={}",
            urlencoding::encode(group_id),
            urlencoding::encode(user_id)
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Self::check_status(response)?
            .json()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))
    }

    /// Fetches the member's trail for the past `hours`.
    pub async fn position_history(
        &self,
        user_id: &str,
        group_id: &str,
        hours: u32,
    ) -> Result<Vec<Position>, SyncError> {
        let url = self.url(&format!(
            "/tracking/history/{}?group_id={}&hours={}",
            urlencoding::encode(user_id),
            urlencoding::encode(group_id),
            hours
        ));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Self::check_status(response)?
            .json()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))
    }

    /// Delivers a chat message to the group.
    pub async fn send_chat(
        &self,
        user_id: &str,
        group_id: &str,
        message: &str,
    ) -> Result<(), SyncError> {
        let url = self.url(&format!(
            "/chat/{}?group_id={}",
            urlencoding::encode(user_id),
            urlencoding::encode(group_id)
        ));
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await
            .map_err(|e| SyncError::HttpError(e.to_string()))?;
        Self::check_status(response).map(|_| ())
    }

    /// Reachability probe, for graceful offline degradation.
    pub async fn check_server(&self) -> bool {
        let url = self.url("/health");
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
        if !response.status().is_success() {
            return Err(SyncError::HttpError(format!(
                "Server returned status {}",
                response.status()
            )));
        }
        Ok(response)
    }
}

//! Remote progress API boundary.
//!
//! Maps a [`ProgressEvent`] to the remote update request and classifies the
//! outcome as acknowledged, transient failure or permanent failure. Holds no
//! state besides its configuration.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::SyncError;
use crate::event::{ProgressEvent, ProgressEventKind};

/// Body of one progress update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRequest {
    pub event_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    pub payload: serde_json::Value,
    pub points: u32,
    pub occurred_at: DateTime<Utc>,
}

impl ProgressRequest {
    pub fn from_event(event: &ProgressEvent) -> Self {
        let mut payload = serde_json::to_value(&event.payload).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("type");
        }
        Self {
            event_id: event.id.clone(),
            user_id: event.user_id.clone(),
            kind: event.kind(),
            payload,
            points: event.points,
            occurred_at: event.occurred_at,
        }
    }
}

/// Successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteAck {
    pub event_id: String,
    /// The remote store had already recorded this event id.
    #[serde(default)]
    pub duplicate: bool,
    /// Remote total after applying the update, when reported.
    #[serde(default)]
    pub total_points: Option<u64>,
}

/// Failure classification for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteFailure {
    /// Network error, timeout or server-side error. Worth retrying.
    #[error("{message}")]
    Transient { message: String },
    /// Rejected by the remote store. Retrying will not help.
    #[error("{message}")]
    Permanent { status: Option<u16>, message: String },
}

impl RemoteFailure {
    /// Classify an HTTP status that is not a success.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        };
        match status {
            408 | 429 | 500..=599 => RemoteFailure::Transient { message },
            _ => RemoteFailure::Permanent {
                status: Some(status),
                message,
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteFailure::Transient { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            RemoteFailure::Transient { message } | RemoteFailure::Permanent { message, .. } => {
                message
            }
        }
    }
}

impl From<reqwest::Error> for RemoteFailure {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => RemoteFailure::from_status(status.as_u16(), ""),
            // Decoding a malformed success body cannot be fixed by resending.
            None if err.is_decode() => RemoteFailure::Permanent {
                status: None,
                message: err.to_string(),
            },
            None => RemoteFailure::Transient {
                message: err.to_string(),
            },
        }
    }
}

/// Remote progress store.
pub trait RemoteProgressApi: Send + Sync {
    /// Deliver one progress update. Must be idempotent on `request.event_id`.
    fn submit(
        &self,
        request: &ProgressRequest,
    ) -> impl Future<Output = Result<RemoteAck, RemoteFailure>> + Send;
}

/// Remote learner profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteProfile {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub total_points: u64,
    #[serde(default, alias = "current_level")]
    pub level: Option<u32>,
    #[serde(default)]
    pub current_streak: u32,
}

/// Whether [`HttpRemoteClient::get_or_create_profile`] found or created the profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileOutcome {
    Existing(RemoteProfile),
    Created(RemoteProfile),
}

impl ProfileOutcome {
    pub fn profile(&self) -> &RemoteProfile {
        match self {
            ProfileOutcome::Existing(p) | ProfileOutcome::Created(p) => p,
        }
    }
}

/// HTTP client for the gamification API.
#[derive(Debug, Clone)]
pub struct HttpRemoteClient {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteClient {
    /// Build a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    /// Returns [`SyncError::Endpoint`] if the URL cannot be parsed or the
    /// HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SyncError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| SyncError::Endpoint(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Endpoint(format!("{base_url}: not a base URL")));
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Endpoint(e.to_string()))?;
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Append `segments` to the base path. Each segment is percent-encoded,
    /// so a user id can never leave its own path position.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteFailure> {
        if let Some(dot) = segments.iter().find(|s| matches!(**s, "." | "..")) {
            return Err(RemoteFailure::Permanent {
                status: None,
                message: format!("path segment {dot:?} is not allowed"),
            });
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteFailure::Permanent {
                status: None,
                message: format!("base URL {} cannot carry a path", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    fn update_url(&self, user_id: &str) -> Result<Url, RemoteFailure> {
        self.endpoint(&["api", "gamification", "progress", user_id, "update"])
    }

    fn profile_url(&self, user_id: &str) -> Result<Url, RemoteFailure> {
        self.endpoint(&["api", "gamification", "profile", user_id])
    }

    /// Fetch the learner's remote profile, creating it when the store has none.
    ///
    /// Only a 404 leads to creation; every other failure is returned as is.
    pub async fn get_or_create_profile(
        &self,
        user_id: &str,
        domain: Option<&str>,
    ) -> Result<ProfileOutcome, RemoteFailure> {
        let url = self.profile_url(user_id)?;
        let response = self.http.get(url.clone()).send().await?;

        if response.status().is_success() {
            return Ok(ProfileOutcome::Existing(response.json().await?));
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(failure_from(response).await);
        }

        debug!(user_id, "remote profile missing, creating");
        let body = serde_json::json!({ "user_id": user_id, "domain": domain });
        let response = self.http.post(url).json(&body).send().await?;
        if response.status().is_success() {
            Ok(ProfileOutcome::Created(response.json().await?))
        } else {
            Err(failure_from(response).await)
        }
    }
}

impl RemoteProgressApi for HttpRemoteClient {
    async fn submit(&self, request: &ProgressRequest) -> Result<RemoteAck, RemoteFailure> {
        let url = self.update_url(&request.user_id)?;
        let response = self.http.post(url).json(request).send().await?;
        let status = response.status();

        if status == StatusCode::CONFLICT {
            // The remote store already holds this event id.
            return Ok(RemoteAck {
                event_id: request.event_id.clone(),
                duplicate: true,
                total_points: None,
            });
        }
        if !status.is_success() {
            return Err(failure_from(response).await);
        }

        let text = response.text().await?;
        let body: serde_json::Value = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| RemoteFailure::Permanent {
                status: Some(status.as_u16()),
                message: format!("malformed acknowledgment: {e}"),
            })?
        };
        Ok(RemoteAck {
            event_id: request.event_id.clone(),
            duplicate: body["duplicate"].as_bool().unwrap_or(false),
            total_points: body["total_points"].as_u64(),
        })
    }
}

async fn failure_from(response: reqwest::Response) -> RemoteFailure {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    RemoteFailure::from_status(status, body.trim())
}

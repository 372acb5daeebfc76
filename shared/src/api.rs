//! API client types and trait definitions
//!
//! This module defines the REST contract the workbench server exposes.
//! Field writes (the write-back queue's output) are deliberately not part
//! of `WorkbenchApi`; they go through the synchronization core's
//! `PersistenceTransport` seam instead.

use async_trait::async_trait;

use crate::{
    ModelOverview, ModelSettings, PresetOverview, Response, Session, SessionId, SessionOverview,
    TemplateOverview,
};

/// API error taxonomy. Expected failure modes are values, never panics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Network or connection error
    #[error("network error: {0}")]
    Network(String),

    /// Server returned an error status
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Failed to parse a response body
    #[error("parse error: {0}")]
    Parse(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),
}

/// API endpoint paths, relative to the server base URL.
pub mod endpoints {
    use crate::SessionId;

    pub const PING: &str = "/api/ping";
    pub const SESSIONS: &str = "/api/session";
    pub const MODELS: &str = "/api/model";
    pub const MODEL_SCAN: &str = "/api/model/scan";
    pub const TEMPLATES: &str = "/api/template";
    pub const PRESETS: &str = "/api/preset";

    pub fn session(id: &SessionId) -> String {
        format!("/api/session/{}", id)
    }

    /// PUT target for a single named session field, e.g. `prompt` or
    /// `modelSettings`.
    pub fn session_field(id: &SessionId, field: &str) -> String {
        format!("/api/session/{}/{}", id, field)
    }

    /// The streaming change-notification endpoint (WebSocket).
    pub fn session_changes(id: &SessionId) -> String {
        format!("/api/session/{}/changes", id)
    }

    pub fn responses(id: &SessionId) -> String {
        format!("/api/session/{}/response", id)
    }

    pub fn response(id: &SessionId, response_id: &str) -> String {
        format!("/api/session/{}/response/{}", id, response_id)
    }

    pub fn response_abort(id: &SessionId, response_id: &str) -> String {
        format!("/api/session/{}/response/{}/abort", id, response_id)
    }

    pub fn response_messages(id: &SessionId, response_id: &str) -> String {
        format!("/api/session/{}/response/{}/message", id, response_id)
    }

    pub fn response_continue(id: &SessionId, response_id: &str) -> String {
        format!("/api/session/{}/response/{}/continue", id, response_id)
    }

    pub fn message(id: &SessionId, response_id: &str, message_id: &str) -> String {
        format!(
            "/api/session/{}/response/{}/message/{}",
            id, response_id, message_id
        )
    }

    pub fn attached_file(id: &SessionId, filename: &str) -> String {
        format!("/api/session/{}/file/{}", id, filename)
    }
}

/// Trait defining the workbench REST API.
///
/// All methods are async and return `Result<T, ApiError>`. Mutating calls
/// that depend on the persisted prompt value must be preceded by a queue
/// flush; that ordering lives in the session controller, not here.
#[async_trait]
pub trait WorkbenchApi: Send + Sync {
    /// Check that the server is reachable
    async fn ping(&self) -> Result<(), ApiError>;

    /// List summaries of all sessions
    async fn session_overview(&self) -> Result<SessionOverview, ApiError>;

    /// Create a new session, optionally seeded with model settings
    async fn create_session(&self, defaults: Option<ModelSettings>) -> Result<Session, ApiError>;

    /// Get a full session and its data
    async fn get_session(&self, id: &SessionId) -> Result<Session, ApiError>;

    /// Delete a session
    async fn delete_session(&self, id: &SessionId) -> Result<(), ApiError>;

    /// Replace a session's model settings
    async fn put_model_settings(
        &self,
        id: &SessionId,
        settings: &ModelSettings,
    ) -> Result<(), ApiError>;

    /// Ask the server to generate a new response for the current prompt
    async fn create_response(&self, id: &SessionId) -> Result<Response, ApiError>;

    /// Delete a response
    async fn delete_response(&self, id: &SessionId, response_id: &str) -> Result<(), ApiError>;

    /// Abort a running response
    async fn abort_response(&self, id: &SessionId, response_id: &str) -> Result<(), ApiError>;

    /// Append a user reply to a response
    async fn create_message(
        &self,
        id: &SessionId,
        response_id: &str,
        text: &str,
    ) -> Result<(), ApiError>;

    /// Ask the model to continue the last message of a response
    async fn continue_response(&self, id: &SessionId, response_id: &str) -> Result<(), ApiError>;

    /// Delete a single message from a response
    async fn delete_message(
        &self,
        id: &SessionId,
        response_id: &str,
        message_id: &str,
    ) -> Result<(), ApiError>;

    /// Delete a file attached to a session
    async fn delete_attached_file(&self, id: &SessionId, filename: &str) -> Result<(), ApiError>;

    /// List available models
    async fn model_overview(&self) -> Result<ModelOverview, ApiError>;

    /// Rescan the model directory and return the updated catalog
    async fn scan_models(&self) -> Result<ModelOverview, ApiError>;

    /// List available prompt templates
    async fn template_overview(&self) -> Result<TemplateOverview, ApiError>;

    /// List available sampling presets
    async fn preset_overview(&self) -> Result<PresetOverview, ApiError>;
}

/// Configuration for creating an API client
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Base URL of the server (e.g., "http://localhost:8080")
    pub base_url: String,
}

impl ApiClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Derive the WebSocket URL for a streaming endpoint from the HTTP base.
    pub fn ws_url(&self, endpoint: &str) -> String {
        let base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.base_url.clone()
        };
        format!("{}{}", base, endpoint)
    }
}

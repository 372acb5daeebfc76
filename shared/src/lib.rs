use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// API client types and trait
pub mod api;
pub use api::{ApiClientConfig, ApiError, WorkbenchApi};

// Protocol constants shared with the server
pub mod protocol;

/// Opaque session identifier.
///
/// Stable for the lifetime of a session; the correlation key for both the
/// write-back queue and the connection monitor. The server mints these, so
/// clients never inspect the contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A unit of conversation state: prompt, responses and model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub creation_timestamp: DateTime<Utc>,
    pub title: String,
    pub prompt: String,
    pub responses: Vec<Response>,
    pub model_settings: ModelSettings,
    #[serde(default)]
    pub attached_files: Vec<AttachedFile>,
}

/// One line in the session overview list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: SessionId,
    pub title: String,
    pub creation_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOverview {
    pub session_summaries: Vec<SessionSummary>,
}

/// Model/template/preset selection for a session. Ids refer to entries in
/// the corresponding overview catalogs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettings {
    pub model_id: String,
    pub template_id: String,
    pub preset_id: String,
}

/// The settings a response was generated with, resolved to display names.
/// Ids are null when the referenced entry no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSettingsSnapshot {
    pub model_id: Option<String>,
    pub template_id: Option<String>,
    pub preset_id: Option<String>,
    pub model_name: String,
    pub template_name: String,
    pub preset_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseStatus {
    Done,
    Pending,
    Running,
    Error,
    Aborted,
}

impl ResponseStatus {
    /// A response the server is still working on. Used by views to decide
    /// whether to keep polling visual state.
    pub fn is_active(self) -> bool {
        matches!(self, ResponseStatus::Pending | ResponseStatus::Running)
    }
}

/// One model invocation and its message exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub creation_timestamp: DateTime<Utc>,
    pub status: ResponseStatus,
    pub messages: Vec<Message>,
    pub model_settings_snapshot: ModelSettingsSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub attached_files: Option<Vec<AttachedFile>>,
}

/// A file stored alongside a session. `filename` is the server-side name,
/// `original_filename` what the user uploaded it as.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFile {
    pub filename: String,
    pub mime_type: String,
    pub original_filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: String,
    pub name: String,
    pub supports_continue: bool,
    pub supports_reply: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOverview {
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateOverview {
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetOverview {
    pub presets: Vec<Preset>,
}

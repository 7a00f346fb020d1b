//! Remote project persistence over the course-management (LMS) API.
//!
//! This module provides the typed surface of the student-projects API:
//! - Load a project record by id
//! - Select the latest web project under a topic
//! - Upsert-save the current bundle (create on first save, update once a
//!   project id has been assigned)
//!
//! Stored records come in two generations: newer records carry a structured
//! `project_data {html, css, js}` object, older ones only flat legacy fields
//! (`project_html`, `project_code`). Structured fields are authoritative when
//! present; legacy fields are consulted per-field independently. Saves always
//! write both shapes for backward compatibility.
//!
//! No retry policy lives here: failures surface as [`RemoteError`] and the
//! caller decides (the autosave controller simply waits for the next edit).

mod client;

pub use client::LmsClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::buffer::SourceBundle;

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors surfaced by the remote repository.
///
/// All of these are non-fatal to the session: the editor keeps working on
/// local buffers even if every remote operation fails.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response body: {0}")]
    Malformed(String),
}

/// Immutable per-session context for remote persistence.
///
/// Derived once from launch parameters; its presence gates whether autosave
/// is active at all. Absence means a local/ephemeral session.
#[derive(Debug, Clone)]
pub struct RemoteContext {
    /// Base URL of the LMS API
    pub api_base: String,
    /// Pre-issued bearer credential
    pub auth_token: String,
    /// Student identifier
    pub student_id: String,
    /// Course identifier
    pub course_id: String,
    /// Topic identifier (scope for project lookup)
    pub topic_id: String,
    /// Human-readable topic name, used as the project name
    pub topic_name: String,
    /// Course level identifier
    pub level_id: String,
    /// Project id supplied at launch, if resuming a saved project
    pub project_id: Option<String>,
    /// Team members to attach to saves, if any
    pub team_member_ids: Vec<String>,
    /// URL of the hosting editor page, echoed into save bodies
    pub editor_url: String,
}

/// Structured web content stored under `project_data`.
///
/// Fields are optional so that a partially populated record can be
/// distinguished from explicit empty strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
}

/// A stored project record as returned by the LMS API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Backend-assigned project identifier
    pub id: String,
    /// Structured web content (newer records)
    #[serde(default)]
    pub project_data: Option<ProjectData>,
    /// Legacy flat markup field (older records)
    #[serde(default)]
    pub project_html: Option<String>,
    /// Legacy flat script field (older records)
    #[serde(default)]
    pub project_code: Option<String>,
    /// Project type tag, `html`/`web` for web projects
    #[serde(default)]
    pub project_type: Option<String>,
    /// Whether the backend marks this record as the current one for its topic
    #[serde(default)]
    pub is_current: bool,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectRecord {
    /// Whether this record carries recognizable web content: at least one
    /// structured buffer, a legacy markup field, or a web type tag.
    pub fn has_web_content(&self) -> bool {
        if let Some(data) = &self.project_data {
            if data.html.is_some() || data.css.is_some() || data.js.is_some() {
                return true;
            }
        }
        if self.project_html.as_deref().is_some_and(|h| !h.is_empty()) {
            return true;
        }
        matches!(self.project_type.as_deref(), Some("html") | Some("web"))
    }

    /// Merge this record into a bundle, or `None` if it has no web content.
    ///
    /// Structured fields win when present; each buffer falls back to its
    /// legacy counterpart independently (style has none and defaults empty).
    pub fn bundle(&self) -> Option<SourceBundle> {
        if !self.has_web_content() {
            return None;
        }
        let data = self.project_data.clone().unwrap_or_default();
        Some(SourceBundle {
            markup: data
                .html
                .or_else(|| self.project_html.clone())
                .unwrap_or_default(),
            style: data.css.unwrap_or_default(),
            script: data
                .js
                .or_else(|| self.project_code.clone())
                .unwrap_or_default(),
        })
    }
}

/// Select the record to resume from a topic's project list: the one marked
/// current that carries web content, else the first one carrying web content.
pub fn select_record(records: Vec<ProjectRecord>) -> Option<ProjectRecord> {
    let mut first_with_content = None;
    for record in records {
        if !record.has_web_content() {
            continue;
        }
        if record.is_current {
            return Some(record);
        }
        if first_with_content.is_none() {
            first_with_content = Some(record);
        }
    }
    first_with_content
}

/// Request body for the upsert-save endpoint.
///
/// Carries the full bundle both as structured `project_data` and as the flat
/// legacy fields so older readers keep working.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveProjectBody {
    pub topic_id: String,
    pub course_level_id: String,
    pub course_id: String,
    pub project_name: String,
    pub editor_type: String,
    pub editor_url: String,
    pub project_data: ProjectData,
    pub project_html: String,
    pub project_code: String,
    pub project_type: String,
    pub file_format: String,
    pub is_autosaved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub team_member_ids: Vec<String>,
}

impl SaveProjectBody {
    /// Build an upsert body from the current context and bundle.
    ///
    /// `existing_id` present means update semantics; absent means create.
    pub fn new(context: &RemoteContext, bundle: &SourceBundle, existing_id: Option<&str>) -> Self {
        let project_name = if context.topic_name.trim().is_empty() {
            "Project".to_string()
        } else {
            context.topic_name.clone()
        };
        Self {
            topic_id: context.topic_id.clone(),
            course_level_id: context.level_id.clone(),
            course_id: context.course_id.clone(),
            project_name,
            editor_type: "inter".to_string(),
            editor_url: context.editor_url.clone(),
            project_data: ProjectData {
                html: Some(bundle.markup.clone()),
                css: Some(bundle.style.clone()),
                js: Some(bundle.script.clone()),
            },
            project_html: bundle.markup.clone(),
            project_code: bundle.script.clone(),
            project_type: "html".to_string(),
            file_format: "html".to_string(),
            is_autosaved: true,
            project_id: existing_id.map(str::to_string),
            team_member_ids: context.team_member_ids.clone(),
        }
    }
}

/// Thin contract over the remote project API. Owns no buffers.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Fetch a single project record by id
    async fn load_by_id(&self, context: &RemoteContext, id: &str) -> RemoteResult<ProjectRecord>;

    /// Fetch the record to resume for the context's topic, if any qualifies
    async fn load_latest_for_topic(
        &self,
        context: &RemoteContext,
    ) -> RemoteResult<Option<ProjectRecord>>;

    /// Upsert-save the bundle; returns the backend-assigned project id
    async fn save(
        &self,
        context: &RemoteContext,
        bundle: &SourceBundle,
        existing_id: Option<&str>,
    ) -> RemoteResult<String>;
}

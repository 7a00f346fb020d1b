//! Launch parameter parsing.
//!
//! The hosting page passes its query string once at startup. When all six of
//! `apiBase`, `authToken`, `studentId`, `courseId`, `topicId` and `levelId`
//! are present the session runs in remote (LMS-backed) mode; otherwise it is
//! a local/ephemeral session with realtime broadcast only.
//!
//! `apiBase` falls back to the `API_BASE_URL` environment variable so hosted
//! deployments can omit it from launch links.

use std::collections::HashMap;

use url::form_urlencoded;

use crate::remote::RemoteContext;

/// Environment fallback for the API base URL
const API_BASE_ENV: &str = "API_BASE_URL";

/// Project name used when the topic name is missing or blank
const DEFAULT_PROJECT_NAME: &str = "Project";

/// Raw launch parameters read once from the page's query string
#[derive(Debug, Clone, Default)]
pub struct LaunchParams {
    pub api_base: Option<String>,
    pub auth_token: Option<String>,
    pub student_id: Option<String>,
    pub course_id: Option<String>,
    pub topic_id: Option<String>,
    pub topic_name: Option<String>,
    pub level_id: Option<String>,
    pub project_id: Option<String>,
    pub team_member_ids: Vec<String>,
    /// URL of the hosting editor page, echoed into save bodies
    pub editor_url: Option<String>,
}

impl LaunchParams {
    /// Parse a query string (leading `?` optional). Values are URL-decoded.
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let params: HashMap<String, String> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        let get = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();

        let team_member_ids = get("teamMemberIds")
            .map(|ids| {
                ids.split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_base: get("apiBase").or_else(api_base_from_env),
            auth_token: get("authToken"),
            student_id: get("studentId"),
            course_id: get("courseId"),
            topic_id: get("topicId"),
            topic_name: get("topicName"),
            level_id: get("levelId"),
            // `savedProjectId` wins over the older `projectId` key.
            project_id: get("savedProjectId").or_else(|| get("projectId")),
            team_member_ids,
            editor_url: get("editorUrl"),
        }
    }

    /// Derive the immutable remote context, or `None` when any of the six
    /// required parameters is missing (local/broadcast-only session).
    pub fn remote_context(&self) -> Option<RemoteContext> {
        let topic_name = self
            .topic_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_PROJECT_NAME)
            .to_string();

        Some(RemoteContext {
            api_base: self.api_base.clone()?,
            auth_token: self.auth_token.clone()?,
            student_id: self.student_id.clone()?,
            course_id: self.course_id.clone()?,
            topic_id: self.topic_id.clone()?,
            topic_name,
            level_id: self.level_id.clone()?,
            project_id: self.project_id.clone(),
            team_member_ids: self.team_member_ids.clone(),
            editor_url: self.editor_url.clone().unwrap_or_default(),
        })
    }
}

fn api_base_from_env() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var(API_BASE_ENV).ok().filter(|v| !v.is_empty())
}

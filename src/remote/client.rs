//! Reqwest-backed implementation of the LMS project repository.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use super::{
    select_record, ProjectRecord, ProjectRepository, RemoteContext, RemoteError, RemoteResult,
    SaveProjectBody,
};
use crate::buffer::SourceBundle;

/// Request timeout for all LMS calls
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Response shape of the upsert-save endpoint
#[derive(Debug, Deserialize)]
struct SaveProjectResponse {
    id: Option<String>,
}

/// HTTP client for the student-courses project API.
///
/// Stateless beyond the connection pool: the per-session context (base URL,
/// bearer token) is passed with each call, matching the repository contract.
#[derive(Clone)]
pub struct LmsClient {
    http: Client,
}

impl LmsClient {
    /// Build a client with the standard request timeout
    pub fn new() -> RemoteResult<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http })
    }

    fn url(context: &RemoteContext, path: &str) -> String {
        format!("{}{}", context.api_base.trim_end_matches('/'), path)
    }

    fn bearer(context: &RemoteContext) -> String {
        format!("Bearer {}", context.auth_token)
    }
}

#[async_trait]
impl ProjectRepository for LmsClient {
    async fn load_by_id(&self, context: &RemoteContext, id: &str) -> RemoteResult<ProjectRecord> {
        let url = Self::url(context, &format!("/student-courses/project/{id}"));
        debug!(project_id = %id, "loading project by id");

        let response = self
            .http
            .get(&url)
            .header("Authorization", Self::bearer(context))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        let record = response.error_for_status()?.json().await?;
        Ok(record)
    }

    async fn load_latest_for_topic(
        &self,
        context: &RemoteContext,
    ) -> RemoteResult<Option<ProjectRecord>> {
        let url = Self::url(
            context,
            &format!("/student-courses/topic/{}/projects", context.topic_id),
        );
        debug!(topic_id = %context.topic_id, "loading topic projects");

        let records: Vec<ProjectRecord> = self
            .http
            .get(&url)
            .header("Authorization", Self::bearer(context))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(select_record(records))
    }

    async fn save(
        &self,
        context: &RemoteContext,
        bundle: &SourceBundle,
        existing_id: Option<&str>,
    ) -> RemoteResult<String> {
        let url = Self::url(context, "/student-courses/save-project");
        let body = SaveProjectBody::new(context, bundle, existing_id);
        debug!(update = existing_id.is_some(), "saving project");

        let response: SaveProjectResponse = self
            .http
            .post(&url)
            .header("Authorization", Self::bearer(context))
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // Older backends echo no id on update; fall back to the known one.
        response
            .id
            .or_else(|| existing_id.map(str::to_string))
            .ok_or_else(|| RemoteError::Malformed("save response carried no project id".into()))
    }
}

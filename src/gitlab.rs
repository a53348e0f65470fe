use crate::config::WorkflowContext;
use crate::models::{
    GitlabChange, GitlabChangesResponse, GitlabMergeRequest, GitlabNote, GitlabNotePayload,
};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, error, instrument};
use url::Url;
use urlencoding::encode;

const NOTES_PER_PAGE: u32 = 100;

#[derive(Error, Debug)]
pub enum GitlabError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("GitLab API request failed ({status}): {body}")]
    Api { status: StatusCode, body: String },
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Failed to deserialize response: {0}")]
    Deserialization(reqwest::Error),
}

#[derive(Debug)]
pub struct GitlabApiClient {
    client: Client,
    base_url: Url,
    token: String,
}

impl GitlabApiClient {
    pub fn new(context: &WorkflowContext) -> Result<Self, GitlabError> {
        // Url::join drops the last segment unless the base ends with '/'
        let base_url = Url::parse(&format!("{}/", context.api_url.trim_end_matches('/')))?;
        let client = Client::builder()
            .timeout(context.http_timeout)
            .build()
            .map_err(GitlabError::Request)?;

        Ok(Self {
            client,
            base_url,
            token: context.token.clone(),
        })
    }

    fn merge_request_path(project_id: &str, mr_iid: i64) -> String {
        format!("projects/{}/merge_requests/{}", encode(project_id), mr_iid)
    }

    fn url(&self, path: &str) -> Result<Url, GitlabError> {
        Ok(self.base_url.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("PRIVATE-TOKEN", &self.token)
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GitlabError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            error!("GitLab API Error: {} - {}", status, body);
            return Err(GitlabError::Api { status, body });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GitlabError> {
        debug!("GET {}", url);
        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .map_err(GitlabError::Request)?;
        let response = Self::check_status(response).await?;
        response
            .json::<T>()
            .await
            .map_err(GitlabError::Deserialization)
    }

    #[instrument(skip(self))]
    pub async fn get_merge_request(
        &self,
        project_id: &str,
        mr_iid: i64,
    ) -> Result<GitlabMergeRequest, GitlabError> {
        let url = self.url(&Self::merge_request_path(project_id, mr_iid))?;
        self.get_json(url).await
    }

    /// All notes on the merge request, following `x-next-page` until the last page.
    #[instrument(skip(self))]
    pub async fn get_merge_request_notes(
        &self,
        project_id: &str,
        mr_iid: i64,
    ) -> Result<Vec<GitlabNote>, GitlabError> {
        let path = format!("{}/notes", Self::merge_request_path(project_id, mr_iid));
        let mut notes = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut url = self.url(&path)?;
            url.query_pairs_mut()
                .append_pair("per_page", &NOTES_PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            debug!("GET {}", url);
            let response = self
                .authorized(self.client.get(url))
                .send()
                .await
                .map_err(GitlabError::Request)?;
            let response = Self::check_status(response).await?;

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok())
                .filter(|next| *next > page);

            let batch = response
                .json::<Vec<GitlabNote>>()
                .await
                .map_err(GitlabError::Deserialization)?;
            debug!(page, count = batch.len(), "Fetched merge request notes");
            notes.extend(batch);

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(notes)
    }

    #[instrument(skip(self))]
    pub async fn get_merge_request_changes(
        &self,
        project_id: &str,
        mr_iid: i64,
    ) -> Result<Vec<GitlabChange>, GitlabError> {
        let url = self.url(&format!(
            "{}/changes",
            Self::merge_request_path(project_id, mr_iid)
        ))?;
        let response: GitlabChangesResponse = self.get_json(url).await?;
        Ok(response.changes.unwrap_or_default())
    }

    #[instrument(skip(self, body), fields(body_len = body.len()))]
    pub async fn post_merge_request_note(
        &self,
        project_id: &str,
        mr_iid: i64,
        body: &str,
    ) -> Result<GitlabNote, GitlabError> {
        let url = self.url(&format!(
            "{}/notes",
            Self::merge_request_path(project_id, mr_iid)
        ))?;
        debug!("POST {}", url);
        let response = self
            .authorized(self.client.post(url))
            .json(&GitlabNotePayload { body })
            .send()
            .await
            .map_err(GitlabError::Request)?;
        let response = Self::check_status(response).await?;
        response
            .json::<GitlabNote>()
            .await
            .map_err(GitlabError::Deserialization)
    }
}

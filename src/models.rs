use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitlabUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitlabNote {
    pub id: i64,
    #[serde(default)]
    pub body: String, // may be empty for some system notes
    pub author: GitlabUser,
    pub created_at: String,
    #[serde(default)]
    pub system: bool,
    pub discussion_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GitlabDiffRefs {
    pub base_sha: Option<String>,
    pub start_sha: Option<String>,
    pub head_sha: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitlabMergeRequest {
    pub iid: i64,
    pub project_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub state: String, // e.g., "opened", "merged", "closed"
    pub web_url: String,
    pub source_branch: String,
    pub target_branch: String,
    pub author: GitlabUser,
    pub diff_refs: Option<GitlabDiffRefs>,
}

impl GitlabMergeRequest {
    /// Base and head SHAs, only when both are known.
    pub fn revision_range(&self) -> Option<(&str, &str)> {
        let refs = self.diff_refs.as_ref()?;
        match (refs.base_sha.as_deref(), refs.head_sha.as_deref()) {
            (Some(base), Some(head)) if !base.is_empty() && !head.is_empty() => Some((base, head)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitlabChange {
    pub old_path: String,
    pub new_path: String,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GitlabChangesResponse {
    pub changes: Option<Vec<GitlabChange>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GitlabNotePayload<'a> {
    pub body: &'a str,
}

//! Tests that need a mock GitLab server or span several modules.
//!
//! Pure logic (marker, trigger, prompt) is tested next to its code.

use crate::config::WorkflowContext;
use serde_json::{json, Value};
use std::time::Duration;


pub(crate) const TEST_PROJECT_ID: &str = "1";
pub(crate) const TEST_MR_IID: i64 = 5;

pub(crate) fn test_context(server_url: &str) -> WorkflowContext {
    WorkflowContext {
        project_id: TEST_PROJECT_ID.to_string(),
        merge_request_iid: TEST_MR_IID,
        token: "test_token".to_string(),
        api_url: format!("{}/api/v4", server_url),
        trigger_phrase: "@claude".to_string(),
        claude_args: None,
        claude_path: None,
        max_diff_lines: 400,
        job_url: None,
        pipeline_url: None,
        output_file: None,
        http_timeout: Duration::from_secs(5),
    }
}

pub(crate) fn user_json(username: &str) -> Value {
    json!({
        "id": 11,
        "username": username,
        "name": format!("{} User", username),
        "avatar_url": null
    })
}

pub(crate) fn note_json(id: i64, body: &str, created_at: &str) -> Value {
    json!({
        "id": id,
        "body": body,
        "author": user_json("reviewer"),
        "created_at": created_at,
        "updated_at": created_at,
        "system": false,
        "noteable_type": "MergeRequest",
        "noteable_iid": TEST_MR_IID
    })
}

pub(crate) fn merge_request_json() -> Value {
    json!({
        "id": 1001, "iid": TEST_MR_IID, "project_id": 1, "title": "Add retry budget",
        "description": "Caps retries per request.", "state": "opened",
        "author": user_json("mr_author"),
        "source_branch": "feature/retry", "target_branch": "main",
        "web_url": "https://gitlab.example.com/group/project/-/merge_requests/5",
        "labels": [], "draft": false, "detailed_merge_status": "mergeable",
        "diff_refs": {"base_sha": "0123456789abcdef", "head_sha": "fedcba9876543210", "start_sha": "0123456789abcdef"},
        "created_at": "2024-05-01T09:00:00Z", "updated_at": "2024-05-01T10:00:00Z"
    })
}

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TRIGGER_PHRASE: &str = "@claude";
pub const DEFAULT_MAX_DIFF_LINES: usize = 400;
pub const DEFAULT_API_URL: &str = "https://gitlab.com/api/v4";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unable to determine GitLab project. Set CI_PROJECT_ID or CLAUDE_GITLAB_PROJECT_ID.")]
    MissingProject,
    #[error("Unable to determine merge request IID. Set CI_MERGE_REQUEST_IID or CLAUDE_GITLAB_MR_IID.")]
    MissingMergeRequestIid,
    #[error("Merge request IID must be a positive integer, got '{0}'")]
    InvalidMergeRequestIid(String),
    #[error("Missing required environment variable: GITLAB_TOKEN")]
    MissingToken,
}

#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "Answers @claude mentions on a GitLab merge request from a CI job"
)]
pub struct AppSettings {
    /// GitLab project ID or URL-encodable path (group/project)
    #[arg(long, env = "CI_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Merge request IID within the project
    #[arg(long, env = "CI_MERGE_REQUEST_IID")]
    pub merge_request_iid: Option<String>,

    /// GitLab API token
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true)]
    pub gitlab_token: Option<String>,

    /// GitLab REST API base URL (e.g. https://gitlab.example.com/api/v4)
    #[arg(long, env = "GITLAB_API_URL")]
    pub api_url: Option<String>,

    /// GitLab instance URL, used to derive the API URL when --api-url is not set
    #[arg(long, env = "CI_SERVER_URL")]
    pub server_url: Option<String>,

    /// Phrase that requests a response when found in a comment (case-insensitive)
    #[arg(long, env = "CLAUDE_GITLAB_TRIGGER_PHRASE", default_value = DEFAULT_TRIGGER_PHRASE)]
    pub trigger_phrase: String,

    /// Extra arguments passed to the Claude CLI, shell-quoted
    #[arg(long, env = "CLAUDE_GITLAB_CLAUDE_ARGS", allow_hyphen_values = true)]
    pub claude_args: Option<String>,

    /// Path to the Claude CLI executable (default: claude on PATH)
    #[arg(long, env = "CLAUDE_GITLAB_CLAUDE_PATH")]
    pub claude_path: Option<String>,

    /// Maximum number of diff lines included per changed file
    #[arg(
        long,
        env = "CLAUDE_GITLAB_MAX_DIFF_LINES",
        default_value_t = DEFAULT_MAX_DIFF_LINES,
        value_parser = parse_max_diff_lines
    )]
    pub max_diff_lines: usize,

    /// URL of the CI job running this tool
    #[arg(long, env = "CI_JOB_URL")]
    pub job_url: Option<String>,

    /// URL of the CI pipeline running this tool
    #[arg(long, env = "CI_PIPELINE_URL")]
    pub pipeline_url: Option<String>,

    /// File that receives CLAUDE_NOTE_ID=<id> after a response is posted
    #[arg(long, env = "GITLAB_OUTPUT_FILE")]
    pub output_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CLAUDE_GITLAB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Timeout for each GitLab API request, in seconds
    #[arg(long, env = "CLAUDE_GITLAB_HTTP_TIMEOUT_SECONDS", default_value_t = 60)]
    pub http_timeout_seconds: u64,
}

/// Validated configuration for a single run.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub project_id: String,
    pub merge_request_iid: i64,
    pub token: String,
    pub api_url: String,
    pub trigger_phrase: String,
    pub claude_args: Option<String>,
    pub claude_path: Option<String>,
    pub max_diff_lines: usize,
    pub job_url: Option<String>,
    pub pipeline_url: Option<String>,
    pub output_file: Option<PathBuf>,
    pub http_timeout: Duration,
}

/// Never fails: anything that is not a positive integer falls back to the default.
fn parse_max_diff_lines(value: &str) -> Result<usize, String> {
    Ok(value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|lines| *lines > 0)
        .unwrap_or(DEFAULT_MAX_DIFF_LINES))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn resolve_api_url(api_url: Option<String>, server_url: Option<String>) -> String {
    if let Some(api_url) = non_blank(api_url) {
        return api_url;
    }
    match non_blank(server_url) {
        Some(server_url) => format!("{}/api/v4", server_url.trim_end_matches('/')),
        None => DEFAULT_API_URL.to_string(),
    }
}

/// Fill identity fields from the CLAUDE_GITLAB_* variables when the CI ones are absent.
pub fn apply_env_fallbacks(settings: &mut AppSettings) {
    if non_blank(settings.project_id.clone()).is_none() {
        settings.project_id = env::var("CLAUDE_GITLAB_PROJECT_ID").ok();
    }
    if non_blank(settings.merge_request_iid.clone()).is_none() {
        settings.merge_request_iid = env::var("CLAUDE_GITLAB_MR_IID").ok();
    }
}

impl WorkflowContext {
    pub fn from_settings(settings: AppSettings) -> Result<Self, ConfigError> {
        let project_id = non_blank(settings.project_id)
            .map(|p| p.trim().to_string())
            .ok_or(ConfigError::MissingProject)?;

        let raw_iid = non_blank(settings.merge_request_iid)
            .ok_or(ConfigError::MissingMergeRequestIid)?;
        let merge_request_iid = raw_iid
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|iid| *iid > 0)
            .ok_or_else(|| ConfigError::InvalidMergeRequestIid(raw_iid.clone()))?;

        let token = non_blank(settings.gitlab_token).ok_or(ConfigError::MissingToken)?;

        let trigger_phrase = non_blank(Some(settings.trigger_phrase))
            .unwrap_or_else(|| DEFAULT_TRIGGER_PHRASE.to_string());

        Ok(Self {
            project_id,
            merge_request_iid,
            token,
            api_url: resolve_api_url(settings.api_url, settings.server_url),
            trigger_phrase,
            claude_args: non_blank(settings.claude_args),
            claude_path: non_blank(settings.claude_path),
            max_diff_lines: if settings.max_diff_lines == 0 {
                DEFAULT_MAX_DIFF_LINES
            } else {
                settings.max_diff_lines
            },
            job_url: non_blank(settings.job_url),
            pipeline_url: non_blank(settings.pipeline_url),
            output_file: settings
                .output_file
                .filter(|p| !p.as_os_str().is_empty()),
            http_timeout: Duration::from_secs(settings.http_timeout_seconds),
        })
    }
}

pub fn load_config(mut settings: AppSettings) -> anyhow::Result<WorkflowContext> {
    apply_env_fallbacks(&mut settings);
    Ok(WorkflowContext::from_settings(settings)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_diff_lines_valid_values() {
        assert_eq!(parse_max_diff_lines("1"), Ok(1));
        assert_eq!(parse_max_diff_lines("250"), Ok(250));
        assert_eq!(parse_max_diff_lines(" 800 "), Ok(800));
    }

    #[test]
    fn test_parse_max_diff_lines_falls_back_to_default() {
        assert_eq!(parse_max_diff_lines("0"), Ok(DEFAULT_MAX_DIFF_LINES));
        assert_eq!(parse_max_diff_lines("-5"), Ok(DEFAULT_MAX_DIFF_LINES));
        assert_eq!(parse_max_diff_lines("lots"), Ok(DEFAULT_MAX_DIFF_LINES));
        assert_eq!(parse_max_diff_lines(""), Ok(DEFAULT_MAX_DIFF_LINES));
    }

    #[test]
    fn test_resolve_api_url() {
        assert_eq!(
            resolve_api_url(Some("https://git.example.com/api/v4".to_string()), None),
            "https://git.example.com/api/v4"
        );
        assert_eq!(
            resolve_api_url(None, Some("https://git.example.com/".to_string())),
            "https://git.example.com/api/v4"
        );
        assert_eq!(
            resolve_api_url(Some("  ".to_string()), Some("https://ci.example.com".to_string())),
            "https://ci.example.com/api/v4"
        );
        assert_eq!(resolve_api_url(None, None), DEFAULT_API_URL);
    }
}

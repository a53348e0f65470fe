use crate::config::WorkflowContext;
use async_trait::async_trait;
use std::env;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument};

const DEFAULT_EXECUTABLE: &str = "claude";
const PROMPT_FILE_NAME: &str = "prompt.txt";

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Failed to prepare prompt file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid Claude CLI arguments '{args}': {message}")]
    InvalidArgs { args: String, message: String },
    #[error("Failed to start {executable}: {source}")]
    Spawn {
        executable: String,
        source: std::io::Error,
    },
    #[error("Claude CLI exited with code {code}. Stderr: {stderr}")]
    Exit { code: i32, stderr: String },
}

/// Text in, text out. The workflow only depends on this seam so tests can
/// substitute a canned reply for the real CLI.
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn run(&self, prompt: &str) -> Result<String, AssistantError>;
}

#[derive(Debug, Clone, Default)]
pub struct AssistantOptions {
    /// Shell-quoted arguments inserted after `-p`.
    pub extra_args: Option<String>,
    pub executable: Option<String>,
    pub env: Vec<(String, String)>,
}

impl AssistantOptions {
    pub fn from_context(context: &WorkflowContext) -> Self {
        let mut env = Vec::new();
        if env::var_os("RUNNER_TEMP").is_none() {
            let fallback = env::temp_dir().join("claude-gitlab-temp");
            env.push((
                "RUNNER_TEMP".to_string(),
                fallback.to_string_lossy().into_owned(),
            ));
        }
        Self {
            extra_args: context.claude_args.clone(),
            executable: context.claude_path.clone(),
            env,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClaudeCli {
    options: AssistantOptions,
}

impl ClaudeCli {
    pub fn new(options: AssistantOptions) -> Self {
        Self { options }
    }

    pub fn executable(&self) -> &str {
        self.options
            .executable
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(DEFAULT_EXECUTABLE)
    }

    /// `-p <extra args...> <prompt file> --output-format markdown`
    pub fn build_args(&self, prompt_path: &Path) -> Result<Vec<String>, AssistantError> {
        let mut args = vec!["-p".to_string()];
        if let Some(extra) = self.options.extra_args.as_deref() {
            if !extra.trim().is_empty() {
                let parsed =
                    shell_words::split(extra).map_err(|e| AssistantError::InvalidArgs {
                        args: extra.to_string(),
                        message: e.to_string(),
                    })?;
                args.extend(parsed);
            }
        }
        args.push(prompt_path.to_string_lossy().into_owned());
        args.push("--output-format".to_string());
        args.push("markdown".to_string());
        Ok(args)
    }
}

#[async_trait]
impl Assistant for ClaudeCli {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn run(&self, prompt: &str) -> Result<String, AssistantError> {
        // Removed together with the prompt file when dropped.
        let temp_dir = tempfile::Builder::new()
            .prefix("claude-gitlab-")
            .tempdir()?;
        let prompt_path = temp_dir.path().join(PROMPT_FILE_NAME);
        tokio::fs::write(&prompt_path, prompt).await?;

        let executable = self.executable().to_string();
        let args = self.build_args(&prompt_path)?;
        info!("Running {} with {} arguments", executable, args.len());
        debug!(?args, "Claude CLI arguments");

        let output = Command::new(&executable)
            .args(&args)
            .envs(self.options.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| AssistantError::Spawn {
                executable: executable.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AssistantError::Exit {
                code: output.status.code().unwrap_or(1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_build_args_without_extra_args() {
        let cli = ClaudeCli::new(AssistantOptions::default());
        let args = cli.build_args(&PathBuf::from("/tmp/x/prompt.txt")).unwrap();
        assert_eq!(
            args,
            vec!["-p", "/tmp/x/prompt.txt", "--output-format", "markdown"]
        );
        assert_eq!(cli.executable(), "claude");
    }

    #[test]
    fn test_build_args_splices_quoted_extra_args() {
        let cli = ClaudeCli::new(AssistantOptions {
            extra_args: Some("--model sonnet --append-system-prompt 'be brief'".to_string()),
            executable: Some("/opt/bin/claude".to_string()),
            env: Vec::new(),
        });
        let args = cli.build_args(&PathBuf::from("p.txt")).unwrap();
        assert_eq!(
            args,
            vec![
                "-p",
                "--model",
                "sonnet",
                "--append-system-prompt",
                "be brief",
                "p.txt",
                "--output-format",
                "markdown"
            ]
        );
        assert_eq!(cli.executable(), "/opt/bin/claude");
    }

    #[test]
    fn test_build_args_rejects_unbalanced_quotes() {
        let cli = ClaudeCli::new(AssistantOptions {
            extra_args: Some("--model 'sonnet".to_string()),
            ..Default::default()
        });
        match cli.build_args(&PathBuf::from("p.txt")) {
            Err(AssistantError::InvalidArgs { args, .. }) => assert_eq!(args, "--model 'sonnet"),
            other => panic!("Expected InvalidArgs, got {:?}", other),
        }
    }

    #[cfg(unix)]
    fn fake_cli(dir: &Path, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-claude");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", script)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_reads_prompt_file_and_trims_output() {
        let dir = tempfile::tempdir().unwrap();
        // $1 is -p, $2 the prompt file
        let script = fake_cli(dir.path(), r#"cat "$2""#);
        let cli = ClaudeCli::new(AssistantOptions {
            executable: Some(script.to_string_lossy().into_owned()),
            ..Default::default()
        });
        let reply = cli.run("\n  Looks good to me.  \n\n").await.unwrap();
        assert_eq!(reply, "Looks good to me.");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_surfaces_stderr_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_cli(dir.path(), "echo \"$REVIEW_FAILURE\" >&2\nexit 3");
        let cli = ClaudeCli::new(AssistantOptions {
            executable: Some(script.to_string_lossy().into_owned()),
            extra_args: None,
            env: vec![("REVIEW_FAILURE".to_string(), "quota exceeded".to_string())],
        });
        match cli.run("prompt").await {
            Err(AssistantError::Exit { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("Expected Exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_missing_executable() {
        let cli = ClaudeCli::new(AssistantOptions {
            executable: Some("definitely-not-a-real-claude-binary".to_string()),
            ..Default::default()
        });
        match cli.run("hello").await {
            Err(AssistantError::Spawn { executable, .. }) => {
                assert_eq!(executable, "definitely-not-a-real-claude-binary")
            }
            other => panic!("Expected Spawn, got {:?}", other),
        }
    }
}

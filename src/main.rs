use anyhow::{Context, Result};
use clap::Parser;
use crate::assistant::{AssistantOptions, ClaudeCli};
use crate::config::{load_config, AppSettings};
use crate::gitlab::GitlabApiClient;
use crate::workflow::{run_workflow, WorkflowOutcome};
use std::io;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod assistant;
mod config;
mod gitlab;
mod marker;
mod models;
mod prompt;
mod trigger;
mod workflow;

#[cfg(test)]
mod tests;

#[tokio::main]
async fn main() -> Result<()> {
    let app_settings = AppSettings::parse();

    // RUST_LOG wins over the configured level. Logs go to stderr so CI can
    // capture stdout separately.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(app_settings.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let context = load_config(app_settings).with_context(|| "Failed to load configuration")?;
    info!(
        project_id = %context.project_id,
        mr_iid = context.merge_request_iid,
        api_url = %context.api_url,
        "Configuration loaded successfully."
    );

    let gitlab_client =
        GitlabApiClient::new(&context).with_context(|| "Failed to create GitLab client")?;
    let assistant = ClaudeCli::new(AssistantOptions::from_context(&context));

    match run_workflow(&context, &gitlab_client, &assistant).await {
        Ok(WorkflowOutcome::NoTrigger) => Ok(()),
        Ok(WorkflowOutcome::Responded {
            trigger_note_id,
            response_note_id,
        }) => {
            info!(trigger_note_id, response_note_id, "GitLab Claude workflow finished.");
            Ok(())
        }
        Err(e) => {
            error!("GitLab Claude workflow failed: {:#}", e);
            Err(e)
        }
    }
}

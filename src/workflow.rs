use crate::assistant::Assistant;
use crate::config::WorkflowContext;
use crate::gitlab::GitlabApiClient;
use crate::marker::HandledMarker;
use crate::prompt::build_prompt;
use crate::trigger::find_latest_trigger;
use anyhow::{Context, Result};
use futures::future::try_join;
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace};

pub const OUTPUT_NOTE_ID_KEY: &str = "CLAUDE_NOTE_ID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// No unanswered note mentions the trigger phrase.
    NoTrigger,
    Responded {
        trigger_note_id: i64,
        response_note_id: i64,
    },
}

/// Marker, assistant output and, when running in CI, a footer linking the job.
pub fn compose_response_body(
    context: &WorkflowContext,
    trigger_note_id: i64,
    assistant_output: &str,
) -> String {
    let marker = HandledMarker::new(trigger_note_id);
    let footer = match (&context.job_url, &context.pipeline_url) {
        (Some(job_url), Some(pipeline_url)) => format!(
            "\n\n——\nTriggered from {} (pipeline {})",
            job_url, pipeline_url
        ),
        (Some(job_url), None) => format!("\n\n——\nTriggered from {}", job_url),
        (None, _) => String::new(),
    };
    format!("{}\n{}{}", marker, assistant_output, footer)
        .trim()
        .to_string()
}

/// Creates the output file (and its directory) up front so later CI steps can
/// always source it, even when nothing gets posted.
pub async fn ensure_output_file(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create output file {}", path.display()))?;
    Ok(())
}

pub async fn record_note_id(path: &Path, note_id: i64) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open output file {}", path.display()))?;
    file.write_all(format!("{}={}\n", OUTPUT_NOTE_ID_KEY, note_id).as_bytes())
        .await
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    file.flush().await?;
    Ok(())
}

pub async fn run_workflow(
    context: &WorkflowContext,
    gitlab_client: &GitlabApiClient,
    assistant: &dyn Assistant,
) -> Result<WorkflowOutcome> {
    let project_id = context.project_id.as_str();
    let mr_iid = context.merge_request_iid;

    if let Some(output_file) = &context.output_file {
        ensure_output_file(output_file).await?;
    }

    info!("Loading merge request data from GitLab...");
    let (merge_request, notes) = try_join(
        gitlab_client.get_merge_request(project_id, mr_iid),
        gitlab_client.get_merge_request_notes(project_id, mr_iid),
    )
    .await
    .with_context(|| format!("Failed to load merge request {}!{}", project_id, mr_iid))?;
    debug!(
        notes = notes.len(),
        state = %merge_request.state,
        "Merge request data loaded"
    );

    let Some(trigger_note) = find_latest_trigger(&notes, &context.trigger_phrase) else {
        info!(
            "No trigger phrase \"{}\" found in merge request notes. Skipping Claude execution.",
            context.trigger_phrase
        );
        return Ok(WorkflowOutcome::NoTrigger);
    };
    info!(
        "Trigger note {} by @{} detected. Preparing prompt...",
        trigger_note.id, trigger_note.author.username
    );

    let changes = gitlab_client
        .get_merge_request_changes(project_id, mr_iid)
        .await
        .with_context(|| format!("Failed to load changes for {}!{}", project_id, mr_iid))?;
    let prompt = build_prompt(context, &merge_request, &changes, trigger_note);
    debug!(
        changes = changes.len(),
        prompt_len = prompt.len(),
        "Prompt built"
    );
    trace!("Prompt for Claude:\n{}", prompt);

    info!("Running Claude CLI...");
    let assistant_output = assistant
        .run(&prompt)
        .await
        .context("Claude CLI failed")?;
    let assistant_output = assistant_output.trim();

    let comment_body = compose_response_body(context, trigger_note.id, assistant_output);

    info!("Posting Claude response to GitLab...");
    let note = gitlab_client
        .post_merge_request_note(project_id, mr_iid, &comment_body)
        .await
        .with_context(|| format!("Failed to post response to {}!{}", project_id, mr_iid))?;

    if let Some(output_file) = &context.output_file {
        record_note_id(output_file, note.id).await?;
    }

    info!("Claude response posted as note {}.", note.id);
    Ok(WorkflowOutcome::Responded {
        trigger_note_id: trigger_note.id,
        response_note_id: note.id,
    })
}

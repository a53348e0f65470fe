use crate::config::WorkflowContext;
use crate::models::{GitlabChange, GitlabMergeRequest, GitlabNote};
use chrono::DateTime;

const FENCE: &str = "```";
const ESCAPED_FENCE: &str = "`\u{200b}``";
const SHORT_SHA_LEN: usize = 8;

/// `2024-05-01 10:00Z` or `2024-05-01 12:00+02:00`, in the timestamp's own
/// offset. Input that is not RFC 3339 is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) if dt.offset().local_minus_utc() == 0 => dt.format("%Y-%m-%d %H:%MZ").to_string(),
        Ok(dt) => dt.format("%Y-%m-%d %H:%M%:z").to_string(),
        Err(_) => raw.to_string(),
    }
}

fn short_sha(sha: &str) -> &str {
    sha.char_indices()
        .nth(SHORT_SHA_LEN)
        .map_or(sha, |(idx, _)| &sha[..idx])
}

/// Breaks up every run of three or more backticks. A single pass would leave
/// a fence behind in runs of four or more.
fn escape_fences(line: &str) -> String {
    let mut escaped = line.to_string();
    while escaped.contains(FENCE) {
        escaped = escaped.replace(FENCE, ESCAPED_FENCE);
    }
    escaped
}

fn change_header(change: &GitlabChange) -> String {
    let mut header = format!("### {}", change.new_path);
    let annotations: Vec<&str> = [
        (change.new_file, "(new file)"),
        (change.deleted_file, "(deleted file)"),
        (change.renamed_file, "(renamed file)"),
    ]
    .into_iter()
    .filter_map(|(applies, label)| applies.then_some(label))
    .collect();

    if !annotations.is_empty() {
        header.push(' ');
        header.push_str(&annotations.join(" "));
    }
    header
}

/// Renders one changed file as a header followed by a fenced diff block,
/// keeping at most `max_lines` lines of the diff.
pub fn format_change(change: &GitlabChange, max_lines: usize) -> String {
    let diff_lines: Vec<&str> = change.diff.split('\n').collect();
    let truncated = diff_lines.len() > max_lines;

    let diff_body = diff_lines
        .iter()
        .take(max_lines)
        .map(|line| escape_fences(line))
        .collect::<Vec<_>>()
        .join("\n");

    let mut parts = vec![change_header(change), format!("{}diff", FENCE)];
    if !diff_body.is_empty() {
        parts.push(diff_body);
    }
    if truncated {
        parts.push("\n... (diff truncated)".to_string());
    }
    parts.push(FENCE.to_string());
    parts.join("\n")
}

pub fn build_prompt(
    context: &WorkflowContext,
    merge_request: &GitlabMergeRequest,
    changes: &[GitlabChange],
    trigger_note: &GitlabNote,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(
        "You are Claude, an AI pair programmer helping with GitLab merge requests.".to_string(),
    );
    lines.push("Focus on producing high-quality, actionable feedback.".to_string());
    lines.push(String::new());

    lines.push("# Request Context".to_string());
    lines.push(format!("Trigger phrase: {}", context.trigger_phrase));
    lines.push(format!(
        "Triggered by: @{} ({})",
        trigger_note.author.username, trigger_note.author.name
    ));
    lines.push(format!(
        "Trigger time: {}",
        format_timestamp(&trigger_note.created_at)
    ));
    lines.push(String::new());
    lines.push("## Trigger Comment".to_string());
    lines.push(trigger_note.body.trim().to_string());
    lines.push(String::new());

    lines.push("# Merge Request".to_string());
    lines.push(format!("Title: {}", merge_request.title));
    lines.push(format!("Author: @{}", merge_request.author.username));
    lines.push(format!("Source branch: {}", merge_request.source_branch));
    lines.push(format!("Target branch: {}", merge_request.target_branch));
    lines.push(format!("Web URL: {}", merge_request.web_url));
    if let Some((base, head)) = merge_request.revision_range() {
        lines.push(format!(
            "Diff refs: {}... -> {}...",
            short_sha(base),
            short_sha(head)
        ));
    }

    if let Some(description) = merge_request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        lines.push(String::new());
        lines.push("## Merge Request Description".to_string());
        lines.push(description.to_string());
    }

    if !changes.is_empty() {
        lines.push(String::new());
        lines.push("# Changes".to_string());
        for change in changes {
            lines.push(String::new());
            lines.push(format_change(change, context.max_diff_lines));
        }
    }

    lines.push(String::new());
    lines.push("# Instructions".to_string());
    lines.push(
        "Provide a concise yet thorough review. Highlight critical issues, suggest improvements, and praise well-executed work. Use GitLab-flavored Markdown."
            .to_string(),
    );
    if let Some(job_url) = &context.job_url {
        lines.push(format!(
            "Include a reference to the job URL if useful: {}",
            job_url
        ));
    }

    lines.join("\n")
}

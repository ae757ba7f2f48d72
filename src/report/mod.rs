pub mod types;

pub use types::{CommentOutcome, CommentStatus, RunSummary};

use crate::detect::Detection;
use crate::pr::PullRequestContext;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Build a RunSummary from the comment outcomes and PR context.
pub fn build(
    ctx: &PullRequestContext,
    files_inspected: usize,
    outcomes: Vec<CommentOutcome>,
    dry_run: bool,
) -> RunSummary {
    RunSummary {
        pr_number: ctx.pr_number,
        repository: ctx.repository.clone(),
        files_inspected,
        dry_run,
        outcomes,
    }
}

/// Output the summary to terminal (default) or to a markdown file.
#[instrument(skip(summary), fields(pr = summary.pr_number, posted = summary.posted()))]
pub fn output(summary: &RunSummary, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing summary to terminal");
            print_terminal_report(summary);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing summary to file");
            write_markdown_report(summary, path)
        }
    }
}

fn describe(detection: &Detection) -> String {
    match detection {
        Detection::NewAction { filename } => format!("new queue action {filename}"),
        Detection::Migration {
            filename,
            class_name,
        } => format!("{class_name} moved to the indexed mapping ({filename})"),
    }
}

/// Format and print the summary to the terminal with colors.
///
/// PR #42 in org/repo | Files inspected: 7
///
/// ═══ Advisories ═══
/// • [POSTED] new queue action QueueFooAsyncAction.groovy
///
/// ═══ Posted: 1 | Failed: 0 ═══
fn print_terminal_report(summary: &RunSummary) {
    println!();
    println!(
        "PR #{} in {} | Files inspected: {}{}",
        summary.pr_number,
        summary.repository,
        summary.files_inspected,
        if summary.dry_run { " | dry run" } else { "" }
    );
    println!();

    println!("═══ Advisories ═══");
    if summary.outcomes.is_empty() {
        println!("  No qualifying changes.");
    } else {
        for outcome in &summary.outcomes {
            let reason = outcome
                .status
                .reason()
                .map(|r| format!(": {r}"))
                .unwrap_or_default();
            println!(
                "  • [{}] {}{}",
                colorize_status(&outcome.status),
                describe(&outcome.detection),
                reason
            );
        }
    }
    println!();

    println!(
        "═══ Posted: {} | Failed: {} ═══",
        summary.posted(),
        summary.failures()
    );
    println!();
}

/// Write the summary as a markdown file.
fn write_markdown_report(summary: &RunSummary, path: &Path) -> Result<(), ReportError> {
    let mut md = String::new();
    md.push_str(&format!(
        "# PR #{} in {}\n\n",
        summary.pr_number, summary.repository
    ));
    md.push_str(&format!(
        "**Files inspected:** {} | **Dry run:** {}\n\n",
        summary.files_inspected,
        if summary.dry_run { "yes" } else { "no" }
    ));

    md.push_str("## Advisories\n\n");
    if summary.outcomes.is_empty() {
        md.push_str("No qualifying changes.\n\n");
    } else {
        for outcome in &summary.outcomes {
            md.push_str(&format!(
                "- **[{}]** {}",
                outcome.status,
                describe(&outcome.detection)
            ));
            if let Some(reason) = outcome.status.reason() {
                md.push_str(&format!(" (`{reason}`)"));
            }
            md.push('\n');
        }
        md.push('\n');
    }

    md.push_str(&format!(
        "## Posted: {} | Failed: {}\n",
        summary.posted(),
        summary.failures()
    ));

    std::fs::write(path, md)?;
    Ok(())
}

fn colorize_status(status: &CommentStatus) -> colored::ColoredString {
    let label = status.to_string();
    match status {
        CommentStatus::Posted => label.green().bold(),
        CommentStatus::AlreadyPresent | CommentStatus::DryRun => label.yellow().bold(),
        CommentStatus::RenderFailed(_) | CommentStatus::PostFailed(_) => label.red().bold(),
    }
}

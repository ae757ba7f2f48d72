use thiserror::Error;
use tracing::info;

use crate::comment::{self, CommentError, Templates};
use crate::detect::{self, Detector};
use crate::pr::{GitHubApi, PrError, PullRequestContext};
use crate::report::{self, RunSummary};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to list PR files: {0}")]
    Listing(#[source] PrError),

    #[error(transparent)]
    Comment(#[from] CommentError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Render and deduplicate, but never post
    pub dry_run: bool,
}

/// List the PR's changed files, run the detectors, and publish advisories.
///
/// A listing failure aborts the run before anything is posted.
pub async fn run(
    ctx: &PullRequestContext,
    api: &dyn GitHubApi,
    detectors: &[Box<dyn Detector>],
    templates: &Templates,
    options: RunOptions,
) -> Result<RunSummary, PipelineError> {
    info!("listing changed files");
    let files = api
        .list_files(ctx.pr_number)
        .await
        .map_err(PipelineError::Listing)?;
    info!(files = files.len(), "listed changed files");

    let detections = detect::run_all(&files, ctx, api, detectors).await;
    info!(detections = detections.len(), "detection complete");

    let outcomes = comment::publish(&detections, ctx, api, templates, options.dry_run).await?;
    Ok(report::build(ctx, files.len(), outcomes, options.dry_run))
}

pub mod templates;

pub use templates::Templates;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::detect::Detection;
use crate::pr::{GitHubApi, PrError, PullRequestContext};
use crate::report::types::{CommentOutcome, CommentStatus};

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("Invalid comment template: {0}")]
    Template(#[source] minijinja::Error),

    #[error("Failed to render {template} comment: {source}")]
    Render {
        template: &'static str,
        #[source]
        source: minijinja::Error,
    },

    #[error("Rendered {0} comment does not carry its marker")]
    MarkerMissing(&'static str),

    #[error("Failed to read existing PR comments: {0}")]
    History(#[source] PrError),
}

/// Post one advisory per detection unless the PR already carries it.
///
/// The PR's comment history is read once; each advisory is then checked
/// against that history and against the advisories this run has already
/// posted, so one marker is posted at most once. Render and post failures
/// only affect their own detection.
#[instrument(skip_all, fields(pr = ctx.pr_number, detections = detections.len(), dry_run = dry_run))]
pub async fn publish(
    detections: &[Detection],
    ctx: &PullRequestContext,
    api: &dyn GitHubApi,
    templates: &Templates,
    dry_run: bool,
) -> Result<Vec<CommentOutcome>, CommentError> {
    if detections.is_empty() {
        debug!("nothing to comment on");
        return Ok(Vec::new());
    }

    let existing: Vec<String> = api
        .list_comments(ctx.pr_number)
        .await
        .map_err(CommentError::History)?
        .into_iter()
        .map(|comment| comment.body)
        .collect();
    debug!(existing = existing.len(), "loaded comment history");

    let mut posted_this_run: Vec<String> = Vec::new();
    let mut outcomes = Vec::with_capacity(detections.len());

    for detection in detections {
        let status = match templates.render(detection) {
            Err(err) => {
                warn!(file = %detection.filename(), error = %err, "dropping advisory");
                CommentStatus::RenderFailed(err.to_string())
            }
            Ok(comment) => {
                let seen = existing
                    .iter()
                    .chain(posted_this_run.iter())
                    .map(String::as_str);
                if comment.found_in(seen) {
                    debug!(marker = %comment.marker, "advisory already present");
                    CommentStatus::AlreadyPresent
                } else if dry_run {
                    info!(marker = %comment.marker, "dry run: advisory not posted");
                    posted_this_run.push(comment.body);
                    CommentStatus::DryRun
                } else {
                    match api.create_comment(ctx.pr_number, &comment.body).await {
                        Ok(()) => {
                            info!(marker = %comment.marker, "advisory posted");
                            posted_this_run.push(comment.body);
                            CommentStatus::Posted
                        }
                        Err(err) => {
                            error!(file = %detection.filename(), error = %err, "failed to post advisory");
                            CommentStatus::PostFailed(err.to_string())
                        }
                    }
                }
            }
        };
        outcomes.push(CommentOutcome {
            detection: detection.clone(),
            status,
        });
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectionConfig;
    use crate::detect::tests::test_context;
    use crate::pr::fake::FakeGitHub;

    fn new_action(name: &str) -> Detection {
        Detection::NewAction {
            filename: name.to_string(),
        }
    }

    fn migration(class_name: &str) -> Detection {
        Detection::Migration {
            filename: format!("{class_name}AsyncAction.groovy"),
            class_name: class_name.to_string(),
        }
    }

    fn templates() -> Templates {
        Templates::new(&DetectionConfig::default()).unwrap()
    }

    fn statuses(outcomes: &[CommentOutcome]) -> Vec<CommentStatus> {
        outcomes.iter().map(|o| o.status.clone()).collect()
    }

    #[tokio::test]
    async fn test_publish_posts_once_per_marker() {
        let api = FakeGitHub::default();
        let detections = vec![
            new_action("QueueFooAsyncAction.groovy"),
            new_action("QueueQuxAsyncAction.groovy"),
            migration("QueueBar"),
            migration("QueueBaz"),
        ];

        let outcomes = publish(&detections, &test_context(), &api, &templates(), false)
            .await
            .unwrap();
        assert_eq!(
            statuses(&outcomes),
            vec![
                CommentStatus::Posted,
                CommentStatus::AlreadyPresent,
                CommentStatus::Posted,
                CommentStatus::Posted,
            ]
        );
        assert_eq!(api.posted().len(), 3);
    }

    #[tokio::test]
    async fn test_publish_skips_markers_in_history() {
        let api = FakeGitHub::default();
        api.comments
            .lock()
            .unwrap()
            .push("> [!WARNING]\n> ### Nova AsyncAction criada!\n".to_string());

        let outcomes = publish(
            &[new_action("QueueFooAsyncAction.groovy")],
            &test_context(),
            &api,
            &templates(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(statuses(&outcomes), vec![CommentStatus::AlreadyPresent]);
        assert_eq!(api.posted().len(), 1);
    }

    #[tokio::test]
    async fn test_post_failure_does_not_stop_others() {
        let api = FakeGitHub {
            fail_posts_containing: Some("`QueueBar`".to_string()),
            ..FakeGitHub::default()
        };
        let detections = vec![migration("QueueBar"), migration("QueueBaz")];

        let outcomes = publish(&detections, &test_context(), &api, &templates(), false)
            .await
            .unwrap();
        assert!(matches!(outcomes[0].status, CommentStatus::PostFailed(_)));
        assert_eq!(outcomes[1].status, CommentStatus::Posted);
        assert_eq!(api.posted().len(), 1);
        assert!(api.posted()[0].contains("`QueueBaz`"));
    }

    #[tokio::test]
    async fn test_render_failure_drops_only_that_detection() {
        let api = FakeGitHub::default();
        let broken = Templates::from_sources(
            &DetectionConfig::default(),
            "{{ marker }} {{ undefined_key }}",
            "{{ marker }} {{ class_name }}",
        )
        .unwrap();
        let detections = vec![new_action("QueueFooAsyncAction.groovy"), migration("QueueBar")];

        let outcomes = publish(&detections, &test_context(), &api, &broken, false)
            .await
            .unwrap();
        assert!(matches!(outcomes[0].status, CommentStatus::RenderFailed(_)));
        assert_eq!(outcomes[1].status, CommentStatus::Posted);
    }

    #[tokio::test]
    async fn test_dry_run_posts_nothing() {
        let api = FakeGitHub::default();
        let detections = vec![
            new_action("QueueFooAsyncAction.groovy"),
            new_action("QueueQuxAsyncAction.groovy"),
        ];

        let outcomes = publish(&detections, &test_context(), &api, &templates(), true)
            .await
            .unwrap();
        assert_eq!(
            statuses(&outcomes),
            vec![CommentStatus::DryRun, CommentStatus::AlreadyPresent]
        );
        assert!(api.posted().is_empty());
    }

    #[tokio::test]
    async fn test_no_detections_reads_no_history() {
        let api = FakeGitHub::default();
        let outcomes = publish(&[], &test_context(), &api, &templates(), false)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
    }
}

pub mod migration;
pub mod new_action;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, info_span, Instrument};

use crate::config::DetectionConfig;
use crate::pr::{ChangedFile, GitHubApi, PullRequestContext};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid detection pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Which family of advisory a detection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionKind {
    NewAction,
    Migration,
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectionKind::NewAction => write!(f, "new-action"),
            DetectionKind::Migration => write!(f, "migration"),
        }
    }
}

/// A changed file that warrants an advisory comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// A queue action file was added by the PR
    NewAction { filename: String },
    /// A queue action switched from the plain to the indexed mapping
    Migration { filename: String, class_name: String },
}

impl Detection {
    pub fn kind(&self) -> DetectionKind {
        match self {
            Detection::NewAction { .. } => DetectionKind::NewAction,
            Detection::Migration { .. } => DetectionKind::Migration,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            Detection::NewAction { filename } | Detection::Migration { filename, .. } => filename,
        }
    }
}

/// Which detectors a run enables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Check {
    #[default]
    All,
    NewAction,
    Migration,
}

/// A rule applied to every changed file of the PR.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Human-readable name of this detector (e.g., "new-action")
    fn name(&self) -> &str;

    /// Inspect one changed file. Content is fetched through `api` only when
    /// the file passes the detector's cheap checks.
    async fn detect(
        &self,
        file: &ChangedFile,
        ctx: &PullRequestContext,
        api: &dyn GitHubApi,
    ) -> Option<Detection>;
}

/// Build the detectors selected by `check`.
pub fn build(check: Check, config: &DetectionConfig) -> Result<Vec<Box<dyn Detector>>, DetectError> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    if matches!(check, Check::All | Check::NewAction) {
        detectors.push(Box::new(new_action::NewActionDetector::new(config)));
    }
    if matches!(check, Check::All | Check::Migration) {
        detectors.push(Box::new(migration::MigrationDetector::new(config)?));
    }
    Ok(detectors)
}

/// Run every detector over every file, one file at a time in list order.
pub async fn run_all(
    files: &[ChangedFile],
    ctx: &PullRequestContext,
    api: &dyn GitHubApi,
    detectors: &[Box<dyn Detector>],
) -> Vec<Detection> {
    let mut detections = Vec::new();
    for file in files {
        for detector in detectors {
            let span = info_span!("detect", detector = detector.name(), file = %file.filename);
            if let Some(detection) = detector.detect(file, ctx, api).instrument(span).await {
                info!(kind = %detection.kind(), file = %detection.filename(), "qualifying change detected");
                detections.push(detection);
            }
        }
    }
    debug!(files = files.len(), detections = detections.len(), "detection complete");
    detections
}

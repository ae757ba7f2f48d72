use async_trait::async_trait;

use super::{Detection, Detector};
use crate::config::DetectionConfig;
use crate::pr::{ChangedFile, FileStatus, GitHubApi, PullRequestContext};

/// New Queue Action Detector
///
/// Flags every file the PR adds whose name ends with the queue action suffix.
/// Queue tables are created without the status/hash index, so a new action
/// needs one created by hand. File content is never read.
pub struct NewActionDetector {
    suffix: String,
}

impl NewActionDetector {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            suffix: config.new_action_suffix.clone(),
        }
    }

    pub fn qualifies(&self, file: &ChangedFile) -> bool {
        file.status == FileStatus::Added && file.filename.ends_with(&self.suffix)
    }
}

#[async_trait]
impl Detector for NewActionDetector {
    fn name(&self) -> &str {
        "new-action"
    }

    async fn detect(
        &self,
        file: &ChangedFile,
        _ctx: &PullRequestContext,
        _api: &dyn GitHubApi,
    ) -> Option<Detection> {
        self.qualifies(file).then(|| Detection::NewAction {
            filename: file.filename.clone(),
        })
    }
}

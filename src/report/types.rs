use crate::detect::Detection;

/// What happened to the advisory for one detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentStatus {
    Posted,
    /// The PR (or this run) already carries the advisory's marker
    AlreadyPresent,
    /// Would have been posted, but the run was a dry run
    DryRun,
    RenderFailed(String),
    PostFailed(String),
}

impl std::fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommentStatus::Posted => write!(f, "POSTED"),
            CommentStatus::AlreadyPresent => write!(f, "ALREADY PRESENT"),
            CommentStatus::DryRun => write!(f, "DRY RUN"),
            CommentStatus::RenderFailed(_) => write!(f, "RENDER FAILED"),
            CommentStatus::PostFailed(_) => write!(f, "POST FAILED"),
        }
    }
}

impl CommentStatus {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            CommentStatus::RenderFailed(_) | CommentStatus::PostFailed(_)
        )
    }

    /// Failure detail, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            CommentStatus::RenderFailed(reason) | CommentStatus::PostFailed(reason) => {
                Some(reason.as_str())
            }
            _ => None,
        }
    }
}

/// A detection paired with the fate of its advisory.
#[derive(Debug, Clone)]
pub struct CommentOutcome {
    pub detection: Detection,
    pub status: CommentStatus,
}

/// Summary of one run over a pull request.
#[derive(Debug)]
pub struct RunSummary {
    pub pr_number: u64,
    /// Repository in `owner/repo` form
    pub repository: String,
    /// Changed files returned by the listing
    pub files_inspected: usize,
    pub dry_run: bool,
    pub outcomes: Vec<CommentOutcome>,
}

impl RunSummary {
    pub fn count(&self, pred: impl Fn(&CommentStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn posted(&self) -> usize {
        self.count(|s| *s == CommentStatus::Posted)
    }

    pub fn failures(&self) -> usize {
        self.count(CommentStatus::is_failure)
    }
}

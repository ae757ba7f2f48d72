use serde::{Deserialize, Deserializer};

/// Everything a run needs to know about the pull request under inspection.
/// Built once at startup and passed by reference to every component. The
/// access token is not part of it: the API client owns the credential.
#[derive(Debug, Clone)]
pub struct PullRequestContext {
    /// Repository in `owner/repo` form
    pub repository: String,
    /// PR number (e.g., 42)
    pub pr_number: u64,
    /// Commit the PR head points at
    pub head_revision: String,
    /// Commit the PR is based on
    pub base_revision: String,
}

/// Head and base commits of a pull request, as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRevisions {
    pub head: String,
    pub base: String,
}

/// Change status of a file within the PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    /// copied, changed, unchanged: never relevant to detection
    #[serde(other)]
    Other,
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Added => write!(f, "added"),
            FileStatus::Modified => write!(f, "modified"),
            FileStatus::Removed => write!(f, "removed"),
            FileStatus::Renamed => write!(f, "renamed"),
            FileStatus::Other => write!(f, "other"),
        }
    }
}

/// A single file touched by the PR, as returned by the pulls-files endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    /// File path (e.g., "src/queue/QueueFooAsyncAction.groovy")
    pub filename: String,
    pub status: FileStatus,
    /// Unified diff fragment; the platform omits it for binary or very large files
    #[serde(default)]
    pub patch: Option<String>,
}

/// Full text of a file at one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSnapshot {
    pub content: String,
}

/// Result of a best-effort content fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentLookup {
    Found(FileSnapshot),
    /// The file does not exist at that revision
    NotFound,
    /// Transport failure, unexpected status, or undecodable bytes
    Unavailable(String),
}

impl ContentLookup {
    /// Collapse to the text, treating every kind of absence alike.
    pub fn into_content(self) -> Option<String> {
        match self {
            ContentLookup::Found(snapshot) => Some(snapshot.content),
            ContentLookup::NotFound | ContentLookup::Unavailable(_) => None,
        }
    }
}

/// A comment already present on the PR. Only the body is ever inspected.
#[derive(Debug, Clone, Deserialize)]
pub struct ExistingComment {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

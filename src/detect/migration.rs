use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use super::{DetectError, Detection, Detector};
use crate::config::DetectionConfig;
use crate::pr::diff::Patch;
use crate::pr::{ChangedFile, FileStatus, GitHubApi, PullRequestContext};

/// How a migration was confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The patch removes a plain-mapping line and adds an indexed-mapping line
    Patch,
    /// No patch was available and the head no longer mentions the plain mapping
    Absence,
}

/// Outcome of evaluating one changed file. Every variant but `Confirmed`
/// names the gate that stopped evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationVerdict {
    /// Wrong suffix or status other than modified
    Ineligible,
    /// Head or base content could not be read
    ContentMissing,
    /// Head does not declare a class extending the base action
    NotQueueAction,
    /// Head lacks the indexed mapping or base lacks the plain mapping
    NoMethodShift { class_name: String },
    /// A patch exists but does not show the swap
    PatchInconclusive { class_name: String },
    /// No patch, and head still mentions the plain mapping
    PlainStillReferenced { class_name: String },
    Confirmed {
        class_name: String,
        via: Confirmation,
    },
}

/// Per-file result once the file is known to hold a queue action class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSignal {
    pub class_name: String,
    pub qualifies: bool,
}

impl MigrationVerdict {
    pub fn qualifies(&self) -> bool {
        matches!(self, MigrationVerdict::Confirmed { .. })
    }

    pub fn signal(&self) -> Option<MigrationSignal> {
        let class_name = match self {
            MigrationVerdict::Ineligible
            | MigrationVerdict::ContentMissing
            | MigrationVerdict::NotQueueAction => return None,
            MigrationVerdict::NoMethodShift { class_name }
            | MigrationVerdict::PatchInconclusive { class_name }
            | MigrationVerdict::PlainStillReferenced { class_name }
            | MigrationVerdict::Confirmed { class_name, .. } => class_name,
        };
        Some(MigrationSignal {
            class_name: class_name.clone(),
            qualifies: self.qualifies(),
        })
    }
}

/// Mapping Migration Detector
///
/// Flags modified queue actions whose mapping moved from the plain variant to
/// the indexed one. The indexed mapping relies on an index the plain one never
/// needed, and deploying without it locks the queue table.
pub struct MigrationDetector {
    source_suffix: String,
    class_pattern: Regex,
    plain_pattern: Regex,
    indexed_pattern: Regex,
}

/// Word-bounded pattern for `method`, tolerating an `s` right after `stem`
/// (`applyBaseMapping` and `applyBaseMappings` are both in use).
fn method_pattern(method: &str, stem: &str) -> String {
    match method.strip_prefix(stem) {
        Some(rest) => format!(r"\b{}s?{}\b", regex::escape(stem), regex::escape(rest)),
        None => format!(r"\b{}\b", regex::escape(method)),
    }
}

impl MigrationDetector {
    pub fn new(config: &DetectionConfig) -> Result<Self, DetectError> {
        let class_pattern = Regex::new(&format!(
            r"class\s+([\w\d_]+)\s+extends\s+{}",
            regex::escape(&config.base_class)
        ))?;
        let plain_pattern =
            Regex::new(&method_pattern(&config.plain_method, &config.plain_method))?;
        let indexed_pattern =
            Regex::new(&method_pattern(&config.indexed_method, &config.plain_method))?;

        Ok(Self {
            source_suffix: config.source_suffix.clone(),
            class_pattern,
            plain_pattern,
            indexed_pattern,
        })
    }

    /// Only modified source files are considered; added, removed and renamed
    /// files never are.
    pub fn is_eligible(&self, file: &ChangedFile) -> bool {
        file.filename.ends_with(&self.source_suffix) && file.status == FileStatus::Modified
    }

    fn class_name(&self, content: &str) -> Option<String> {
        self.class_pattern
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }

    /// Decide whether `file` migrates a queue action to the indexed mapping,
    /// given its content at the PR head and base. Empty content counts as
    /// missing.
    pub fn evaluate(
        &self,
        file: &ChangedFile,
        head: Option<&str>,
        base: Option<&str>,
    ) -> MigrationVerdict {
        if !self.is_eligible(file) {
            return MigrationVerdict::Ineligible;
        }

        let (Some(head), Some(base)) = (
            head.filter(|c| !c.is_empty()),
            base.filter(|c| !c.is_empty()),
        ) else {
            return MigrationVerdict::ContentMissing;
        };

        let Some(class_name) = self.class_name(head) else {
            return MigrationVerdict::NotQueueAction;
        };

        let uses_indexed_now = self.indexed_pattern.is_match(head);
        let used_plain_before = self.plain_pattern.is_match(base);
        if !(uses_indexed_now && used_plain_before) {
            return MigrationVerdict::NoMethodShift { class_name };
        }

        // A patch that exists but does not show the swap is inconclusive; the
        // absence check applies only when there is no patch at all.
        match file.patch.as_deref().filter(|p| !p.is_empty()) {
            Some(raw) => {
                let patch = Patch::new(raw);
                let removed_plain = patch.removes(|line| self.plain_pattern.is_match(line));
                let added_indexed = patch.adds(|line| self.indexed_pattern.is_match(line));
                debug!(removed_plain, added_indexed, "patch scanned");
                if removed_plain && added_indexed {
                    MigrationVerdict::Confirmed {
                        class_name,
                        via: Confirmation::Patch,
                    }
                } else {
                    MigrationVerdict::PatchInconclusive { class_name }
                }
            }
            None if !self.plain_pattern.is_match(head) => MigrationVerdict::Confirmed {
                class_name,
                via: Confirmation::Absence,
            },
            None => MigrationVerdict::PlainStillReferenced { class_name },
        }
    }
}

#[async_trait]
impl Detector for MigrationDetector {
    fn name(&self) -> &str {
        "migration"
    }

    async fn detect(
        &self,
        file: &ChangedFile,
        ctx: &PullRequestContext,
        api: &dyn GitHubApi,
    ) -> Option<Detection> {
        if !self.is_eligible(file) {
            return None;
        }

        debug!("inspecting modified file");
        let head = api
            .get_content(&file.filename, &ctx.head_revision)
            .await
            .into_content();
        let base = api
            .get_content(&file.filename, &ctx.base_revision)
            .await
            .into_content();

        let verdict = self.evaluate(file, head.as_deref(), base.as_deref());
        if let Some(signal) = verdict.signal() {
            debug!(class = %signal.class_name, qualifies = signal.qualifies, "queue action evaluated");
        }

        match verdict {
            MigrationVerdict::Confirmed { class_name, via } => {
                info!(class = %class_name, ?via, "mapping migration confirmed");
                Some(Detection::Migration {
                    filename: file.filename.clone(),
                    class_name,
                })
            }
            verdict => {
                debug!(?verdict, "no qualifying migration");
                None
            }
        }
    }
}

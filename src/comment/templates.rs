use minijinja::{context, Environment, UndefinedBehavior};

use super::CommentError;
use crate::config::DetectionConfig;
use crate::detect::Detection;

// Markers identify a posted advisory when scanning the PR's comment history.
// Template wording may change freely as long as the marker lines are kept
// verbatim; when a marker itself has to change, move the old text into the
// matching LEGACY list so earlier comments are still recognized.

pub const NEW_ACTION_MARKER: &str = "### New AsyncAction created";

/// Heading used by the scripts this tool replaced.
pub const LEGACY_NEW_ACTION_MARKERS: &[&str] = &["### Nova AsyncAction criada!"];

pub const MIGRATION_MARKER_PREFIX: &str = "### Indexed mapping migration:";

pub const LEGACY_MIGRATION_MARKERS: &[&str] = &[];

const NEW_ACTION_TEMPLATE: &str = r#"
> [!WARNING]
> {{ marker }}
>
> A new file ending in `{{ suffix }}` was added in this pull request.
>
> Async action queue tables are not created with indexes. Have a DBA create them before deploying, so queue polling stays fast and does not hold long locks on the queue.
>
> - [ ] Pre-deploy script creating the queue indexes through a DBA.
>
> Example:
> ```sql
> ALTER TABLE queues.your_new_queue_async_action ADD INDEX status_action_data_hash_idx (status, action_data_hash) ALGORITHM = INPLACE, LOCK = NONE;
> ```
>
> Follow the team's index naming convention when naming the index.
"#;

const MIGRATION_TEMPLATE: &str = r#"
> [!WARNING]
> {{ marker }}
>
> The class `{{ class_name }}` in `{{ file_path }}` now uses `{{ indexed_method }}` instead of `{{ plain_method }}`.
>
> **Before deploying, make sure that:**
>
> - [ ] A pre-deploy script has a DBA create the indexes `{{ class_name }}` needs.
>
> ```sql
> ALTER TABLE queues.{{ table_name }} ADD INDEX status_action_data_hash_idx (status, action_data_hash) ALGORITHM = INPLACE, LOCK = NONE;
> ```
>
> Switching to `{{ indexed_method }}` before the index exists leads to long locks on the queue table during deploy.
"#;

/// A rendered advisory, ready to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvisoryComment {
    pub marker: String,
    pub legacy_markers: &'static [&'static str],
    pub body: String,
}

impl AdvisoryComment {
    /// True if any of `bodies` already carries this advisory's marker.
    pub fn found_in<'b>(&self, bodies: impl IntoIterator<Item = &'b str>) -> bool {
        bodies.into_iter().any(|body| {
            body.contains(self.marker.as_str())
                || self.legacy_markers.iter().any(|legacy| body.contains(legacy))
        })
    }
}

pub fn new_action_marker() -> String {
    NEW_ACTION_MARKER.to_string()
}

pub fn migration_marker(class_name: &str) -> String {
    format!("{MIGRATION_MARKER_PREFIX} `{class_name}`")
}

/// `QueueBarAsyncAction` -> `queue_bar_async_action`
pub fn table_name(class_name: &str) -> String {
    let mut out = String::with_capacity(class_name.len() + 4);
    let mut prev_lower = false;
    for ch in class_name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Advisory templates, compiled once per run.
pub struct Templates {
    env: Environment<'static>,
    detection: DetectionConfig,
}

impl Templates {
    pub fn new(detection: &DetectionConfig) -> Result<Self, CommentError> {
        Self::from_sources(detection, NEW_ACTION_TEMPLATE, MIGRATION_TEMPLATE)
    }

    pub fn from_sources(
        detection: &DetectionConfig,
        new_action: &'static str,
        migration: &'static str,
    ) -> Result<Self, CommentError> {
        let mut env = Environment::new();
        // A key the template expects but the context lacks is an error, not ""
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.add_template("new_action", new_action)
            .map_err(CommentError::Template)?;
        env.add_template("migration", migration)
            .map_err(CommentError::Template)?;
        Ok(Self {
            env,
            detection: detection.clone(),
        })
    }

    pub fn render(&self, detection: &Detection) -> Result<AdvisoryComment, CommentError> {
        let (name, marker, legacy_markers, ctx) = match detection {
            Detection::NewAction { filename } => {
                let marker = new_action_marker();
                let ctx = context! {
                    marker => &marker,
                    suffix => &self.detection.new_action_suffix,
                    file_path => filename,
                };
                ("new_action", marker, LEGACY_NEW_ACTION_MARKERS, ctx)
            }
            Detection::Migration {
                filename,
                class_name,
            } => {
                let marker = migration_marker(class_name);
                let ctx = context! {
                    marker => &marker,
                    class_name => class_name,
                    file_path => filename,
                    table_name => table_name(class_name),
                    plain_method => &self.detection.plain_method,
                    indexed_method => &self.detection.indexed_method,
                };
                ("migration", marker, LEGACY_MIGRATION_MARKERS, ctx)
            }
        };

        let body = self
            .env
            .get_template(name)
            .and_then(|template| template.render(ctx))
            .map_err(|source| CommentError::Render {
                template: name,
                source,
            })?;

        if !body.contains(marker.as_str()) {
            return Err(CommentError::MarkerMissing(name));
        }

        Ok(AdvisoryComment {
            marker,
            legacy_markers,
            body,
        })
    }
}

/// Line-prefix view over a unified diff fragment as returned in the `patch`
/// field of the pulls-files endpoint.
///
/// The fragment carries no `diff --git` or `---`/`+++` file headers, only hunk
/// headers and hunk lines, so a line's first character is enough to classify it:
///   '+' for additions
///   '-' for deletions
///   ' ' for context (unchanged)
///   '@' for hunk headers
#[derive(Debug, Clone, Copy)]
pub struct Patch<'a> {
    raw: &'a str,
}

impl<'a> Patch<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    /// Lines removed by the patch, prefix included.
    pub fn removed_lines(&self) -> impl Iterator<Item = &'a str> {
        self.raw.split('\n').filter(|line| line.starts_with('-'))
    }

    /// Lines added by the patch, prefix included.
    pub fn added_lines(&self) -> impl Iterator<Item = &'a str> {
        self.raw.split('\n').filter(|line| line.starts_with('+'))
    }

    /// True if any removed line satisfies `pred`.
    pub fn removes(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.removed_lines().any(|line| pred(line))
    }

    /// True if any added line satisfies `pred`.
    pub fn adds(&self, pred: impl Fn(&str) -> bool) -> bool {
        self.added_lines().any(|line| pred(line))
    }
}

//! Exclusion of files before they reach the engine.
//!
//! Deleted files and files without a destination path are always dropped;
//! everything else is checked against the configured glob patterns.

use std::path::PathBuf;

use glob::{MatchOptions, Pattern};
use kensa_core::KensaError;
use tracing::debug;

use crate::parser::DiffFile;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Glob-based exclusion filter over destination paths.
///
/// `*` matches within one path segment, `**` across segments.
///
/// # Examples
///
/// ```
/// use kensa_difflens::filter::DiffFilter;
///
/// let filter = DiffFilter::new(&["*.md", "dist/**"]).unwrap();
/// assert!(filter.should_skip("README.md"));
/// assert!(filter.should_skip("dist/app/main.js"));
/// assert!(!filter.should_skip("docs/guide.md"));
/// assert!(!filter.should_skip("src/main.rs"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct DiffFilter {
    patterns: Vec<Pattern>,
}

impl DiffFilter {
    /// Compile exclusion patterns. Blank patterns are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] if a pattern is not a valid glob.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, KensaError> {
        let mut compiled = Vec::new();
        for raw in patterns {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let pattern = Pattern::new(raw).map_err(|e| {
                KensaError::Config(format!("invalid exclude pattern '{raw}': {e}"))
            })?;
            compiled.push(pattern);
        }
        Ok(Self { patterns: compiled })
    }

    /// Returns `true` if `path` matches any exclusion pattern.
    pub fn should_skip(&self, path: &str) -> bool {
        self.matching_pattern(path).is_some()
    }

    fn matching_pattern(&self, path: &str) -> Option<&Pattern> {
        self.patterns
            .iter()
            .find(|p| p.matches_with(path, MATCH_OPTIONS))
    }

    /// Filter parsed files, returning the reviewable ones in input order.
    ///
    /// # Examples
    ///
    /// ```
    /// use kensa_difflens::filter::DiffFilter;
    /// use kensa_difflens::parser::parse_unified_diff;
    ///
    /// let diff = "diff --git a/src/main.rs b/src/main.rs\n\
    ///             --- a/src/main.rs\n\
    ///             +++ b/src/main.rs\n\
    ///             @@ -1,1 +1,2 @@\n \
    ///             line\n\
    ///             +new\n";
    /// let files = parse_unified_diff(diff);
    /// let result = DiffFilter::default().filter(files);
    /// assert_eq!(result.kept.len(), 1);
    /// assert!(result.skipped.is_empty());
    /// ```
    pub fn filter(&self, files: Vec<DiffFile>) -> FilterResult {
        let mut kept = Vec::new();
        let mut skipped = Vec::new();

        for file in files {
            let reason = match (&file.path, file.review_path()) {
                (None, _) => Some((PathBuf::new(), SkipReason::NoPath)),
                (Some(_), None) => Some((
                    file.old_path.clone().unwrap_or_default(),
                    SkipReason::Deleted,
                )),
                (Some(_), Some(path)) => {
                    let path_str = path.to_string_lossy();
                    self.matching_pattern(&path_str).map(|pat| {
                        (
                            path.to_path_buf(),
                            SkipReason::PatternMatch(pat.as_str().to_string()),
                        )
                    })
                }
            };

            match reason {
                Some((path, reason)) => {
                    debug!(path = %path.display(), %reason, "skipping file");
                    skipped.push(SkippedFile { path, reason });
                }
                None => kept.push(file),
            }
        }

        FilterResult { kept, skipped }
    }
}

/// Result of filtering diffs.
#[derive(Debug)]
pub struct FilterResult {
    /// Files that passed the filter, in input order.
    pub kept: Vec<DiffFile>,
    /// Files that were skipped with reasons.
    pub skipped: Vec<SkippedFile>,
}

/// A file that was skipped during filtering.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// Destination path, or the old path for deleted files.
    pub path: PathBuf,
    /// Why the file was skipped.
    pub reason: SkipReason,
}

/// Reason a file was skipped.
///
/// # Examples
///
/// ```
/// use kensa_difflens::filter::SkipReason;
///
/// assert_eq!(SkipReason::Deleted.to_string(), "deleted");
/// assert_eq!(SkipReason::PatternMatch("*.md".into()).to_string(), "pattern: *.md");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The file no longer exists in the new revision.
    Deleted,
    /// The diff never named a destination path.
    NoPath,
    /// Matched an exclusion pattern.
    PatternMatch(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Deleted => write!(f, "deleted"),
            SkipReason::NoPath => write!(f, "no destination path"),
            SkipReason::PatternMatch(pat) => write!(f, "pattern: {pat}"),
        }
    }
}

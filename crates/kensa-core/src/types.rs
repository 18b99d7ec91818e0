use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Owner and name of a hosted repository.
///
/// # Examples
///
/// ```
/// use kensa_core::RepoRef;
///
/// let repo = RepoRef::new("octocat", "hello-world");
/// assert_eq!(repo.to_string(), "octocat/hello-world");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    /// Account or organisation that owns the repository.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Read-only bundle describing the pull request under review.
///
/// Built once per run and shared by every per-file review task.
///
/// # Examples
///
/// ```
/// use kensa_core::{RepoRef, ReviewContext};
///
/// let ctx = ReviewContext::new(RepoRef::new("o", "r"), 7, "Fix login", "")
///     .with_docs(Some("# Style guide".into()));
/// assert_eq!(ctx.pr_number, 7);
/// assert!(ctx.docs.is_some());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewContext {
    /// Repository coordinates.
    pub repo: RepoRef,
    /// Pull request number.
    pub pr_number: u64,
    /// Pull request title (empty when the host has none).
    pub title: String,
    /// Pull request description (empty when the host has none).
    pub description: String,
    /// Supplementary document text, e.g. project guidelines.
    pub docs: Option<String>,
}

impl ReviewContext {
    pub fn new(
        repo: RepoRef,
        pr_number: u64,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            pr_number,
            title: title.into(),
            description: description.into(),
            docs: None,
        }
    }

    /// Attach the supplementary document. Blank text counts as absent.
    pub fn with_docs(mut self, docs: Option<String>) -> Self {
        self.docs = docs.filter(|d| !d.trim().is_empty());
        self
    }
}

/// Line a review item refers to.
///
/// Serializes as a bare number, or `null` when the engine gave no usable line.
///
/// # Examples
///
/// ```
/// use kensa_core::LineRef;
///
/// assert_eq!(serde_json::to_string(&LineRef::Line(10)).unwrap(), "10");
/// assert_eq!(serde_json::to_string(&LineRef::Unattributed).unwrap(), "null");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    /// A line number in the reviewed file.
    Line(u32),
    /// No line attribution.
    Unattributed,
}

impl LineRef {
    pub fn number(self) -> Option<u32> {
        match self {
            LineRef::Line(n) => Some(n),
            LineRef::Unattributed => None,
        }
    }
}

impl fmt::Display for LineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineRef::Line(n) => write!(f, "{n}"),
            LineRef::Unattributed => write!(f, "?"),
        }
    }
}

/// One discrete comment decoded from structured engine output.
///
/// # Examples
///
/// ```
/// use kensa_core::{LineRef, ReviewItem};
///
/// let item = ReviewItem {
///     line: LineRef::Line(42),
///     title: "[Bug] Off by one".into(),
///     comment: "The loop skips the last element.".into(),
///     suggested_patch: None,
/// };
/// assert_eq!(item.line.number(), Some(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    /// Line the comment is attached to.
    pub line: LineRef,
    /// Short headline.
    pub title: String,
    /// Comment body (Markdown).
    pub comment: String,
    /// Optional improved diff proposed by the engine.
    pub suggested_patch: Option<String>,
}

/// The review result for a single file.
///
/// # Examples
///
/// ```
/// use kensa_core::FileReview;
///
/// assert!(FileReview::Narrative("  \n".into()).is_empty());
/// assert!(FileReview::Items(vec![]).is_empty());
/// assert!(!FileReview::Narrative("Looks risky".into()).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum FileReview {
    /// Free-form text with no line attribution.
    Narrative(String),
    /// Line-attributed review items.
    Items(Vec<ReviewItem>),
}

impl FileReview {
    /// Returns `true` when there is nothing to report for the file.
    pub fn is_empty(&self) -> bool {
        match self {
            FileReview::Narrative(text) => text.trim().is_empty(),
            FileReview::Items(items) => items.is_empty(),
        }
    }

    /// Number of review items, counting a narrative as one.
    pub fn len(&self) -> usize {
        match self {
            FileReview::Narrative(text) if text.trim().is_empty() => 0,
            FileReview::Narrative(_) => 1,
            FileReview::Items(items) => items.len(),
        }
    }
}

/// Which prompt and response shape a run uses.
///
/// # Examples
///
/// ```
/// use kensa_core::PromptVariant;
///
/// let v: PromptVariant = "narrative".parse().unwrap();
/// assert_eq!(v, PromptVariant::Narrative);
/// assert_eq!(PromptVariant::default(), PromptVariant::Structured);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptVariant {
    /// JSON `reviews` array with per-line items.
    #[default]
    Structured,
    /// Free-form text per file.
    Narrative,
}

impl fmt::Display for PromptVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptVariant::Structured => write!(f, "structured"),
            PromptVariant::Narrative => write!(f, "narrative"),
        }
    }
}

impl FromStr for PromptVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "structured" | "json" => Ok(PromptVariant::Structured),
            "narrative" | "text" => Ok(PromptVariant::Narrative),
            other => Err(format!("unknown prompt variant: {other}")),
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use kensa_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown, identical to the published comment.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

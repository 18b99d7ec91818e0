use std::fmt;
use std::path::PathBuf;

use kensa_core::{FileReview, LineRef, ReviewItem};
use serde::Serialize;

/// Reviews of one file, as they appear in the report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSection {
    /// Destination path of the reviewed file.
    pub path: PathBuf,
    /// What the engine had to say about it.
    pub review: FileReview,
}

/// Ordered collection of per-file reviews for a whole run.
///
/// # Examples
///
/// ```
/// use kensa_core::FileReview;
/// use kensa_review::report::ReviewReport;
///
/// let report = ReviewReport::aggregate(vec![
///     ("src/b.rs".into(), FileReview::Narrative("Adds a check.".into())),
///     ("src/a.rs".into(), FileReview::Items(vec![])),
/// ]);
/// assert_eq!(report.sections.len(), 1);
/// assert!(report.to_markdown("AI Reviewer").starts_with("# AI Reviewer\n"));
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReport {
    /// Non-empty file reviews in diff order.
    pub sections: Vec<FileSection>,
}

impl ReviewReport {
    /// Collect per-file reviews, keeping input order and dropping empty ones.
    pub fn aggregate(reviews: impl IntoIterator<Item = (PathBuf, FileReview)>) -> Self {
        let sections = reviews
            .into_iter()
            .filter(|(_, review)| !review.is_empty())
            .map(|(path, review)| FileSection { path, review })
            .collect();
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Total review items, counting each narrative as one.
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.review.len()).sum()
    }

    /// Render the publishable comment body.
    pub fn to_markdown(&self, title: &str) -> String {
        format!("# {title}\n\n{}", self.body_markdown())
    }

    /// The per-file sections without the top-level heading.
    pub fn body_markdown(&self) -> String {
        self.sections
            .iter()
            .map(render_section)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_section(section: &FileSection) -> String {
    let path = section.path.display().to_string();
    let mut out = format!("## {path}\n");
    match &section.review {
        FileReview::Narrative(text) => {
            out.push_str(text.trim_end());
            out.push('\n');
        }
        FileReview::Items(items) => {
            for item in items {
                out.push('\n');
                out.push_str(&render_item(&path, item));
            }
        }
    }
    out
}

fn render_item(path: &str, item: &ReviewItem) -> String {
    let location = match item.line {
        LineRef::Line(n) => format!("{path}:{n}"),
        LineRef::Unattributed => path.to_string(),
    };
    let mut out = format!("### {}({location})\n{}\n", item.title, item.comment);
    if let Some(patch) = &item.suggested_patch {
        out.push_str(&format!("```diff\n{patch}\n```\n"));
    }
    out
}

impl fmt::Display for ReviewReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sections.is_empty() {
            return writeln!(f, "No review comments.");
        }

        for section in &self.sections {
            writeln!(f, "{}", section.path.display())?;
            match &section.review {
                FileReview::Narrative(text) => {
                    for line in text.lines() {
                        writeln!(f, "  {line}")?;
                    }
                }
                FileReview::Items(items) => {
                    for item in items {
                        writeln!(f, "  [{}] {}", item.line, item.title)?;
                        for line in item.comment.lines() {
                            writeln!(f, "      {line}")?;
                        }
                    }
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

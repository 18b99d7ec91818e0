use std::fmt::Write;

use kensa_core::{PromptVariant, ReviewContext};
use kensa_difflens::parser::DiffFile;

use crate::report::ReviewReport;

/// Revision of the instructional prompt text. Bump when wording changes.
pub const PROMPT_VERSION: &str = "2";

/// Placeholder for an absent or empty prompt section.
pub const NONE_MARKER: &str = "(none)";

const STRUCTURED_INSTRUCTIONS: &str = "\
Your task is to review pull requests. Instructions:
- Provide the response in following JSON format: {\"reviews\": [{\"lineNumber\": <line_number>, \"reviewTitle\": \"<review title>\", \"reviewComment\": \"<review comment>\", \"improveDiff\": \"<improve diff>\"}]}
- Start every reviewTitle with one of [Bug], [Warning] or [Suggestion].
- Use the line numbers printed in front of each diff line for lineNumber.
- Do not give positive comments or compliments.
- Provide comments and suggestions ONLY if there is something to improve, otherwise \"reviews\" should be an empty array.
- Write the comment in GitHub Markdown format.
- Do not generate JSON code blocks.
- Use the given description only for the overall context and only comment the code.
- IMPORTANT: NEVER suggest adding comments to the code.
- Follow the project document when it applies to the change.
- Write in {language}.
";

const NARRATIVE_INSTRUCTIONS: &str = "\
Describe the following diff in {language} under these headings:

- 1. Changes
- 2. Test items / how to verify the change
- 3. Suggestions for variable names, function names, alternative features or methods
";

const SUMMARY_INSTRUCTIONS: &str = "\
Write an overall summary of the following code review for a chat message. \
Keep it short and write in {language}.
";

/// Builds the engine prompt for one file.
///
/// Output depends only on the builder settings and its inputs, so identical
/// inputs always produce byte-identical prompts.
///
/// # Examples
///
/// ```
/// use kensa_core::{PromptVariant, RepoRef, ReviewContext};
/// use kensa_difflens::parser::parse_unified_diff;
/// use kensa_review::prompt::PromptBuilder;
///
/// let diff = "--- a/src/a.ts\n+++ b/src/a.ts\n@@ -9,0 +10,1 @@\n+console.log('x')\n";
/// let file = &parse_unified_diff(diff)[0];
/// let ctx = ReviewContext::new(RepoRef::new("o", "r"), 1, "Add logging", "");
///
/// let prompt = PromptBuilder::new(PromptVariant::Structured, "English").build(file, &ctx);
/// assert!(prompt.contains("10 +console.log('x')"));
/// assert!(prompt.contains("Pull request title: Add logging"));
/// ```
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    variant: PromptVariant,
    language: String,
}

impl PromptBuilder {
    pub fn new(variant: PromptVariant, language: impl Into<String>) -> Self {
        Self {
            variant,
            language: language.into(),
        }
    }

    pub fn variant(&self) -> PromptVariant {
        self.variant
    }

    /// Render the prompt for `file` within the pull request `ctx`.
    pub fn build(&self, file: &DiffFile, ctx: &ReviewContext) -> String {
        let path = file
            .review_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let mut prompt = String::new();
        match self.variant {
            PromptVariant::Structured => {
                prompt.push_str(&STRUCTURED_INSTRUCTIONS.replace("{language}", &self.language));
                let _ = write!(
                    prompt,
                    "\nReview the following code diff in the file \"{path}\" and take the \
                     pull request title and description into account when writing the response.\n\n\
                     Pull request title: {}\n\
                     Pull request description:\n\n---\n{}\n---\n",
                    or_none(&ctx.title),
                    or_none(&ctx.description),
                );
                prompt.push_str("\nGit diff to review:\n\n");
            }
            PromptVariant::Narrative => {
                prompt.push_str(&NARRATIVE_INSTRUCTIONS.replace("{language}", &self.language));
                let _ = writeln!(prompt, "\nFile: {path}\n");
            }
        }

        let _ = writeln!(prompt, "```diff\n{}\n```", render_chunks(file));

        prompt.push_str("\nProject document:\n");
        match ctx.docs.as_deref() {
            Some(docs) => {
                let _ = writeln!(prompt, "```markdown\n{}\n```", docs.trim_end());
            }
            None => {
                let _ = writeln!(prompt, "{NONE_MARKER}");
            }
        }

        prompt
    }
}

/// Build the prompt asking for a whole-run summary of `report`.
///
/// # Examples
///
/// ```
/// use kensa_review::prompt::build_summary_prompt;
/// use kensa_review::report::ReviewReport;
///
/// let prompt = build_summary_prompt(&ReviewReport::default(), "English");
/// assert!(prompt.contains("English"));
/// ```
pub fn build_summary_prompt(report: &ReviewReport, language: &str) -> String {
    let mut prompt = SUMMARY_INSTRUCTIONS.replace("{language}", language);
    prompt.push('\n');
    prompt.push_str(&report.body_markdown());
    prompt
}

/// Each chunk line as `<line_number> <content>`, chunks joined in order.
fn render_chunks(file: &DiffFile) -> String {
    file.chunks
        .iter()
        .map(|chunk| {
            chunk
                .changes
                .iter()
                .map(|l| format!("{} {}", l.line_number, l.content))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        NONE_MARKER
    } else {
        text
    }
}

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kensa_core::{
    FileReview, KensaConfig, KensaError, PromptVariant, RepoRef, ReviewConfig, ReviewContext,
};
use kensa_difflens::filter::DiffFilter;
use kensa_difflens::parser::parse_unified_diff;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::event::{Trigger, TriggerEvent};
use crate::github::SourceHost;
use crate::llm::{GenerationParams, ReviewEngine};
use crate::prompt::{build_summary_prompt, PromptBuilder, PROMPT_VERSION};
use crate::report::ReviewReport;
use crate::response::parse_response;
use crate::state::{RunState, RunTracker};

/// Prefix of a `review.docs` value that names a file in the repository.
pub const REPO_DOCS_PREFIX: &str = "repo:";

/// Statistics about a review run.
///
/// # Examples
///
/// ```
/// use kensa_review::pipeline::ReviewStats;
///
/// let stats = ReviewStats {
///     files_in_diff: 5,
///     files_skipped: 2,
///     files_reviewed: 3,
///     files_errored: 0,
///     files_undecodable: 1,
///     items: 4,
///     model_used: "gpt-4o-mini".into(),
/// };
/// assert_eq!(stats.files_in_diff - stats.files_skipped, stats.files_reviewed);
/// ```
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    /// Files named by the diff.
    pub files_in_diff: usize,
    /// Files dropped by the filter or with nothing to review.
    pub files_skipped: usize,
    /// Files the engine answered for.
    pub files_reviewed: usize,
    /// Files whose engine call failed or timed out.
    pub files_errored: usize,
    /// Files whose answer could not be decoded.
    pub files_undecodable: usize,
    /// Review items in the final report.
    pub items: usize,
    /// Model identifier used for the review.
    pub model_used: String,
}

/// Report and statistics of one review.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRunResult {
    pub report: ReviewReport,
    pub stats: ReviewStats,
}

impl ReviewRunResult {
    /// Pretty-printed JSON with camelCase keys.
    pub fn to_json(&self) -> kensa_core::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ReviewRunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Review Results")?;
        writeln!(f, "==============")?;
        writeln!(
            f,
            "Model: {} | Files: {} reviewed, {} skipped, {} errored | Items: {}\n",
            self.stats.model_used,
            self.stats.files_reviewed,
            self.stats.files_skipped,
            self.stats.files_errored,
            self.stats.items,
        )?;
        write!(f, "{}", self.report)
    }
}

/// How a CI run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The event action is not reviewed.
    NoOp { action: String },
    /// A review comment was posted.
    Published(ReviewRunResult),
    /// The run finished without anything to publish.
    Done(ReviewRunResult),
}

/// Result of one per-file sub-task.
#[derive(Debug)]
enum FileOutcome {
    Reviewed(FileReview),
    Undecodable,
    Errored(String),
}

/// Review orchestrator: acquires the diff, fans out one engine call per
/// file under a concurrency bound, and publishes the aggregated report.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use kensa_core::KensaConfig;
/// use kensa_review::github::GitHubClient;
/// use kensa_review::llm::LlmClient;
/// use kensa_review::pipeline::ReviewPipeline;
///
/// # fn demo(config: &KensaConfig) -> Result<(), kensa_core::KensaError> {
/// let engine = Arc::new(LlmClient::new(&config.llm)?);
/// let host = Arc::new(GitHubClient::new(&config.github)?);
/// let pipeline = ReviewPipeline::new(engine, config)?.with_host(host);
/// # Ok(())
/// # }
/// ```
pub struct ReviewPipeline {
    engine: Arc<dyn ReviewEngine>,
    host: Option<Arc<dyn SourceHost>>,
    filter: DiffFilter,
    prompts: Arc<PromptBuilder>,
    params: GenerationParams,
    review: ReviewConfig,
    call_timeout: Duration,
}

impl ReviewPipeline {
    /// Create a pipeline without a source host, enough for [`review_diff`].
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] if an exclusion pattern is invalid.
    ///
    /// [`review_diff`]: ReviewPipeline::review_diff
    pub fn new(engine: Arc<dyn ReviewEngine>, config: &KensaConfig) -> Result<Self, KensaError> {
        Ok(Self {
            engine,
            host: None,
            filter: DiffFilter::new(&config.review.exclude)?,
            prompts: Arc::new(PromptBuilder::new(
                config.review.variant,
                config.review.language.clone(),
            )),
            params: GenerationParams::from(&config.llm),
            review: config.review.clone(),
            call_timeout: Duration::from_secs(config.llm.timeout_secs),
        })
    }

    /// Attach the host needed by [`run`](ReviewPipeline::run).
    pub fn with_host(mut self, host: Arc<dyn SourceHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Override the per-call engine timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn variant(&self) -> PromptVariant {
        self.prompts.variant()
    }

    /// Handle one pull request event end to end.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Acquisition`] if the pull request or its diff
    /// cannot be fetched, [`KensaError::Publish`] if the comment cannot be
    /// posted, and [`KensaError::Config`] if no host is attached. Per-file
    /// engine failures never surface here.
    pub async fn run(&self, event: &TriggerEvent) -> Result<RunOutcome, KensaError> {
        let mut tracker = RunTracker::new();

        let trigger = event.trigger();
        if let Trigger::Unsupported(action) = &trigger {
            info!(%action, "event action is not reviewed, nothing to do");
            tracker.advance(RunState::Done);
            return Ok(RunOutcome::NoOp {
                action: action.clone(),
            });
        }

        let result = self.run_triggered(&mut tracker, event, trigger).await;
        if let Err(e) = &result {
            error!(error = %e, state = %tracker.state(), "review run failed");
            tracker.fail();
        }
        result
    }

    async fn run_triggered(
        &self,
        tracker: &mut RunTracker,
        event: &TriggerEvent,
        trigger: Trigger,
    ) -> Result<RunOutcome, KensaError> {
        let host = self
            .host
            .as_ref()
            .ok_or_else(|| KensaError::Config("no source host configured for CI runs".into()))?;

        let repo = event.repo();
        let number = event
            .pr_number()
            .ok_or_else(|| KensaError::Acquisition("event carries no pull request number".into()))?;
        info!(%repo, number, "reviewing pull request");

        let pr = host.get_pull_request(&repo, number).await?;
        let diff = match trigger {
            Trigger::Synchronize {
                before: Some(before),
                after: Some(after),
            } => host.compare_commits(&repo, &before, &after).await?,
            Trigger::Synchronize { .. } => {
                return Err(KensaError::Acquisition(
                    "synchronize event without before/after commits".into(),
                ))
            }
            _ => host.get_diff(&repo, number).await?,
        };
        tracker.advance(RunState::DiffAcquired);

        if diff.trim().is_empty() {
            info!("no diff found");
            tracker.advance(RunState::Done);
            return Ok(RunOutcome::Done(ReviewRunResult {
                stats: self.empty_stats(),
                ..ReviewRunResult::default()
            }));
        }

        let git_ref = [pr.head_sha.as_str(), pr.head_ref.as_str()]
            .into_iter()
            .find(|r| !r.is_empty())
            .or_else(|| event.head_ref())
            .map(str::to_string);
        let docs = self.load_docs(&repo, git_ref.as_deref()).await;
        let context = ReviewContext::new(repo.clone(), number, pr.title, pr.description).with_docs(docs);

        let result = self.review_parsed(tracker, &diff, context).await;

        if result.report.is_empty() {
            info!("no review comments, nothing to publish");
            tracker.advance(RunState::Done);
            return Ok(RunOutcome::Done(result));
        }

        let body = result.report.to_markdown(&self.review.report_title);
        debug!(%body, "publishing review comment");
        host.post_issue_comment(&repo, number, &body).await?;
        tracker.advance(RunState::Published);
        info!(
            files = result.report.sections.len(),
            items = result.stats.items,
            "review comment published"
        );

        if self.review.summarize {
            self.summarize(&result.report).await;
        }

        tracker.advance(RunState::Done);
        Ok(RunOutcome::Published(result))
    }

    /// Review a diff that is already at hand: parse, filter, review each file
    /// and aggregate.
    pub async fn review_diff(&self, diff_text: &str, context: ReviewContext) -> ReviewRunResult {
        let mut tracker = RunTracker::starting_at(RunState::DiffAcquired);
        self.review_parsed(&mut tracker, diff_text, context).await
    }

    async fn review_parsed(
        &self,
        tracker: &mut RunTracker,
        diff_text: &str,
        context: ReviewContext,
    ) -> ReviewRunResult {
        let files = parse_unified_diff(diff_text);
        tracker.advance(RunState::Parsed);
        let mut stats = self.empty_stats();
        stats.files_in_diff = files.len();

        let filtered = self.filter.filter(files);
        tracker.advance(RunState::Filtered);
        stats.files_skipped = filtered.skipped.len();
        info!(
            kept = filtered.kept.len(),
            skipped = filtered.skipped.len(),
            variant = %self.prompts.variant(),
            prompt_version = PROMPT_VERSION,
            "filtered diff"
        );

        tracker.advance(RunState::Reviewing);
        let context = Arc::new(context);
        let semaphore = Arc::new(Semaphore::new(self.review.max_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (index, file) in filtered.kept.into_iter().enumerate() {
            let Some(path) = file.review_path().map(PathBuf::from) else {
                continue;
            };
            if file.chunks.is_empty() {
                debug!(path = %path.display(), "no chunks to review");
                stats.files_skipped += 1;
                continue;
            }

            let engine = Arc::clone(&self.engine);
            let prompts = Arc::clone(&self.prompts);
            let context = Arc::clone(&context);
            let sem = Arc::clone(&semaphore);
            let params = self.params.clone();
            let call_timeout = self.call_timeout;

            // The prompt is only built once a permit is held.
            join_set.spawn(async move {
                let outcome = match sem.acquire_owned().await {
                    Ok(_permit) => {
                        let prompt = prompts.build(&file, &context);
                        drop(file);
                        debug!(path = %path.display(), %prompt, "built prompt");
                        review_file(
                            engine.as_ref(),
                            &prompt,
                            &params,
                            prompts.variant(),
                            call_timeout,
                            &path,
                        )
                        .await
                    }
                    Err(e) => FileOutcome::Errored(format!("semaphore closed: {e}")),
                };
                (index, path, outcome)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(error = %e, "review task panicked");
                    stats.files_errored += 1;
                }
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut reviews = Vec::with_capacity(results.len());
        for (_, path, outcome) in results {
            match outcome {
                FileOutcome::Reviewed(review) => {
                    stats.files_reviewed += 1;
                    reviews.push((path, review));
                }
                FileOutcome::Undecodable => {
                    stats.files_reviewed += 1;
                    stats.files_undecodable += 1;
                }
                FileOutcome::Errored(reason) => {
                    warn!(path = %path.display(), %reason, "file excluded from report");
                    stats.files_errored += 1;
                }
            }
        }

        let report = ReviewReport::aggregate(reviews);
        tracker.advance(RunState::Aggregated);
        stats.items = report.item_count();

        ReviewRunResult { report, stats }
    }

    /// Resolve `review.docs` to its text. Failures are logged and treated as
    /// no document.
    pub async fn load_docs(&self, repo: &RepoRef, git_ref: Option<&str>) -> Option<String> {
        let source = self.review.docs.as_deref()?.trim();
        if source.is_empty() {
            return None;
        }

        let loaded = match source.strip_prefix(REPO_DOCS_PREFIX) {
            Some(path) => match (&self.host, git_ref) {
                (Some(host), Some(git_ref)) => host.get_file_content(repo, path, git_ref).await,
                _ => Err(KensaError::Config(format!(
                    "cannot read '{source}' without a pull request head"
                ))),
            },
            None => tokio::fs::read_to_string(source)
                .await
                .map_err(KensaError::from),
        };

        match loaded {
            Ok(text) => {
                debug!(source, bytes = text.len(), "loaded supplementary document");
                Some(text)
            }
            Err(e) => {
                warn!(source, error = %e, "failed to load supplementary document, continuing without it");
                None
            }
        }
    }

    async fn summarize(&self, report: &ReviewReport) {
        let prompt = build_summary_prompt(report, &self.review.language);
        match tokio::time::timeout(self.call_timeout, self.engine.generate(&prompt, &self.params)).await {
            Ok(Ok(summary)) => info!(%summary, "run summary"),
            Ok(Err(e)) => warn!(error = %e, "summary generation failed"),
            Err(_) => warn!("summary generation timed out"),
        }
    }

    fn empty_stats(&self) -> ReviewStats {
        ReviewStats {
            model_used: self.params.model.clone(),
            ..ReviewStats::default()
        }
    }
}

async fn review_file(
    engine: &dyn ReviewEngine,
    prompt: &str,
    params: &GenerationParams,
    variant: PromptVariant,
    call_timeout: Duration,
    path: &std::path::Path,
) -> FileOutcome {
    let raw = match tokio::time::timeout(call_timeout, engine.generate(prompt, params)).await {
        Ok(Ok(raw)) => raw,
        Ok(Err(e)) => return FileOutcome::Errored(e.to_string()),
        Err(_) => {
            return FileOutcome::Errored(format!(
                "engine call timed out after {}s",
                call_timeout.as_secs_f32()
            ))
        }
    };

    match parse_response(&raw, variant) {
        Ok(review) => {
            debug!(path = %path.display(), items = review.len(), "file reviewed");
            FileOutcome::Reviewed(review)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, %raw, "discarding undecodable engine response");
            FileOutcome::Undecodable
        }
    }
}

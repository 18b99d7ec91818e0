use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kensa_core::{FileReview, KensaConfig, KensaError, LineRef, RepoRef};
use kensa_review::event::TriggerEvent;
use kensa_review::github::{PullRequestInfo, SourceHost};
use kensa_review::llm::{GenerationParams, ReviewEngine};
use kensa_review::pipeline::{ReviewPipeline, RunOutcome};

/// Order of engine calls and posted comments, shared between the fakes.
type Journal = Arc<Mutex<Vec<&'static str>>>;

const SUMMARY_PREFIX: &str = "Write an overall summary";

enum Reply {
    Text(&'static str),
    Fail,
    Hang,
}

/// Engine that answers by the file path embedded in the prompt.
#[derive(Default)]
struct FakeEngine {
    replies: HashMap<&'static str, Reply>,
    summary: Option<Reply>,
    journal: Journal,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeEngine {
    fn with(mut self, path: &'static str, reply: Reply) -> Self {
        self.replies.insert(path, reply);
        self
    }

    fn with_summary(mut self, reply: Reply, journal: &Journal) -> Self {
        self.summary = Some(reply);
        self.journal = Arc::clone(journal);
        self
    }
}

#[async_trait]
impl ReviewEngine for FakeEngine {
    async fn generate(&self, prompt: &str, _: &GenerationParams) -> Result<String, KensaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = if prompt.starts_with(SUMMARY_PREFIX) {
            self.journal.lock().unwrap().push("summary");
            self.summary.as_ref()
        } else {
            self.journal.lock().unwrap().push("review");
            self.replies
                .iter()
                .find(|(path, _)| prompt.contains(*path))
                .map(|(_, reply)| reply)
        };
        match reply {
            Some(Reply::Text(text)) => Ok(text.to_string()),
            Some(Reply::Fail) => Err(KensaError::Engine("quota exceeded".into())),
            Some(Reply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            None => Ok(r#"{"reviews":[]}"#.into()),
        }
    }
}

#[derive(Default)]
struct FakeHost {
    diff: String,
    fail_diff: bool,
    fail_post: bool,
    calls: AtomicUsize,
    compared: Mutex<Vec<(String, String)>>,
    posted: Mutex<Vec<String>>,
    journal: Journal,
}

impl FakeHost {
    fn with_diff(diff: &str) -> Self {
        Self {
            diff: diff.to_string(),
            ..Self::default()
        }
    }

    fn journaling(mut self, journal: &Journal) -> Self {
        self.journal = Arc::clone(journal);
        self
    }

    fn posted(&self) -> Vec<String> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn get_pull_request(
        &self,
        _: &RepoRef,
        _: u64,
    ) -> Result<PullRequestInfo, KensaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PullRequestInfo {
            title: "Add logging".into(),
            description: String::new(),
            head_ref: "feature/log".into(),
            head_sha: "bbb222".into(),
        })
    }

    async fn get_diff(&self, _: &RepoRef, _: u64) -> Result<String, KensaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_diff {
            return Err(KensaError::Acquisition("GitHub API error 404".into()));
        }
        Ok(self.diff.clone())
    }

    async fn compare_commits(
        &self,
        _: &RepoRef,
        base: &str,
        head: &str,
    ) -> Result<String, KensaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.compared
            .lock()
            .unwrap()
            .push((base.to_string(), head.to_string()));
        Ok(self.diff.clone())
    }

    async fn get_file_content(
        &self,
        _: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, KensaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("docs from {path}@{git_ref}"))
    }

    async fn post_issue_comment(
        &self,
        _: &RepoRef,
        _: u64,
        body: &str,
    ) -> Result<(), KensaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_post {
            return Err(KensaError::Publish("403 Forbidden".into()));
        }
        self.posted.lock().unwrap().push(body.to_string());
        self.journal.lock().unwrap().push("post");
        Ok(())
    }
}

fn file_diff(path: &str, line: u32, added: &str) -> String {
    format!(
        "diff --git a/{path} b/{path}\n\
         --- a/{path}\n\
         +++ b/{path}\n\
         @@ -{prev},1 +{prev},2 @@\n \
         const a = 1;\n\
         +{added}\n",
        prev = line - 1,
    )
}

fn event(action: &str) -> TriggerEvent {
    TriggerEvent::from_json(&format!(
        r#"{{
            "action": "{action}",
            "before": "aaa111",
            "after": "bbb222",
            "number": 7,
            "pull_request": {{"number": 7, "head": {{"ref": "feature/log", "sha": "bbb222"}}}},
            "repository": {{"name": "web", "owner": {{"login": "acme"}}}}
        }}"#
    ))
    .unwrap()
}

fn build(
    engine: Arc<FakeEngine>,
    host: Arc<FakeHost>,
    config: &KensaConfig,
) -> ReviewPipeline {
    ReviewPipeline::new(engine, config).unwrap().with_host(host)
}

const CONSOLE_LOG_REVIEW: &str = r#"{"reviews":[{"lineNumber":"10","reviewTitle":"[Warning] Debug output","reviewComment":"Remove the console.log call.","improveDiff":"-console.log('x')"}]}"#;

#[tokio::test]
async fn structured_review_is_published_with_line_reference() {
    let engine = Arc::new(FakeEngine::default().with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW)));
    let host = Arc::new(FakeHost::with_diff(&file_diff("src/a.ts", 10, "console.log('x')")));

    let outcome = build(engine.clone(), host.clone(), &KensaConfig::default())
        .run(&event("opened"))
        .await
        .unwrap();

    let RunOutcome::Published(result) = outcome else {
        panic!("expected a published review");
    };
    assert_eq!(result.report.sections.len(), 1);
    assert_eq!(result.report.sections[0].path.to_str(), Some("src/a.ts"));
    match &result.report.sections[0].review {
        FileReview::Items(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].line, LineRef::Line(10));
        }
        other => panic!("unexpected review: {other:?}"),
    }

    let posted = host.posted();
    assert_eq!(posted.len(), 1);
    assert!(posted[0].starts_with("# AI Reviewer\n"));
    assert!(posted[0].contains("### [Warning] Debug output(src/a.ts:10)"));
    assert!(posted[0].contains("```diff\n-console.log('x')\n```"));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn excluded_files_never_reach_the_engine() {
    let diff = format!(
        "{}{}",
        file_diff("README.md", 3, "More docs"),
        file_diff("src/a.ts", 10, "console.log('x')")
    );
    let engine = Arc::new(FakeEngine::default().with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW)));
    let host = Arc::new(FakeHost::with_diff(&diff));
    let mut config = KensaConfig::default();
    config.review.exclude = vec!["*.md".into()];

    let outcome = build(engine.clone(), host, &config)
        .run(&event("opened"))
        .await
        .unwrap();

    let RunOutcome::Published(result) = outcome else {
        panic!("expected a published review");
    };
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.stats.files_in_diff, 2);
    assert_eq!(result.stats.files_skipped, 1);
    let paths: Vec<_> = result
        .report
        .sections
        .iter()
        .map(|s| s.path.display().to_string())
        .collect();
    assert_eq!(paths, vec!["src/a.ts"]);
}

#[tokio::test]
async fn undecodable_file_is_omitted_from_published_report() {
    let diff = format!(
        "{}{}",
        file_diff("src/broken.ts", 5, "let x"),
        file_diff("src/a.ts", 10, "console.log('x')")
    );
    let engine = Arc::new(
        FakeEngine::default()
            .with("src/broken.ts", Reply::Text("not json"))
            .with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW)),
    );
    let host = Arc::new(FakeHost::with_diff(&diff));

    let outcome = build(engine, host.clone(), &KensaConfig::default())
        .run(&event("opened"))
        .await
        .unwrap();

    let RunOutcome::Published(result) = outcome else {
        panic!("expected a published review");
    };
    assert_eq!(result.stats.files_undecodable, 1);
    assert_eq!(result.report.sections.len(), 1);
    let posted = host.posted();
    assert!(posted[0].contains("src/a.ts"));
    assert!(!posted[0].contains("src/broken.ts"));
}

#[tokio::test]
async fn closed_event_touches_neither_engine_nor_host() {
    let engine = Arc::new(FakeEngine::default());
    let host = Arc::new(FakeHost::with_diff(&file_diff("src/a.ts", 10, "x")));

    let outcome = build(engine.clone(), host.clone(), &KensaConfig::default())
        .run(&event("closed"))
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::NoOp { ref action } if action == "closed"));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert_eq!(host.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn noop_needs_no_host() {
    let engine = Arc::new(FakeEngine::default());
    let pipeline = ReviewPipeline::new(engine, &KensaConfig::default()).unwrap();
    let outcome = pipeline.run(&event("labeled")).await.unwrap();
    assert!(matches!(outcome, RunOutcome::NoOp { .. }));
}

#[tokio::test]
async fn synchronize_reviews_only_the_pushed_range() {
    let engine = Arc::new(FakeEngine::default().with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW)));
    let host = Arc::new(FakeHost::with_diff(&file_diff("src/a.ts", 10, "console.log('x')")));

    build(engine, host.clone(), &KensaConfig::default())
        .run(&event("synchronize"))
        .await
        .unwrap();

    let compared = host.compared.lock().unwrap().clone();
    assert_eq!(compared, vec![("aaa111".to_string(), "bbb222".to_string())]);
}

#[tokio::test]
async fn synchronize_without_range_is_acquisition_error() {
    let engine = Arc::new(FakeEngine::default());
    let host = Arc::new(FakeHost::with_diff("unused"));
    let event = TriggerEvent::from_json(
        r#"{"action":"synchronize","number":7,"repository":{"name":"web","owner":{"login":"acme"}}}"#,
    )
    .unwrap();

    let err = build(engine.clone(), host, &KensaConfig::default())
        .run(&event)
        .await
        .unwrap_err();
    assert!(matches!(err, KensaError::Acquisition(_)));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn diff_failure_starts_no_per_file_work() {
    let engine = Arc::new(FakeEngine::default());
    let host = Arc::new(FakeHost {
        fail_diff: true,
        ..FakeHost::default()
    });

    let err = build(engine.clone(), host.clone(), &KensaConfig::default())
        .run(&event("opened"))
        .await
        .unwrap_err();
    assert!(matches!(err, KensaError::Acquisition(_)));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert!(host.posted().is_empty());
}

#[tokio::test]
async fn empty_diff_finishes_without_publishing() {
    let engine = Arc::new(FakeEngine::default());
    let host = Arc::new(FakeHost::with_diff("\n"));

    let outcome = build(engine.clone(), host.clone(), &KensaConfig::default())
        .run(&event("opened"))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Done(_)));
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    assert!(host.posted().is_empty());
}

#[tokio::test]
async fn nothing_to_say_publishes_nothing() {
    let engine = Arc::new(FakeEngine::default());
    let host = Arc::new(FakeHost::with_diff(&file_diff("src/a.ts", 10, "x")));

    let outcome = build(engine, host.clone(), &KensaConfig::default())
        .run(&event("opened"))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Done(_)));
    assert!(host.posted().is_empty());
}

#[tokio::test]
async fn engine_failure_and_timeout_only_drop_their_file() {
    let diff = format!(
        "{}{}{}",
        file_diff("src/fail.ts", 2, "a"),
        file_diff("src/hang.ts", 2, "b"),
        file_diff("src/a.ts", 10, "console.log('x')")
    );
    let engine = Arc::new(
        FakeEngine::default()
            .with("src/fail.ts", Reply::Fail)
            .with("src/hang.ts", Reply::Hang)
            .with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW)),
    );
    let host = Arc::new(FakeHost::with_diff(&diff));

    let outcome = build(engine, host.clone(), &KensaConfig::default())
        .with_call_timeout(Duration::from_millis(200))
        .run(&event("opened"))
        .await
        .unwrap();

    let RunOutcome::Published(result) = outcome else {
        panic!("expected a published review");
    };
    assert_eq!(result.stats.files_errored, 2);
    assert_eq!(result.report.sections.len(), 1);
    assert_eq!(host.posted().len(), 1);
}

#[tokio::test]
async fn publish_failure_is_fatal() {
    let engine = Arc::new(FakeEngine::default().with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW)));
    let host = Arc::new(FakeHost {
        diff: file_diff("src/a.ts", 10, "console.log('x')"),
        fail_post: true,
        ..FakeHost::default()
    });

    let err = build(engine, host, &KensaConfig::default())
        .run(&event("opened"))
        .await
        .unwrap_err();
    assert!(matches!(err, KensaError::Publish(_)));
}

#[tokio::test]
async fn concurrency_is_bounded_and_order_is_stable() {
    let paths = ["src/f0.ts", "src/f1.ts", "src/f2.ts", "src/f3.ts", "src/f4.ts", "src/f5.ts"];
    let diff: String = paths.iter().map(|p| file_diff(p, 2, "x")).collect();
    let mut engine = FakeEngine {
        delay: Duration::from_millis(30),
        ..FakeEngine::default()
    };
    for path in paths {
        engine = engine.with(path, Reply::Text("Looks risky."));
    }
    let engine = Arc::new(engine);
    let host = Arc::new(FakeHost::with_diff(&diff));
    let mut config = KensaConfig::default();
    config.review.max_concurrency = 2;
    config.review.variant = kensa_core::PromptVariant::Narrative;

    let outcome = build(engine.clone(), host, &config)
        .run(&event("opened"))
        .await
        .unwrap();

    let RunOutcome::Published(result) = outcome else {
        panic!("expected a published review");
    };
    assert!(engine.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(engine.calls.load(Ordering::SeqCst), paths.len());
    let order: Vec<_> = result
        .report
        .sections
        .iter()
        .map(|s| s.path.display().to_string())
        .collect();
    assert_eq!(order, paths);
}

#[tokio::test]
async fn repo_docs_are_fetched_from_head() {
    let engine = Arc::new(FakeEngine::default());
    let host = Arc::new(FakeHost::default());
    let mut config = KensaConfig::default();
    config.review.docs = Some("repo:docs/review.md".into());

    let pipeline = build(engine, host, &config);
    let docs = pipeline
        .load_docs(&RepoRef::new("acme", "web"), Some("bbb222"))
        .await;
    assert_eq!(docs.as_deref(), Some("docs from docs/review.md@bbb222"));
}

fn summarizing() -> KensaConfig {
    let mut config = KensaConfig::default();
    config.review.summarize = true;
    config
}

#[tokio::test]
async fn summary_is_requested_after_publishing() {
    let journal = Journal::default();
    let engine = Arc::new(
        FakeEngine::default()
            .with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW))
            .with_summary(Reply::Text("One warning about debug output."), &journal),
    );
    let host = Arc::new(
        FakeHost::with_diff(&file_diff("src/a.ts", 10, "console.log('x')")).journaling(&journal),
    );

    let outcome = build(engine.clone(), host, &summarizing())
        .run(&event("opened"))
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Published(_)));
    assert_eq!(*journal.lock().unwrap(), vec!["review", "post", "summary"]);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn no_summary_when_nothing_is_published() {
    let journal = Journal::default();
    let engine = Arc::new(
        FakeEngine::default().with_summary(Reply::Text("unused"), &journal),
    );
    let host = Arc::new(
        FakeHost::with_diff(&file_diff("src/a.ts", 10, "let y = 2;")).journaling(&journal),
    );

    let outcome = build(engine, host.clone(), &summarizing())
        .run(&event("opened"))
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Done(_)));
    assert_eq!(*journal.lock().unwrap(), vec!["review"]);
    assert!(host.posted().is_empty());
}

#[tokio::test]
async fn failing_or_hanging_summary_keeps_the_published_outcome() {
    for summary in [Reply::Fail, Reply::Hang] {
        let journal = Journal::default();
        let engine = Arc::new(
            FakeEngine::default()
                .with("src/a.ts", Reply::Text(CONSOLE_LOG_REVIEW))
                .with_summary(summary, &journal),
        );
        let host = Arc::new(
            FakeHost::with_diff(&file_diff("src/a.ts", 10, "console.log('x')"))
                .journaling(&journal),
        );

        let outcome = build(engine, host.clone(), &summarizing())
            .with_call_timeout(Duration::from_millis(200))
            .run(&event("opened"))
            .await
            .unwrap();

        assert!(matches!(outcome, RunOutcome::Published(_)));
        assert_eq!(host.posted().len(), 1);
        assert_eq!(*journal.lock().unwrap(), vec!["review", "post", "summary"]);
    }
}

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use kensa_core::{KensaConfig, OutputFormat, PromptVariant, RepoRef, ReviewContext};
use kensa_review::event::TriggerEvent;
use kensa_review::github::GitHubClient;
use kensa_review::llm::LlmClient;
use kensa_review::pipeline::{ReviewPipeline, ReviewRunResult, RunOutcome};
use miette::{Context, IntoDiagnostic, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".kensa.toml";

#[derive(Parser)]
#[command(
    name = "kensa",
    version,
    about = "First-pass AI review comments for pull requests",
    long_about = "kensa sends each changed file of a pull request to a text-generation engine\n\
                   and posts the collected review as one comment on the pull request.\n\n\
                   Examples:\n  \
                     kensa run                         Review the PR in GITHUB_EVENT_PATH (CI)\n  \
                     git diff main | kensa review      Review a local diff from stdin\n  \
                     kensa review --file pr.diff       Review a diff file\n  \
                     kensa init                        Write a .kensa.toml template"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .kensa.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summary (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  The comment body as it would be published"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Review the pull request described by a GitHub event
    #[command(long_about = "Review the pull request described by a GitHub event.\n\n\
        Reads the event payload from --event or GITHUB_EVENT_PATH. Only the `opened`\n\
        and `synchronize` actions are reviewed; anything else exits successfully\n\
        without doing any work.\n\n\
        Requires GITHUB_TOKEN and OPENAI_API_KEY (or the matching INPUT_* variables).")]
    Run {
        /// Path to the event payload (default: $GITHUB_EVENT_PATH)
        #[arg(long)]
        event: Option<PathBuf>,
    },
    /// Review a unified diff locally and print the report
    #[command(long_about = "Review a unified diff locally and print the report.\n\n\
        Reads from stdin or a file. Nothing is posted anywhere.\n\n\
        Examples:\n  git diff main | kensa review\n  kensa review --file changes.diff --exclude '*.lock'")]
    Review {
        /// Read diff from file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,

        /// Pull request title to give the engine as context
        #[arg(long)]
        title: Option<String>,

        /// Pull request description to give the engine as context
        #[arg(long)]
        description: Option<String>,

        /// Additional glob pattern of paths to skip (repeatable)
        #[arg(long)]
        exclude: Vec<String>,

        /// Prompt variant: structured or narrative
        #[arg(long)]
        variant: Option<PromptVariant>,
    },
    /// Create a default .kensa.toml configuration file
    #[command(long_about = "Create a default .kensa.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .kensa.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

const DEFAULT_CONFIG: &str = r#"# kensa configuration
# Environment variables (and GitHub Action INPUT_* variables) override these values.

[llm]
# model = "gpt-4o-mini"
# api_key = "sk-..."            # prefer OPENAI_API_KEY
# base_url = "https://api.openai.com"
# temperature = 0.2
# max_tokens = 700
# top_p = 1.0
# frequency_penalty = 0.0
# presence_penalty = 0.0
# timeout_secs = 120

[review]
# exclude = ["*.lock", "dist/**"]
# docs = "docs/REVIEW.md"       # or "repo:docs/REVIEW.md" to read it from the PR head
# variant = "structured"        # or "narrative"
# language = "English"
# max_concurrency = 4
# report_title = "AI Reviewer"
# summarize = false

[github]
# api_url = "https://api.github.com"
"#;

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,kensa=debug,kensa_core=debug,kensa_difflens=debug,kensa_review=debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<KensaConfig> {
    let mut config = match path {
        Some(path) => KensaConfig::from_file(path)
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                KensaConfig::from_file(default_path).wrap_err(format!("loading {CONFIG_FILE}"))?
            } else {
                KensaConfig::default()
            }
        }
    };
    config.apply_process_env()?;
    Ok(config)
}

fn read_diff_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err(format!("reading {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .into_diagnostic()
                .wrap_err("reading stdin")?;
            Ok(input)
        }
    }
}

fn print_result(result: &ReviewRunResult, format: OutputFormat, title: &str) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", result.to_json()?);
        }
        OutputFormat::Markdown => {
            if !result.report.is_empty() {
                print!("{}", result.report.to_markdown(title));
            }
        }
        OutputFormat::Text => print!("{result}"),
    }
    Ok(())
}

async fn run_event(cli: &Cli, event_path: Option<&Path>) -> Result<()> {
    let path = event_path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("GITHUB_EVENT_PATH").map(PathBuf::from))
        .ok_or_else(|| miette::miette!("no event payload: pass --event or set GITHUB_EVENT_PATH"))?;
    let event = TriggerEvent::from_file(&path)?;

    let config = load_config(cli.config.as_deref())?;
    let engine = Arc::new(LlmClient::new(&config.llm)?);
    let mut pipeline = ReviewPipeline::new(engine, &config)?;

    // Unsupported actions finish without credentials.
    match event.trigger().ensure_supported() {
        Ok(()) => {
            config.validate_for_run()?;
            pipeline = pipeline.with_host(Arc::new(GitHubClient::new(&config.github)?));
        }
        Err(reason) => info!(%reason, "skipping credential checks"),
    }

    match pipeline.run(&event).await? {
        RunOutcome::NoOp { action } => info!(%action, "nothing to review"),
        RunOutcome::Published(result) | RunOutcome::Done(result) => {
            print_result(&result, cli.format, &config.review.report_title)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Run { event } => run_event(&cli, event.as_deref()).await?,
        Command::Review {
            file,
            title,
            description,
            exclude,
            variant,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            config.review.exclude.extend(exclude.iter().cloned());
            if let Some(variant) = variant {
                config.review.variant = *variant;
            }
            config.validate_engine()?;

            let input = read_diff_input(file.as_deref())?;
            let engine = Arc::new(LlmClient::new(&config.llm)?);
            let pipeline = ReviewPipeline::new(engine, &config)?;

            let repo = RepoRef::default();
            let docs = pipeline.load_docs(&repo, None).await;
            let context = ReviewContext::new(
                repo,
                0,
                title.clone().unwrap_or_default(),
                description.clone().unwrap_or_default(),
            )
            .with_docs(docs);

            let result = pipeline.review_diff(&input, context).await;
            print_result(&result, cli.format, &config.review.report_title)?;
        }
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "kensa", &mut std::io::stdout());
        }
    }

    Ok(())
}

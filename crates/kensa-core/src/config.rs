use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::KensaError;
use crate::types::PromptVariant;

/// Top-level configuration loaded from `.kensa.toml`.
///
/// Resolution order: CLI flags > environment (including GitHub Action
/// `INPUT_*` variables) > config file > defaults. The resolved value is built
/// once at start-up and passed by reference to the pipeline.
///
/// # Examples
///
/// ```
/// use kensa_core::KensaConfig;
///
/// let config = KensaConfig::default();
/// assert_eq!(config.review.max_concurrency, 4);
/// assert_eq!(config.llm.max_tokens, 700);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KensaConfig {
    /// Text-generation engine settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Source-control host settings.
    #[serde(default)]
    pub github: GitHubConfig,
}

impl KensaConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Io`] if the file cannot be read, or
    /// [`KensaError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, KensaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use kensa_core::KensaConfig;
    ///
    /// let toml = r#"
    /// [review]
    /// exclude = ["*.md"]
    /// "#;
    /// let config = KensaConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.review.exclude, vec!["*.md"]);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, KensaError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] if a variable holds an invalid value.
    pub fn apply_process_env(&mut self) -> Result<(), KensaError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an environment lookup.
    ///
    /// GitHub Actions exposes workflow inputs as `INPUT_<NAME>` and passes
    /// unset inputs as empty strings, so blank values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] if a variable holds an invalid value.
    ///
    /// # Examples
    ///
    /// ```
    /// use kensa_core::KensaConfig;
    ///
    /// let mut config = KensaConfig::default();
    /// config
    ///     .apply_env(|key| match key {
    ///         "INPUT_EXCLUDE" => Some("*.md, dist/**".to_string()),
    ///         _ => None,
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.review.exclude, vec!["*.md", "dist/**"]);
    /// ```
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), KensaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(*k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        if let Some(token) = get(&["INPUT_GITHUB_TOKEN", "GITHUB_TOKEN"]) {
            self.github.token = Some(token);
        }
        if let Some(url) = get(&["GITHUB_API_URL"]) {
            self.github.api_url = Some(url);
        }
        if let Some(key) = get(&["INPUT_OPENAI_API_KEY", "OPENAI_API_KEY"]) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = get(&["INPUT_OPENAI_API_MODEL", "OPENAI_API_MODEL"]) {
            self.llm.model = model;
        }
        if let Some(url) = get(&["OPENAI_BASE_URL"]) {
            self.llm.base_url = Some(url);
        }
        if let Some(exclude) = get(&["INPUT_EXCLUDE"]) {
            self.review.exclude = parse_exclude_list(&exclude);
        }
        if let Some(docs) = get(&["INPUT_DOCS_MD"]) {
            self.review.docs = Some(docs);
        }
        if let Some(variant) = get(&["INPUT_PROMPT_VARIANT"]) {
            self.review.variant = variant.parse().map_err(KensaError::Config)?;
        }
        if let Some(language) = get(&["INPUT_LANGUAGE"]) {
            self.review.language = language;
        }
        Ok(())
    }

    /// Check that everything a CI run needs is present.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] when the GitHub token is missing, or
    /// when no engine API key is set and no custom endpoint is configured.
    pub fn validate_for_run(&self) -> Result<(), KensaError> {
        self.validate_engine()?;
        if self.github.token.is_none() {
            return Err(KensaError::Config(
                "GitHub token not set. Provide the GITHUB_TOKEN input or set GITHUB_TOKEN".into(),
            ));
        }
        Ok(())
    }

    /// Check that the engine can be called.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Config`] when neither an API key nor a custom
    /// endpoint is configured.
    pub fn validate_engine(&self) -> Result<(), KensaError> {
        if self.llm.api_key.is_none() && self.llm.base_url.is_none() {
            return Err(KensaError::Config(
                "engine API key not set. Provide the OPENAI_API_KEY input or set OPENAI_API_KEY"
                    .into(),
            ));
        }
        if self.review.max_concurrency == 0 {
            return Err(KensaError::Config(
                "review.max_concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated exclusion list, dropping blank entries.
///
/// # Examples
///
/// ```
/// use kensa_core::parse_exclude_list;
///
/// assert_eq!(parse_exclude_list(" *.md ,, dist/** "), vec!["*.md", "dist/**"]);
/// assert!(parse_exclude_list("").is_empty());
/// ```
pub fn parse_exclude_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Text-generation engine configuration.
///
/// Sampling defaults favour short, conservative reviews.
///
/// # Examples
///
/// ```
/// use kensa_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "gpt-4o-mini");
/// assert_eq!(config.temperature, 0.2);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Custom base URL for an OpenAI-compatible endpoint.
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub frequency_penalty: f32,
    #[serde(default)]
    pub presence_penalty: f32,
    /// Per-call timeout in seconds (default: 120).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    700
}

fn default_top_p() -> f32 {
    1.0
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use kensa_core::{PromptVariant, ReviewConfig};
///
/// let config = ReviewConfig::default();
/// assert_eq!(config.variant, PromptVariant::Structured);
/// assert_eq!(config.language, "English");
/// assert_eq!(config.report_title, "AI Reviewer");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Glob patterns of destination paths to leave unreviewed.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Supplementary document: a local path, or `repo:<path>` to read it
    /// from the pull request's head commit.
    pub docs: Option<String>,
    /// Prompt and response shape.
    #[serde(default)]
    pub variant: PromptVariant,
    /// Language the engine should write in.
    #[serde(default = "default_language")]
    pub language: String,
    /// Maximum number of concurrent engine calls (default: 4).
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Heading of the published comment.
    #[serde(default = "default_report_title")]
    pub report_title: String,
    /// Ask the engine for a whole-run summary after publishing.
    #[serde(default)]
    pub summarize: bool,
}

fn default_language() -> String {
    "English".into()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_report_title() -> String {
    "AI Reviewer".into()
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            docs: None,
            variant: PromptVariant::default(),
            language: default_language(),
            max_concurrency: default_max_concurrency(),
            report_title: default_report_title(),
            summarize: false,
        }
    }
}

/// GitHub connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Token used for API calls.
    pub token: Option<String>,
    /// API base URL, for GitHub Enterprise Server.
    pub api_url: Option<String>,
}

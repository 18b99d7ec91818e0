/// Errors that can occur across kensa.
///
/// Library crates return this type directly; the binary reports it through
/// `miette` at the process boundary. Only [`KensaError::Config`],
/// [`KensaError::Acquisition`] and [`KensaError::Publish`] end a run; the
/// per-file variants are recovered inside the review pipeline.
///
/// # Examples
///
/// ```
/// use kensa_core::KensaError;
///
/// let err = KensaError::Config("missing API key".into());
/// assert!(err.to_string().contains("missing API key"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum KensaError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    #[diagnostic(code(kensa::config))]
    Config(String),

    /// Pull request metadata or diff could not be fetched.
    #[error("acquisition error: {0}")]
    #[diagnostic(code(kensa::acquisition))]
    Acquisition(String),

    /// The trigger event is not one kensa acts on.
    #[error("unsupported trigger: {0}")]
    UnsupportedTrigger(String),

    /// The text-generation engine call failed or timed out.
    #[error("engine error: {0}")]
    Engine(String),

    /// The engine answered, but the answer could not be decoded.
    #[error("response decode error: {0}")]
    Decode(String),

    /// The report was produced but could not be delivered.
    #[error("publish error: {0}")]
    #[diagnostic(code(kensa::publish))]
    Publish(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

//! The GitHub `pull_request` event that starts a CI run.

use std::path::Path;

use kensa_core::{KensaError, RepoRef};
use serde::Deserialize;

/// Subset of the webhook payload GitHub writes to `GITHUB_EVENT_PATH`.
///
/// # Examples
///
/// ```
/// use kensa_review::event::{Trigger, TriggerEvent};
///
/// let event = TriggerEvent::from_json(r#"{
///     "action": "opened",
///     "number": 12,
///     "repository": {"name": "web", "owner": {"login": "acme"}}
/// }"#).unwrap();
/// assert_eq!(event.trigger(), Trigger::Opened);
/// assert_eq!(event.repo().to_string(), "acme/web");
/// assert_eq!(event.pr_number(), Some(12));
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerEvent {
    pub action: String,
    #[serde(default)]
    pub before: Option<String>,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub number: Option<u64>,
    #[serde(default)]
    pub pull_request: Option<EventPullRequest>,
    pub repository: EventRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPullRequest {
    pub number: u64,
    pub head: EventHead,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventHead {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub name: String,
    pub owner: EventOwner,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventOwner {
    pub login: String,
}

/// What the event asks kensa to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// A pull request was opened: review its whole diff.
    Opened,
    /// New commits were pushed: review only `before..after`.
    Synchronize {
        before: Option<String>,
        after: Option<String>,
    },
    /// Any other action; nothing to do.
    Unsupported(String),
}

impl Trigger {
    /// # Errors
    ///
    /// Returns [`KensaError::UnsupportedTrigger`] for actions that are not
    /// reviewed.
    pub fn ensure_supported(&self) -> Result<(), KensaError> {
        match self {
            Trigger::Unsupported(action) => Err(KensaError::UnsupportedTrigger(action.clone())),
            _ => Ok(()),
        }
    }
}

impl TriggerEvent {
    /// Read and decode an event file.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Acquisition`] if the file cannot be read or
    /// decoded.
    pub fn from_file(path: &Path) -> Result<Self, KensaError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KensaError::Acquisition(format!(
                "failed to read event file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&content)
    }

    /// Decode an event payload.
    ///
    /// # Errors
    ///
    /// Returns [`KensaError::Acquisition`] if the payload is not a pull
    /// request event.
    pub fn from_json(content: &str) -> Result<Self, KensaError> {
        serde_json::from_str(content)
            .map_err(|e| KensaError::Acquisition(format!("invalid event payload: {e}")))
    }

    pub fn trigger(&self) -> Trigger {
        match self.action.as_str() {
            "opened" => Trigger::Opened,
            "synchronize" => Trigger::Synchronize {
                before: self.before.clone(),
                after: self.after.clone(),
            },
            other => Trigger::Unsupported(other.to_string()),
        }
    }

    pub fn repo(&self) -> RepoRef {
        RepoRef::new(&self.repository.owner.login, &self.repository.name)
    }

    /// Pull request number, from the top-level field or the embedded PR.
    pub fn pr_number(&self) -> Option<u64> {
        self.number
            .or_else(|| self.pull_request.as_ref().map(|pr| pr.number))
    }

    /// Head branch of the pull request, when the payload carries it.
    pub fn head_ref(&self) -> Option<&str> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.head.ref_name.as_str())
    }
}

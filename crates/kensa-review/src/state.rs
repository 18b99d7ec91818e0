use std::fmt;

use serde::Serialize;
use tracing::debug;

/// Phase of a review run.
///
/// ```text
/// Idle -> DiffAcquired -> Parsed -> Filtered -> Reviewing -> Aggregated -> Published -> Done
/// ```
///
/// A run may also end early in `Done` (unsupported trigger, empty diff,
/// nothing to publish) or in `Failed` from any non-terminal state.
///
/// # Examples
///
/// ```
/// use kensa_review::state::RunState;
///
/// assert!(RunState::Idle.can_transition_to(RunState::DiffAcquired));
/// assert!(RunState::Reviewing.can_transition_to(RunState::Failed));
/// assert!(!RunState::Done.can_transition_to(RunState::Idle));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    DiffAcquired,
    Parsed,
    Filtered,
    Reviewing,
    Aggregated,
    Published,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Whether `next` is an allowed successor of `self`.
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Idle, DiffAcquired)
                | (Idle, Done)
                | (DiffAcquired, Parsed)
                | (DiffAcquired, Done)
                | (Parsed, Filtered)
                | (Filtered, Reviewing)
                | (Reviewing, Aggregated)
                | (Aggregated, Published)
                | (Aggregated, Done)
                | (Published, Done)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::DiffAcquired => "diff-acquired",
            RunState::Parsed => "parsed",
            RunState::Filtered => "filtered",
            RunState::Reviewing => "reviewing",
            RunState::Aggregated => "aggregated",
            RunState::Published => "published",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks the current [`RunState`] of one run and logs every transition.
#[derive(Debug)]
pub struct RunTracker {
    state: RunState,
}

impl RunTracker {
    pub fn new() -> Self {
        Self::starting_at(RunState::Idle)
    }

    /// Start from a later state, e.g. when the diff is supplied directly.
    pub fn starting_at(state: RunState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Move to `next`. Illegal edges are a bug in the caller.
    pub fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal run transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "run state");
        self.state = next;
    }

    /// Move to `Failed` unless the run already ended.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(RunState::Failed);
        }
    }
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

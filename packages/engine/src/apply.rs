use serde::{Deserialize, Serialize};
use tandem_markup::Span;
use tracing::debug;

use crate::error::FragmentError;

/// Attempt bound for version-checked writes that lost a race.
pub const MAX_ATTEMPTS: u32 = 3;

/// One atomic replacement against the document text. An insertion is an
/// empty range; a deletion is empty text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Span,
    pub text: String,
}

impl TextEdit {
    pub fn replace(range: Span, text: impl Into<String>) -> Self {
        Self {
            range,
            text: text.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(Span::new(offset, offset), text)
    }

    pub fn delete(range: Span) -> Self {
        Self::replace(range, "")
    }

    pub fn is_noop_on(&self, text: &str) -> bool {
        text.get(self.range.start..self.range.end) == Some(self.text.as_str())
    }
}

/// Apply non-overlapping edits to a string, back to front so earlier ranges
/// stay valid while later ones are spliced.
pub fn splice(text: &str, edits: &[TextEdit]) -> String {
    let mut sorted: Vec<&TextEdit> = edits.iter().collect();
    sorted.sort_by(|a, b| b.range.start.cmp(&a.range.start));
    let mut out = text.to_string();
    for edit in sorted {
        let start = edit.range.start.min(out.len());
        let end = edit.range.end.min(out.len());
        out.replace_range(start..end, &edit.text);
    }
    out
}

/// Why an edit was dropped instead of applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The locator found no element for the descriptor.
    TargetMissing,
    /// The sliced fragment failed to parse or rejected the operations.
    FragmentInvalid(FragmentError),
    /// The write was stale but the document version never advanced, so the
    /// failure is not explained by a race.
    StaleNoProgress,
    /// Three stale attempts in a row.
    RetriesExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyState {
    /// Reading the document and resolving the target against a fresh snapshot.
    Resolving,
    /// Fragment rewritten, atomic replacement in flight.
    Applying,
    /// Stale write with an advanced version; waiting to re-resolve.
    Retrying,
    Applied { version: u64 },
    Dropped(DropReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyEvent {
    Resolved,
    ResolutionFailed,
    FragmentRejected(FragmentError),
    ApplyOk { version: u64 },
    ApplyStale { version_advanced: bool },
    RetryBegun,
}

/// The per-edit lifecycle, pure and synchronous. The async driver reads the
/// document, resolves, and writes; this machine only decides what happens
/// next, which keeps every transition unit-testable without timing.
#[derive(Debug)]
pub struct ApplyMachine {
    state: ApplyState,
    attempt: u32,
}

impl ApplyMachine {
    pub fn new() -> Self {
        Self {
            state: ApplyState::Resolving,
            attempt: 1,
        }
    }

    pub fn state(&self) -> &ApplyState {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ApplyState::Applied { .. } | ApplyState::Dropped(_)
        )
    }

    /// Terminal result, once reached.
    pub fn outcome(&self) -> Option<EditOutcome> {
        match &self.state {
            ApplyState::Applied { version } => Some(EditOutcome::Applied { version: *version }),
            ApplyState::Dropped(reason) => Some(EditOutcome::Dropped(reason.clone())),
            _ => None,
        }
    }

    pub fn advance(&mut self, event: ApplyEvent) -> &ApplyState {
        let next = match (&self.state, event) {
            (ApplyState::Resolving, ApplyEvent::Resolved) => Some(ApplyState::Applying),
            (ApplyState::Resolving, ApplyEvent::ResolutionFailed) => {
                Some(ApplyState::Dropped(DropReason::TargetMissing))
            }
            (ApplyState::Resolving, ApplyEvent::FragmentRejected(err)) => {
                Some(ApplyState::Dropped(DropReason::FragmentInvalid(err)))
            }
            (ApplyState::Applying, ApplyEvent::ApplyOk { version }) => {
                Some(ApplyState::Applied { version })
            }
            (ApplyState::Applying, ApplyEvent::ApplyStale { version_advanced }) => {
                Some(if !version_advanced {
                    ApplyState::Dropped(DropReason::StaleNoProgress)
                } else if self.attempt < MAX_ATTEMPTS {
                    ApplyState::Retrying
                } else {
                    ApplyState::Dropped(DropReason::RetriesExhausted)
                })
            }
            (ApplyState::Retrying, ApplyEvent::RetryBegun) => {
                self.attempt += 1;
                Some(ApplyState::Resolving)
            }
            (state, event) => {
                debug!(?state, ?event, "event ignored in this state");
                None
            }
        };
        if let Some(next) = next {
            self.state = next;
        }
        &self.state
    }
}

impl Default for ApplyMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// What a queued edit job reports back to its submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied { version: u64 },
    Dropped(DropReason),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

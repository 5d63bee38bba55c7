//! Shared outcome enum returned by every state-machine service.

/// Result of attempting a single CAS-guarded transition.
///
/// Every state-machine service (§4.4) returns one of these instead of
/// throwing on a lost race or a stale precondition — a 0-row CAS is an
/// expected, not exceptional, outcome under at-least-once delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The CAS applied; side effects were (or are being) performed.
    Applied,
    /// The referenced case (or job, or token) does not exist.
    NotFound,
    /// The case exists but is not in the status the transition requires.
    WrongState,
    /// The CAS affected zero rows because a concurrent caller already
    /// applied an equivalent transition first.
    DuplicateOrRace,
}

impl TransitionOutcome {
    #[must_use]
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::NotFound => "not_found",
            Self::WrongState => "wrong_state",
            Self::DuplicateOrRace => "duplicate_or_race",
        }
    }
}

impl std::fmt::Display for TransitionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

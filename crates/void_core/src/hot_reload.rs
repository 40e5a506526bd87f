//! Two-phase reload protocol states
//!
//! A reload runs `Idle -> Staging -> Validating -> Committing -> Idle`, or
//! leaves `Staging`/`Validating` through `RollingBack -> Idle`. Every reload
//! request walks this sequence exactly once; a new request starts over at
//! `Staging`.

use core::fmt;

/// How a staged object leaves the staging area
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FinishMode {
    /// The staged version became the live one
    Commit,
    /// The staged version is being thrown away
    Rollback,
}

/// Phase of the reload state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ReloadPhase {
    /// No reload in progress; only committed objects are live
    #[default]
    Idle,
    /// Candidates are being built next to the live objects
    Staging,
    /// Candidates are wired together and may reject themselves
    Validating,
    /// Candidates replace the live objects; cannot fail
    Committing,
    /// Candidates are discarded; live objects are untouched
    RollingBack,
}

impl ReloadPhase {
    /// Whether the protocol allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ReloadPhase) -> bool {
        use ReloadPhase::*;
        matches!(
            (self, next),
            (Idle, Staging)
                | (Staging, Validating)
                | (Staging, RollingBack)
                | (Validating, Committing)
                | (Validating, RollingBack)
                | (Committing, Idle)
                | (RollingBack, Idle)
        )
    }

    /// Whether a reload in this phase may still be abandoned without effect
    pub fn is_cancellable(self) -> bool {
        matches!(self, ReloadPhase::Staging | ReloadPhase::Validating)
    }

    /// Whether a reload is in flight
    pub fn is_active(self) -> bool {
        self != ReloadPhase::Idle
    }
}

impl fmt::Display for ReloadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReloadPhase::Idle => "idle",
            ReloadPhase::Staging => "staging",
            ReloadPhase::Validating => "validating",
            ReloadPhase::Committing => "committing",
            ReloadPhase::RollingBack => "rolling back",
        };
        f.write_str(name)
    }
}

/// Tracks the current phase and the path taken through the protocol
#[derive(Clone, Debug, Default)]
pub struct PhaseTracker {
    current: ReloadPhase,
    history: Vec<ReloadPhase>,
}

impl PhaseTracker {
    /// Start in `Idle`
    pub fn new() -> Self {
        Self {
            current: ReloadPhase::Idle,
            history: vec![ReloadPhase::Idle],
        }
    }

    /// Current phase
    pub fn current(&self) -> ReloadPhase {
        self.current
    }

    /// Every phase visited so far, including the current one
    pub fn history(&self) -> &[ReloadPhase] {
        &self.history
    }

    /// Move to `next`.
    ///
    /// Illegal transitions are a programming error in the coordinator; they
    /// trip a debug assertion and are ignored in release builds.
    pub fn advance(&mut self, next: ReloadPhase) -> bool {
        let legal = self.current.can_transition_to(next);
        debug_assert!(legal, "illegal reload transition {} -> {}", self.current, next);
        if legal {
            self.current = next;
            self.history.push(next);
        }
        legal
    }
}

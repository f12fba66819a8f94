//! State machines for the import and undo pipelines.
//!
//! Each machine is a pure transition function from (state, event) to
//! (next state, effect). The database drivers in [`crate::db::import`] and
//! [`crate::db::undo`] execute the effects and report the outcome back as the
//! next event, so the atomicity rules are encoded here and can be checked
//! without a database.
//!
//! Import:
//!
//! ```text
//! Start -> DuplicateCheck -> StageRaw -> Reconcile -> [QualityGate] -> Insert
//!       -> RecordHistory -> Commit -> Committed
//! ```
//!
//! A duplicate ends in `Rejected` before any transaction exists. Any failure
//! once `StageRaw` is entered ends in `RolledBack`.
//!
//! Undo:
//!
//! ```text
//! Start -> CheckReference -> CheckBackup -> ResolveMapping -> ReconstructJoin
//!       -> DeleteRows -> ForgetHistory -> DropBackup -> Commit -> Done
//! ```
//!
//! A failed precondition ends in `Aborted` with nothing mutated; a failure
//! while executing ends in `RolledBack`.

use crate::error::{Error, Result};
use std::fmt;

/// Default minimum match quality (percent) below which an import needs confirmation.
pub const DEFAULT_QUALITY_THRESHOLD: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    Start,
    DuplicateCheck,
    StageRaw,
    Reconcile,
    QualityGate,
    Insert,
    RecordHistory,
    Commit,
    Committed,
    Rejected,
    RolledBack,
}

impl ImportState {
    /// Whether the import transaction is open in this state.
    pub fn in_transaction(self) -> bool {
        matches!(
            self,
            ImportState::StageRaw
                | ImportState::Reconcile
                | ImportState::QualityGate
                | ImportState::Insert
                | ImportState::RecordHistory
                | ImportState::Commit
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ImportState::Committed | ImportState::Rejected | ImportState::RolledBack
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportEvent {
    Begin,
    DuplicateFound,
    NoDuplicate,
    Staged,
    Reconciled { quality: u8 },
    Confirmed(bool),
    Inserted,
    Recorded,
    Committed,
    Failed,
}

/// What the driver must do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportEffect {
    CheckDuplicate,
    /// Open the transaction, create the backup table and copy every row into it.
    StageBackup,
    Reconcile,
    RequestConfirmation,
    InsertRows,
    RecordHistory,
    Commit,
    Reject,
    Rollback,
    Done,
}

/// Import pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportMachine {
    state: ImportState,
    threshold: u8,
}

impl ImportMachine {
    pub fn new(threshold: u8) -> Self {
        Self {
            state: ImportState::Start,
            threshold,
        }
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Pure transition function.
    pub fn step(
        state: ImportState,
        event: ImportEvent,
        threshold: u8,
    ) -> Result<(ImportState, ImportEffect)> {
        use ImportEffect as E;
        use ImportEvent as Ev;
        use ImportState as S;

        let next = match (state, event) {
            (S::Start, Ev::Begin) => (S::DuplicateCheck, E::CheckDuplicate),

            (S::DuplicateCheck, Ev::NoDuplicate) => (S::StageRaw, E::StageBackup),
            // Nothing has been written yet: a plain rejection, no rollback.
            (S::DuplicateCheck, Ev::DuplicateFound | Ev::Failed) => (S::Rejected, E::Reject),

            (S::StageRaw, Ev::Staged) => (S::Reconcile, E::Reconcile),

            (S::Reconcile, Ev::Reconciled { quality }) if quality >= threshold => {
                (S::Insert, E::InsertRows)
            }
            (S::Reconcile, Ev::Reconciled { .. }) => (S::QualityGate, E::RequestConfirmation),

            (S::QualityGate, Ev::Confirmed(true)) => (S::Insert, E::InsertRows),
            // Declining discards the staged backup along with everything else.
            (S::QualityGate, Ev::Confirmed(false)) => (S::RolledBack, E::Rollback),

            (S::Insert, Ev::Inserted) => (S::RecordHistory, E::RecordHistory),
            (S::RecordHistory, Ev::Recorded) => (S::Commit, E::Commit),
            (S::Commit, Ev::Committed) => (S::Committed, E::Done),

            (s, Ev::Failed) if s.in_transaction() => (S::RolledBack, E::Rollback),

            (s, ev) => {
                return Err(Error::InvalidTransition {
                    machine: "import",
                    state: format!("{:?}", s),
                    event: format!("{:?}", ev),
                });
            }
        };
        Ok(next)
    }

    /// Apply an event and return the effect to execute.
    pub fn advance(&mut self, event: ImportEvent) -> Result<ImportEffect> {
        let (next, effect) = Self::step(self.state, event, self.threshold)?;
        self.state = next;
        Ok(effect)
    }
}

impl Default for ImportMachine {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoState {
    Start,
    CheckReference,
    CheckBackup,
    ResolveMapping,
    ReconstructJoin,
    DeleteRows,
    ForgetHistory,
    DropBackup,
    Commit,
    Done,
    Aborted,
    RolledBack,
}

impl UndoState {
    /// Precondition states run before the transaction opens and never mutate.
    pub fn is_precondition(self) -> bool {
        matches!(
            self,
            UndoState::CheckReference
                | UndoState::CheckBackup
                | UndoState::ResolveMapping
                | UndoState::ReconstructJoin
        )
    }

    pub fn in_transaction(self) -> bool {
        matches!(
            self,
            UndoState::DeleteRows
                | UndoState::ForgetHistory
                | UndoState::DropBackup
                | UndoState::Commit
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UndoState::Done | UndoState::Aborted | UndoState::RolledBack
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoEvent {
    Begin,
    /// The current precondition holds.
    Satisfied,
    /// The current precondition does not hold.
    Unsatisfied,
    Executed,
    Committed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoEffect {
    CheckReference,
    CheckBackupExists,
    ResolveMapping,
    ReconstructJoin,
    /// Open the transaction and delete the matching rows from the target table.
    DeleteRows,
    DeleteHistory,
    DropBackup,
    Commit,
    Abort,
    Rollback,
    Done,
}

/// Undo pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoMachine {
    state: UndoState,
}

impl UndoMachine {
    pub fn new() -> Self {
        Self {
            state: UndoState::Start,
        }
    }

    pub fn state(&self) -> UndoState {
        self.state
    }

    /// Pure transition function.
    pub fn step(state: UndoState, event: UndoEvent) -> Result<(UndoState, UndoEffect)> {
        use UndoEffect as E;
        use UndoEvent as Ev;
        use UndoState as S;

        let next = match (state, event) {
            (S::Start, Ev::Begin) => (S::CheckReference, E::CheckReference),
            (S::CheckReference, Ev::Satisfied) => (S::CheckBackup, E::CheckBackupExists),
            (S::CheckBackup, Ev::Satisfied) => (S::ResolveMapping, E::ResolveMapping),
            (S::ResolveMapping, Ev::Satisfied) => (S::ReconstructJoin, E::ReconstructJoin),
            (S::ReconstructJoin, Ev::Satisfied) => (S::DeleteRows, E::DeleteRows),

            (s, Ev::Unsatisfied | Ev::Failed) if s.is_precondition() => (S::Aborted, E::Abort),

            (S::DeleteRows, Ev::Executed) => (S::ForgetHistory, E::DeleteHistory),
            (S::ForgetHistory, Ev::Executed) => (S::DropBackup, E::DropBackup),
            (S::DropBackup, Ev::Executed) => (S::Commit, E::Commit),
            (S::Commit, Ev::Committed) => (S::Done, E::Done),

            (s, Ev::Failed) if s.in_transaction() => (S::RolledBack, E::Rollback),

            (s, ev) => {
                return Err(Error::InvalidTransition {
                    machine: "undo",
                    state: format!("{:?}", s),
                    event: format!("{:?}", ev),
                });
            }
        };
        Ok(next)
    }

    pub fn advance(&mut self, event: UndoEvent) -> Result<UndoEffect> {
        let (next, effect) = Self::step(self.state, event)?;
        self.state = next;
        Ok(effect)
    }
}

impl Default for UndoMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for UndoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

//! Durable step boundaries backed by a per-run ledger
//!
//! Each externally visible effect of a run executes inside a named step.
//! Re-running the same run id replays completed steps from the ledger
//! instead of repeating their effects.

mod ledger;
mod runner;

pub use ledger::{InMemoryLedger, LedgerError, SqliteLedger, StepLedger, StepRecord, StepState};
pub use runner::{EffectError, StepError, StepRunner};

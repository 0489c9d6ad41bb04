//! Dispatcher error types.
//!
//! Business failures (insufficient credits, provider exhaustion, missing
//! materials) are not errors here — they come back as tagged
//! `GenerationFailure` values inside the record. `DispatchError` covers only
//! backend faults the dispatcher cannot translate into a terminal record.

use thiserror::Error;

use crate::ledger::LedgerError;
use crate::materials::MaterialError;
use crate::records::StoreError;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Material store error: {0}")]
    Material(#[from] MaterialError),

    #[error("Generation store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch task failed: {0}")]
    Task(String),
}

//! The VidGo generation dispatcher.
//!
//! This crate is the core of the backend: given one tool invocation it
//! decides demo-vs-live routing, walks the provider failover list, charges
//! credits only on success, and persists exactly one generation record.
//!
//! It also defines the seams to the collaborating stores:
//! - [`CreditLedger`] with an in-memory reference implementation
//! - [`MaterialLookup`] over the pre-generated demo example pool
//! - [`GenerationStore`] for durable generation records

pub mod dispatcher;
pub mod error;
pub mod ledger;
pub mod materials;
pub mod pipeline;
pub mod records;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, DispatchResult};
pub use ledger::{CommitContext, CreditLedger, LedgerError, MemoryLedger, ReservationId};
pub use materials::{MaterialError, MaterialLookup, MemoryMaterialStore};
pub use pipeline::{plan_for, PipelineStep};
pub use records::{GenerationStore, MemoryGenerationStore, StoreError};

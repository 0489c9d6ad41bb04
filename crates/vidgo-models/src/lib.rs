//! Shared data models for the VidGo backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation tools and provider capabilities
//! - Generation requests, records, and provider attempts
//! - Credit balances, costs, and transactions
//! - Plan tiers
//! - Pre-generated demo materials

pub mod capability;
pub mod credit;
pub mod generation;
pub mod material;
pub mod plan;
pub mod tool;

// Re-export common types
pub use capability::Capability;
pub use credit::{CreditBalance, CreditDraw, CreditTransaction};
pub use generation::{
    AttemptOutcome, GenerationFailure, GenerationRecord, GenerationRequest, GenerationStatus,
    ProviderAttempt,
};
pub use material::MaterialExample;
pub use plan::PlanTier;
pub use tool::{ToolParseError, ToolType};

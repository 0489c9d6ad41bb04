//! External generation provider clients for the VidGo backend.
//!
//! This crate provides:
//! - A uniform [`ProviderClient`] trait over vendor REST APIs
//! - One client per vendor (PiAPI, Pollo, A2E, GoEnhance, Gemini)
//! - The [`ProviderRegistry`]: capability → ordered provider list, plus
//!   last-known provider health for the service-status endpoint

pub mod a2e;
pub mod client;
pub mod error;
pub mod gemini;
pub mod goenhance;
pub mod piapi;
pub mod pollo;
pub mod registry;

pub use a2e::A2eClient;
pub use client::{ProviderClient, ProviderOutput, ProviderParams};
pub use error::{ProviderError, ProviderResult};
pub use gemini::GeminiClient;
pub use goenhance::GoEnhanceClient;
pub use piapi::PiApiClient;
pub use pollo::PolloClient;
pub use registry::{ProviderRegistry, ProviderStatus};

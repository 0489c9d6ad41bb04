//! Request handlers.

pub mod credits;
pub mod demo;
pub mod generations;
pub mod health;
pub mod status;
pub mod tools;

pub use health::*;

//! Core data models for synthkit.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete record types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants surfaced per item

mod config;
mod error;
mod record;

pub use config::*;
pub use error::*;
pub use record::*;

//! Shared types for the loan-funded swap executor.
//!
//! Everything that crosses a crate boundary lives here: ledger primitives,
//! venue and provider identifiers, the error taxonomy, execution events and
//! the configuration schema helpers.

pub mod common;
pub mod errors;
pub mod events;
pub mod validation;

pub use common::*;
pub use errors::*;
pub use events::*;
pub use validation::*;

//! Off-ledger execution-path selection.
//!
//! Given a candidate opportunity, the selector decides which on-ledger entry
//! point to submit to. Decisions pass through three ordered gates and the
//! first one that produces an answer wins:
//!
//! 1. topology: more than two distinct assets, or anything other than a
//!    two-hop round trip, needs the general entry point;
//! 2. liquidity source: any hop that is not constant-product needs the
//!    general entry point;
//! 3. cost: both entry points are estimated under a deadline and the cheaper
//!    one wins. An estimator failure or timeout falls back to general.

use arb_types::{Classify, ErrorClass};
use thiserror::Error;

pub mod cost;
pub mod selector;
pub mod sizing;

pub use cost::{CostEstimator, StaticGasModel};
pub use selector::{Decision, Estimates, Gate, Hop, Opportunity, PathSelector};
pub use sizing::LoanSizer;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
	#[error("Opportunity {0} has no hops")]
	EmptyPath(String),
	#[error("Opportunity {id} has {hops} hops")]
	TooManyHops { id: String, hops: usize },
	#[error("Hop {index} of opportunity {id} does not chain from the previous output")]
	BrokenChain { id: String, index: usize },
	#[error("Entry point cannot run this path: {0}")]
	UnsupportedEntryPoint(String),
	#[error("Cost estimation failed: {0}")]
	Estimator(String),
}

impl Classify for SelectorError {
	fn class(&self) -> ErrorClass {
		match self {
			SelectorError::Estimator(_) => ErrorClass::Infrastructure,
			_ => ErrorClass::Validation,
		}
	}
}

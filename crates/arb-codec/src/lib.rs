//! Wire formats consumed by the execution engine.
//!
//! Two self-describing instruction encodings are supported:
//!
//! - the binary **Plan** (fixed 60-byte header followed by packed steps),
//!   identified by its leading format version byte;
//! - the **Route** (explicit addresses or registry ids), identified by a
//!   leading mode byte followed by an ABI-encoded body.
//!
//! Nothing in this crate touches the ledger. A decode either returns a
//! complete value or an error; partial results are never exposed.

use arb_types::{Classify, ErrorClass};
use thiserror::Error;

pub mod instructions;
pub mod plan;
pub mod reader;
pub mod route;

pub use instructions::{decode_instructions, is_undersized, Instructions, MIN_PLAN_LEN, MIN_ROUTE_LEN};
pub use plan::{Plan, PlanHeader, Step, HEADER_LEN, PLAN_FORMAT_V1, STEP_FIXED_LEN};
pub use reader::{PlanReader, PlanWriter};
pub use route::{ExplicitRoute, RegistryRoute, Route, MODE_EXPLICIT, MODE_REGISTRY};

/// Errors that can occur while encoding or decoding instructions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
	/// Any bound violation, unknown version, aux overrun or bad field value.
	#[error("Malformed plan: {0}")]
	MalformedPlan(String),
	/// Sibling sequences of a route disagree on length.
	#[error("Route length mismatch: {field} has {actual} entries, expected {expected}")]
	RouteLengthMismatch {
		field: &'static str,
		expected: usize,
		actual: usize,
	},
}

impl CodecError {
	pub(crate) fn malformed(reason: impl Into<String>) -> Self {
		CodecError::MalformedPlan(reason.into())
	}
}

impl Classify for CodecError {
	fn class(&self) -> ErrorClass {
		ErrorClass::Format
	}
}

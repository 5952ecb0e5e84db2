//! Error taxonomy shared by every crate.
//!
//! Each crate owns its own error enum; this module only defines how those
//! errors are classified so that the off-ledger side can decide whether to
//! alert, drop the opportunity or retry later.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
	/// The caller built bad input. Fatal, never retried automatically.
	Format,
	/// Hostile or misrouted call. Fatal, raises an alert.
	Authorization,
	/// The opportunity was not profitable after real execution. The
	/// opportunity is dropped and may be resized later.
	Economic,
	/// Rejected before touching funds.
	Validation,
	/// Storage, configuration or other infrastructure failure.
	Infrastructure,
}

impl ErrorClass {
	/// Whether an off-ledger operator should be alerted.
	pub fn is_alert(self) -> bool {
		matches!(self, ErrorClass::Authorization)
	}

	/// Whether the same opportunity may be retried with different sizing.
	pub fn is_retryable(self) -> bool {
		matches!(self, ErrorClass::Economic)
	}
}

impl fmt::Display for ErrorClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ErrorClass::Format => "format",
			ErrorClass::Authorization => "authorization",
			ErrorClass::Economic => "economic",
			ErrorClass::Validation => "validation",
			ErrorClass::Infrastructure => "infrastructure",
		};
		f.write_str(name)
	}
}

/// Implemented by every crate error to expose its class.
pub trait Classify {
	fn class(&self) -> ErrorClass;
}

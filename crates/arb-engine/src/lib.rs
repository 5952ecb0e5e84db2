//! Loan session engine.
//!
//! A session borrows an asset, runs the decoded instructions through the
//! step dispatcher and settles with the lender, all inside one ledger
//! transaction. If anything fails, the transaction reverts and no balance
//! anywhere changes.

use arb_adapters::AdapterError;
use arb_codec::CodecError;
use arb_ledger::LedgerError;
use arb_payload::PayloadError;
use arb_registry::RegistryError;
use arb_types::{Address, Classify, ErrorClass, ProviderKind, Timestamp, U256};
use thiserror::Error;

pub mod controller;
pub mod dispatcher;
pub mod profit;
pub mod session;

pub use controller::{ControllerConfig, LoanController, LoanRequest, PairRequest, SessionReceipt};
pub use dispatcher::{StepDispatcher, StepOutcome};
pub use profit::{ProfitGuard, Settlement};
pub use session::{LoanSession, SessionGuard, SessionState, SessionToken};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
	#[error("Invalid loan request: {0}")]
	InvalidRequest(String),
	#[error("Plan expired: deadline {deadline}, now {now}")]
	PlanExpired { deadline: Timestamp, now: Timestamp },
	#[error("Unauthorized callback: {0}")]
	UnauthorizedCallback(String),
	#[error("Insufficient repayment: holding {ending}, owed {owed}")]
	InsufficientRepayment { ending: U256, owed: U256 },
	#[error("Profit {profit} below floor {floor}")]
	ProfitTooLow { profit: U256, floor: U256 },
	#[error("A loan session is already open")]
	SessionActive,
	#[error("Illegal session transition {from:?} -> {to:?}")]
	IllegalTransition { from: SessionState, to: SessionState },
	#[error("No {0} lender configured")]
	NoLender(ProviderKind),
	#[error("Venue {0} is not a constant-product venue")]
	NotConstantProduct(Address),
	#[error("Arithmetic overflow computing {0}")]
	Overflow(&'static str),
	#[error(transparent)]
	Codec(#[from] CodecError),
	#[error(transparent)]
	Registry(#[from] RegistryError),
	#[error(transparent)]
	Adapter(#[from] AdapterError),
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	#[error(transparent)]
	Payload(#[from] PayloadError),
}

impl Classify for ExecutionError {
	fn class(&self) -> ErrorClass {
		match self {
			ExecutionError::InvalidRequest(_)
			| ExecutionError::PlanExpired { .. }
			| ExecutionError::NoLender(_)
			| ExecutionError::NotConstantProduct(_) => ErrorClass::Validation,
			ExecutionError::UnauthorizedCallback(_) | ExecutionError::SessionActive => {
				ErrorClass::Authorization
			}
			ExecutionError::InsufficientRepayment { .. }
			| ExecutionError::ProfitTooLow { .. }
			| ExecutionError::Overflow(_) => ErrorClass::Economic,
			ExecutionError::IllegalTransition { .. } => ErrorClass::Infrastructure,
			ExecutionError::Codec(e) => e.class(),
			ExecutionError::Registry(e) => e.class(),
			ExecutionError::Adapter(e) => e.class(),
			ExecutionError::Ledger(e) => e.class(),
			ExecutionError::Payload(e) => e.class(),
		}
	}
}

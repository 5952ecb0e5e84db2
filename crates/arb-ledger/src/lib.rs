//! In-process model of the host ledger.
//!
//! The executor runs against a deterministic ledger: token balances and
//! allowances, a clock and a network id, plus hosted venue and lender
//! contracts addressed by 20-byte addresses. [`Ledger::transact`] gives
//! all-or-nothing semantics by running on a scratch copy of the state and
//! committing only on success.

use alloy_primitives::keccak256;
use arb_types::{Address, Classify, ErrorClass, ProviderKind, VenueKind, B256, U256};
use std::collections::BTreeMap;
use std::fmt::Debug;
use thiserror::Error;
use tracing::debug;

pub mod state;

/// Hosted contract implementations.
pub mod implementations {
	pub mod lenders;
	pub mod venues;
}

pub use implementations::lenders::{PullSimpleLender, PushSettlementLender};
pub use implementations::venues::{
	ConcentratedRouter, ConstantProductRouter, FixedOutputVenue, StableBasketPool,
};
pub use state::LedgerState;

/// Errors raised by ledger operations and hosted contracts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
	#[error("Insufficient balance of {token} for {holder}: needed {needed}, available {available}")]
	InsufficientBalance {
		token: Address,
		holder: Address,
		needed: U256,
		available: U256,
	},
	#[error("Insufficient allowance of {token} from {owner} to {spender}: needed {needed}, allowed {allowed}")]
	InsufficientAllowance {
		token: Address,
		owner: Address,
		spender: Address,
		needed: U256,
		allowed: U256,
	},
	#[error("Slippage: output {actual} below minimum {minimum}")]
	Slippage { minimum: U256, actual: U256 },
	#[error("No contract deployed at {0}")]
	UnknownContract(Address),
	#[error("Call not supported by venue {venue}: {reason}")]
	UnsupportedCall { venue: Address, reason: String },
	#[error("Empty liquidity for {0}")]
	NoLiquidity(Address),
	#[error("Borrower callback failed: {0}")]
	CallbackFailed(String),
	#[error("Arithmetic overflow")]
	Overflow,
}

impl Classify for LedgerError {
	fn class(&self) -> ErrorClass {
		match self {
			LedgerError::UnknownContract(_) | LedgerError::UnsupportedCall { .. } => {
				ErrorClass::Validation
			}
			LedgerError::CallbackFailed(_) => ErrorClass::Authorization,
			_ => ErrorClass::Economic,
		}
	}
}

/// Native calling conventions of the supported venue families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VenueCall {
	/// Path router: pulls `amount_in` of `path[0]` and pays the last path
	/// asset to `recipient`.
	SwapExactTokensForTokens {
		amount_in: U256,
		amount_out_min: U256,
		path: Vec<Address>,
		recipient: Address,
		deadline: u64,
	},
	/// Single-pool router keyed by fee tier (hundredths of a basis point).
	ExactInputSingle {
		token_in: Address,
		token_out: Address,
		fee: u32,
		recipient: Address,
		amount_in: U256,
		amount_out_minimum: U256,
	},
	/// Indexed pool exchange; proceeds go to the caller.
	Exchange { i: i8, j: i8, dx: U256, min_dy: U256 },
}

impl VenueCall {
	pub fn kind(&self) -> VenueKind {
		match self {
			VenueCall::SwapExactTokensForTokens { .. } => VenueKind::ConstantProduct,
			VenueCall::ExactInputSingle { .. } => VenueKind::ConcentratedLiquidity,
			VenueCall::Exchange { .. } => VenueKind::StableBasket,
		}
	}
}

/// A venue contract hosted on the ledger.
pub trait VenueInterface: Send + Sync + Debug {
	fn address(&self) -> Address;

	/// Whether the venue speaks the calling convention of `kind`.
	fn supports(&self, kind: VenueKind) -> bool;

	/// Indexed coins, for venues that address assets by position.
	fn coins(&self) -> &[Address] {
		&[]
	}

	/// Executes `call` on behalf of `caller`, returning the output amount.
	/// Input is pulled from `caller` through its allowance.
	fn call(
		&self,
		ledger: &mut LedgerState,
		caller: Address,
		call: VenueCall,
	) -> Result<U256, LedgerError>;
}

/// Borrower side of a flash loan.
///
/// Callbacks report failure through their return value; implementations keep
/// their own typed error for the caller to inspect afterwards.
pub trait FlashLoanReceiver {
	fn address(&self) -> Address;

	/// Push-settlement callback. Must return [`callback_success`] to accept.
	#[allow(clippy::too_many_arguments)]
	fn on_flash_loan(
		&mut self,
		ledger: &mut LedgerState,
		caller: Address,
		initiator: Address,
		asset: Address,
		amount: U256,
		fee: U256,
		data: &[u8],
	) -> B256;

	/// Pull-simple callback. Returns `true` to accept.
	#[allow(clippy::too_many_arguments)]
	fn execute_operation(
		&mut self,
		ledger: &mut LedgerState,
		caller: Address,
		asset: Address,
		amount: U256,
		premium: U256,
		initiator: Address,
		data: &[u8],
	) -> bool;
}

/// Lender contract hosted on the ledger.
pub trait LenderInterface: Send + Sync + Debug {
	fn address(&self) -> Address;

	fn kind(&self) -> ProviderKind;

	fn flash_fee(&self, asset: Address, amount: U256) -> Result<U256, LedgerError>;

	/// Funds the lender can hand out right now.
	fn max_flash_loan(&self, ledger: &LedgerState, asset: Address) -> U256 {
		ledger.balance_of(asset, self.address())
	}

	/// Lends `amount`, invokes the receiver once and pulls back principal
	/// plus fee.
	fn flash_loan(
		&self,
		ledger: &mut LedgerState,
		receiver: &mut dyn FlashLoanReceiver,
		initiator: Address,
		asset: Address,
		amount: U256,
		data: &[u8],
	) -> Result<(), LedgerError>;
}

/// Magic value a push-settlement borrower returns to accept the loan.
pub fn callback_success() -> B256 {
	keccak256("ERC3156FlashBorrower.onFlashLoan")
}

/// Contracts deployed on the ledger, by address.
#[derive(Debug, Default)]
pub struct Contracts {
	venues: BTreeMap<Address, Box<dyn VenueInterface>>,
	lenders: BTreeMap<Address, Box<dyn LenderInterface>>,
}

impl Contracts {
	pub fn venue(&self, address: Address) -> Result<&dyn VenueInterface, LedgerError> {
		self.venues
			.get(&address)
			.map(|venue| venue.as_ref())
			.ok_or(LedgerError::UnknownContract(address))
	}

	pub fn lender(&self, address: Address) -> Result<&dyn LenderInterface, LedgerError> {
		self.lenders
			.get(&address)
			.map(|lender| lender.as_ref())
			.ok_or(LedgerError::UnknownContract(address))
	}
}

/// The ledger: committed state plus deployed contracts.
#[derive(Debug)]
pub struct Ledger {
	state: LedgerState,
	contracts: Contracts,
}

impl Ledger {
	pub fn new(state: LedgerState) -> Self {
		Self {
			state,
			contracts: Contracts::default(),
		}
	}

	pub fn state(&self) -> &LedgerState {
		&self.state
	}

	/// Direct state access for setup outside of any transaction.
	pub fn state_mut(&mut self) -> &mut LedgerState {
		&mut self.state
	}

	pub fn contracts(&self) -> &Contracts {
		&self.contracts
	}

	pub fn deploy_venue(&mut self, venue: impl VenueInterface + 'static) -> Address {
		let address = venue.address();
		self.contracts.venues.insert(address, Box::new(venue));
		address
	}

	pub fn deploy_lender(&mut self, lender: impl LenderInterface + 'static) -> Address {
		let address = lender.address();
		self.contracts.lenders.insert(address, Box::new(lender));
		address
	}

	/// Runs `f` as one atomic transaction. State changes are committed only
	/// if `f` returns `Ok`.
	pub fn transact<T, E>(
		&mut self,
		f: impl FnOnce(&mut LedgerState, &Contracts) -> Result<T, E>,
	) -> Result<T, E> {
		let mut scratch = self.state.clone();
		match f(&mut scratch, &self.contracts) {
			Ok(value) => {
				self.state = scratch;
				Ok(value)
			}
			Err(e) => {
				debug!("transaction reverted");
				Err(e)
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use arb_types::NetworkId;

	#[test]
	fn test_transact_commits_only_on_success() {
		let token = Address::repeat_byte(1);
		let holder = Address::repeat_byte(2);
		let mut ledger = Ledger::new(LedgerState::new(NetworkId::ETHEREUM, 0));

		ledger
			.transact(|state, _| state.mint(token, holder, U256::from(5u64)))
			.unwrap();
		assert_eq!(ledger.state().balance_of(token, holder), U256::from(5u64));

		let result: Result<(), LedgerError> = ledger.transact(|state, _| {
			state.mint(token, holder, U256::from(5u64))?;
			Err(LedgerError::Overflow)
		});
		assert!(result.is_err());
		assert_eq!(ledger.state().balance_of(token, holder), U256::from(5u64));
	}

	#[test]
	fn test_unknown_contract_lookup() {
		let ledger = Ledger::new(LedgerState::new(NetworkId::ETHEREUM, 0));
		assert!(matches!(
			ledger.contracts().venue(Address::repeat_byte(9)),
			Err(LedgerError::UnknownContract(_))
		));
	}
}

//! Flash-loan lenders for the two supported settlement shapes.

use arb_types::{Address, ProviderKind, BPS_DENOMINATOR, U256};
use tracing::debug;

use crate::{callback_success, FlashLoanReceiver, LedgerError, LedgerState, LenderInterface};

fn fee_for(amount: U256, bps: u64) -> Result<U256, LedgerError> {
	Ok(amount
		.checked_mul(U256::from(bps))
		.ok_or(LedgerError::Overflow)?
		/ U256::from(BPS_DENOMINATOR))
}

/// Lender that pushes funds, calls `on_flash_loan` once and then pulls
/// principal plus fee through the allowance granted during the callback.
#[derive(Debug, Clone)]
pub struct PushSettlementLender {
	address: Address,
	fee_bps: u64,
}

impl PushSettlementLender {
	pub const DEFAULT_FEE_BPS: u64 = 0;

	pub fn new(address: Address) -> Self {
		Self::with_fee(address, Self::DEFAULT_FEE_BPS)
	}

	pub fn with_fee(address: Address, fee_bps: u64) -> Self {
		Self { address, fee_bps }
	}
}

impl LenderInterface for PushSettlementLender {
	fn address(&self) -> Address {
		self.address
	}

	fn kind(&self) -> ProviderKind {
		ProviderKind::PushSettlement
	}

	fn flash_fee(&self, _asset: Address, amount: U256) -> Result<U256, LedgerError> {
		fee_for(amount, self.fee_bps)
	}

	fn flash_loan(
		&self,
		ledger: &mut LedgerState,
		receiver: &mut dyn FlashLoanReceiver,
		initiator: Address,
		asset: Address,
		amount: U256,
		data: &[u8],
	) -> Result<(), LedgerError> {
		let fee = self.flash_fee(asset, amount)?;
		let borrower = receiver.address();
		ledger.transfer(asset, self.address, borrower, amount)?;

		let returned =
			receiver.on_flash_loan(ledger, self.address, initiator, asset, amount, fee, data);
		if returned != callback_success() {
			return Err(LedgerError::CallbackFailed(
				"borrower rejected the loan".into(),
			));
		}

		let owed = amount.checked_add(fee).ok_or(LedgerError::Overflow)?;
		ledger.transfer_from(asset, self.address, borrower, self.address, owed)?;
		debug!(lender = %self.address, %asset, %amount, %fee, "push-settlement loan repaid");
		Ok(())
	}
}

/// Lender that pushes funds, calls `execute_operation` and pulls principal
/// plus premium when the callback returns `true`.
#[derive(Debug, Clone)]
pub struct PullSimpleLender {
	address: Address,
	premium_bps: u64,
}

impl PullSimpleLender {
	pub const DEFAULT_PREMIUM_BPS: u64 = 5;

	pub fn new(address: Address) -> Self {
		Self::with_premium(address, Self::DEFAULT_PREMIUM_BPS)
	}

	pub fn with_premium(address: Address, premium_bps: u64) -> Self {
		Self {
			address,
			premium_bps,
		}
	}
}

impl LenderInterface for PullSimpleLender {
	fn address(&self) -> Address {
		self.address
	}

	fn kind(&self) -> ProviderKind {
		ProviderKind::PullSimple
	}

	fn flash_fee(&self, _asset: Address, amount: U256) -> Result<U256, LedgerError> {
		fee_for(amount, self.premium_bps)
	}

	fn flash_loan(
		&self,
		ledger: &mut LedgerState,
		receiver: &mut dyn FlashLoanReceiver,
		initiator: Address,
		asset: Address,
		amount: U256,
		data: &[u8],
	) -> Result<(), LedgerError> {
		let premium = self.flash_fee(asset, amount)?;
		let borrower = receiver.address();
		ledger.transfer(asset, self.address, borrower, amount)?;

		if !receiver.execute_operation(ledger, self.address, asset, amount, premium, initiator, data)
		{
			return Err(LedgerError::CallbackFailed(
				"executeOperation returned false".into(),
			));
		}

		let owed = amount.checked_add(premium).ok_or(LedgerError::Overflow)?;
		ledger.transfer_from(asset, self.address, borrower, self.address, owed)?;
		debug!(lender = %self.address, %asset, %amount, %premium, "pull-simple loan repaid");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use arb_types::{NetworkId, B256};

	const ASSET: Address = Address::new([0xAA; 20]);
	const LENDER: Address = Address::new([0x4C; 20]);
	const BORROWER: Address = Address::new([0xB0; 20]);

	/// Borrower that adds `bonus` to its balance and approves repayment.
	struct Borrower {
		bonus: U256,
		approve: bool,
	}

	impl Borrower {
		fn settle(&self, ledger: &mut LedgerState, caller: Address, owed: U256) {
			ledger.mint(ASSET, BORROWER, self.bonus).unwrap();
			if self.approve {
				ledger.approve(ASSET, BORROWER, caller, owed);
			}
		}
	}

	impl FlashLoanReceiver for Borrower {
		fn address(&self) -> Address {
			BORROWER
		}

		fn on_flash_loan(
			&mut self,
			ledger: &mut LedgerState,
			caller: Address,
			_initiator: Address,
			_asset: Address,
			amount: U256,
			fee: U256,
			_data: &[u8],
		) -> B256 {
			self.settle(ledger, caller, amount + fee);
			callback_success()
		}

		fn execute_operation(
			&mut self,
			ledger: &mut LedgerState,
			caller: Address,
			_asset: Address,
			amount: U256,
			premium: U256,
			_initiator: Address,
			_data: &[u8],
		) -> bool {
			self.settle(ledger, caller, amount + premium);
			true
		}
	}

	fn funded() -> LedgerState {
		let mut state = LedgerState::new(NetworkId::ETHEREUM, 0);
		state.mint(ASSET, LENDER, U256::from(1_000_000u64)).unwrap();
		state
	}

	#[test]
	fn test_pull_simple_premium_is_five_bps() {
		let lender = PullSimpleLender::new(LENDER);
		assert_eq!(
			lender.flash_fee(ASSET, U256::from(10_000u64)).unwrap(),
			U256::from(5u64)
		);

		let mut state = funded();
		let mut borrower = Borrower {
			bonus: U256::from(50u64),
			approve: true,
		};
		lender
			.flash_loan(&mut state, &mut borrower, BORROWER, ASSET, U256::from(10_000u64), &[])
			.unwrap();
		assert_eq!(state.balance_of(ASSET, LENDER), U256::from(1_000_005u64));
		assert_eq!(state.balance_of(ASSET, BORROWER), U256::from(45u64));
	}

	#[test]
	fn test_push_settlement_needs_allowance() {
		let lender = PushSettlementLender::new(LENDER);
		let mut state = funded();
		let mut borrower = Borrower {
			bonus: U256::ZERO,
			approve: false,
		};
		let err = lender
			.flash_loan(&mut state, &mut borrower, BORROWER, ASSET, U256::from(100u64), &[])
			.unwrap_err();
		assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
	}
}

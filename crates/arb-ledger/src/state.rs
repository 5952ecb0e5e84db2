//! Token balances, allowances and the clock.

use arb_types::{Address, NetworkId, Timestamp, U256};
use std::collections::BTreeMap;
use tracing::trace;

use crate::LedgerError;

/// Plain ledger state. Cloning it is how transactions get a scratch copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
	network: NetworkId,
	now: Timestamp,
	balances: BTreeMap<(Address, Address), U256>,
	allowances: BTreeMap<(Address, Address, Address), U256>,
}

impl LedgerState {
	pub fn new(network: NetworkId, now: Timestamp) -> Self {
		Self {
			network,
			now,
			balances: BTreeMap::new(),
			allowances: BTreeMap::new(),
		}
	}

	pub fn network(&self) -> NetworkId {
		self.network
	}

	pub fn now(&self) -> Timestamp {
		self.now
	}

	pub fn set_time(&mut self, now: Timestamp) {
		self.now = now;
	}

	pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
		self.balances
			.get(&(token, holder))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> U256 {
		self.allowances
			.get(&(token, owner, spender))
			.copied()
			.unwrap_or(U256::ZERO)
	}

	/// Credits `amount` out of thin air. Used to seed venues and lenders.
	pub fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), LedgerError> {
		let balance = self.balance_of(token, to);
		let updated = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
		self.balances.insert((token, to), updated);
		Ok(())
	}

	pub fn transfer(
		&mut self,
		token: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		let available = self.balance_of(token, from);
		if available < amount {
			return Err(LedgerError::InsufficientBalance {
				token,
				holder: from,
				needed: amount,
				available,
			});
		}
		if from == to || amount.is_zero() {
			return Ok(());
		}
		let credited = self
			.balance_of(token, to)
			.checked_add(amount)
			.ok_or(LedgerError::Overflow)?;
		self.balances.insert((token, from), available - amount);
		self.balances.insert((token, to), credited);
		trace!(%token, %from, %to, %amount, "transfer");
		Ok(())
	}

	/// Sets (not adds to) the allowance `owner` grants `spender`.
	pub fn approve(&mut self, token: Address, owner: Address, spender: Address, amount: U256) {
		if amount.is_zero() {
			self.allowances.remove(&(token, owner, spender));
		} else {
			self.allowances.insert((token, owner, spender), amount);
		}
	}

	/// Moves `amount` from `from` to `to` on behalf of `spender`, consuming
	/// allowance.
	pub fn transfer_from(
		&mut self,
		token: Address,
		spender: Address,
		from: Address,
		to: Address,
		amount: U256,
	) -> Result<(), LedgerError> {
		let allowed = self.allowance(token, from, spender);
		if allowed < amount {
			return Err(LedgerError::InsufficientAllowance {
				token,
				owner: from,
				spender,
				needed: amount,
				allowed,
			});
		}
		self.transfer(token, from, to, amount)?;
		self.approve(token, from, spender, allowed - amount);
		Ok(())
	}
}

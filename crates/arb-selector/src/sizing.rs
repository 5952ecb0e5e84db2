//! Loan sizing against lender liquidity.

use arb_types::{BPS_DENOMINATOR, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanSizer {
	/// Largest share of the lender's available liquidity to borrow.
	pub max_liquidity_share_bps: u64,
	/// Smallest loan worth submitting, in whole asset units.
	pub min_units: u64,
}

impl Default for LoanSizer {
	fn default() -> Self {
		Self {
			max_liquidity_share_bps: 2_000,
			min_units: 500,
		}
	}
}

impl LoanSizer {
	/// `min_units` scaled by the asset's decimals.
	pub fn floor(&self, decimals: u8) -> U256 {
		(0..decimals).fold(U256::from(self.min_units), |acc, _| {
			acc.saturating_mul(U256::from(10u64))
		})
	}

	/// Caps `requested` at the configured share of `available` liquidity.
	/// Returns `None` when the result falls below the floor. Unknown
	/// liquidity leaves only the floor in force.
	pub fn size(&self, requested: U256, available: Option<U256>, decimals: u8) -> Option<U256> {
		let amount = match available {
			Some(liquidity) => {
				let bps = self.max_liquidity_share_bps.min(BPS_DENOMINATOR);
				let cap = liquidity.saturating_mul(U256::from(bps)) / U256::from(BPS_DENOMINATOR);
				requested.min(cap)
			}
			None => requested,
		};
		let floor = self.floor(decimals);
		if amount < floor {
			debug!(%amount, %floor, "loan below sizing floor");
			return None;
		}
		Some(amount)
	}
}

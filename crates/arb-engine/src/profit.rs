//! Repayment and profit floor check.

use arb_types::U256;
use serde::{Deserialize, Serialize};

use crate::ExecutionError;

/// Outcome of a passing profit check. `ending == principal + fee + profit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
	pub ending: U256,
	pub principal: U256,
	pub fee: U256,
	pub profit: U256,
}

impl Settlement {
	pub fn owed(&self) -> U256 {
		self.principal + self.fee
	}
}

/// Enforces the controller-wide profit floor on top of per-plan floors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfitGuard {
	floor: U256,
}

impl ProfitGuard {
	pub fn new(floor: U256) -> Self {
		Self { floor }
	}

	pub fn floor(&self) -> U256 {
		self.floor
	}

	pub fn settle(
		&self,
		ending: U256,
		principal: U256,
		fee: U256,
		plan_floor: U256,
	) -> Result<Settlement, ExecutionError> {
		let owed = principal
			.checked_add(fee)
			.ok_or(ExecutionError::Overflow("repayment"))?;
		let profit = ending
			.checked_sub(owed)
			.ok_or(ExecutionError::InsufficientRepayment { ending, owed })?;
		let floor = self.floor.max(plan_floor);
		if profit < floor {
			return Err(ExecutionError::ProfitTooLow { profit, floor });
		}
		Ok(Settlement {
			ending,
			principal,
			fee,
			profit,
		})
	}
}

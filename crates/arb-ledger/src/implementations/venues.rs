//! Simulated venue contracts.
//!
//! Every venue keeps its liquidity as ordinary ledger balances held at its
//! own address, so a reverted transaction also reverts pool state.

use arb_types::{Address, VenueKind, BPS_DENOMINATOR, U256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::{LedgerError, LedgerState, VenueCall, VenueInterface};

/// Fee tiers are expressed in hundredths of a basis point.
const FEE_TIER_DENOMINATOR: u64 = 1_000_000;

/// `x*y=k` output for `amount_in` after a fee of `fee_num / fee_den`.
fn constant_product_out(
	reserve_in: U256,
	reserve_out: U256,
	amount_in: U256,
	fee_num: u64,
	fee_den: u64,
) -> Result<U256, LedgerError> {
	let keep = U256::from(fee_den - fee_num);
	let in_with_fee = amount_in.checked_mul(keep).ok_or(LedgerError::Overflow)?;
	let numerator = in_with_fee
		.checked_mul(reserve_out)
		.ok_or(LedgerError::Overflow)?;
	let denominator = reserve_in
		.checked_mul(U256::from(fee_den))
		.and_then(|r| r.checked_add(in_with_fee))
		.ok_or(LedgerError::Overflow)?;
	if denominator.is_zero() {
		return Ok(U256::ZERO);
	}
	Ok(numerator / denominator)
}

fn enforce_minimum(actual: U256, minimum: U256) -> Result<U256, LedgerError> {
	if actual < minimum {
		return Err(LedgerError::Slippage { minimum, actual });
	}
	Ok(actual)
}

fn unsupported(venue: Address, requested: VenueKind) -> LedgerError {
	LedgerError::UnsupportedCall {
		venue,
		reason: format!("{} call on this venue", requested),
	}
}

/// Pulls input, swaps against the pool held at `pool` and pays `recipient`.
#[allow(clippy::too_many_arguments)]
fn swap_against_reserves(
	ledger: &mut LedgerState,
	pool: Address,
	caller: Address,
	token_in: Address,
	token_out: Address,
	amount_in: U256,
	recipient: Address,
	fee_num: u64,
	fee_den: u64,
) -> Result<U256, LedgerError> {
	let reserve_in = ledger.balance_of(token_in, pool);
	let reserve_out = ledger.balance_of(token_out, pool);
	if reserve_in.is_zero() || reserve_out.is_zero() {
		return Err(LedgerError::NoLiquidity(pool));
	}
	let amount_out = constant_product_out(reserve_in, reserve_out, amount_in, fee_num, fee_den)?;
	ledger.transfer_from(token_in, pool, caller, pool, amount_in)?;
	ledger.transfer(token_out, pool, recipient, amount_out)?;
	Ok(amount_out)
}

/// Path router over x*y=k reserves.
#[derive(Debug, Clone)]
pub struct ConstantProductRouter {
	address: Address,
	fee_bps: u64,
}

impl ConstantProductRouter {
	pub fn new(address: Address, fee_bps: u64) -> Self {
		Self {
			address,
			fee_bps: fee_bps.min(BPS_DENOMINATOR),
		}
	}
}

impl VenueInterface for ConstantProductRouter {
	fn address(&self) -> Address {
		self.address
	}

	fn supports(&self, kind: VenueKind) -> bool {
		kind == VenueKind::ConstantProduct
	}

	fn call(
		&self,
		ledger: &mut LedgerState,
		caller: Address,
		call: VenueCall,
	) -> Result<U256, LedgerError> {
		let requested = call.kind();
		let VenueCall::SwapExactTokensForTokens {
			amount_in,
			amount_out_min,
			path,
			recipient,
			deadline,
		} = call
		else {
			return Err(unsupported(self.address, requested));
		};
		if path.len() < 2 {
			return Err(LedgerError::UnsupportedCall {
				venue: self.address,
				reason: "path needs at least two assets".into(),
			});
		}
		if deadline < ledger.now() {
			return Err(LedgerError::UnsupportedCall {
				venue: self.address,
				reason: "router deadline passed".into(),
			});
		}

		// Intermediate hops settle at the router itself.
		let mut amount = amount_in;
		let mut payer = caller;
		for (index, pair) in path.windows(2).enumerate() {
			let last = index + 2 == path.len();
			let to = if last { recipient } else { self.address };
			if payer == self.address {
				ledger.approve(pair[0], self.address, self.address, amount);
			}
			amount = swap_against_reserves(
				ledger,
				self.address,
				payer,
				pair[0],
				pair[1],
				amount,
				to,
				self.fee_bps,
				BPS_DENOMINATOR,
			)?;
			payer = self.address;
		}
		debug!(venue = %self.address, hops = path.len() - 1, out = %amount, "constant-product swap");
		enforce_minimum(amount, amount_out_min)
	}
}

/// Single-pool router; each configured fee tier is a separate pool.
#[derive(Debug, Clone)]
pub struct ConcentratedRouter {
	address: Address,
	tiers: BTreeSet<u32>,
}

impl ConcentratedRouter {
	pub fn new(address: Address, tiers: impl IntoIterator<Item = u32>) -> Self {
		Self {
			address,
			tiers: tiers.into_iter().collect(),
		}
	}
}

impl VenueInterface for ConcentratedRouter {
	fn address(&self) -> Address {
		self.address
	}

	fn supports(&self, kind: VenueKind) -> bool {
		kind == VenueKind::ConcentratedLiquidity
	}

	fn call(
		&self,
		ledger: &mut LedgerState,
		caller: Address,
		call: VenueCall,
	) -> Result<U256, LedgerError> {
		let requested = call.kind();
		let VenueCall::ExactInputSingle {
			token_in,
			token_out,
			fee,
			recipient,
			amount_in,
			amount_out_minimum,
		} = call
		else {
			return Err(unsupported(self.address, requested));
		};
		if !self.tiers.contains(&fee) || u64::from(fee) >= FEE_TIER_DENOMINATOR {
			return Err(LedgerError::UnsupportedCall {
				venue: self.address,
				reason: format!("no pool for fee tier {}", fee),
			});
		}
		let amount_out = swap_against_reserves(
			ledger,
			self.address,
			caller,
			token_in,
			token_out,
			amount_in,
			recipient,
			u64::from(fee),
			FEE_TIER_DENOMINATOR,
		)?;
		debug!(venue = %self.address, fee, out = %amount_out, "concentrated swap");
		enforce_minimum(amount_out, amount_out_minimum)
	}
}

/// Indexed pool trading its coins 1:1 minus a fee.
#[derive(Debug, Clone)]
pub struct StableBasketPool {
	address: Address,
	coins: Vec<Address>,
	fee_bps: u64,
}

impl StableBasketPool {
	pub fn new(address: Address, coins: Vec<Address>, fee_bps: u64) -> Self {
		Self {
			address,
			coins,
			fee_bps: fee_bps.min(BPS_DENOMINATOR),
		}
	}

	fn coin(&self, index: i8) -> Result<Address, LedgerError> {
		usize::try_from(index)
			.ok()
			.and_then(|i| self.coins.get(i).copied())
			.ok_or_else(|| LedgerError::UnsupportedCall {
				venue: self.address,
				reason: format!("coin index {} out of range", index),
			})
	}
}

impl VenueInterface for StableBasketPool {
	fn address(&self) -> Address {
		self.address
	}

	fn supports(&self, kind: VenueKind) -> bool {
		kind == VenueKind::StableBasket
	}

	fn coins(&self) -> &[Address] {
		&self.coins
	}

	fn call(
		&self,
		ledger: &mut LedgerState,
		caller: Address,
		call: VenueCall,
	) -> Result<U256, LedgerError> {
		let requested = call.kind();
		let VenueCall::Exchange { i, j, dx, min_dy } = call else {
			return Err(unsupported(self.address, requested));
		};
		let coin_in = self.coin(i)?;
		let coin_out = self.coin(j)?;
		let fee = dx
			.checked_mul(U256::from(self.fee_bps))
			.ok_or(LedgerError::Overflow)?
			/ U256::from(BPS_DENOMINATOR);
		let dy = dx - fee;
		ledger.transfer_from(coin_in, self.address, caller, self.address, dx)?;
		ledger.transfer(coin_out, self.address, caller, dy)?;
		debug!(venue = %self.address, i, j, out = %dy, "stable-basket exchange");
		enforce_minimum(dy, min_dy)
	}
}

/// Venue that pays a preset amount per asset pair regardless of input size.
/// Speaks every calling convention; used for deterministic scenarios.
#[derive(Debug, Clone)]
pub struct FixedOutputVenue {
	address: Address,
	coins: Vec<Address>,
	outputs: BTreeMap<(Address, Address), U256>,
}

impl FixedOutputVenue {
	pub fn new(address: Address) -> Self {
		Self {
			address,
			coins: Vec::new(),
			outputs: BTreeMap::new(),
		}
	}

	/// Quotes `amount_out` of `asset_out` for any input of `asset_in`.
	pub fn with_output(mut self, asset_in: Address, asset_out: Address, amount_out: U256) -> Self {
		for asset in [asset_in, asset_out] {
			if !self.coins.contains(&asset) {
				self.coins.push(asset);
			}
		}
		self.outputs.insert((asset_in, asset_out), amount_out);
		self
	}

	#[allow(clippy::too_many_arguments)]
	fn settle(
		&self,
		ledger: &mut LedgerState,
		caller: Address,
		asset_in: Address,
		asset_out: Address,
		amount_in: U256,
		recipient: Address,
		minimum: U256,
	) -> Result<U256, LedgerError> {
		let amount_out = self
			.outputs
			.get(&(asset_in, asset_out))
			.copied()
			.ok_or_else(|| LedgerError::UnsupportedCall {
				venue: self.address,
				reason: format!("no quote for {} -> {}", asset_in, asset_out),
			})?;
		ledger.transfer_from(asset_in, self.address, caller, self.address, amount_in)?;
		ledger.transfer(asset_out, self.address, recipient, amount_out)?;
		enforce_minimum(amount_out, minimum)
	}
}

impl VenueInterface for FixedOutputVenue {
	fn address(&self) -> Address {
		self.address
	}

	fn supports(&self, _kind: VenueKind) -> bool {
		true
	}

	fn coins(&self) -> &[Address] {
		&self.coins
	}

	fn call(
		&self,
		ledger: &mut LedgerState,
		caller: Address,
		call: VenueCall,
	) -> Result<U256, LedgerError> {
		match call {
			VenueCall::SwapExactTokensForTokens {
				amount_in,
				amount_out_min,
				path,
				recipient,
				..
			} => match (path.first(), path.last()) {
				(Some(&first), Some(&last)) if path.len() == 2 => self.settle(
					ledger,
					caller,
					first,
					last,
					amount_in,
					recipient,
					amount_out_min,
				),
				_ => Err(LedgerError::UnsupportedCall {
					venue: self.address,
					reason: "fixed venue trades single pairs only".into(),
				}),
			},
			VenueCall::ExactInputSingle {
				token_in,
				token_out,
				recipient,
				amount_in,
				amount_out_minimum,
				..
			} => self.settle(
				ledger,
				caller,
				token_in,
				token_out,
				amount_in,
				recipient,
				amount_out_minimum,
			),
			VenueCall::Exchange { i, j, dx, min_dy } => {
				let coin = |index: i8| {
					usize::try_from(index)
						.ok()
						.and_then(|k| self.coins.get(k).copied())
						.ok_or_else(|| LedgerError::UnsupportedCall {
							venue: self.address,
							reason: format!("coin index {} out of range", index),
						})
				};
				let (coin_in, coin_out) = (coin(i)?, coin(j)?);
				self.settle(ledger, caller, coin_in, coin_out, dx, caller, min_dy)
			}
		}
	}
}

//! Per-step execution over heterogeneous venues.

use arb_adapters::{AdapterSet, SwapRequest};
use arb_codec::{Instructions, Plan, Route};
use arb_ledger::{Contracts, LedgerState};
use arb_registry::{resolve_route, resolve_venue, RegistryView};
use arb_types::{Address, NetworkId, Timestamp, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ExecutionError;

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
	pub index: usize,
	pub venue: Address,
	pub asset_in: Address,
	pub asset_out: Address,
	pub amount_in: U256,
	pub amount_out: U256,
}

/// Runs decoded instructions for the account `executor`.
pub struct StepDispatcher<'a> {
	adapters: &'a AdapterSet,
	contracts: &'a Contracts,
	registry: RegistryView<'a>,
	network: NetworkId,
	executor: Address,
	deadline: Timestamp,
}

impl<'a> StepDispatcher<'a> {
	pub fn new(
		adapters: &'a AdapterSet,
		contracts: &'a Contracts,
		registry: RegistryView<'a>,
		network: NetworkId,
		executor: Address,
		deadline: Timestamp,
	) -> Self {
		Self {
			adapters,
			contracts,
			registry,
			network,
			executor,
			deadline,
		}
	}

	pub fn run(
		&self,
		ledger: &mut LedgerState,
		instructions: &Instructions,
		loan_asset: Address,
	) -> Result<Vec<StepOutcome>, ExecutionError> {
		match instructions {
			Instructions::Plan(plan) => self.run_plan(ledger, plan),
			Instructions::Route(route) => self.run_route(ledger, route, loan_asset),
		}
	}

	/// Executes plan steps in order. Every step's tag and aux data are
	/// checked before the first one runs.
	pub fn run_plan(
		&self,
		ledger: &mut LedgerState,
		plan: &Plan,
	) -> Result<Vec<StepOutcome>, ExecutionError> {
		for step in &plan.steps {
			self.adapters.get(step.venue_tag)?.check_aux(&step.aux)?;
		}

		let mut outcomes = Vec::with_capacity(plan.steps.len());
		for (index, step) in plan.steps.iter().enumerate() {
			let venue = resolve_venue(&self.registry, self.network, u16::from(step.venue_tag))?;
			outcomes.push(self.dispatch(
				ledger,
				index,
				step.venue_tag,
				venue,
				step.asset_in,
				step.asset_out,
				step.amount_in,
				step.min_amount_out,
				&step.aux,
			)?);
		}
		Ok(outcomes)
	}

	/// Executes a route as a chain: each hop spends the full output of the
	/// previous one, starting from the loan asset.
	pub fn run_route(
		&self,
		ledger: &mut LedgerState,
		route: &Route,
		loan_asset: Address,
	) -> Result<Vec<StepOutcome>, ExecutionError> {
		let hops = resolve_route(route, &self.registry, self.network)?;
		for hop in &hops {
			self.adapters.get(hop.protocol)?.check_aux(&hop.aux)?;
		}

		let mut outcomes = Vec::with_capacity(hops.len());
		let mut asset_in = loan_asset;
		for (index, hop) in hops.iter().enumerate() {
			outcomes.push(self.dispatch(
				ledger,
				index,
				hop.protocol,
				hop.venue,
				asset_in,
				hop.asset_out,
				U256::ZERO,
				U256::ZERO,
				&hop.aux,
			)?);
			asset_in = hop.asset_out;
		}
		Ok(outcomes)
	}

	#[allow(clippy::too_many_arguments)]
	fn dispatch(
		&self,
		ledger: &mut LedgerState,
		index: usize,
		tag: u8,
		venue_address: Address,
		asset_in: Address,
		asset_out: Address,
		amount_in: U256,
		min_amount_out: U256,
		aux: &[u8],
	) -> Result<StepOutcome, ExecutionError> {
		let adapter = self.adapters.get(tag)?;
		let venue = self.contracts.venue(venue_address)?;

		let amount_in = if amount_in.is_zero() {
			ledger.balance_of(asset_in, self.executor)
		} else {
			amount_in
		};

		ledger.approve(asset_in, self.executor, venue_address, amount_in);
		let amount_out = adapter.swap(
			ledger,
			venue,
			&SwapRequest {
				caller: self.executor,
				asset_in,
				asset_out,
				amount_in,
				min_amount_out,
				aux,
				deadline: self.deadline,
			},
		)?;
		// No allowance outlives its step.
		ledger.approve(asset_in, self.executor, venue_address, U256::ZERO);

		debug!(
			step = index,
			kind = %adapter.kind(),
			venue = %venue_address,
			%amount_in,
			%amount_out,
			"step executed"
		);
		Ok(StepOutcome {
			index,
			venue: venue_address,
			asset_in,
			asset_out,
			amount_in,
			amount_out,
		})
	}
}

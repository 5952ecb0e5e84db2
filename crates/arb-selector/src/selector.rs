//! Gate evaluation.

use arb_types::{
	Address, ArbEvent, EntryPoint, EventBus, SelectionEvent, Timestamp, VenueKind, MAX_STEPS, U256,
};
use futures::future::{join_all, try_join};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::cost::CostEstimator;
use crate::SelectorError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
	pub kind: VenueKind,
	pub venue: Address,
	pub asset_in: Address,
	pub asset_out: Address,
}

/// A candidate path found by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opportunity {
	pub id: String,
	pub loan_asset: Address,
	pub amount: U256,
	pub hops: Vec<Hop>,
}

impl Opportunity {
	pub fn distinct_assets(&self) -> usize {
		let mut assets = BTreeSet::from([self.loan_asset]);
		for hop in &self.hops {
			assets.insert(hop.asset_in);
			assets.insert(hop.asset_out);
		}
		assets.len()
	}

	/// Shape checks every gate relies on.
	pub fn check(&self) -> Result<(), SelectorError> {
		if self.hops.is_empty() {
			return Err(SelectorError::EmptyPath(self.id.clone()));
		}
		if self.hops.len() > MAX_STEPS {
			return Err(SelectorError::TooManyHops {
				id: self.id.clone(),
				hops: self.hops.len(),
			});
		}
		let mut expected = self.loan_asset;
		for (index, hop) in self.hops.iter().enumerate() {
			if hop.asset_in != expected {
				return Err(SelectorError::BrokenChain {
					id: self.id.clone(),
					index,
				});
			}
			expected = hop.asset_out;
		}
		Ok(())
	}
}

/// The gate that produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
	Topology,
	LiquiditySource,
	Cost,
}

impl Gate {
	pub fn number(self) -> u8 {
		match self {
			Gate::Topology => 1,
			Gate::LiquiditySource => 2,
			Gate::Cost => 3,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimates {
	pub minimal: u64,
	pub general: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
	pub opportunity_id: String,
	pub entry_point: EntryPoint,
	pub gate: Gate,
	/// Present only when the cost gate obtained both estimates.
	pub estimates: Option<Estimates>,
	pub decided_at: Timestamp,
}

impl Decision {
	/// Whether the decision rests on estimates older than `max_age` seconds.
	pub fn is_stale(&self, now: Timestamp, max_age: u64) -> bool {
		self.gate == Gate::Cost && now.saturating_sub(self.decided_at) > max_age
	}
}

pub struct PathSelector {
	estimator: Arc<dyn CostEstimator>,
	timeout: Duration,
	max_estimate_age: u64,
	events: Option<EventBus>,
}

impl PathSelector {
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(250);
	pub const DEFAULT_MAX_ESTIMATE_AGE: u64 = 12;

	pub fn new(estimator: Arc<dyn CostEstimator>) -> Self {
		Self {
			estimator,
			timeout: Self::DEFAULT_TIMEOUT,
			max_estimate_age: Self::DEFAULT_MAX_ESTIMATE_AGE,
			events: None,
		}
	}

	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	pub fn with_max_estimate_age(mut self, seconds: u64) -> Self {
		self.max_estimate_age = seconds;
		self
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn max_estimate_age(&self) -> u64 {
		self.max_estimate_age
	}

	/// Gates 1 and 2. Pure; `None` means the cost gate decides.
	pub fn structural_gate(opportunity: &Opportunity) -> Option<Gate> {
		if opportunity.distinct_assets() > 2 || opportunity.hops.len() != 2 {
			return Some(Gate::Topology);
		}
		if opportunity
			.hops
			.iter()
			.any(|hop| !hop.kind.is_constant_product())
		{
			return Some(Gate::LiquiditySource);
		}
		None
	}

	#[instrument(skip_all, fields(id = %opportunity.id))]
	pub async fn select(
		&self,
		opportunity: &Opportunity,
		now: Timestamp,
	) -> Result<Decision, SelectorError> {
		opportunity.check()?;

		let decision = match Self::structural_gate(opportunity) {
			Some(gate) => Decision {
				opportunity_id: opportunity.id.clone(),
				entry_point: EntryPoint::General,
				gate,
				estimates: None,
				decided_at: now,
			},
			None => self.cost_gate(opportunity, now).await,
		};

		debug!(
			entry_point = %decision.entry_point,
			gate = decision.gate.number(),
			"entry point selected"
		);
		if let Some(events) = &self.events {
			events.publish(ArbEvent::Selection(SelectionEvent::Selected {
				opportunity_id: decision.opportunity_id.clone(),
				entry_point: decision.entry_point,
				gate: decision.gate.number(),
			}));
		}
		Ok(decision)
	}

	/// Evaluates a batch concurrently. Results keep the input order.
	pub async fn select_many(
		&self,
		opportunities: &[Opportunity],
		now: Timestamp,
	) -> Vec<Result<Decision, SelectorError>> {
		join_all(opportunities.iter().map(|o| self.select(o, now))).await
	}

	/// Re-runs the cost gate for a decision whose estimates have gone stale.
	/// Structural decisions never go stale.
	pub async fn revalidate(
		&self,
		decision: Decision,
		opportunity: &Opportunity,
		now: Timestamp,
	) -> Result<Decision, SelectorError> {
		if !decision.is_stale(now, self.max_estimate_age) {
			return Ok(decision);
		}
		opportunity.check()?;
		debug!(id = %opportunity.id, age = now.saturating_sub(decision.decided_at), "re-estimating stale decision");
		Ok(self.cost_gate(opportunity, now).await)
	}

	async fn cost_gate(&self, opportunity: &Opportunity, now: Timestamp) -> Decision {
		let both = try_join(
			self.estimator.estimate(opportunity, EntryPoint::Minimal),
			self.estimator.estimate(opportunity, EntryPoint::General),
		);
		let (entry_point, estimates) = match tokio::time::timeout(self.timeout, both).await {
			Ok(Ok((minimal, general))) => {
				let entry_point = if minimal <= general {
					EntryPoint::Minimal
				} else {
					EntryPoint::General
				};
				(entry_point, Some(Estimates { minimal, general }))
			}
			Ok(Err(e)) => {
				warn!(id = %opportunity.id, error = %e, "cost unknown, using general entry point");
				(EntryPoint::General, None)
			}
			Err(_) => {
				warn!(id = %opportunity.id, timeout_ms = self.timeout.as_millis() as u64, "cost estimation timed out, using general entry point");
				(EntryPoint::General, None)
			}
		};
		Decision {
			opportunity_id: opportunity.id.clone(),
			entry_point,
			gate: Gate::Cost,
			estimates,
			decided_at: now,
		}
	}
}

//! Cost estimation for the two entry points.

use arb_types::{EntryPoint, VenueKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::selector::Opportunity;
use crate::SelectorError;

/// Estimates what submitting an opportunity through an entry point costs,
/// in gas units.
#[async_trait]
pub trait CostEstimator: Send + Sync {
	async fn estimate(
		&self,
		opportunity: &Opportunity,
		entry_point: EntryPoint,
	) -> Result<u64, SelectorError>;
}

/// Table-driven gas model.
///
/// The general entry point pays for instruction decoding and adapter
/// dispatch on every hop; the minimal one has a fixed two-hop body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticGasModel {
	pub minimal_base: u64,
	pub general_base: u64,
	pub general_per_hop: u64,
	pub constant_product_hop: u64,
	pub concentrated_hop: u64,
	pub stable_basket_hop: u64,
}

impl Default for StaticGasModel {
	fn default() -> Self {
		Self {
			minimal_base: 95_000,
			general_base: 110_000,
			general_per_hop: 8_000,
			constant_product_hop: 62_000,
			concentrated_hop: 85_000,
			stable_basket_hop: 74_000,
		}
	}
}

impl StaticGasModel {
	fn hop_cost(&self, kind: VenueKind) -> u64 {
		match kind {
			VenueKind::ConstantProduct => self.constant_product_hop,
			VenueKind::ConcentratedLiquidity => self.concentrated_hop,
			VenueKind::StableBasket => self.stable_basket_hop,
		}
	}

	pub fn cost(&self, opportunity: &Opportunity, entry_point: EntryPoint) -> Result<u64, SelectorError> {
		let swaps: u64 = opportunity
			.hops
			.iter()
			.map(|hop| self.hop_cost(hop.kind))
			.fold(0u64, u64::saturating_add);
		let hops = opportunity.hops.len() as u64;
		match entry_point {
			EntryPoint::Minimal => {
				if hops != 2 || opportunity.hops.iter().any(|h| !h.kind.is_constant_product()) {
					return Err(SelectorError::UnsupportedEntryPoint(format!(
						"minimal entry point needs two constant-product hops, opportunity {} has {}",
						opportunity.id, hops
					)));
				}
				Ok(self.minimal_base.saturating_add(swaps))
			}
			EntryPoint::General => Ok(self
				.general_base
				.saturating_add(self.general_per_hop.saturating_mul(hops))
				.saturating_add(swaps)),
		}
	}
}

#[async_trait]
impl CostEstimator for StaticGasModel {
	async fn estimate(
		&self,
		opportunity: &Opportunity,
		entry_point: EntryPoint,
	) -> Result<u64, SelectorError> {
		self.cost(opportunity, entry_point)
	}
}

//! Single-pool adapter for concentrated-liquidity venues.
//!
//! Aux data is the pool fee tier as a 3-byte big-endian integer, in
//! hundredths of a basis point.

use arb_ledger::{VenueCall, VenueInterface};
use arb_types::VenueKind;

use crate::{AdapterError, SwapAdapter, SwapRequest};

/// Fee tiers a step may address.
pub const FEE_TIERS: [u32; 4] = [100, 500, 3000, 10000];

#[derive(Debug, Clone, Copy, Default)]
pub struct ConcentratedAdapter;

impl ConcentratedAdapter {
	pub fn fee_tier(aux: &[u8]) -> Result<u32, AdapterError> {
		let [hi, mid, lo] = aux else {
			return Err(AdapterError::InvalidAux {
				kind: VenueKind::ConcentratedLiquidity,
				reason: format!("expected 3-byte fee tier, got {} bytes", aux.len()),
			});
		};
		let tier = u32::from_be_bytes([0, *hi, *mid, *lo]);
		if !FEE_TIERS.contains(&tier) {
			return Err(AdapterError::UnsupportedFeeTier(tier));
		}
		Ok(tier)
	}
}

impl SwapAdapter for ConcentratedAdapter {
	fn kind(&self) -> VenueKind {
		VenueKind::ConcentratedLiquidity
	}

	fn check_aux(&self, aux: &[u8]) -> Result<(), AdapterError> {
		Self::fee_tier(aux).map(|_| ())
	}

	fn build_call(
		&self,
		_venue: &dyn VenueInterface,
		request: &SwapRequest<'_>,
	) -> Result<VenueCall, AdapterError> {
		Ok(VenueCall::ExactInputSingle {
			token_in: request.asset_in,
			token_out: request.asset_out,
			fee: Self::fee_tier(request.aux)?,
			recipient: request.caller,
			amount_in: request.amount_in,
			amount_out_minimum: request.min_amount_out,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_fee_tier_allow_list() {
		assert_eq!(ConcentratedAdapter::fee_tier(&[0x00, 0x0B, 0xB8]).unwrap(), 3000);
		assert_eq!(ConcentratedAdapter::fee_tier(&[0x00, 0x27, 0x10]).unwrap(), 10000);
		assert_eq!(
			ConcentratedAdapter::fee_tier(&[0x00, 0x0B, 0xB9]),
			Err(AdapterError::UnsupportedFeeTier(3001))
		);
		assert!(matches!(
			ConcentratedAdapter::fee_tier(&[0x01, 0xF4]),
			Err(AdapterError::InvalidAux { .. })
		));
	}
}

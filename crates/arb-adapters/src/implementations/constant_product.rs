//! Path-router adapter for x*y=k venues.

use arb_ledger::{VenueCall, VenueInterface};
use arb_types::VenueKind;

use crate::{AdapterError, SwapAdapter, SwapRequest};

/// Routes a single pair through the venue's path router. Takes no aux data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantProductAdapter;

impl SwapAdapter for ConstantProductAdapter {
	fn kind(&self) -> VenueKind {
		VenueKind::ConstantProduct
	}

	fn check_aux(&self, aux: &[u8]) -> Result<(), AdapterError> {
		if !aux.is_empty() {
			return Err(AdapterError::InvalidAux {
				kind: self.kind(),
				reason: format!("expected no aux data, got {} bytes", aux.len()),
			});
		}
		Ok(())
	}

	fn build_call(
		&self,
		_venue: &dyn VenueInterface,
		request: &SwapRequest<'_>,
	) -> Result<VenueCall, AdapterError> {
		Ok(VenueCall::SwapExactTokensForTokens {
			amount_in: request.amount_in,
			amount_out_min: request.min_amount_out,
			path: vec![request.asset_in, request.asset_out],
			recipient: request.caller,
			deadline: request.deadline,
		})
	}
}

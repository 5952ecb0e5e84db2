//! Indexed-pool adapter for stable-basket venues.
//!
//! Aux data is two signed bytes: the input coin index `i` and the output
//! coin index `j`.

use arb_ledger::{VenueCall, VenueInterface};
use arb_types::VenueKind;

use crate::{AdapterError, SwapAdapter, SwapRequest};

/// Coin indices must be below this bound.
pub const MAX_COINS: i8 = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct StableBasketAdapter;

impl StableBasketAdapter {
	pub fn indices(aux: &[u8]) -> Result<(i8, i8), AdapterError> {
		let [i, j] = aux else {
			return Err(AdapterError::InvalidAux {
				kind: VenueKind::StableBasket,
				reason: format!("expected 2 index bytes, got {}", aux.len()),
			});
		};
		let (i, j) = (*i as i8, *j as i8);
		if !(0..MAX_COINS).contains(&i) || !(0..MAX_COINS).contains(&j) || i == j {
			return Err(AdapterError::InvalidCoinIndex { i, j });
		}
		Ok((i, j))
	}
}

impl SwapAdapter for StableBasketAdapter {
	fn kind(&self) -> VenueKind {
		VenueKind::StableBasket
	}

	fn check_aux(&self, aux: &[u8]) -> Result<(), AdapterError> {
		Self::indices(aux).map(|_| ())
	}

	fn build_call(
		&self,
		venue: &dyn VenueInterface,
		request: &SwapRequest<'_>,
	) -> Result<VenueCall, AdapterError> {
		let (i, j) = Self::indices(request.aux)?;
		// Venues that publish their coin list must agree with the step's
		// assets at the given indices.
		let coins = venue.coins();
		if !coins.is_empty() {
			let at = |index: i8| coins.get(index as usize).copied();
			if at(i) != Some(request.asset_in) || at(j) != Some(request.asset_out) {
				return Err(AdapterError::InvalidAux {
					kind: self.kind(),
					reason: format!(
						"indices ({}, {}) do not address {} -> {}",
						i, j, request.asset_in, request.asset_out
					),
				});
			}
		}
		Ok(VenueCall::Exchange {
			i,
			j,
			dx: request.amount_in,
			min_dy: request.min_amount_out,
		})
	}
}

//! Protocol adapters.
//!
//! Each venue family has its own calling convention. An adapter turns the
//! uniform swap request `(venue, asset_in, asset_out, amount_in, aux)` into
//! the family's native call and returns the amount received.

use arb_ledger::{LedgerError, LedgerState, VenueCall, VenueInterface};
use arb_types::{Address, Classify, ErrorClass, Timestamp, VenueKind, U256};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

pub mod implementations {
	pub mod concentrated;
	pub mod constant_product;
	pub mod stable_basket;
}

pub use implementations::concentrated::{ConcentratedAdapter, FEE_TIERS};
pub use implementations::constant_product::ConstantProductAdapter;
pub use implementations::stable_basket::{StableBasketAdapter, MAX_COINS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
	#[error("Unsupported venue tag {0}")]
	UnsupportedVenue(u8),
	#[error("Invalid aux data for {kind}: {reason}")]
	InvalidAux { kind: VenueKind, reason: String },
	#[error("Fee tier {0} not in allow-list")]
	UnsupportedFeeTier(u32),
	#[error("Invalid coin indices i={i}, j={j}")]
	InvalidCoinIndex { i: i8, j: i8 },
	#[error("Venue {venue} does not speak {kind}")]
	IncompatibleVenue { venue: Address, kind: VenueKind },
	#[error(transparent)]
	Ledger(#[from] LedgerError),
}

impl Classify for AdapterError {
	fn class(&self) -> ErrorClass {
		match self {
			AdapterError::UnsupportedVenue(_)
			| AdapterError::InvalidAux { .. }
			| AdapterError::UnsupportedFeeTier(_)
			| AdapterError::InvalidCoinIndex { .. } => ErrorClass::Format,
			AdapterError::IncompatibleVenue { .. } => ErrorClass::Validation,
			AdapterError::Ledger(e) => e.class(),
		}
	}
}

/// One swap, in venue-independent terms.
#[derive(Debug, Clone)]
pub struct SwapRequest<'a> {
	/// Account that holds the input and receives the output.
	pub caller: Address,
	pub asset_in: Address,
	pub asset_out: Address,
	pub amount_in: U256,
	pub min_amount_out: U256,
	pub aux: &'a [u8],
	pub deadline: Timestamp,
}

pub trait SwapAdapter: Send + Sync {
	fn kind(&self) -> VenueKind;

	/// Validates venue-specific parameters without touching the ledger.
	fn check_aux(&self, aux: &[u8]) -> Result<(), AdapterError>;

	/// Builds the venue's native call for `request`.
	fn build_call(
		&self,
		venue: &dyn VenueInterface,
		request: &SwapRequest<'_>,
	) -> Result<VenueCall, AdapterError>;

	/// Performs the swap. The caller must already have granted `venue` an
	/// allowance of `request.amount_in`.
	fn swap(
		&self,
		ledger: &mut LedgerState,
		venue: &dyn VenueInterface,
		request: &SwapRequest<'_>,
	) -> Result<U256, AdapterError> {
		if !venue.supports(self.kind()) {
			return Err(AdapterError::IncompatibleVenue {
				venue: venue.address(),
				kind: self.kind(),
			});
		}
		self.check_aux(request.aux)?;
		let call = self.build_call(venue, request)?;
		let amount_out = venue.call(ledger, request.caller, call)?;
		debug!(
			kind = %self.kind(),
			venue = %venue.address(),
			amount_in = %request.amount_in,
			%amount_out,
			"adapter swap"
		);
		Ok(amount_out)
	}
}

/// Adapters keyed by venue tag.
pub struct AdapterSet {
	adapters: BTreeMap<u8, Box<dyn SwapAdapter>>,
}

impl AdapterSet {
	pub fn empty() -> Self {
		Self {
			adapters: BTreeMap::new(),
		}
	}

	/// One adapter per supported venue family.
	pub fn standard() -> Self {
		let mut set = Self::empty();
		set.register(Box::new(ConstantProductAdapter));
		set.register(Box::new(ConcentratedAdapter));
		set.register(Box::new(StableBasketAdapter));
		set
	}

	pub fn register(&mut self, adapter: Box<dyn SwapAdapter>) {
		self.adapters.insert(adapter.kind().tag(), adapter);
	}

	pub fn get(&self, tag: u8) -> Result<&dyn SwapAdapter, AdapterError> {
		VenueKind::from_tag(tag).map_err(|_| AdapterError::UnsupportedVenue(tag))?;
		self.adapters
			.get(&tag)
			.map(|adapter| adapter.as_ref())
			.ok_or(AdapterError::UnsupportedVenue(tag))
	}

	pub fn kinds(&self) -> Vec<VenueKind> {
		self.adapters.values().map(|adapter| adapter.kind()).collect()
	}
}

impl Default for AdapterSet {
	fn default() -> Self {
		Self::standard()
	}
}

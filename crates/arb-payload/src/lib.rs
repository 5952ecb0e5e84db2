//! Payload validation and replay protection.
//!
//! Off-ledger discovery hands the executor an ABI-encoded payload. Before
//! any funds move the validator checks, in order: network, asset rank,
//! expiry, nonce, pinned registry version and profit bound.

use arb_types::{Classify, ErrorClass, NetworkId, Timestamp, B256, U256};
use thiserror::Error;

pub mod letters;
pub mod payload;
pub mod validator;

pub use letters::NetworkLetters;
pub use payload::DecodedPayload;
pub use validator::{PayloadValidator, ReplayGuard, ValidatedPayload};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
	#[error("Payload decode failed: {0}")]
	Decode(String),
	#[error("Network letter {0:?} is not ASCII")]
	InvalidNetworkLetter(char),
	#[error("Chain mismatch: letter {letter:?} maps to {mapped:?}, runtime network is {expected}")]
	ChainMismatch {
		letter: char,
		mapped: Option<NetworkId>,
		expected: NetworkId,
	},
	#[error("Asset rank {0} has no canonical asset")]
	InvalidAssetRank(u16),
	#[error("Payload expired at {expiry}, now {now}")]
	PayloadExpired { expiry: Timestamp, now: Timestamp },
	#[error("Nonce {0} already used")]
	NonceAlreadyUsed(U256),
	#[error("Registry version mismatch: pinned {pinned}, current {current}")]
	RegistryVersionMismatch { pinned: B256, current: B256 },
	#[error("Profit bound {0} bps exceeds 10000")]
	InvalidProfitBound(u16),
}

impl Classify for PayloadError {
	fn class(&self) -> ErrorClass {
		match self {
			PayloadError::Decode(_) | PayloadError::InvalidNetworkLetter(_) => ErrorClass::Format,
			_ => ErrorClass::Validation,
		}
	}
}

//! Versioned address registry and route resolution.
//!
//! The store maps small per-network identifiers to ledger addresses. Writes
//! go through an [`AccessPolicy`] and bump a monotonic version; execution
//! only ever sees the read-only [`RegistryView`].

use arb_codec::CodecError;
use arb_types::{Address, Classify, ErrorClass};
use thiserror::Error;

pub mod policy;
pub mod resolver;
pub mod snapshot;
pub mod store;

pub use policy::AccessPolicy;
pub use resolver::{resolve_route, resolve_venue, ResolvedHop};
pub use snapshot::{AssetRow, RegistrySnapshot, VenueRow};
pub use store::{version_hash, AssetEntry, RegistryStore, RegistryView};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
	#[error("Unauthorized registry write by {0}")]
	Unauthorized(Address),
	#[error("Zero address rejected for {0}")]
	ZeroAddress(String),
	#[error("Unregistered identifier: {0}")]
	UnregisteredIdentifier(String),
	#[error(transparent)]
	Codec(#[from] CodecError),
}

impl Classify for RegistryError {
	fn class(&self) -> ErrorClass {
		match self {
			RegistryError::Unauthorized(_) => ErrorClass::Authorization,
			RegistryError::ZeroAddress(_) | RegistryError::UnregisteredIdentifier(_) => {
				ErrorClass::Validation
			}
			RegistryError::Codec(e) => e.class(),
		}
	}
}

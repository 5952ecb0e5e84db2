//! Serializable registry image for persistence across restarts.

use arb_types::{Address, AssetType, NetworkId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::policy::AccessPolicy;
use crate::store::RegistryStore;
use crate::RegistryError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRow {
	pub network: NetworkId,
	pub id: u16,
	pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRow {
	pub network: NetworkId,
	pub id: u16,
	pub asset_type: AssetType,
	pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
	pub version: u64,
	pub policy: AccessPolicy,
	pub venues: Vec<VenueRow>,
	pub assets: Vec<AssetRow>,
}

impl RegistryStore {
	pub fn snapshot(&self) -> RegistrySnapshot {
		RegistrySnapshot {
			version: self.version,
			policy: self.policy.clone(),
			venues: self
				.venues
				.iter()
				.map(|(&(network, id), &address)| VenueRow {
					network,
					id,
					address,
				})
				.collect(),
			assets: self
				.assets
				.iter()
				.map(|(&(network, id, asset_type), &address)| AssetRow {
					network,
					id,
					asset_type,
					address,
				})
				.collect(),
		}
	}

	/// Rebuilds a store from a snapshot, keeping its version so pinned
	/// version hashes stay valid.
	pub fn restore(snapshot: RegistrySnapshot) -> Result<Self, RegistryError> {
		let mut venues = BTreeMap::new();
		for row in snapshot.venues {
			if row.address.is_zero() {
				return Err(RegistryError::ZeroAddress(format!(
					"snapshot venue {} on network {}",
					row.id, row.network
				)));
			}
			venues.insert((row.network, row.id), row.address);
		}

		let mut assets = BTreeMap::new();
		for row in snapshot.assets {
			if row.address.is_zero() {
				return Err(RegistryError::ZeroAddress(format!(
					"snapshot asset {} on network {}",
					row.id, row.network
				)));
			}
			assets.insert((row.network, row.id, row.asset_type), row.address);
		}

		let mut store = RegistryStore::with_policy(snapshot.policy);
		store.venues = venues;
		store.assets = assets;
		store.version = snapshot.version;
		Ok(store)
	}
}

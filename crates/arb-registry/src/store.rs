//! Versioned registry store.

use alloy_primitives::keccak256;
use arb_types::{
	Address, ArbEvent, AssetType, EventBus, NetworkId, RegistryEvent, B256,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::policy::AccessPolicy;
use crate::RegistryError;

/// One asset row in a batch write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
	pub id: u16,
	pub asset_type: AssetType,
	pub address: Address,
}

/// Owner-mutated map of venue and asset identifiers.
#[derive(Debug)]
pub struct RegistryStore {
	pub(crate) policy: AccessPolicy,
	pub(crate) venues: BTreeMap<(NetworkId, u16), Address>,
	pub(crate) assets: BTreeMap<(NetworkId, u16, AssetType), Address>,
	pub(crate) version: u64,
	events: Option<EventBus>,
}

impl RegistryStore {
	pub fn new(owner: Address) -> Self {
		Self::with_policy(AccessPolicy::owner_only(owner))
	}

	pub fn with_policy(policy: AccessPolicy) -> Self {
		Self {
			policy,
			venues: BTreeMap::new(),
			assets: BTreeMap::new(),
			version: 0,
			events: None,
		}
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn owner(&self) -> Address {
		self.policy.owner()
	}

	pub fn policy(&self) -> &AccessPolicy {
		&self.policy
	}

	pub fn version(&self) -> u64 {
		self.version
	}

	/// `keccak256(network_be8 ‖ version_be8)`.
	pub fn version_hash(&self, network: NetworkId) -> B256 {
		version_hash(network, self.version)
	}

	pub fn view(&self) -> RegistryView<'_> {
		RegistryView { store: self }
	}

	pub fn set_venue(
		&mut self,
		caller: Address,
		network: NetworkId,
		id: u16,
		address: Address,
	) -> Result<u64, RegistryError> {
		self.set_venues(caller, network, &[(id, address)])
	}

	/// Writes every row or none; the version moves once per call.
	pub fn set_venues(
		&mut self,
		caller: Address,
		network: NetworkId,
		rows: &[(u16, Address)],
	) -> Result<u64, RegistryError> {
		self.authorize(caller)?;
		for (id, address) in rows {
			if address.is_zero() {
				return Err(RegistryError::ZeroAddress(format!(
					"venue {} on network {}",
					id, network
				)));
			}
		}
		if rows.is_empty() {
			return Ok(self.version);
		}

		self.version += 1;
		for (id, address) in rows {
			self.venues.insert((network, *id), *address);
			debug!(%network, id, %address, "venue set");
			self.publish(RegistryEvent::VenueSet {
				network,
				id: *id,
				address: *address,
				version: self.version,
			});
		}
		info!(%network, rows = rows.len(), version = self.version, "registry venues updated");
		Ok(self.version)
	}

	pub fn set_asset(
		&mut self,
		caller: Address,
		network: NetworkId,
		entry: AssetEntry,
	) -> Result<u64, RegistryError> {
		self.set_assets(caller, network, &[entry])
	}

	pub fn set_assets(
		&mut self,
		caller: Address,
		network: NetworkId,
		entries: &[AssetEntry],
	) -> Result<u64, RegistryError> {
		self.authorize(caller)?;
		for entry in entries {
			if entry.address.is_zero() {
				return Err(RegistryError::ZeroAddress(format!(
					"asset {} ({:?}) on network {}",
					entry.id, entry.asset_type, network
				)));
			}
		}
		if entries.is_empty() {
			return Ok(self.version);
		}

		self.version += 1;
		for entry in entries {
			self.assets
				.insert((network, entry.id, entry.asset_type), entry.address);
			self.publish(RegistryEvent::AssetSet {
				network,
				id: entry.id,
				asset_type: entry.asset_type,
				address: entry.address,
				version: self.version,
			});
		}
		info!(%network, rows = entries.len(), version = self.version, "registry assets updated");
		Ok(self.version)
	}

	/// Hands ownership to `new_owner`. Does not change the data version.
	pub fn transfer_ownership(
		&mut self,
		caller: Address,
		new_owner: Address,
	) -> Result<(), RegistryError> {
		if !self.policy.can_transfer(caller) {
			return Err(RegistryError::Unauthorized(caller));
		}
		if new_owner.is_zero() {
			return Err(RegistryError::ZeroAddress("registry owner".into()));
		}
		let previous = self.policy.owner();
		self.policy.set_owner(new_owner);
		info!(%previous, owner = %new_owner, "registry ownership transferred");
		self.publish(RegistryEvent::OwnershipTransferred {
			previous,
			owner: new_owner,
		});
		Ok(())
	}

	fn authorize(&self, caller: Address) -> Result<(), RegistryError> {
		if self.policy.can_write(caller) {
			Ok(())
		} else {
			Err(RegistryError::Unauthorized(caller))
		}
	}

	fn publish(&self, event: RegistryEvent) {
		if let Some(events) = &self.events {
			events.publish(ArbEvent::Registry(event));
		}
	}
}

pub fn version_hash(network: NetworkId, version: u64) -> B256 {
	let mut preimage = [0u8; 16];
	preimage[..8].copy_from_slice(&network.0.to_be_bytes());
	preimage[8..].copy_from_slice(&version.to_be_bytes());
	keccak256(preimage)
}

/// Read-only handle used during execution.
#[derive(Debug, Clone, Copy)]
pub struct RegistryView<'a> {
	store: &'a RegistryStore,
}

impl<'a> RegistryView<'a> {
	pub fn venue(&self, network: NetworkId, id: u16) -> Option<Address> {
		self.store.venues.get(&(network, id)).copied()
	}

	pub fn asset(&self, network: NetworkId, id: u16, asset_type: AssetType) -> Option<Address> {
		self.store.assets.get(&(network, id, asset_type)).copied()
	}

	pub fn version(&self) -> u64 {
		self.store.version
	}

	pub fn version_hash(&self, network: NetworkId) -> B256 {
		self.store.version_hash(network)
	}
}

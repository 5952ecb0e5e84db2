//! Turns routes into concrete per-hop addresses.

use arb_codec::Route;
use arb_types::{Address, Bytes, NetworkId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::store::RegistryView;
use crate::RegistryError;

/// A route hop with every identifier replaced by a ledger address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedHop {
	/// Raw protocol tag, mapped to a venue kind by the dispatcher.
	pub protocol: u8,
	pub venue: Address,
	pub asset_out: Address,
	pub aux: Bytes,
}

/// Looks up the venue a plan step addresses by tag on `network`.
pub fn resolve_venue(
	view: &RegistryView<'_>,
	network: NetworkId,
	venue_id: u16,
) -> Result<Address, RegistryError> {
	view.venue(network, venue_id).ok_or_else(|| {
		RegistryError::UnregisteredIdentifier(format!(
			"venue {} on network {}",
			venue_id, network
		))
	})
}

/// Resolves every hop of `route`. Either every hop resolves or an error is
/// returned.
pub fn resolve_route(
	route: &Route,
	view: &RegistryView<'_>,
	network: NetworkId,
) -> Result<Vec<ResolvedHop>, RegistryError> {
	let hops = route.check_shape()?;
	let mut resolved = Vec::with_capacity(hops);

	match route {
		Route::Explicit(route) => {
			for index in 0..hops {
				let venue = route.venues[index];
				let asset_out = route.outputs[index];
				if venue.is_zero() || asset_out.is_zero() {
					return Err(RegistryError::UnregisteredIdentifier(format!(
						"zero address at hop {}",
						index
					)));
				}
				resolved.push(ResolvedHop {
					protocol: route.protocols[index],
					venue,
					asset_out,
					aux: route.aux[index].clone(),
				});
			}
		}
		Route::Registry(route) => {
			for index in 0..hops {
				let venue = resolve_venue(view, network, route.venue_ids[index])?;
				let asset_type = route.asset_types[index];
				let asset_id = route.asset_ids[index];
				let asset_out = view.asset(network, asset_id, asset_type).ok_or_else(|| {
					RegistryError::UnregisteredIdentifier(format!(
						"asset {} ({:?}) on network {}",
						asset_id, asset_type, network
					))
				})?;
				resolved.push(ResolvedHop {
					protocol: route.protocols[index],
					venue,
					asset_out,
					aux: route.aux[index].clone(),
				});
			}
		}
	}

	debug!(hops, version = view.version(), "route resolved");
	Ok(resolved)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::{AssetEntry, RegistryStore};
	use arb_codec::{CodecError, ExplicitRoute, RegistryRoute};
	use arb_types::AssetType;

	const NET: NetworkId = NetworkId::ETHEREUM;

	fn addr(byte: u8) -> Address {
		Address::repeat_byte(byte)
	}

	fn store() -> RegistryStore {
		let owner = addr(0xFF);
		let mut store = RegistryStore::new(owner);
		store
			.set_venues(owner, NET, &[(0, addr(0x10)), (1, addr(0x11))])
			.unwrap();
		store
			.set_assets(
				owner,
				NET,
				&[
					AssetEntry {
						id: 0,
						asset_type: AssetType::Canonical,
						address: addr(0xAA),
					},
					AssetEntry {
						id: 1,
						asset_type: AssetType::Bridged,
						address: addr(0xBB),
					},
				],
			)
			.unwrap();
		store
	}

	fn registry_route(asset_types: Vec<AssetType>) -> Route {
		Route::Registry(RegistryRoute {
			protocols: vec![0, 0],
			venue_ids: vec![0, 1],
			asset_ids: vec![1, 0],
			asset_types,
			aux: vec![Bytes::new(), Bytes::new()],
		})
	}

	#[test]
	fn test_registry_route_resolves_through_view() {
		let store = store();
		let hops = resolve_route(
			&registry_route(vec![AssetType::Bridged, AssetType::Canonical]),
			&store.view(),
			NET,
		)
		.unwrap();
		assert_eq!(hops.len(), 2);
		assert_eq!(hops[0].venue, addr(0x10));
		assert_eq!(hops[0].asset_out, addr(0xBB));
		assert_eq!(hops[1].venue, addr(0x11));
		assert_eq!(hops[1].asset_out, addr(0xAA));
	}

	#[test]
	fn test_registry_miss_is_unregistered() {
		let store = store();
		// asset 1 exists only as Bridged
		let err = resolve_route(
			&registry_route(vec![AssetType::Canonical, AssetType::Canonical]),
			&store.view(),
			NET,
		)
		.unwrap_err();
		assert!(matches!(err, RegistryError::UnregisteredIdentifier(_)));

		let err = resolve_route(
			&registry_route(vec![AssetType::Bridged, AssetType::Canonical]),
			&store.view(),
			NetworkId::BASE,
		)
		.unwrap_err();
		assert!(matches!(err, RegistryError::UnregisteredIdentifier(_)));
	}

	#[test]
	fn test_explicit_route_checks() {
		let store = store();
		let mut route = ExplicitRoute {
			protocols: vec![0],
			venues: vec![addr(0x42)],
			outputs: vec![addr(0xAA)],
			aux: vec![Bytes::new()],
		};
		let hops = resolve_route(&Route::Explicit(route.clone()), &store.view(), NET).unwrap();
		assert_eq!(hops[0].venue, addr(0x42));

		route.venues[0] = Address::ZERO;
		assert!(matches!(
			resolve_route(&Route::Explicit(route.clone()), &store.view(), NET),
			Err(RegistryError::UnregisteredIdentifier(_))
		));

		route.aux.push(Bytes::new());
		assert!(matches!(
			resolve_route(&Route::Explicit(route), &store.view(), NET),
			Err(RegistryError::Codec(CodecError::RouteLengthMismatch { .. }))
		));
	}
}

//! Route encodings.
//!
//! A route is `mode byte ‖ abi_encode(body)`. Mode 0 carries explicit venue
//! and output-asset addresses; mode 1 carries small per-network registry ids
//! that are resolved against the registry at execution time. All sibling
//! sequences must have the same length.

use alloy_sol_types::{sol, SolValue};
use arb_types::{Address, AssetType, Bytes, MAX_STEPS};
use serde::{Deserialize, Serialize};

use crate::CodecError;

pub const MODE_EXPLICIT: u8 = 0;
pub const MODE_REGISTRY: u8 = 1;

sol! {
	struct ExplicitRouteAbi {
		uint8[] protocols;
		address[] venues;
		address[] outputs;
		bytes[] aux;
	}

	struct RegistryRouteAbi {
		uint8[] protocols;
		uint16[] venue_ids;
		uint16[] asset_ids;
		uint8[] asset_types;
		bytes[] aux;
	}
}

/// Route with concrete ledger addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitRoute {
	pub protocols: Vec<u8>,
	pub venues: Vec<Address>,
	pub outputs: Vec<Address>,
	pub aux: Vec<Bytes>,
}

/// Route expressed as registry identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRoute {
	pub protocols: Vec<u8>,
	pub venue_ids: Vec<u16>,
	pub asset_ids: Vec<u16>,
	pub asset_types: Vec<AssetType>,
	pub aux: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
	Explicit(ExplicitRoute),
	Registry(RegistryRoute),
}

fn same_len(field: &'static str, expected: usize, actual: usize) -> Result<(), CodecError> {
	if expected != actual {
		return Err(CodecError::RouteLengthMismatch {
			field,
			expected,
			actual,
		});
	}
	Ok(())
}

impl Route {
	pub fn mode(&self) -> u8 {
		match self {
			Route::Explicit(_) => MODE_EXPLICIT,
			Route::Registry(_) => MODE_REGISTRY,
		}
	}

	pub fn protocols(&self) -> &[u8] {
		match self {
			Route::Explicit(route) => &route.protocols,
			Route::Registry(route) => &route.protocols,
		}
	}

	/// Checks that all sibling sequences agree and the hop count is within
	/// bounds. Returns the hop count.
	pub fn check_shape(&self) -> Result<usize, CodecError> {
		let hops = self.protocols().len();
		match self {
			Route::Explicit(route) => {
				same_len("venues", hops, route.venues.len())?;
				same_len("outputs", hops, route.outputs.len())?;
				same_len("aux", hops, route.aux.len())?;
			}
			Route::Registry(route) => {
				same_len("venue_ids", hops, route.venue_ids.len())?;
				same_len("asset_ids", hops, route.asset_ids.len())?;
				same_len("asset_types", hops, route.asset_types.len())?;
				same_len("aux", hops, route.aux.len())?;
			}
		}
		if hops == 0 || hops > MAX_STEPS {
			return Err(CodecError::malformed(format!(
				"route has {} hops, expected 1..={}",
				hops, MAX_STEPS
			)));
		}
		Ok(hops)
	}

	/// Serializes the route without judging its shape; decoding is where
	/// malformed routes are rejected.
	pub fn encode(&self) -> Vec<u8> {
		let body = match self {
			Route::Explicit(route) => ExplicitRouteAbi {
				protocols: route.protocols.clone(),
				venues: route.venues.clone(),
				outputs: route.outputs.clone(),
				aux: route.aux.clone(),
			}
			.abi_encode(),
			Route::Registry(route) => RegistryRouteAbi {
				protocols: route.protocols.clone(),
				venue_ids: route.venue_ids.clone(),
				asset_ids: route.asset_ids.clone(),
				asset_types: route.asset_types.iter().map(|t| t.tag()).collect(),
				aux: route.aux.clone(),
			}
			.abi_encode(),
		};

		let mut out = Vec::with_capacity(1 + body.len());
		out.push(self.mode());
		out.extend_from_slice(&body);
		out
	}

	pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
		let (mode, body) = buf
			.split_first()
			.ok_or_else(|| CodecError::malformed("empty route"))?;

		let route = match *mode {
			MODE_EXPLICIT => {
				let abi = ExplicitRouteAbi::abi_decode(body)
					.map_err(|e| CodecError::malformed(format!("explicit route body: {}", e)))?;
				Route::Explicit(ExplicitRoute {
					protocols: abi.protocols,
					venues: abi.venues,
					outputs: abi.outputs,
					aux: abi.aux,
				})
			}
			MODE_REGISTRY => {
				let abi = RegistryRouteAbi::abi_decode(body)
					.map_err(|e| CodecError::malformed(format!("registry route body: {}", e)))?;
				// Length first so a short type array reports as a mismatch.
				same_len("asset_types", abi.protocols.len(), abi.asset_types.len())?;
				let asset_types = abi
					.asset_types
					.iter()
					.map(|tag| AssetType::from_tag(*tag))
					.collect::<Result<Vec<_>, _>>()
					.map_err(|e| CodecError::malformed(e.to_string()))?;
				Route::Registry(RegistryRoute {
					protocols: abi.protocols,
					venue_ids: abi.venue_ids,
					asset_ids: abi.asset_ids,
					asset_types,
					aux: abi.aux,
				})
			}
			other => {
				return Err(CodecError::malformed(format!(
					"unknown route mode {}",
					other
				)))
			}
		};

		route.check_shape()?;
		Ok(route)
	}
}

//! Self-describing instruction bytes.
//!
//! The first byte selects the encoding: `0x00`/`0x01` are route modes,
//! `0x10` is the plan format version. Any other leading byte is rejected.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::plan::{Plan, HEADER_LEN, PLAN_FORMAT_V1, STEP_FIXED_LEN};
use crate::route::{Route, MODE_EXPLICIT, MODE_REGISTRY};
use crate::CodecError;

/// Smallest route buffer: mode byte plus the ABI head word.
pub const MIN_ROUTE_LEN: usize = 1 + 32;
/// Smallest plan buffer: header plus one step without aux data.
pub const MIN_PLAN_LEN: usize = HEADER_LEN + STEP_FIXED_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instructions {
	Plan(Plan),
	Route(Route),
}

impl Instructions {
	pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
		match self {
			Instructions::Plan(plan) => plan.encode(),
			Instructions::Route(route) => Ok(route.encode()),
		}
	}

	pub fn hop_count(&self) -> usize {
		match self {
			Instructions::Plan(plan) => plan.steps.len(),
			Instructions::Route(route) => route.protocols().len(),
		}
	}
}

/// True when the buffer is too short to hold any valid payload of the kind
/// its leading byte announces. Sessions treat this as a precondition failure.
pub fn is_undersized(bytes: &[u8]) -> bool {
	match bytes.first() {
		None => true,
		Some(&PLAN_FORMAT_V1) => bytes.len() < MIN_PLAN_LEN,
		Some(_) => bytes.len() < MIN_ROUTE_LEN,
	}
}

pub fn decode_instructions(bytes: &[u8]) -> Result<Instructions, CodecError> {
	let instructions = match bytes.first() {
		Some(&PLAN_FORMAT_V1) => Instructions::Plan(Plan::decode(bytes)?),
		Some(&MODE_EXPLICIT) | Some(&MODE_REGISTRY) => Instructions::Route(Route::decode(bytes)?),
		Some(other) => {
			return Err(CodecError::malformed(format!(
				"unknown instruction prefix {:#04x}",
				other
			)))
		}
		None => return Err(CodecError::malformed("empty instructions")),
	};
	debug!(
		len = bytes.len(),
		hops = instructions.hop_count(),
		"decoded instructions"
	);
	Ok(instructions)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::plan::{PlanHeader, Step};
	use crate::route::ExplicitRoute;
	use arb_types::{Address, Bytes, U256};

	fn plan() -> Plan {
		Plan::new(
			PlanHeader {
				deadline: 100,
				base_asset: Address::ZERO,
				min_profit: U256::ZERO,
			},
			vec![Step {
				venue_tag: 0,
				action: 0,
				asset_in: Address::repeat_byte(1),
				asset_out: Address::repeat_byte(2),
				amount_in: U256::ZERO,
				min_amount_out: U256::ZERO,
				aux: Bytes::new(),
			}],
		)
	}

	#[test]
	fn test_dispatch_on_leading_byte() {
		let encoded = plan().encode().unwrap();
		assert!(matches!(
			decode_instructions(&encoded).unwrap(),
			Instructions::Plan(_)
		));

		let route = Route::Explicit(ExplicitRoute {
			protocols: vec![0],
			venues: vec![Address::repeat_byte(9)],
			outputs: vec![Address::repeat_byte(2)],
			aux: vec![Bytes::new()],
		});
		let decoded = decode_instructions(&route.encode()).unwrap();
		assert_eq!(decoded, Instructions::Route(route));

		assert!(decode_instructions(&hex::decode("ff00").unwrap()).is_err());
		assert!(decode_instructions(&[]).is_err());
	}

	#[test]
	fn test_undersized_thresholds() {
		assert!(is_undersized(&[]));
		let encoded = plan().encode().unwrap();
		assert_eq!(encoded.len(), MIN_PLAN_LEN);
		assert!(!is_undersized(&encoded));
		assert!(is_undersized(&encoded[..MIN_PLAN_LEN - 1]));
		assert!(is_undersized(&[MODE_REGISTRY; 32]));
		assert!(!is_undersized(&[MODE_REGISTRY; 33]));
	}
}

//! Wire form of a discovery payload.

use alloy_sol_types::{sol, SolValue};
use arb_types::{Address, Bytes, Timestamp, B256, U256};
use serde::{Deserialize, Serialize};

use crate::PayloadError;

sol! {
	struct PayloadAbi {
		uint8 network;
		uint16 assetRank;
		uint256 amount;
		bytes routeParams;
		uint16 minProfitBps;
		uint64 expiry;
		address recipient;
		bytes32 registryVersionHash;
		uint256 nonce;
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPayload {
	/// ASCII network letter.
	pub network: char,
	/// Registry id of the canonical loan asset.
	pub asset_rank: u16,
	pub amount: U256,
	/// Instruction bytes handed to the loan session.
	pub route_params: Bytes,
	pub min_profit_bps: u16,
	pub expiry: Timestamp,
	/// Where profit is swept; zero means the executor's default.
	pub recipient: Address,
	/// Zero means "not pinned".
	pub registry_version_hash: B256,
	pub nonce: U256,
}

impl DecodedPayload {
	pub fn encode(&self) -> Result<Vec<u8>, PayloadError> {
		let network = u8::try_from(self.network)
			.ok()
			.filter(u8::is_ascii)
			.ok_or(PayloadError::InvalidNetworkLetter(self.network))?;
		Ok(PayloadAbi {
			network,
			assetRank: self.asset_rank,
			amount: self.amount,
			routeParams: self.route_params.clone(),
			minProfitBps: self.min_profit_bps,
			expiry: self.expiry,
			recipient: self.recipient,
			registryVersionHash: self.registry_version_hash,
			nonce: self.nonce,
		}
		.abi_encode())
	}

	pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
		let abi = PayloadAbi::abi_decode(bytes).map_err(|e| PayloadError::Decode(e.to_string()))?;
		Ok(Self {
			network: char::from(abi.network),
			asset_rank: abi.assetRank,
			amount: abi.amount,
			route_params: abi.routeParams,
			min_profit_bps: abi.minProfitBps,
			expiry: abi.expiry,
			recipient: abi.recipient,
			registry_version_hash: abi.registryVersionHash,
			nonce: abi.nonce,
		})
	}

	/// Minimum profit implied by the bps bound on `amount`.
	pub fn profit_floor(&self) -> U256 {
		self.amount.saturating_mul(U256::from(self.min_profit_bps)) / U256::from(10_000u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trip_and_floor() {
		let payload = DecodedPayload {
			network: 'A',
			asset_rank: 1,
			amount: U256::from(1_000_000u64),
			route_params: Bytes::from_static(&[0x01, 0x02]),
			min_profit_bps: 25,
			expiry: 1_700_000_000,
			recipient: Address::repeat_byte(0x77),
			registry_version_hash: B256::repeat_byte(0x11),
			nonce: U256::from(42u64),
		};
		let decoded = DecodedPayload::decode(&payload.encode().unwrap()).unwrap();
		assert_eq!(decoded, payload);
		assert_eq!(decoded.profit_floor(), U256::from(2_500u64));
	}

	#[test]
	fn test_non_ascii_letter_is_not_truncated() {
		for letter in ['é', 'Ā'] {
			let payload = DecodedPayload {
				network: letter,
				asset_rank: 0,
				amount: U256::from(1u64),
				route_params: Bytes::new(),
				min_profit_bps: 0,
				expiry: 0,
				recipient: Address::ZERO,
				registry_version_hash: B256::ZERO,
				nonce: U256::ZERO,
			};
			assert_eq!(
				payload.encode(),
				Err(PayloadError::InvalidNetworkLetter(letter))
			);
		}
	}

	#[test]
	fn test_garbage_is_decode_error() {
		let bytes = hex::decode("deadbeef").unwrap();
		assert!(matches!(
			DecodedPayload::decode(&bytes),
			Err(PayloadError::Decode(_))
		));
	}
}

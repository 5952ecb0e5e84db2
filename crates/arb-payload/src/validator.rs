//! Ordered payload checks and the replay set.

use arb_registry::RegistryView;
use arb_types::{
	Address, ArbEvent, AssetType, EventBus, NetworkId, PayloadEvent, Timestamp, B256,
	BPS_DENOMINATOR, U256,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::letters::NetworkLetters;
use crate::payload::DecodedPayload;
use crate::PayloadError;

/// Set of consumed nonces. Only ever grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayGuard {
	used: BTreeSet<U256>,
}

impl ReplayGuard {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_used(&self, nonce: &U256) -> bool {
		self.used.contains(nonce)
	}

	/// Returns false if the nonce was already recorded.
	pub fn mark(&mut self, nonce: U256) -> bool {
		self.used.insert(nonce)
	}

	pub fn len(&self) -> usize {
		self.used.len()
	}

	pub fn is_empty(&self) -> bool {
		self.used.is_empty()
	}
}

/// A payload that passed every check, with its identifiers resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPayload {
	pub payload: DecodedPayload,
	pub network: NetworkId,
	/// Canonical asset registered under the payload's rank.
	pub asset: Address,
}

impl ValidatedPayload {
	pub fn nonce(&self) -> U256 {
		self.payload.nonce
	}
}

#[derive(Debug)]
pub struct PayloadValidator {
	network: NetworkId,
	letters: NetworkLetters,
	replay: ReplayGuard,
	events: Option<EventBus>,
}

impl PayloadValidator {
	pub fn new(network: NetworkId) -> Self {
		Self::with_letters(network, NetworkLetters::default())
	}

	pub fn with_letters(network: NetworkId, letters: NetworkLetters) -> Self {
		Self {
			network,
			letters,
			replay: ReplayGuard::new(),
			events: None,
		}
	}

	pub fn with_replay_guard(mut self, replay: ReplayGuard) -> Self {
		self.replay = replay;
		self
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn network(&self) -> NetworkId {
		self.network
	}

	pub fn replay_guard(&self) -> &ReplayGuard {
		&self.replay
	}

	/// Runs every check without consuming the nonce.
	pub fn check(
		&self,
		payload: &DecodedPayload,
		registry: &RegistryView<'_>,
		now: Timestamp,
	) -> Result<ValidatedPayload, PayloadError> {
		self.check_on(payload, registry, now, self.network)
	}

	/// Like [`check`](Self::check), against the network the caller is
	/// actually executing on. Fails with `ChainMismatch` unless the payload
	/// letter, this validator and `runtime` all agree.
	pub fn check_on(
		&self,
		payload: &DecodedPayload,
		registry: &RegistryView<'_>,
		now: Timestamp,
		runtime: NetworkId,
	) -> Result<ValidatedPayload, PayloadError> {
		let result = self.run_checks(payload, registry, now, runtime);
		if let Err(e) = &result {
			warn!(nonce = %payload.nonce, error = %e, "payload rejected");
			self.publish(PayloadEvent::Rejected {
				reason: e.to_string(),
			});
		}
		result
	}

	/// Records the nonce of a payload whose execution committed.
	pub fn commit(&mut self, validated: &ValidatedPayload) -> Result<(), PayloadError> {
		let nonce = validated.nonce();
		if !self.replay.mark(nonce) {
			return Err(PayloadError::NonceAlreadyUsed(nonce));
		}
		debug!(%nonce, "nonce consumed");
		self.publish(PayloadEvent::Accepted {
			network: validated.network,
			nonce,
		});
		Ok(())
	}

	/// `check` followed by `commit`.
	pub fn validate(
		&mut self,
		payload: &DecodedPayload,
		registry: &RegistryView<'_>,
		now: Timestamp,
	) -> Result<ValidatedPayload, PayloadError> {
		let validated = self.check(payload, registry, now)?;
		self.commit(&validated)?;
		Ok(validated)
	}

	fn run_checks(
		&self,
		payload: &DecodedPayload,
		registry: &RegistryView<'_>,
		now: Timestamp,
		runtime: NetworkId,
	) -> Result<ValidatedPayload, PayloadError> {
		let mapped = self.letters.get(payload.network);
		if mapped != Some(runtime) || self.network != runtime {
			return Err(PayloadError::ChainMismatch {
				letter: payload.network,
				mapped,
				expected: runtime,
			});
		}

		let asset = registry
			.asset(self.network, payload.asset_rank, AssetType::Canonical)
			.ok_or(PayloadError::InvalidAssetRank(payload.asset_rank))?;

		if now > payload.expiry {
			return Err(PayloadError::PayloadExpired {
				expiry: payload.expiry,
				now,
			});
		}

		if self.replay.is_used(&payload.nonce) {
			return Err(PayloadError::NonceAlreadyUsed(payload.nonce));
		}

		if payload.registry_version_hash != B256::ZERO {
			let current = registry.version_hash(self.network);
			if payload.registry_version_hash != current {
				return Err(PayloadError::RegistryVersionMismatch {
					pinned: payload.registry_version_hash,
					current,
				});
			}
		}

		if u64::from(payload.min_profit_bps) > BPS_DENOMINATOR {
			return Err(PayloadError::InvalidProfitBound(payload.min_profit_bps));
		}

		Ok(ValidatedPayload {
			payload: payload.clone(),
			network: self.network,
			asset,
		})
	}

	fn publish(&self, event: PayloadEvent) {
		if let Some(events) = &self.events {
			events.publish(ArbEvent::Payload(event));
		}
	}
}

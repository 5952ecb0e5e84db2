//! Execution events and the broadcast bus that carries them.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Address, AssetType, EntryPoint, ErrorClass, NetworkId, ProviderKind, U256};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArbEvent {
	Session(SessionEvent),
	Registry(RegistryEvent),
	Payload(PayloadEvent),
	Selection(SelectionEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
	/// Completion record of a committed session.
	Completed {
		provider: ProviderKind,
		asset: Address,
		principal: U256,
		fee: U256,
		profit: U256,
	},
	/// The session aborted and the transaction was rolled back.
	Aborted {
		provider: ProviderKind,
		asset: Address,
		class: ErrorClass,
		reason: String,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryEvent {
	VenueSet {
		network: NetworkId,
		id: u16,
		address: Address,
		version: u64,
	},
	AssetSet {
		network: NetworkId,
		id: u16,
		asset_type: AssetType,
		address: Address,
		version: u64,
	},
	OwnershipTransferred {
		previous: Address,
		owner: Address,
	},
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PayloadEvent {
	Accepted { network: NetworkId, nonce: U256 },
	Rejected { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SelectionEvent {
	Selected {
		opportunity_id: String,
		entry_point: EntryPoint,
		gate: u8,
	},
}

pub struct EventBus {
	sender: broadcast::Sender<ArbEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ArbEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Having no subscribers is not an error.
	pub fn publish(&self, event: ArbEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

impl std::fmt::Debug for EventBus {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventBus")
			.field("subscribers", &self.sender.receiver_count())
			.finish()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(256)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_publish_reaches_subscriber() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		bus.publish(ArbEvent::Payload(PayloadEvent::Rejected {
			reason: "expired".into(),
		}));
		match rx.try_recv().unwrap() {
			ArbEvent::Payload(PayloadEvent::Rejected { reason }) => assert_eq!(reason, "expired"),
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[test]
	fn test_publish_without_subscribers_is_silent() {
		let bus = EventBus::default();
		bus.publish(ArbEvent::Registry(RegistryEvent::OwnershipTransferred {
			previous: Address::ZERO,
			owner: Address::repeat_byte(1),
		}));
	}
}

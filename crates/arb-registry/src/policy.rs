//! Write access to the registry.

use arb_types::Address;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Decides who may mutate the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AccessPolicy {
	/// Only the owner writes.
	OwnerOnly { owner: Address },
	/// The owner plus a fixed set of operators write. Only the owner may
	/// transfer ownership.
	Operators {
		owner: Address,
		operators: BTreeSet<Address>,
	},
}

impl AccessPolicy {
	pub fn owner_only(owner: Address) -> Self {
		AccessPolicy::OwnerOnly { owner }
	}

	pub fn owner(&self) -> Address {
		match self {
			AccessPolicy::OwnerOnly { owner } | AccessPolicy::Operators { owner, .. } => *owner,
		}
	}

	pub fn can_write(&self, caller: Address) -> bool {
		match self {
			AccessPolicy::OwnerOnly { owner } => caller == *owner,
			AccessPolicy::Operators { owner, operators } => {
				caller == *owner || operators.contains(&caller)
			}
		}
	}

	pub fn can_transfer(&self, caller: Address) -> bool {
		caller == self.owner()
	}

	pub(crate) fn set_owner(&mut self, new_owner: Address) {
		match self {
			AccessPolicy::OwnerOnly { owner } | AccessPolicy::Operators { owner, .. } => {
				*owner = new_owner
			}
		}
	}
}

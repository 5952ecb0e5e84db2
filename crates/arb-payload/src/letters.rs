//! Single-letter network codes carried in payloads.

use arb_types::NetworkId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maps uppercase ASCII letters to network ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkLetters {
	table: BTreeMap<char, NetworkId>,
}

impl NetworkLetters {
	pub fn empty() -> Self {
		Self {
			table: BTreeMap::new(),
		}
	}

	/// Adds or replaces a mapping. Returns false for letters outside `A..=Z`.
	pub fn insert(&mut self, letter: char, network: NetworkId) -> bool {
		if !letter.is_ascii_uppercase() {
			return false;
		}
		self.table.insert(letter, network);
		true
	}

	pub fn get(&self, letter: char) -> Option<NetworkId> {
		self.table.get(&letter).copied()
	}

	/// Reverse lookup, used when building payloads.
	pub fn letter_for(&self, network: NetworkId) -> Option<char> {
		self.table
			.iter()
			.find(|(_, id)| **id == network)
			.map(|(letter, _)| *letter)
	}

	pub fn len(&self) -> usize {
		self.table.len()
	}

	pub fn is_empty(&self) -> bool {
		self.table.is_empty()
	}
}

impl Default for NetworkLetters {
	fn default() -> Self {
		let mut letters = Self::empty();
		for (letter, network) in [
			('E', NetworkId::ETHEREUM),
			('P', NetworkId::POLYGON),
			('A', NetworkId::ARBITRUM),
			('O', NetworkId::OPTIMISM),
			('B', NetworkId::BASE),
			('N', NetworkId::BSC),
			('V', NetworkId::AVALANCHE),
			('F', NetworkId::FANTOM),
			('L', NetworkId::LINEA),
			('S', NetworkId::SCROLL),
			('M', NetworkId::MANTLE),
			('Z', NetworkId::ZKSYNC),
			('C', NetworkId::CELO),
		] {
			letters.insert(letter, network);
		}
		letters
	}
}

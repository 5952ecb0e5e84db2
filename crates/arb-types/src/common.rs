//! Common types used throughout the executor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// Re-export commonly used ethereum types
pub use alloy_primitives::{Address, Bytes, B256, U256};

/// Timestamp (Unix seconds)
pub type Timestamp = u64;

/// Maximum number of swap steps (or route hops) in one execution.
pub const MAX_STEPS: usize = 8;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Network identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NetworkId(pub u64);

impl NetworkId {
	pub const ETHEREUM: Self = Self(1);
	pub const OPTIMISM: Self = Self(10);
	pub const BSC: Self = Self(56);
	pub const POLYGON: Self = Self(137);
	pub const FANTOM: Self = Self(250);
	pub const ZKSYNC: Self = Self(324);
	pub const MANTLE: Self = Self(5000);
	pub const BASE: Self = Self(8453);
	pub const ARBITRUM: Self = Self(42161);
	pub const CELO: Self = Self(42220);
	pub const AVALANCHE: Self = Self(43114);
	pub const LINEA: Self = Self(59144);
	pub const SCROLL: Self = Self(534352);
}

impl fmt::Display for NetworkId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for NetworkId {
	type Err = std::num::ParseIntError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(NetworkId(s.parse()?))
	}
}

/// Raised when a wire-level identifier has no matching variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TagError {
	#[error("unknown venue tag {0}")]
	Venue(u8),
	#[error("unknown provider selector {0}")]
	Provider(u8),
	#[error("unknown asset type {0}")]
	AssetType(u8),
}

/// Exchange-mechanism family of a venue.
///
/// On the wire this is a raw `u8` (the registry's id space is open ended);
/// inside the executor it is a closed set and unknown tags are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
	/// Two-asset path router over x*y=k pools.
	ConstantProduct,
	/// Single-pool router parameterised by a fee tier.
	ConcentratedLiquidity,
	/// Indexed multi-coin pool.
	StableBasket,
}

impl VenueKind {
	pub const ALL: [VenueKind; 3] = [
		VenueKind::ConstantProduct,
		VenueKind::ConcentratedLiquidity,
		VenueKind::StableBasket,
	];

	pub fn tag(self) -> u8 {
		match self {
			VenueKind::ConstantProduct => 0,
			VenueKind::ConcentratedLiquidity => 1,
			VenueKind::StableBasket => 2,
		}
	}

	pub fn from_tag(tag: u8) -> Result<Self, TagError> {
		match tag {
			0 => Ok(VenueKind::ConstantProduct),
			1 => Ok(VenueKind::ConcentratedLiquidity),
			2 => Ok(VenueKind::StableBasket),
			other => Err(TagError::Venue(other)),
		}
	}

	/// Whether the minimal two-venue entry point can drive this venue.
	pub fn is_constant_product(self) -> bool {
		matches!(self, VenueKind::ConstantProduct)
	}
}

impl fmt::Display for VenueKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			VenueKind::ConstantProduct => "constant-product",
			VenueKind::ConcentratedLiquidity => "concentrated-liquidity",
			VenueKind::StableBasket => "stable-basket",
		};
		f.write_str(name)
	}
}

/// Shape of the loan provider's settlement protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
	/// Provider pushes funds, calls back once and pulls principal + fee
	/// through an allowance granted during the callback.
	PushSettlement,
	/// Provider pushes funds and calls back; the boolean return signals
	/// success, after which principal + premium are pulled.
	PullSimple,
}

impl ProviderKind {
	pub fn selector(self) -> u8 {
		match self {
			ProviderKind::PushSettlement => 0,
			ProviderKind::PullSimple => 1,
		}
	}

	pub fn from_selector(selector: u8) -> Result<Self, TagError> {
		match selector {
			0 => Ok(ProviderKind::PushSettlement),
			1 => Ok(ProviderKind::PullSimple),
			other => Err(TagError::Provider(other)),
		}
	}
}

impl fmt::Display for ProviderKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProviderKind::PushSettlement => f.write_str("push-settlement"),
			ProviderKind::PullSimple => f.write_str("pull-simple"),
		}
	}
}

/// Disambiguates registry asset rows sharing one id, e.g. a network's
/// canonical stablecoin and its bridged variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
	Canonical,
	Bridged,
	Wrapped,
}

impl AssetType {
	pub fn tag(self) -> u8 {
		match self {
			AssetType::Canonical => 0,
			AssetType::Bridged => 1,
			AssetType::Wrapped => 2,
		}
	}

	pub fn from_tag(tag: u8) -> Result<Self, TagError> {
		match tag {
			0 => Ok(AssetType::Canonical),
			1 => Ok(AssetType::Bridged),
			2 => Ok(AssetType::Wrapped),
			other => Err(TagError::AssetType(other)),
		}
	}
}

/// On-ledger entry point a transaction is submitted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
	/// Two constant-product venues, two-asset round trip only.
	Minimal,
	/// Any venue mix, up to `MAX_STEPS` hops.
	General,
}

impl fmt::Display for EntryPoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EntryPoint::Minimal => f.write_str("minimal"),
			EntryPoint::General => f.write_str("general"),
		}
	}
}

/// Parses a decimal or `0x`-prefixed hex amount.
pub fn parse_amount(value: &str) -> Result<U256, String> {
	let trimmed = value.trim();
	let parsed = if let Some(hex) = trimmed.strip_prefix("0x") {
		U256::from_str_radix(hex, 16)
	} else {
		U256::from_str_radix(trimmed, 10)
	};
	parsed.map_err(|e| format!("invalid amount '{}': {}", value, e))
}

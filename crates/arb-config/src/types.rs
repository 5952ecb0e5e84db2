//! Configuration types.

use arb_selector::{LoanSizer, StaticGasModel};
use arb_types::{Address, AssetType, NetworkId, VenueKind, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::serde_helpers;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbConfig {
	#[serde(default = "default_log_level")]
	pub log_level: String,
	pub engine: EngineConfig,
	pub lenders: LendersConfig,
	pub registry: RegistryConfig,
	#[serde(default)]
	pub selector: SelectorConfig,
	#[serde(default)]
	pub sizing: LoanSizer,
	/// Payload network letters, e.g. `E = 1`. Replaces the built-in table
	/// when non-empty.
	#[serde(default)]
	pub networks: BTreeMap<String, u64>,
	#[serde(default)]
	pub ledger: LedgerConfig,
	#[serde(default)]
	pub storage: StorageConfig,
	#[serde(default)]
	pub api: ApiConfig,
}

fn default_log_level() -> String {
	"info".to_string()
}

impl ArbConfig {
	pub fn network(&self) -> NetworkId {
		NetworkId(self.engine.network)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
	/// Account the executor runs as.
	pub address: Address,
	pub network: u64,
	#[serde(with = "serde_helpers::amount", default)]
	pub min_profit: U256,
	#[serde(default)]
	pub profit_recipient: Option<Address>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LendersConfig {
	#[serde(default)]
	pub push: Option<LenderConfig>,
	#[serde(default)]
	pub pull: Option<LenderConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LenderConfig {
	pub address: Address,
	/// Fee (push) or premium (pull) in basis points. Lender default if unset.
	#[serde(default)]
	pub fee_bps: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
	pub owner: Address,
	#[serde(default)]
	pub operators: Vec<Address>,
	#[serde(default)]
	pub venues: Vec<VenueEntryConfig>,
	#[serde(default)]
	pub assets: Vec<AssetEntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueEntryConfig {
	pub id: u16,
	pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntryConfig {
	pub id: u16,
	#[serde(default = "canonical")]
	pub asset_type: AssetType,
	pub address: Address,
}

fn canonical() -> AssetType {
	AssetType::Canonical
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
	pub timeout_ms: u64,
	pub max_estimate_age_secs: u64,
	pub gas: StaticGasModel,
}

impl Default for SelectorConfig {
	fn default() -> Self {
		Self {
			timeout_ms: 250,
			max_estimate_age_secs: 12,
			gas: StaticGasModel::default(),
		}
	}
}

impl SelectorConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}
}

/// Contracts and balances of the in-process ledger the service executes
/// against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
	#[serde(default)]
	pub venues: Vec<LedgerVenueConfig>,
	#[serde(default)]
	pub balances: Vec<BalanceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerVenueConfig {
	pub address: Address,
	pub kind: VenueKind,
	/// Swap fee in basis points. Constant-product and stable-basket only.
	#[serde(default)]
	pub fee_bps: u64,
	/// Listed fee tiers in millionths. Concentrated liquidity only.
	#[serde(default)]
	pub tiers: Vec<u32>,
	/// Coins by pool index. Stable basket only.
	#[serde(default)]
	pub coins: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceConfig {
	pub asset: Address,
	pub holder: Address,
	#[serde(with = "serde_helpers::amount")]
	pub amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
	/// `file` or `memory`.
	pub backend: String,
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			backend: "file".to_string(),
			path: PathBuf::from("./data/storage"),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
	pub host: String,
	pub port: u16,
}

impl Default for ApiConfig {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 3000,
		}
	}
}

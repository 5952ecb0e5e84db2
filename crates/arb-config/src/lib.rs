//! Configuration loading for the executor service.
//!
//! A TOML file is read, `${VAR}` references are substituted from the
//! environment (`${VAR:-default}` falls back to `default` when unset), the raw document is checked against [`ArbConfigSchema`], and
//! the parsed [`ArbConfig`] gets `ARB_*` overrides and semantic checks.

use arb_types::{
	ConfigSchema, Field, FieldType, Schema, ValidationError, VenueKind, BPS_DENOMINATOR,
};
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub mod serde_helpers;
pub mod types;

pub use types::*;

#[derive(Error, Debug)]
pub enum ConfigError {
	#[error("File not found: {0}")]
	FileNotFound(String),

	#[error("Parse error: {0}")]
	ParseError(String),

	#[error("Validation error: {0}")]
	ValidationError(String),

	#[error(transparent)]
	Schema(#[from] ValidationError),

	#[error("Environment variable not found: {0}")]
	EnvVarNotFound(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),
}

/// Loads [`ArbConfig`] with environment substitution and overrides.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
	file_path: Option<PathBuf>,
	env_prefix: String,
}

impl Default for ConfigLoader {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigLoader {
	pub fn new() -> Self {
		Self {
			file_path: None,
			env_prefix: "ARB_".to_string(),
		}
	}

	pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
		self.file_path = Some(path.as_ref().to_path_buf());
		self
	}

	pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.env_prefix = prefix.into();
		self
	}

	pub async fn load(&self) -> Result<ArbConfig, ConfigError> {
		let path = self.file_path.as_ref().ok_or_else(|| {
			ConfigError::FileNotFound("No configuration file specified".to_string())
		})?;
		info!("Loading configuration from {:?}", path);
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			if e.kind() == std::io::ErrorKind::NotFound {
				ConfigError::FileNotFound(path.display().to_string())
			} else {
				ConfigError::IoError(e)
			}
		})?;
		self.parse_with(&content, |name| env::var(name).ok())
	}

	/// Parses `content` resolving variables through `lookup`.
	pub fn parse_with<F>(&self, content: &str, lookup: F) -> Result<ArbConfig, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let substituted = substitute_env_vars(content, &lookup)?;

		let raw: toml::Value =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;
		ArbConfigSchema.validate(&raw)?;

		let mut config: ArbConfig =
			toml::from_str(&substituted).map_err(|e| ConfigError::ParseError(e.to_string()))?;
		self.apply_env_overrides(&mut config, &lookup)?;
		validate_config(&config)?;
		Ok(config)
	}

	fn apply_env_overrides<F>(&self, config: &mut ArbConfig, lookup: &F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |suffix: &str| lookup(&format!("{}{}", self.env_prefix, suffix));

		if let Some(level) = var("LOG_LEVEL") {
			debug!("Overriding log level from environment");
			config.log_level = level;
		}

		if let Some(port) = var("HTTP_PORT") {
			config.api.port = port
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
		}

		if let Some(network) = var("NETWORK") {
			config.engine.network = network
				.parse()
				.map_err(|e| ConfigError::ValidationError(format!("Invalid network id: {}", e)))?;
		}

		Ok(())
	}
}

/// Replaces every `${NAME}` with the looked-up value, or with `default` for
/// `${NAME:-default}` when the lookup fails.
fn substitute_env_vars<F>(content: &str, lookup: &F) -> Result<String, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}")
		.map_err(|e| ConfigError::ParseError(e.to_string()))?;
	let mut result = content.to_string();
	for cap in re.captures_iter(content) {
		let var_name = &cap[1];
		let value = match (lookup(var_name), cap.get(2)) {
			(Some(value), _) => value,
			(None, Some(default)) => default.as_str().to_string(),
			(None, None) => return Err(ConfigError::EnvVarNotFound(var_name.to_string())),
		};
		result = result.replace(&cap[0], &value);
	}
	Ok(result)
}

fn bps_field(name: &str) -> Field {
	Field::new(
		name,
		FieldType::Integer {
			min: Some(0),
			max: Some(BPS_DENOMINATOR as i64),
		},
	)
}

fn lender_schema() -> Schema {
	Schema::new(
		vec![Field::new("address", FieldType::Address)],
		vec![bps_field("fee_bps")],
	)
}

fn id_field() -> Field {
	Field::new(
		"id",
		FieldType::Integer {
			min: Some(0),
			max: Some(u16::MAX as i64),
		},
	)
}

/// Structural schema of the whole configuration document.
pub struct ArbConfigSchema;

impl ConfigSchema for ArbConfigSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let engine = Schema::new(
			vec![
				Field::new("address", FieldType::Address),
				Field::new(
					"network",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new("min_profit", FieldType::Amount),
				Field::new("profit_recipient", FieldType::Address),
			],
		);
		let lenders = Schema::new(
			vec![],
			vec![
				Field::new("push", FieldType::Table(lender_schema())),
				Field::new("pull", FieldType::Table(lender_schema())),
			],
		);
		let registry = Schema::new(
			vec![Field::new("owner", FieldType::Address)],
			vec![
				Field::new("operators", FieldType::Array(Box::new(FieldType::Address))),
				Field::new(
					"venues",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![id_field(), Field::new("address", FieldType::Address)],
						vec![],
					)))),
				),
				Field::new(
					"assets",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![id_field(), Field::new("address", FieldType::Address)],
						vec![Field::new("asset_type", FieldType::String).with_validator(
							|value| match value.as_str() {
								Some("canonical" | "bridged" | "wrapped") => Ok(()),
								_ => Err("asset_type must be canonical, bridged or wrapped"
									.to_string()),
							},
						)],
					)))),
				),
			],
		);
		let ledger = Schema::new(
			vec![],
			vec![
				Field::new(
					"venues",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![
							Field::new("address", FieldType::Address),
							Field::new("kind", FieldType::String).with_validator(|value| {
								match value.as_str() {
									Some(
										"constant_product" | "concentrated_liquidity"
										| "stable_basket",
									) => Ok(()),
									_ => Err("unknown venue kind".to_string()),
								}
							}),
						],
						vec![
							bps_field("fee_bps"),
							Field::new(
								"tiers",
								FieldType::Array(Box::new(FieldType::Integer {
									min: Some(1),
									max: Some(999_999),
								})),
							),
							Field::new("coins", FieldType::Array(Box::new(FieldType::Address))),
						],
					)))),
				),
				Field::new(
					"balances",
					FieldType::Array(Box::new(FieldType::Table(Schema::new(
						vec![
							Field::new("asset", FieldType::Address),
							Field::new("holder", FieldType::Address),
							Field::new("amount", FieldType::Amount),
						],
						vec![],
					)))),
				),
			],
		);
		let sizing = Schema::new(
			vec![],
			vec![
				bps_field("max_liquidity_share_bps"),
				Field::new(
					"min_units",
					FieldType::Integer {
						min: Some(0),
						max: None,
					},
				),
			],
		);
		let api = Schema::new(
			vec![],
			vec![
				Field::new("host", FieldType::String),
				Field::new(
					"port",
					FieldType::Integer {
						min: Some(1),
						max: Some(u16::MAX as i64),
					},
				),
			],
		);
		let storage = Schema::new(
			vec![],
			vec![
				Field::new("backend", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some("file" | "memory") => Ok(()),
						_ => Err("backend must be 'file' or 'memory'".to_string()),
					}
				}),
				Field::new("path", FieldType::String),
			],
		);

		Schema::new(
			vec![
				Field::new("engine", FieldType::Table(engine)),
				Field::new("lenders", FieldType::Table(lenders)),
				Field::new("registry", FieldType::Table(registry)),
			],
			vec![
				Field::new("log_level", FieldType::String),
				Field::new("sizing", FieldType::Table(sizing)),
				Field::new("ledger", FieldType::Table(ledger)),
				Field::new("api", FieldType::Table(api)),
				Field::new("storage", FieldType::Table(storage)),
			],
		)
		.validate(config)
	}
}

/// Checks the schema cannot express.
fn validate_config(config: &ArbConfig) -> Result<(), ConfigError> {
	let invalid = |message: String| Err(ConfigError::ValidationError(message));

	if config.engine.address.is_zero() {
		return invalid("engine.address must not be the zero address".into());
	}
	if config.lenders.push.is_none() && config.lenders.pull.is_none() {
		return invalid("At least one lender must be configured".into());
	}
	for (name, lender) in [("push", &config.lenders.push), ("pull", &config.lenders.pull)] {
		if let Some(lender) = lender {
			if lender.address.is_zero() {
				return invalid(format!("lenders.{}.address must not be zero", name));
			}
			if lender.fee_bps.is_some_and(|bps| bps > BPS_DENOMINATOR) {
				return invalid(format!("lenders.{}.fee_bps exceeds {}", name, BPS_DENOMINATOR));
			}
		}
	}
	if config.sizing.max_liquidity_share_bps > BPS_DENOMINATOR {
		return invalid("sizing.max_liquidity_share_bps exceeds 10000".into());
	}
	for venue in &config.registry.venues {
		if venue.address.is_zero() {
			return invalid(format!("registry venue {} has the zero address", venue.id));
		}
	}
	for asset in &config.registry.assets {
		if asset.address.is_zero() {
			return invalid(format!("registry asset {} has the zero address", asset.id));
		}
	}
	for venue in &config.ledger.venues {
		if venue.address.is_zero() {
			return invalid("ledger venue has the zero address".into());
		}
		match venue.kind {
			VenueKind::ConcentratedLiquidity if venue.tiers.is_empty() => {
				return invalid(format!("ledger venue {} lists no fee tiers", venue.address));
			}
			VenueKind::StableBasket if venue.coins.len() < 2 => {
				return invalid(format!("ledger venue {} needs at least two coins", venue.address));
			}
			_ => {}
		}
	}
	for letter in config.networks.keys() {
		let mut chars = letter.chars();
		match (chars.next(), chars.next()) {
			(Some(c), None) if c.is_ascii_uppercase() => {}
			_ => {
				return invalid(format!(
					"network letter '{}' must be one uppercase ASCII letter",
					letter
				))
			}
		}
	}
	Ok(())
}

//! Serde helpers for configuration values.

/// `U256` as a decimal or `0x`-hex string. Serializes as decimal.
pub mod amount {
	use arb_types::{parse_amount, U256};
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		parse_amount(&raw).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use arb_types::U256;
	use serde::{Deserialize, Serialize};

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Holder {
		#[serde(with = "super::amount")]
		value: U256,
	}

	#[test]
	fn test_decimal_and_hex() {
		let decimal: Holder = toml::from_str(r#"value = "1000""#).unwrap();
		let hex: Holder = toml::from_str(r#"value = "0x3e8""#).unwrap();
		assert_eq!(decimal, hex);
		assert_eq!(decimal.value, U256::from(1000u64));

		let text = toml::to_string(&decimal).unwrap();
		assert!(text.contains("value = \"1000\""));
	}

	#[test]
	fn test_garbage_rejected() {
		assert!(toml::from_str::<Holder>(r#"value = "ten""#).is_err());
	}
}

//! Persistence for executor state that must survive restarts.
//!
//! Registry snapshots and the payload replay set are stored as JSON under
//! `namespace:id` keys in a byte-oriented backend.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

pub use implementations::file::FileStorage;
pub use implementations::memory::MemoryStorage;

#[derive(Debug, Error)]
pub enum StorageError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
}

/// Byte-level key-value backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deleting a missing key succeeds.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}

/// Typed access over a backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	fn key(namespace: &str, id: &str) -> String {
		format!("{}:{}", namespace, id)
	}

	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&Self::key(namespace, id), bytes).await
	}

	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&Self::key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Like [`retrieve`](Self::retrieve), with a missing key as `None`.
	pub async fn retrieve_optional<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Option<T>, StorageError> {
		match self.retrieve(namespace, id).await {
			Ok(value) => Ok(Some(value)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&Self::key(namespace, id)).await
	}

	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&Self::key(namespace, id)).await
	}
}

/// Builds a backend by name: `memory`, or `file` rooted at `path`
/// (default `./data/storage`).
pub fn create_storage(
	backend: &str,
	path: Option<PathBuf>,
) -> Result<Box<dyn StorageInterface>, StorageError> {
	match backend {
		"memory" => Ok(Box::new(MemoryStorage::new())),
		"file" => Ok(Box::new(FileStorage::new(
			path.unwrap_or_else(|| PathBuf::from("./data/storage")),
		))),
		other => Err(StorageError::Backend(format!(
			"unknown storage backend '{}'",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Snapshot {
		version: u64,
		rows: Vec<(u16, String)>,
	}

	#[tokio::test]
	async fn test_typed_round_trip_and_missing_key() {
		let storage = StorageService::new(Box::new(MemoryStorage::new()));
		let snapshot = Snapshot {
			version: 3,
			rows: vec![(0, "router".into())],
		};
		storage.store("registry", "current", &snapshot).await.unwrap();
		let back: Snapshot = storage.retrieve("registry", "current").await.unwrap();
		assert_eq!(back, snapshot);

		let missing: Option<Snapshot> = storage.retrieve_optional("registry", "other").await.unwrap();
		assert!(missing.is_none());

		storage.remove("registry", "current").await.unwrap();
		assert!(!storage.exists("registry", "current").await.unwrap());
	}

	#[tokio::test]
	async fn test_corrupt_value_is_serialization_error() {
		let backend = MemoryStorage::new();
		backend.set_bytes("replay:guard", b"not json".to_vec()).await.unwrap();
		let storage = StorageService::new(Box::new(backend));
		let result: Result<Snapshot, _> = storage.retrieve("replay", "guard").await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
	}

	#[test]
	fn test_unknown_backend() {
		assert!(create_storage("memory", None).is_ok());
		assert!(matches!(
			create_storage("redis", None),
			Err(StorageError::Backend(_))
		));
	}
}

//! Service state shared by the HTTP handlers and CLI commands.

use anyhow::{Context, Result};
use arb_config::ArbConfig;
use arb_engine::{ControllerConfig, ExecutionError, LoanController, SessionReceipt};
use arb_ledger::{
	ConcentratedRouter, ConstantProductRouter, Ledger, LedgerState, PullSimpleLender,
	PushSettlementLender, StableBasketPool,
};
use arb_payload::{
	DecodedPayload, NetworkLetters, PayloadError, PayloadValidator, ReplayGuard, ValidatedPayload,
};
use arb_registry::{AccessPolicy, AssetEntry, RegistrySnapshot, RegistryStore};
use arb_selector::{Decision, LoanSizer, Opportunity, PathSelector, SelectorError};
use arb_storage::StorageService;
use arb_types::{
	Classify, ErrorClass, EventBus, NetworkId, ProviderKind, Timestamp, VenueKind, B256, U256,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

const REGISTRY_NAMESPACE: &str = "registry";
const REPLAY_NAMESPACE: &str = "replay";

/// One opportunity's selection result, sized against lender liquidity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutcome {
	pub opportunity_id: String,
	pub decision: Option<Decision>,
	/// `None` when the loan falls below the sizing floor.
	pub loan_amount: Option<U256>,
	pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryVersion {
	pub version: u64,
	pub network: NetworkId,
	pub version_hash: B256,
}

#[derive(Debug, Error)]
pub enum ServiceError {
	#[error(transparent)]
	Execution(#[from] ExecutionError),
	/// The session committed but the replay set could not be written.
	#[error("Failed to persist state: {0:#}")]
	Persistence(anyhow::Error),
}

impl Classify for ServiceError {
	fn class(&self) -> ErrorClass {
		match self {
			ServiceError::Execution(e) => e.class(),
			ServiceError::Persistence(_) => ErrorClass::Infrastructure,
		}
	}
}

/// The in-process ledger and the controller that runs sessions on it.
struct Executor {
	ledger: Ledger,
	controller: LoanController,
}

pub struct ArbService {
	config: ArbConfig,
	registry: RwLock<RegistryStore>,
	validator: RwLock<PayloadValidator>,
	executor: Mutex<Executor>,
	selector: PathSelector,
	sizer: LoanSizer,
	storage: StorageService,
	events: EventBus,
}

impl ArbService {
	/// Restores persisted state or seeds it from configuration.
	#[instrument(skip_all, fields(network = %config.network()))]
	pub async fn new(config: ArbConfig, storage: StorageService) -> Result<Self> {
		let events = EventBus::default();
		let network = config.network();

		let registry = match storage
			.retrieve_optional::<RegistrySnapshot>(REGISTRY_NAMESPACE, "snapshot")
			.await
			.context("Failed to read registry snapshot")?
		{
			Some(snapshot) => {
				info!(version = snapshot.version, "Restored registry snapshot");
				RegistryStore::restore(snapshot).context("Stored registry snapshot is invalid")?
			}
			None => seed_registry(&config).context("Failed to seed registry from config")?,
		}
		.with_event_bus(events.clone());

		let replay = storage
			.retrieve_optional::<ReplayGuard>(REPLAY_NAMESPACE, &network.to_string())
			.await
			.context("Failed to read replay set")?
			.unwrap_or_default();
		info!(used_nonces = replay.len(), "Loaded replay set");

		let validator = PayloadValidator::with_letters(network, letters(&config)?)
			.with_replay_guard(replay)
			.with_event_bus(events.clone());

		let selector = PathSelector::new(Arc::new(config.selector.gas.clone()))
			.with_timeout(config.selector.timeout())
			.with_max_estimate_age(config.selector.max_estimate_age_secs)
			.with_event_bus(events.clone());

		let executor = Executor {
			ledger: build_ledger(&config).context("Failed to build ledger from config")?,
			controller: LoanController::new(controller_config(&config))
				.with_event_bus(events.clone()),
		};

		let service = Self {
			sizer: config.sizing,
			config,
			registry: RwLock::new(registry),
			validator: RwLock::new(validator),
			executor: Mutex::new(executor),
			selector,
			storage,
			events,
		};
		service.persist().await?;
		Ok(service)
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	pub fn now() -> Timestamp {
		chrono::Utc::now().timestamp().max(0) as Timestamp
	}

	/// Runs the selector over a batch and sizes each selected loan.
	#[instrument(skip_all, fields(count = opportunities.len()))]
	pub async fn select(
		&self,
		opportunities: &[Opportunity],
		available: Option<U256>,
		decimals: u8,
		now: Timestamp,
	) -> Vec<SelectionOutcome> {
		let results = self.selector.select_many(opportunities, now).await;
		opportunities
			.iter()
			.zip(results)
			.map(|(opportunity, result)| match result {
				Ok(decision) => SelectionOutcome {
					opportunity_id: opportunity.id.clone(),
					loan_amount: self.sizer.size(opportunity.amount, available, decimals),
					decision: Some(decision),
					error: None,
				},
				Err(e) => {
					warn!(id = %opportunity.id, error = %e, "opportunity rejected");
					SelectionOutcome {
						opportunity_id: opportunity.id.clone(),
						decision: None,
						loan_amount: None,
						error: Some(e.to_string()),
					}
				}
			})
			.collect()
	}

	/// Re-estimates a cost-gate decision that has gone stale. Called right
	/// before a decision is handed to submission.
	pub async fn revalidate(
		&self,
		decision: Decision,
		opportunity: &Opportunity,
		now: Timestamp,
	) -> Result<Decision, SelectorError> {
		if decision.opportunity_id != opportunity.id {
			return Err(SelectorError::UnsupportedEntryPoint(format!(
				"decision for {} does not match opportunity {}",
				decision.opportunity_id, opportunity.id
			)));
		}
		self.selector.revalidate(decision, opportunity, now).await
	}

	/// Runs every payload check without consuming the nonce.
	pub async fn check_payload(
		&self,
		bytes: &[u8],
		now: Timestamp,
	) -> Result<ValidatedPayload, PayloadError> {
		let payload = DecodedPayload::decode(bytes)?;
		let registry = self.registry.read().await;
		self.validator
			.read()
			.await
			.check(&payload, &registry.view(), now)
	}

	/// Runs a payload-driven loan session on the in-process ledger at `now`.
	/// The nonce is consumed and persisted only when the session commits.
	#[instrument(skip_all, fields(provider = %provider))]
	pub async fn execute_payload(
		&self,
		provider: ProviderKind,
		bytes: &[u8],
		now: Timestamp,
	) -> Result<SessionReceipt, ServiceError> {
		let receipt = {
			let registry = self.registry.read().await;
			let mut validator = self.validator.write().await;
			let mut executor = self.executor.lock().await;
			let Executor { ledger, controller } = &mut *executor;
			ledger.state_mut().set_time(now);
			controller.execute_payload(ledger, registry.view(), &mut validator, provider, bytes)?
		};

		if let Err(e) = self.persist().await {
			error!("Session committed but state was not persisted: {:#}", e);
			return Err(ServiceError::Persistence(e));
		}
		Ok(receipt)
	}

	pub async fn registry_version(&self) -> RegistryVersion {
		let registry = self.registry.read().await;
		let network = self.config.network();
		RegistryVersion {
			version: registry.version(),
			network,
			version_hash: registry.version_hash(network),
		}
	}

	/// Writes the registry snapshot and the replay set.
	pub async fn persist(&self) -> Result<()> {
		let snapshot = self.registry.read().await.snapshot();
		self.storage
			.store(REGISTRY_NAMESPACE, "snapshot", &snapshot)
			.await
			.context("Failed to persist registry snapshot")?;

		let validator = self.validator.read().await;
		self.storage
			.store(
				REPLAY_NAMESPACE,
				&validator.network().to_string(),
				validator.replay_guard(),
			)
			.await
			.context("Failed to persist replay set")?;
		Ok(())
	}
}

fn seed_registry(config: &ArbConfig) -> Result<RegistryStore> {
	let registry_config = &config.registry;
	let owner = registry_config.owner;
	let policy = if registry_config.operators.is_empty() {
		AccessPolicy::owner_only(owner)
	} else {
		AccessPolicy::Operators {
			owner,
			operators: registry_config.operators.iter().copied().collect::<BTreeSet<_>>(),
		}
	};

	let network = config.network();
	let mut store = RegistryStore::with_policy(policy);
	let venues: Vec<_> = registry_config
		.venues
		.iter()
		.map(|v| (v.id, v.address))
		.collect();
	store.set_venues(owner, network, &venues)?;
	let assets: Vec<_> = registry_config
		.assets
		.iter()
		.map(|a| AssetEntry {
			id: a.id,
			asset_type: a.asset_type,
			address: a.address,
		})
		.collect();
	store.set_assets(owner, network, &assets)?;
	info!(
		venues = venues.len(),
		assets = assets.len(),
		version = store.version(),
		"Seeded registry from config"
	);
	Ok(store)
}

fn controller_config(config: &ArbConfig) -> ControllerConfig {
	ControllerConfig {
		address: config.engine.address,
		push_lender: config.lenders.push.as_ref().map(|l| l.address),
		pull_lender: config.lenders.pull.as_ref().map(|l| l.address),
		min_profit: config.engine.min_profit,
		profit_recipient: config.engine.profit_recipient,
	}
}

/// Deploys the configured lenders and venues and mints the configured
/// balances.
fn build_ledger(config: &ArbConfig) -> Result<Ledger> {
	let mut ledger = Ledger::new(LedgerState::new(config.network(), ArbService::now()));

	if let Some(push) = &config.lenders.push {
		let fee_bps = push.fee_bps.unwrap_or(PushSettlementLender::DEFAULT_FEE_BPS);
		ledger.deploy_lender(PushSettlementLender::with_fee(push.address, fee_bps));
	}
	if let Some(pull) = &config.lenders.pull {
		let premium_bps = pull.fee_bps.unwrap_or(PullSimpleLender::DEFAULT_PREMIUM_BPS);
		ledger.deploy_lender(PullSimpleLender::with_premium(pull.address, premium_bps));
	}

	for venue in &config.ledger.venues {
		match venue.kind {
			VenueKind::ConstantProduct => {
				ledger.deploy_venue(ConstantProductRouter::new(venue.address, venue.fee_bps))
			}
			VenueKind::ConcentratedLiquidity => ledger.deploy_venue(ConcentratedRouter::new(
				venue.address,
				venue.tiers.iter().copied(),
			)),
			VenueKind::StableBasket => ledger.deploy_venue(StableBasketPool::new(
				venue.address,
				venue.coins.clone(),
				venue.fee_bps,
			)),
		};
	}

	for balance in &config.ledger.balances {
		ledger
			.state_mut()
			.mint(balance.asset, balance.holder, balance.amount)
			.with_context(|| format!("Failed to mint {} to {}", balance.asset, balance.holder))?;
	}

	info!(
		venues = config.ledger.venues.len(),
		balances = config.ledger.balances.len(),
		"Built ledger from config"
	);
	Ok(ledger)
}

fn letters(config: &ArbConfig) -> Result<NetworkLetters> {
	if config.networks.is_empty() {
		return Ok(NetworkLetters::default());
	}
	let mut letters = NetworkLetters::empty();
	for (letter, id) in &config.networks {
		let c = letter.chars().next().unwrap_or_default();
		if letter.len() != 1 || !letters.insert(c, NetworkId(*id)) {
			anyhow::bail!("Invalid network letter '{}'", letter);
		}
	}
	Ok(letters)
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use arb_config::ConfigLoader;
	use arb_storage::MemoryStorage;
	use arb_codec::{ExplicitRoute, Route};
	use arb_selector::Hop;
	use arb_types::{Address, Bytes, EntryPoint};

	const CONFIG: &str = r#"
[engine]
address = "0x00000000000000000000000000000000000000e0"
network = 1
min_profit = "100"
profit_recipient = "0x000000000000000000000000000000000000007e"

[lenders.pull]
address = "0x0000000000000000000000000000000000000050"
fee_bps = 9

[registry]
owner = "0x000000000000000000000000000000000000000f"

[[registry.venues]]
id = 0
address = "0x0000000000000000000000000000000000000010"

[[registry.assets]]
id = 0
address = "0x00000000000000000000000000000000000000c0"

[[ledger.venues]]
address = "0x0000000000000000000000000000000000000010"
kind = "constant_product"

[[ledger.venues]]
address = "0x0000000000000000000000000000000000000011"
kind = "constant_product"

[[ledger.balances]]
asset = "0x00000000000000000000000000000000000000c0"
holder = "0x0000000000000000000000000000000000000050"
amount = "1000000"

[[ledger.balances]]
asset = "0x00000000000000000000000000000000000000c0"
holder = "0x0000000000000000000000000000000000000010"
amount = "1000000"

[[ledger.balances]]
asset = "0x00000000000000000000000000000000000000c1"
holder = "0x0000000000000000000000000000000000000010"
amount = "2000000"

[[ledger.balances]]
asset = "0x00000000000000000000000000000000000000c0"
holder = "0x0000000000000000000000000000000000000011"
amount = "1000000"

[[ledger.balances]]
asset = "0x00000000000000000000000000000000000000c1"
holder = "0x0000000000000000000000000000000000000011"
amount = "1000000"

[storage]
backend = "memory"
"#;

	pub(crate) async fn service() -> ArbService {
		let config = ConfigLoader::new().parse_with(CONFIG, |_| None).unwrap();
		ArbService::new(config, StorageService::new(Box::new(MemoryStorage::new())))
			.await
			.unwrap()
	}

	/// Borrows 10_000 of asset 0 and trades it through venue 0x10 and back
	/// through venue 0x11.
	pub(crate) fn payload(nonce: u64) -> DecodedPayload {
		let route = Route::Explicit(ExplicitRoute {
			protocols: vec![VenueKind::ConstantProduct.tag(); 2],
			venues: vec![Address::with_last_byte(0x10), Address::with_last_byte(0x11)],
			outputs: vec![Address::with_last_byte(0xc1), Address::with_last_byte(0xc0)],
			aux: vec![Bytes::new(), Bytes::new()],
		});
		DecodedPayload {
			network: 'E',
			asset_rank: 0,
			amount: U256::from(10_000u64),
			route_params: Bytes::from(route.encode()),
			min_profit_bps: 10,
			expiry: 2_000,
			recipient: Address::ZERO,
			registry_version_hash: B256::ZERO,
			nonce: U256::from(nonce),
		}
	}

	#[tokio::test]
	async fn test_seeded_registry_version() {
		let service = service().await;
		let version = service.registry_version().await;
		// one bump per non-empty batch
		assert_eq!(version.version, 2);
		assert_eq!(version.network, NetworkId::ETHEREUM);
		assert_eq!(
			version.version_hash,
			arb_registry::version_hash(NetworkId::ETHEREUM, 2)
		);
	}

	#[tokio::test]
	async fn test_check_does_not_consume_nonce() {
		let service = service().await;
		let bytes = payload(9).encode().unwrap();
		let validated = service.check_payload(&bytes, 1_000).await.unwrap();
		assert_eq!(validated.asset, Address::with_last_byte(0xc0));
		assert!(service.check_payload(&bytes, 1_000).await.is_ok());
		assert!(matches!(
			service.check_payload(&[0u8; 3], 1_000).await,
			Err(PayloadError::Decode(_))
		));
	}

	#[tokio::test]
	async fn test_execute_uses_configured_economics() {
		let service = service().await;
		let bytes = payload(9).encode().unwrap();

		// 10_000 A -> 19_801 B -> 19_416 A, pull premium 9 bps
		let receipt = service
			.execute_payload(ProviderKind::PullSimple, &bytes, 1_000)
			.await
			.unwrap();
		assert_eq!(receipt.lender, Address::with_last_byte(0x50));
		assert_eq!(receipt.fee, U256::from(9u64));
		assert_eq!(receipt.profit, U256::from(19_416u64 - 10_009));
		assert_eq!(receipt.swept_to, Some(Address::with_last_byte(0x7e)));

		assert_eq!(
			service.check_payload(&bytes, 1_000).await.unwrap_err(),
			PayloadError::NonceAlreadyUsed(U256::from(9u64))
		);
		assert!(matches!(
			service
				.execute_payload(ProviderKind::PullSimple, &bytes, 1_000)
				.await,
			Err(ServiceError::Execution(ExecutionError::Payload(
				PayloadError::NonceAlreadyUsed(_)
			)))
		));
	}

	#[tokio::test]
	async fn test_execute_respects_engine_profit_floor() {
		// one above the 9_407 this route earns
		let text = CONFIG.replace("min_profit = \"100\"", "min_profit = \"9408\"");
		let config = ConfigLoader::new().parse_with(&text, |_| None).unwrap();
		let service = ArbService::new(config, StorageService::new(Box::new(MemoryStorage::new())))
			.await
			.unwrap();
		let bytes = payload(4).encode().unwrap();

		let err = service
			.execute_payload(ProviderKind::PullSimple, &bytes, 1_000)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ServiceError::Execution(ExecutionError::ProfitTooLow { .. })
		));
		assert_eq!(err.class(), ErrorClass::Economic);
		// the nonce survives a failed session
		assert!(service.check_payload(&bytes, 1_000).await.is_ok());
	}

	#[tokio::test]
	async fn test_execute_without_lender_leaves_nonce_unused() {
		let service = service().await;
		let bytes = payload(5).encode().unwrap();
		let err = service
			.execute_payload(ProviderKind::PushSettlement, &bytes, 1_000)
			.await
			.unwrap_err();
		assert!(matches!(
			err,
			ServiceError::Execution(ExecutionError::NoLender(ProviderKind::PushSettlement))
		));
		assert_eq!(err.class(), ErrorClass::Validation);
		assert!(service.check_payload(&bytes, 1_000).await.is_ok());
	}

	#[tokio::test]
	async fn test_state_survives_restart() {
		let config = ConfigLoader::new().parse_with(CONFIG, |_| None).unwrap();
		let dir = tempfile::tempdir().unwrap();
		let storage = || {
			StorageService::new(Box::new(arb_storage::FileStorage::new(
				dir.path().to_path_buf(),
			)))
		};

		let first = ArbService::new(config.clone(), storage()).await.unwrap();
		first
			.execute_payload(ProviderKind::PullSimple, &payload(1).encode().unwrap(), 0)
			.await
			.unwrap();
		drop(first);

		let second = ArbService::new(config, storage()).await.unwrap();
		assert!(matches!(
			second.check_payload(&payload(1).encode().unwrap(), 0).await,
			Err(PayloadError::NonceAlreadyUsed(_))
		));
		assert_eq!(second.registry_version().await.version, 2);
	}

	#[tokio::test]
	async fn test_select_sizes_loans() {
		let service = service().await;
		let (a, b) = (Address::repeat_byte(0xAA), Address::repeat_byte(0xBB));
		let hop = |from, to| Hop {
			kind: VenueKind::ConstantProduct,
			venue: Address::repeat_byte(0x10),
			asset_in: from,
			asset_out: to,
		};
		let pair = Opportunity {
			id: "pair".into(),
			loan_asset: a,
			amount: U256::from(1_000_000u64),
			hops: vec![hop(a, b), hop(b, a)],
		};
		let empty = Opportunity {
			id: "empty".into(),
			hops: vec![],
			..pair.clone()
		};

		let outcomes = service
			.select(&[pair, empty], Some(U256::from(4_000_000u64)), 0, 0)
			.await;
		assert_eq!(
			outcomes[0].decision.as_ref().map(|d| d.entry_point),
			Some(EntryPoint::Minimal)
		);
		assert_eq!(outcomes[0].loan_amount, Some(U256::from(800_000u64)));
		assert!(outcomes[1].error.is_some());
	}

	#[tokio::test]
	async fn test_revalidate_refreshes_stale_decisions() {
		let service = service().await;
		let (a, b) = (Address::repeat_byte(0xAA), Address::repeat_byte(0xBB));
		let hop = |from, to| Hop {
			kind: VenueKind::ConstantProduct,
			venue: Address::repeat_byte(0x10),
			asset_in: from,
			asset_out: to,
		};
		let pair = Opportunity {
			id: "pair".into(),
			loan_asset: a,
			amount: U256::from(1_000_000u64),
			hops: vec![hop(a, b), hop(b, a)],
		};
		let decision = service.select(std::slice::from_ref(&pair), None, 0, 100).await[0]
			.decision
			.clone()
			.unwrap();

		// default max estimate age is 12 seconds
		let kept = service.revalidate(decision.clone(), &pair, 112).await.unwrap();
		assert_eq!(kept.decided_at, 100);
		let renewed = service.revalidate(decision.clone(), &pair, 113).await.unwrap();
		assert_eq!(renewed.decided_at, 113);

		let other = Opportunity {
			id: "other".into(),
			..pair
		};
		assert!(service.revalidate(decision, &other, 113).await.is_err());
	}
}

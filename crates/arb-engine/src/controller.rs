//! Loan session controller.
//!
//! Entry points:
//!
//! - [`LoanController::execute`]: general N-hop, self-describing instruction
//!   bytes (plan or route);
//! - [`LoanController::execute_pair`]: minimal two-venue round trip over
//!   constant-product venues;
//! - [`LoanController::execute_payload`]: validated discovery payload, whose
//!   nonce is consumed only when the session commits.
//!
//! Every request gets a [`LoanSession`] on arrival. A request refused before
//! any funds move leaves its session in `Rejected`.

use arb_adapters::AdapterSet;
use arb_codec::{decode_instructions, is_undersized, ExplicitRoute, Instructions, Route};
use arb_ledger::{callback_success, FlashLoanReceiver, Ledger, LedgerState};
use arb_payload::{DecodedPayload, PayloadValidator, ValidatedPayload};
use arb_registry::RegistryView;
use arb_types::{
	Address, ArbEvent, Bytes, Classify, EntryPoint, ErrorClass, EventBus, ProviderKind,
	SessionEvent, Timestamp, VenueKind, B256, U256,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::dispatcher::{StepDispatcher, StepOutcome};
use crate::profit::{ProfitGuard, Settlement};
use crate::session::{LoanSession, SessionGuard, SessionState, SessionToken};
use crate::ExecutionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
	/// Ledger account the controller executes from.
	pub address: Address,
	pub push_lender: Option<Address>,
	pub pull_lender: Option<Address>,
	/// Controller-wide profit floor, in loan-asset units.
	pub min_profit: U256,
	/// Profit is swept here after repayment when set.
	pub profit_recipient: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRequest {
	pub provider: ProviderKind,
	pub asset: Address,
	pub amount: U256,
	/// Plan or route bytes.
	pub instructions: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairRequest {
	pub provider: ProviderKind,
	pub asset: Address,
	pub amount: U256,
	pub intermediate: Address,
	pub first_venue: Address,
	pub second_venue: Address,
	pub min_profit: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReceipt {
	pub entry_point: EntryPoint,
	pub provider: ProviderKind,
	pub lender: Address,
	pub asset: Address,
	pub principal: U256,
	pub fee: U256,
	pub profit: U256,
	pub steps: Vec<StepOutcome>,
	pub swept_to: Option<Address>,
}

/// Everything a session needs once the entry point has done its checks.
struct SessionParams {
	entry_point: EntryPoint,
	raw: Bytes,
	instructions: Instructions,
	plan_floor: U256,
	deadline: Timestamp,
	recipient: Option<Address>,
}

pub struct LoanController {
	config: ControllerConfig,
	adapters: AdapterSet,
	guard: SessionGuard,
	profit: ProfitGuard,
	events: Option<EventBus>,
	last_session: Option<LoanSession>,
}

impl LoanController {
	pub fn new(config: ControllerConfig) -> Self {
		let profit = ProfitGuard::new(config.min_profit);
		Self {
			config,
			adapters: AdapterSet::standard(),
			guard: SessionGuard::new(),
			profit,
			events: None,
			last_session: None,
		}
	}

	pub fn with_adapters(mut self, adapters: AdapterSet) -> Self {
		self.adapters = adapters;
		self
	}

	pub fn with_event_bus(mut self, events: EventBus) -> Self {
		self.events = Some(events);
		self
	}

	pub fn address(&self) -> Address {
		self.config.address
	}

	pub fn config(&self) -> &ControllerConfig {
		&self.config
	}

	pub fn guard(&self) -> &SessionGuard {
		&self.guard
	}

	/// Session of the last request if it ended in a terminal state:
	/// `Rejected` before funding or `Closed` after commit. `None` after a
	/// session that reverted mid-flight.
	pub fn last_session(&self) -> Option<&LoanSession> {
		self.last_session.as_ref()
	}

	/// General entry point.
	#[instrument(skip_all, fields(provider = %request.provider, asset = %request.asset, amount = %request.amount))]
	pub fn execute(
		&mut self,
		ledger: &mut Ledger,
		registry: RegistryView<'_>,
		request: LoanRequest,
	) -> Result<SessionReceipt, ExecutionError> {
		let session = LoanSession::new(request.provider, request.asset, request.amount);
		let now = ledger.state().now();
		match self.prepare(
			EntryPoint::General,
			&session,
			request.instructions,
			U256::ZERO,
			now,
		) {
			Ok(params) => self.run(ledger, registry, session, params),
			Err(e) => Err(self.reject(session, e)),
		}
	}

	/// Minimal entry point: `asset -> intermediate -> asset` over two
	/// constant-product venues.
	#[instrument(skip_all, fields(provider = %request.provider, asset = %request.asset, amount = %request.amount))]
	pub fn execute_pair(
		&mut self,
		ledger: &mut Ledger,
		registry: RegistryView<'_>,
		request: PairRequest,
	) -> Result<SessionReceipt, ExecutionError> {
		let session = LoanSession::new(request.provider, request.asset, request.amount);
		match self.pair_params(ledger, &session, &request) {
			Ok(params) => self.run(ledger, registry, session, params),
			Err(e) => Err(self.reject(session, e)),
		}
	}

	/// Validated-payload entry point. The payload must be for the network
	/// the ledger runs on. The nonce is recorded only after the session
	/// commits, so a reverted session leaves the payload usable.
	#[instrument(skip_all, fields(provider = %provider))]
	pub fn execute_payload(
		&mut self,
		ledger: &mut Ledger,
		registry: RegistryView<'_>,
		validator: &mut PayloadValidator,
		provider: ProviderKind,
		payload_bytes: &[u8],
	) -> Result<SessionReceipt, ExecutionError> {
		let mut session = LoanSession::new(provider, Address::ZERO, U256::ZERO);
		match self.payload_params(ledger, &registry, validator, &mut session, payload_bytes) {
			Ok((params, validated)) => {
				let receipt = self.run(ledger, registry, session, params)?;
				validator.commit(&validated)?;
				Ok(receipt)
			}
			Err(e) => Err(self.reject(session, e)),
		}
	}

	fn pair_params(
		&self,
		ledger: &Ledger,
		session: &LoanSession,
		request: &PairRequest,
	) -> Result<SessionParams, ExecutionError> {
		if request.intermediate.is_zero() || request.intermediate == request.asset {
			return Err(invalid("intermediate asset must differ from the loan asset"));
		}
		for venue in [request.first_venue, request.second_venue] {
			if !ledger
				.contracts()
				.venue(venue)?
				.supports(VenueKind::ConstantProduct)
			{
				return Err(ExecutionError::NotConstantProduct(venue));
			}
		}

		let route = Route::Explicit(ExplicitRoute {
			protocols: vec![VenueKind::ConstantProduct.tag(); 2],
			venues: vec![request.first_venue, request.second_venue],
			outputs: vec![request.intermediate, request.asset],
			aux: vec![Bytes::new(), Bytes::new()],
		});
		self.prepare(
			EntryPoint::Minimal,
			session,
			Bytes::from(route.encode()),
			request.min_profit,
			ledger.state().now(),
		)
	}

	/// Decodes and checks the payload against the ledger's network, filling
	/// in the session's asset and principal as they become known.
	fn payload_params(
		&self,
		ledger: &Ledger,
		registry: &RegistryView<'_>,
		validator: &PayloadValidator,
		session: &mut LoanSession,
		payload_bytes: &[u8],
	) -> Result<(SessionParams, ValidatedPayload), ExecutionError> {
		let payload = DecodedPayload::decode(payload_bytes)?;
		session.principal = payload.amount;

		let now = ledger.state().now();
		let validated = validator.check_on(&payload, registry, now, ledger.state().network())?;
		session.asset = validated.asset;

		let mut params = self.prepare(
			EntryPoint::General,
			session,
			payload.route_params.clone(),
			payload.profit_floor(),
			now,
		)?;
		if !payload.recipient.is_zero() {
			params.recipient = Some(payload.recipient);
		}
		Ok((params, validated))
	}

	/// Precondition checks and decoding. Nothing here touches the ledger.
	fn prepare(
		&self,
		entry_point: EntryPoint,
		session: &LoanSession,
		raw: Bytes,
		extra_floor: U256,
		now: Timestamp,
	) -> Result<SessionParams, ExecutionError> {
		if session.principal.is_zero() {
			return Err(invalid("zero loan amount"));
		}
		if session.asset.is_zero() {
			return Err(invalid("zero loan asset"));
		}
		if is_undersized(&raw) {
			return Err(invalid("instruction bytes shorter than any valid payload"));
		}

		let instructions = decode_instructions(&raw)?;
		let (plan_floor, deadline) = match &instructions {
			Instructions::Plan(plan) => {
				if !plan.is_live(now) {
					return Err(ExecutionError::PlanExpired {
						deadline: plan.header.deadline,
						now,
					});
				}
				(plan.header.min_profit.max(extra_floor), plan.header.deadline)
			}
			Instructions::Route(_) => (extra_floor, now),
		};

		Ok(SessionParams {
			entry_point,
			raw,
			instructions,
			plan_floor,
			deadline,
			recipient: self.config.profit_recipient,
		})
	}

	fn lender_for(&self, provider: ProviderKind) -> Result<Address, ExecutionError> {
		match provider {
			ProviderKind::PushSettlement => self.config.push_lender,
			ProviderKind::PullSimple => self.config.pull_lender,
		}
		.ok_or(ExecutionError::NoLender(provider))
	}

	/// Ends a request that never reached the lender.
	fn reject(&mut self, mut session: LoanSession, error: ExecutionError) -> ExecutionError {
		if let Err(e) = session.advance(SessionState::Rejected) {
			warn!(error = %e, "session could not be marked rejected");
		}
		self.report_abort(session.provider, session.asset, &error);
		self.last_session = Some(session);
		error
	}

	fn run(
		&mut self,
		ledger: &mut Ledger,
		registry: RegistryView<'_>,
		mut session: LoanSession,
		params: SessionParams,
	) -> Result<SessionReceipt, ExecutionError> {
		let lender = match self.lender_for(session.provider) {
			Ok(lender) => lender,
			Err(e) => return Err(self.reject(session, e)),
		};
		session.lender = lender;
		self.last_session = None;

		let (provider, asset) = (session.provider, session.asset);
		match self.open_session(ledger, registry, session, params) {
			Ok((receipt, closed)) => {
				info!(
					entry_point = %receipt.entry_point,
					principal = %receipt.principal,
					fee = %receipt.fee,
					profit = %receipt.profit,
					steps = receipt.steps.len(),
					"loan session committed"
				);
				self.publish(SessionEvent::Completed {
					provider: receipt.provider,
					asset: receipt.asset,
					principal: receipt.principal,
					fee: receipt.fee,
					profit: receipt.profit,
				});
				self.last_session = Some(closed);
				Ok(receipt)
			}
			Err(e) => {
				self.report_abort(provider, asset, &e);
				Err(e)
			}
		}
	}

	fn open_session(
		&mut self,
		ledger: &mut Ledger,
		registry: RegistryView<'_>,
		session: LoanSession,
		params: SessionParams,
	) -> Result<(SessionReceipt, LoanSession), ExecutionError> {
		let Self {
			config,
			adapters,
			guard,
			profit,
			..
		} = self;
		let executor = config.address;
		let network = ledger.state().network();
		let (provider, asset, amount, lender_address) = (
			session.provider,
			session.asset,
			session.principal,
			session.lender,
		);
		let SessionParams {
			entry_point,
			raw,
			instructions,
			plan_floor,
			deadline,
			recipient,
		} = params;

		let mut token = guard.acquire(session)?;
		token.advance(SessionState::Requested)?;

		ledger.transact(|state, contracts| {
			let lender = contracts.lender(lender_address)?;
			if lender.kind() != provider {
				return Err(ExecutionError::InvalidRequest(format!(
					"lender {} is not a {} provider",
					lender_address, provider
				)));
			}

			let mut receiver = SessionReceiver {
				executor,
				lender: lender_address,
				token,
				instructions,
				dispatcher: StepDispatcher::new(
					adapters, contracts, registry, network, executor, deadline,
				),
				profit: *profit,
				plan_floor,
				outcome: None,
				error: None,
			};
			let loan = lender.flash_loan(state, &mut receiver, executor, asset, amount, &raw);
			let SessionReceiver {
				token,
				outcome,
				error,
				..
			} = receiver;

			if let Err(e) = loan {
				return Err(error.unwrap_or_else(|| e.into()));
			}
			if let Some(e) = error {
				return Err(e);
			}
			let (settlement, steps) = outcome.ok_or_else(|| {
				ExecutionError::UnauthorizedCallback("lender never invoked the callback".into())
			})?;

			let swept_to = match recipient {
				Some(to) if !settlement.profit.is_zero() && to != executor => {
					state.transfer(asset, executor, to, settlement.profit)?;
					Some(to)
				}
				_ => None,
			};

			let closed = token.close()?;
			let receipt = SessionReceipt {
				entry_point,
				provider: closed.provider,
				lender: closed.lender,
				asset: closed.asset,
				principal: closed.principal,
				fee: closed.fee,
				profit: settlement.profit,
				steps,
				swept_to,
			};
			Ok((receipt, closed))
		})
	}

	fn report_abort(&self, provider: ProviderKind, asset: Address, e: &ExecutionError) {
		let class = e.class();
		match class {
			ErrorClass::Authorization => error!(%class, error = %e, "loan session aborted"),
			ErrorClass::Economic => info!(%class, error = %e, "loan session aborted"),
			_ => warn!(%class, error = %e, "loan session aborted"),
		}
		self.publish(SessionEvent::Aborted {
			provider,
			asset,
			class,
			reason: e.to_string(),
		});
	}

	fn publish(&self, event: SessionEvent) {
		if let Some(events) = &self.events {
			events.publish(ArbEvent::Session(event));
		}
	}
}

fn invalid(reason: &str) -> ExecutionError {
	ExecutionError::InvalidRequest(reason.to_string())
}

/// Borrower side of one session. Callback failures are kept in `error`
/// because the lender only sees a boolean or magic value.
struct SessionReceiver<'a, 'g> {
	executor: Address,
	lender: Address,
	token: SessionToken<'g>,
	instructions: Instructions,
	dispatcher: StepDispatcher<'a>,
	profit: ProfitGuard,
	plan_floor: U256,
	outcome: Option<(Settlement, Vec<StepOutcome>)>,
	error: Option<ExecutionError>,
}

impl SessionReceiver<'_, '_> {
	fn verify(
		&self,
		caller: Address,
		initiator: Address,
		asset: Address,
		amount: U256,
	) -> Result<(), ExecutionError> {
		let unauthorized = |reason: String| Err(ExecutionError::UnauthorizedCallback(reason));
		if self.token.state() != SessionState::Requested {
			return unauthorized(format!(
				"callback fired again in state {:?}",
				self.token.state()
			));
		}
		if caller != self.lender {
			return unauthorized(format!("caller {} is not the lender {}", caller, self.lender));
		}
		let session = self.token.session();
		if asset != session.asset || amount != session.principal {
			return unauthorized(format!(
				"callback terms ({}, {}) differ from request ({}, {})",
				asset, amount, session.asset, session.principal
			));
		}
		if initiator != self.executor {
			return unauthorized(format!("initiator {} is not the controller", initiator));
		}
		Ok(())
	}

	fn settle(
		&mut self,
		ledger: &mut LedgerState,
		caller: Address,
		initiator: Address,
		asset: Address,
		amount: U256,
		fee: U256,
	) -> Result<(), ExecutionError> {
		self.verify(caller, initiator, asset, amount)?;
		self.token.record_fee(fee);
		self.token.advance(SessionState::Funded)?;

		self.token.advance(SessionState::Executing)?;
		let steps = self
			.dispatcher
			.run(ledger, &self.instructions, asset)?;

		self.token.advance(SessionState::Settling)?;
		let ending = ledger.balance_of(asset, self.executor);
		let settlement = self.profit.settle(ending, amount, fee, self.plan_floor)?;
		ledger.approve(asset, self.executor, caller, settlement.owed());

		self.outcome = Some((settlement, steps));
		Ok(())
	}

	fn record(&mut self, result: Result<(), ExecutionError>) -> bool {
		match result {
			Ok(()) => true,
			Err(e) => {
				self.error.get_or_insert(e);
				false
			}
		}
	}
}

impl FlashLoanReceiver for SessionReceiver<'_, '_> {
	fn address(&self) -> Address {
		self.executor
	}

	fn on_flash_loan(
		&mut self,
		ledger: &mut LedgerState,
		caller: Address,
		initiator: Address,
		asset: Address,
		amount: U256,
		fee: U256,
		_data: &[u8],
	) -> B256 {
		let result = self.settle(ledger, caller, initiator, asset, amount, fee);
		if self.record(result) {
			callback_success()
		} else {
			B256::ZERO
		}
	}

	fn execute_operation(
		&mut self,
		ledger: &mut LedgerState,
		caller: Address,
		asset: Address,
		amount: U256,
		premium: U256,
		initiator: Address,
		_data: &[u8],
	) -> bool {
		let result = self.settle(ledger, caller, initiator, asset, amount, premium);
		self.record(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use arb_adapters::AdapterError;
	use arb_codec::{Plan, PlanHeader, RegistryRoute, Step};
	use arb_ledger::{
		ConcentratedRouter, ConstantProductRouter, FixedOutputVenue, LedgerError,
		LenderInterface, PullSimpleLender, PushSettlementLender, StableBasketPool,
	};
	use arb_payload::PayloadError;
	use arb_registry::{AssetEntry, RegistryStore};
	use arb_types::{AssetType, NetworkId};

	const NET: NetworkId = NetworkId::ETHEREUM;
	const OWNER: Address = Address::new([0x0F; 20]);
	const EXECUTOR: Address = Address::new([0xE0; 20]);
	const PULL: Address = Address::new([0x50; 20]);
	const PUSH: Address = Address::new([0x51; 20]);
	const TOKEN_A: Address = Address::new([0xAA; 20]);
	const TOKEN_B: Address = Address::new([0xBB; 20]);
	const TOKEN_C: Address = Address::new([0xCC; 20]);
	const VENUE_0: Address = Address::new([0x10; 20]);
	const VENUE_1: Address = Address::new([0x11; 20]);
	const VENUE_2: Address = Address::new([0x12; 20]);
	const NOW: Timestamp = 1_700_000_000;

	fn u(value: u64) -> U256 {
		U256::from(value)
	}

	fn config() -> ControllerConfig {
		ControllerConfig {
			address: EXECUTOR,
			push_lender: Some(PUSH),
			pull_lender: Some(PULL),
			min_profit: U256::ZERO,
			profit_recipient: None,
		}
	}

	/// Three fixed venues forming A -> B -> C -> A; the last pays `final_out`.
	fn triangle(final_out: u64) -> Ledger {
		let mut ledger = Ledger::new(LedgerState::new(NET, NOW));
		ledger.deploy_lender(PullSimpleLender::new(PULL));
		ledger.deploy_lender(PushSettlementLender::new(PUSH));
		ledger.deploy_venue(FixedOutputVenue::new(VENUE_0).with_output(TOKEN_A, TOKEN_B, u(20_000)));
		ledger.deploy_venue(FixedOutputVenue::new(VENUE_1).with_output(TOKEN_B, TOKEN_C, u(30_000)));
		ledger.deploy_venue(
			FixedOutputVenue::new(VENUE_2).with_output(TOKEN_C, TOKEN_A, u(final_out)),
		);

		let state = ledger.state_mut();
		state.mint(TOKEN_A, PULL, u(1_000_000)).unwrap();
		state.mint(TOKEN_A, PUSH, u(1_000_000)).unwrap();
		state.mint(TOKEN_B, VENUE_0, u(20_000)).unwrap();
		state.mint(TOKEN_C, VENUE_1, u(30_000)).unwrap();
		state.mint(TOKEN_A, VENUE_2, u(final_out)).unwrap();
		ledger
	}

	fn registry() -> RegistryStore {
		let mut store = RegistryStore::new(OWNER);
		store
			.set_venues(OWNER, NET, &[(0, VENUE_0), (1, VENUE_1), (2, VENUE_2)])
			.unwrap();
		store
			.set_assets(
				OWNER,
				NET,
				&[
					AssetEntry {
						id: 0,
						asset_type: AssetType::Canonical,
						address: TOKEN_A,
					},
					AssetEntry {
						id: 1,
						asset_type: AssetType::Canonical,
						address: TOKEN_B,
					},
					AssetEntry {
						id: 2,
						asset_type: AssetType::Canonical,
						address: TOKEN_C,
					},
				],
			)
			.unwrap();
		store
	}

	fn step(tag: u8, from: Address, to: Address, aux: &'static [u8]) -> Step {
		Step {
			venue_tag: tag,
			action: 0,
			asset_in: from,
			asset_out: to,
			amount_in: U256::ZERO,
			min_amount_out: U256::ZERO,
			aux: Bytes::from_static(aux),
		}
	}

	fn triangle_plan(min_profit: u64) -> Plan {
		Plan::new(
			PlanHeader {
				deadline: NOW + 60,
				base_asset: Address::ZERO,
				min_profit: u(min_profit),
			},
			vec![
				Step {
					amount_in: u(10_000),
					..step(0, TOKEN_A, TOKEN_B, &[])
				},
				step(1, TOKEN_B, TOKEN_C, &[0x00, 0x0B, 0xB8]),
				step(2, TOKEN_C, TOKEN_A, &[0x00, 0x01]),
			],
		)
	}

	fn plan_request(plan: &Plan) -> LoanRequest {
		LoanRequest {
			provider: ProviderKind::PullSimple,
			asset: TOKEN_A,
			amount: u(10_000),
			instructions: Bytes::from(plan.encode().unwrap()),
		}
	}

	#[test]
	fn test_three_hop_plan_commits_profit() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let mut controller = LoanController::new(config());

		let receipt = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(40)))
			.unwrap();

		assert_eq!(receipt.fee, u(5));
		assert_eq!(receipt.profit, u(45));
		assert_eq!(receipt.steps.len(), 3);
		assert_eq!(receipt.steps[2].amount_out, u(10_050));
		assert_eq!(ledger.state().balance_of(TOKEN_A, EXECUTOR), u(45));
		assert_eq!(ledger.state().balance_of(TOKEN_A, PULL), u(1_000_005));
		assert!(!controller.guard().is_active());
		let closed = controller.last_session().unwrap();
		assert_eq!(closed.state(), SessionState::Closed);
		assert_eq!(closed.lender, PULL);
		assert_eq!(closed.fee, u(5));
	}

	/// The three-hop scenario over one venue of each family: a
	/// constant-product router, a concentrated router at the 0.3% tier and a
	/// stable basket holding [C, A].
	fn live_venues() -> Ledger {
		let mut ledger = Ledger::new(LedgerState::new(NET, NOW));
		ledger.deploy_lender(PullSimpleLender::new(PULL));
		ledger.deploy_venue(ConstantProductRouter::new(VENUE_0, 30));
		ledger.deploy_venue(ConcentratedRouter::new(VENUE_1, [500, 3_000]));
		ledger.deploy_venue(StableBasketPool::new(VENUE_2, vec![TOKEN_C, TOKEN_A], 4));

		let state = ledger.state_mut();
		state.mint(TOKEN_A, PULL, u(1_000_000)).unwrap();
		state.mint(TOKEN_A, VENUE_0, u(1_000_000)).unwrap();
		state.mint(TOKEN_B, VENUE_0, u(1_100_000)).unwrap();
		state.mint(TOKEN_B, VENUE_1, u(1_000_000)).unwrap();
		state.mint(TOKEN_C, VENUE_1, u(1_000_000)).unwrap();
		state.mint(TOKEN_A, VENUE_2, u(1_000_000)).unwrap();
		ledger
	}

	#[test]
	fn test_three_hop_plan_over_live_venues() {
		let store = registry();
		let mut ledger = live_venues();
		let mut controller = LoanController::new(config());

		// 10_000 A -> 10_858 B (30 bps) -> 10_709 C (tier 3000) -> 10_705 A (4 bps)
		let receipt = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0)))
			.unwrap();
		let outs: Vec<U256> = receipt.steps.iter().map(|s| s.amount_out).collect();
		assert_eq!(outs, vec![u(10_858), u(10_709), u(10_705)]);
		assert_eq!(receipt.profit, u(10_705 - 10_005));

		let state = ledger.state();
		assert_eq!(state.balance_of(TOKEN_A, EXECUTOR), u(700));
		assert_eq!(state.balance_of(TOKEN_A, VENUE_0), u(1_010_000));
		assert_eq!(state.balance_of(TOKEN_B, VENUE_1), u(1_010_858));
		assert_eq!(state.balance_of(TOKEN_C, VENUE_2), u(10_709));
		assert_eq!(state.balance_of(TOKEN_A, VENUE_2), u(1_000_000 - 10_705));
		for venue in [VENUE_0, VENUE_1, VENUE_2] {
			assert_eq!(state.allowance(TOKEN_A, EXECUTOR, venue), U256::ZERO);
		}
	}

	#[test]
	fn test_live_venues_revert_pool_state_on_floor_miss() {
		let store = registry();
		let mut ledger = live_venues();
		let before = ledger.state().clone();
		let mut controller = LoanController::new(config());

		let err = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(701)))
			.unwrap_err();
		assert_eq!(
			err,
			ExecutionError::ProfitTooLow {
				profit: u(700),
				floor: u(701),
			}
		);
		assert_eq!(*ledger.state(), before);
		assert!(controller.last_session().is_none());
	}

	#[test]
	fn test_live_venue_rejects_unlisted_fee_tier() {
		let store = registry();
		let mut ledger = live_venues();
		let before = ledger.state().clone();
		let mut plan = triangle_plan(0);
		// 100 is on the adapter allow-list but the router has no such pool
		plan.steps[1].aux = Bytes::from_static(&[0x00, 0x00, 0x64]);
		let mut controller = LoanController::new(config());
		let err = controller
			.execute(&mut ledger, store.view(), plan_request(&plan))
			.unwrap_err();
		assert!(matches!(
			err,
			ExecutionError::Adapter(AdapterError::Ledger(LedgerError::UnsupportedCall { .. }))
		));
		assert_eq!(*ledger.state(), before);
	}

	#[test]
	fn test_shortfall_reverts_everything() {
		let store = registry();
		let mut ledger = triangle(9_990);
		let before = ledger.state().clone();
		let mut controller = LoanController::new(config());

		let err = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0)))
			.unwrap_err();

		assert_eq!(
			err,
			ExecutionError::InsufficientRepayment {
				ending: u(9_990),
				owed: u(10_005),
			}
		);
		assert_eq!(err.class(), ErrorClass::Economic);
		assert_eq!(*ledger.state(), before);
		assert!(!controller.guard().is_active());
	}

	#[test]
	fn test_plan_floor_enforced() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let before = ledger.state().clone();
		let mut controller = LoanController::new(config());
		let err = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(46)))
			.unwrap_err();
		assert!(matches!(err, ExecutionError::ProfitTooLow { .. }));
		assert_eq!(*ledger.state(), before);
	}

	#[test]
	fn test_profit_sweep_and_completion_event() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let treasury = Address::repeat_byte(0x7E);
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		let mut controller = LoanController::new(ControllerConfig {
			profit_recipient: Some(treasury),
			..config()
		})
		.with_event_bus(bus);

		let receipt = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0)))
			.unwrap();
		assert_eq!(receipt.swept_to, Some(treasury));
		assert_eq!(ledger.state().balance_of(TOKEN_A, treasury), u(45));
		assert_eq!(ledger.state().balance_of(TOKEN_A, EXECUTOR), U256::ZERO);

		match rx.try_recv().unwrap() {
			ArbEvent::Session(SessionEvent::Completed { profit, fee, .. }) => {
				assert_eq!(profit, u(45));
				assert_eq!(fee, u(5));
			}
			other => panic!("unexpected event {:?}", other),
		}
	}

	#[test]
	fn test_push_settlement_with_zero_fee() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let mut controller = LoanController::new(config());
		let request = LoanRequest {
			provider: ProviderKind::PushSettlement,
			..plan_request(&triangle_plan(0))
		};
		let receipt = controller.execute(&mut ledger, store.view(), request).unwrap();
		assert_eq!(receipt.fee, U256::ZERO);
		assert_eq!(receipt.profit, u(50));
		assert_eq!(ledger.state().balance_of(TOKEN_A, PUSH), u(1_000_000));
	}

	#[test]
	fn test_explicit_and_registry_routes() {
		let store = registry();
		let explicit = Route::Explicit(ExplicitRoute {
			protocols: vec![0, 1, 2],
			venues: vec![VENUE_0, VENUE_1, VENUE_2],
			outputs: vec![TOKEN_B, TOKEN_C, TOKEN_A],
			aux: vec![
				Bytes::new(),
				Bytes::from_static(&[0x00, 0x01, 0xF4]),
				Bytes::from_static(&[0x00, 0x01]),
			],
		});
		let by_registry = Route::Registry(RegistryRoute {
			protocols: vec![0, 1, 2],
			venue_ids: vec![0, 1, 2],
			asset_ids: vec![1, 2, 0],
			asset_types: vec![AssetType::Canonical; 3],
			aux: vec![
				Bytes::new(),
				Bytes::from_static(&[0x00, 0x01, 0xF4]),
				Bytes::from_static(&[0x00, 0x01]),
			],
		});

		for route in [explicit, by_registry] {
			let mut ledger = triangle(10_050);
			let mut controller = LoanController::new(config());
			let receipt = controller
				.execute(
					&mut ledger,
					store.view(),
					LoanRequest {
						provider: ProviderKind::PullSimple,
						asset: TOKEN_A,
						amount: u(10_000),
						instructions: Bytes::from(route.encode()),
					},
				)
				.unwrap();
			// Hop 0 spends the whole loan, later hops the full prior output.
			assert_eq!(receipt.steps[0].amount_in, u(10_000));
			assert_eq!(receipt.steps[1].amount_in, u(20_000));
			assert_eq!(receipt.steps[2].amount_in, u(30_000));
			assert_eq!(receipt.profit, u(45));
		}
	}

	#[test]
	fn test_preconditions_reject_before_funding() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let mut controller = LoanController::new(config());
		let good = plan_request(&triangle_plan(0));

		for request in [
			LoanRequest {
				amount: U256::ZERO,
				..good.clone()
			},
			LoanRequest {
				asset: Address::ZERO,
				..good.clone()
			},
			LoanRequest {
				instructions: Bytes::from_static(&[0x10, 0x00]),
				..good.clone()
			},
		] {
			let asset = request.asset;
			assert!(matches!(
				controller.execute(&mut ledger, store.view(), request),
				Err(ExecutionError::InvalidRequest(_))
			));
			let rejected = controller.last_session().unwrap();
			assert_eq!(rejected.state(), SessionState::Rejected);
			assert_eq!(rejected.asset, asset);
			assert_eq!(rejected.lender, Address::ZERO);
		}
		assert_eq!(controller.guard().sessions_opened(), 0);
	}

	#[test]
	fn test_missing_lender_rejects_session() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let before = ledger.state().clone();
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		let mut controller = LoanController::new(ControllerConfig {
			push_lender: None,
			..config()
		})
		.with_event_bus(bus);
		let request = LoanRequest {
			provider: ProviderKind::PushSettlement,
			..plan_request(&triangle_plan(0))
		};

		assert_eq!(
			controller.execute(&mut ledger, store.view(), request),
			Err(ExecutionError::NoLender(ProviderKind::PushSettlement))
		);
		assert_eq!(
			controller.last_session().map(|s| s.state()),
			Some(SessionState::Rejected)
		);
		assert_eq!(controller.guard().sessions_opened(), 0);
		assert_eq!(*ledger.state(), before);
		assert!(matches!(
			rx.try_recv().unwrap(),
			ArbEvent::Session(SessionEvent::Aborted { class: ErrorClass::Validation, .. })
		));
	}

	#[test]
	fn test_expired_plan_rejected() {
		let store = registry();
		let mut ledger = triangle(10_050);
		ledger.state_mut().set_time(NOW + 61);
		let mut controller = LoanController::new(config());
		assert!(matches!(
			controller.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0))),
			Err(ExecutionError::PlanExpired { .. })
		));
		assert_eq!(
			controller.last_session().map(|s| s.state()),
			Some(SessionState::Rejected)
		);
	}

	#[test]
	fn test_unknown_tag_fails_before_any_step() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let before = ledger.state().clone();
		let mut plan = triangle_plan(0);
		plan.steps[2].venue_tag = 7;
		let mut controller = LoanController::new(config());
		let err = controller
			.execute(&mut ledger, store.view(), plan_request(&plan))
			.unwrap_err();
		assert_eq!(err, ExecutionError::Adapter(AdapterError::UnsupportedVenue(7)));
		assert_eq!(err.class(), ErrorClass::Format);
		assert_eq!(*ledger.state(), before);
	}

	#[test]
	fn test_unregistered_venue_rejected() {
		let mut store = RegistryStore::new(OWNER);
		store.set_venues(OWNER, NET, &[(0, VENUE_0)]).unwrap();
		let mut ledger = triangle(10_050);
		let mut controller = LoanController::new(config());
		let err = controller
			.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0)))
			.unwrap_err();
		assert!(matches!(
			err,
			ExecutionError::Registry(arb_registry::RegistryError::UnregisteredIdentifier(_))
		));
	}

	/// Lender double that misbehaves in one configurable way.
	#[derive(Debug)]
	enum Rogue {
		CallsTwice,
		WrongCaller,
		WrongAmount,
		WrongInitiator,
		NeverCalls,
	}

	#[derive(Debug)]
	struct RogueLender {
		address: Address,
		mode: Rogue,
	}

	impl LenderInterface for RogueLender {
		fn address(&self) -> Address {
			self.address
		}

		fn kind(&self) -> ProviderKind {
			ProviderKind::PullSimple
		}

		fn flash_fee(&self, _asset: Address, _amount: U256) -> Result<U256, LedgerError> {
			Ok(U256::ZERO)
		}

		fn flash_loan(
			&self,
			ledger: &mut LedgerState,
			receiver: &mut dyn FlashLoanReceiver,
			initiator: Address,
			asset: Address,
			amount: U256,
			data: &[u8],
		) -> Result<(), LedgerError> {
			ledger.transfer(asset, self.address, receiver.address(), amount)?;
			let (caller, amount_seen, initiator_seen) = match self.mode {
				Rogue::WrongCaller => (Address::repeat_byte(0x66), amount, initiator),
				Rogue::WrongAmount => (self.address, amount + U256::from(1u64), initiator),
				Rogue::WrongInitiator => (self.address, amount, Address::repeat_byte(0x67)),
				Rogue::CallsTwice | Rogue::NeverCalls => (self.address, amount, initiator),
			};
			if matches!(self.mode, Rogue::NeverCalls) {
				return Ok(());
			}
			let calls = if matches!(self.mode, Rogue::CallsTwice) { 2 } else { 1 };
			for _ in 0..calls {
				// A misbehaving lender ignores the callback's verdict.
				let _ = receiver.execute_operation(
					ledger,
					caller,
					asset,
					amount_seen,
					U256::ZERO,
					initiator_seen,
					data,
				);
			}
			Ok(())
		}
	}

	#[test]
	fn test_misbehaving_lenders_are_unauthorized() {
		let store = registry();
		for mode in [
			Rogue::CallsTwice,
			Rogue::WrongCaller,
			Rogue::WrongAmount,
			Rogue::WrongInitiator,
			Rogue::NeverCalls,
		] {
			let mut ledger = triangle(10_050);
			let rogue = Address::repeat_byte(0x60);
			ledger.deploy_lender(RogueLender {
				address: rogue,
				mode,
			});
			ledger
				.state_mut()
				.mint(TOKEN_A, rogue, u(1_000_000))
				.unwrap();
			let before = ledger.state().clone();

			let mut controller = LoanController::new(ControllerConfig {
				pull_lender: Some(rogue),
				..config()
			});
			let err = controller
				.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0)))
				.unwrap_err();
			assert!(
				matches!(err, ExecutionError::UnauthorizedCallback(_)),
				"unexpected {:?}",
				err
			);
			assert_eq!(err.class(), ErrorClass::Authorization);
			assert_eq!(*ledger.state(), before);
		}
	}

	#[test]
	fn test_lender_kind_must_match_provider() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let mut controller = LoanController::new(ControllerConfig {
			pull_lender: Some(PUSH),
			..config()
		});
		assert!(matches!(
			controller.execute(&mut ledger, store.view(), plan_request(&triangle_plan(0))),
			Err(ExecutionError::InvalidRequest(_))
		));
	}

	fn pair_ledger() -> Ledger {
		let mut ledger = Ledger::new(LedgerState::new(NET, NOW));
		ledger.deploy_lender(PullSimpleLender::new(PULL));
		ledger.deploy_venue(ConstantProductRouter::new(VENUE_0, 0));
		ledger.deploy_venue(ConstantProductRouter::new(VENUE_1, 0));
		ledger.deploy_venue(StableBasketPool::new(VENUE_2, vec![TOKEN_A, TOKEN_B], 0));
		let state = ledger.state_mut();
		state.mint(TOKEN_A, PULL, u(1_000_000)).unwrap();
		// B is cheap on venue 0 and dear on venue 1.
		state.mint(TOKEN_A, VENUE_0, u(1_000_000)).unwrap();
		state.mint(TOKEN_B, VENUE_0, u(2_000_000)).unwrap();
		state.mint(TOKEN_A, VENUE_1, u(1_000_000)).unwrap();
		state.mint(TOKEN_B, VENUE_1, u(1_000_000)).unwrap();
		ledger
	}

	#[test]
	fn test_pair_entry_point() {
		let store = RegistryStore::new(OWNER);
		let mut ledger = pair_ledger();
		let mut controller = LoanController::new(config());
		let request = PairRequest {
			provider: ProviderKind::PullSimple,
			asset: TOKEN_A,
			amount: u(10_000),
			intermediate: TOKEN_B,
			first_venue: VENUE_0,
			second_venue: VENUE_1,
			min_profit: u(1),
		};

		// 10_000 A -> 19_801 B -> 19_416 A
		let receipt = controller
			.execute_pair(&mut ledger, store.view(), request.clone())
			.unwrap();
		assert_eq!(receipt.entry_point, EntryPoint::Minimal);
		assert_eq!(receipt.steps[0].amount_out, u(19_801));
		assert_eq!(receipt.steps[1].amount_out, u(19_416));
		assert_eq!(receipt.profit, u(19_416 - 10_005));

		let not_cp = PairRequest {
			second_venue: VENUE_2,
			..request
		};
		assert_eq!(
			controller.execute_pair(&mut ledger, store.view(), not_cp),
			Err(ExecutionError::NotConstantProduct(VENUE_2))
		);
	}

	fn payload(nonce: u64) -> DecodedPayload {
		DecodedPayload {
			network: 'E',
			asset_rank: 0,
			amount: u(10_000),
			route_params: Bytes::from(triangle_plan(0).encode().unwrap()),
			min_profit_bps: 40,
			expiry: NOW + 10,
			recipient: Address::repeat_byte(0x7E),
			registry_version_hash: B256::ZERO,
			nonce: u(nonce),
		}
	}

	#[test]
	fn test_payload_entry_point_consumes_nonce_on_success() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let mut validator = PayloadValidator::new(NET);
		let mut controller = LoanController::new(config());
		let bytes = payload(1).encode().unwrap();

		let receipt = controller
			.execute_payload(
				&mut ledger,
				store.view(),
				&mut validator,
				ProviderKind::PullSimple,
				&bytes,
			)
			.unwrap();
		assert_eq!(receipt.profit, u(45));
		assert_eq!(receipt.swept_to, Some(Address::repeat_byte(0x7E)));
		assert!(validator.replay_guard().is_used(&u(1)));

		assert_eq!(
			controller.execute_payload(
				&mut ledger,
				store.view(),
				&mut validator,
				ProviderKind::PullSimple,
				&bytes,
			),
			Err(ExecutionError::Payload(PayloadError::NonceAlreadyUsed(u(1))))
		);
	}

	#[test]
	fn test_payload_failure_keeps_nonce_unused() {
		let store = registry();
		let mut ledger = triangle(10_050);
		let mut validator = PayloadValidator::new(NET);
		let mut controller = LoanController::new(config());
		// 50 bps of 10_000 is 50 > 45
		let mut demanding = payload(2);
		demanding.min_profit_bps = 50;

		let err = controller
			.execute_payload(
				&mut ledger,
				store.view(),
				&mut validator,
				ProviderKind::PullSimple,
				&demanding.encode().unwrap(),
			)
			.unwrap_err();
		assert!(matches!(err, ExecutionError::ProfitTooLow { .. }));
		assert!(!validator.replay_guard().is_used(&u(2)));
	}

	#[test]
	fn test_payload_for_another_network_never_funds() {
		let store = registry();
		// Ledger runs on Base; validator and payload both claim Ethereum.
		let mut ledger = Ledger::new(LedgerState::new(NetworkId::BASE, NOW));
		ledger.deploy_lender(PullSimpleLender::new(PULL));
		ledger.state_mut().mint(TOKEN_A, PULL, u(1_000_000)).unwrap();
		let before = ledger.state().clone();
		let mut validator = PayloadValidator::new(NET);
		let mut controller = LoanController::new(config());

		let err = controller
			.execute_payload(
				&mut ledger,
				store.view(),
				&mut validator,
				ProviderKind::PullSimple,
				&payload(3).encode().unwrap(),
			)
			.unwrap_err();
		assert_eq!(
			err,
			ExecutionError::Payload(PayloadError::ChainMismatch {
				letter: 'E',
				mapped: Some(NET),
				expected: NetworkId::BASE,
			})
		);
		assert_eq!(*ledger.state(), before);
		assert_eq!(controller.guard().sessions_opened(), 0);
		let rejected = controller.last_session().unwrap();
		assert_eq!(rejected.state(), SessionState::Rejected);
		assert_eq!(rejected.principal, u(10_000));
		assert!(!validator.replay_guard().is_used(&u(3)));
	}
}

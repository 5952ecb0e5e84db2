//! Loan session state machine and the non-reentrancy token.

use arb_types::{Address, ProviderKind, U256};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ExecutionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	Idle,
	Requested,
	Funded,
	Executing,
	Settling,
	Closed,
	Rejected,
}

impl SessionState {
	pub fn can_transition_to(self, next: SessionState) -> bool {
		use SessionState::*;
		matches!(
			(self, next),
			(Idle, Requested)
				| (Idle, Rejected)
				| (Requested, Funded)
				| (Funded, Executing)
				| (Executing, Settling)
				| (Settling, Closed)
		)
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, SessionState::Closed | SessionState::Rejected)
	}
}

/// One loan, from request to settlement. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanSession {
	pub provider: ProviderKind,
	/// Zero until a lender is bound to the request.
	pub lender: Address,
	pub asset: Address,
	pub principal: U256,
	/// Known once the lender calls back.
	pub fee: U256,
	state: SessionState,
}

impl LoanSession {
	/// A session in `Idle`, created as soon as a request arrives.
	pub fn new(provider: ProviderKind, asset: Address, principal: U256) -> Self {
		Self {
			provider,
			lender: Address::ZERO,
			asset,
			principal,
			fee: U256::ZERO,
			state: SessionState::Idle,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn advance(&mut self, next: SessionState) -> Result<(), ExecutionError> {
		if !self.state.can_transition_to(next) {
			return Err(ExecutionError::IllegalTransition {
				from: self.state,
				to: next,
			});
		}
		trace!(from = ?self.state, to = ?next, "session transition");
		self.state = next;
		Ok(())
	}
}

/// Hands out at most one live [`SessionToken`] at a time.
#[derive(Debug, Default)]
pub struct SessionGuard {
	active: bool,
	opened: u64,
}

impl SessionGuard {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_active(&self) -> bool {
		self.active
	}

	pub fn sessions_opened(&self) -> u64 {
		self.opened
	}

	/// Opens a session. The token mutably borrows the guard, so a second
	/// session cannot be opened until the token is closed or dropped.
	pub fn acquire(&mut self, session: LoanSession) -> Result<SessionToken<'_>, ExecutionError> {
		if self.active {
			return Err(ExecutionError::SessionActive);
		}
		self.active = true;
		self.opened += 1;
		Ok(SessionToken {
			guard: self,
			session,
		})
	}
}

/// Proof that a session is open. Not `Clone`; consumed by [`close`].
///
/// [`close`]: SessionToken::close
#[derive(Debug)]
pub struct SessionToken<'g> {
	guard: &'g mut SessionGuard,
	session: LoanSession,
}

impl SessionToken<'_> {
	pub fn session(&self) -> &LoanSession {
		&self.session
	}

	pub fn state(&self) -> SessionState {
		self.session.state
	}

	pub fn advance(&mut self, next: SessionState) -> Result<(), ExecutionError> {
		self.session.advance(next)
	}

	pub(crate) fn record_fee(&mut self, fee: U256) {
		self.session.fee = fee;
	}

	/// Ends a settled session and releases the guard.
	pub fn close(mut self) -> Result<LoanSession, ExecutionError> {
		self.session.advance(SessionState::Closed)?;
		Ok(self.session.clone())
	}
}

impl Drop for SessionToken<'_> {
	fn drop(&mut self) {
		self.guard.active = false;
	}
}

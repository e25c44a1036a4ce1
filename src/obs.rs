//! Optional observability helpers for login stages.
//!
//! # Feature Flags
//!
//! - `tracing` (default) emits structured spans named `oidc_broker.login` with the `stage`
//!   and `provider` fields.
//! - `metrics` increments the `oidc_broker_login_total` counter for every
//!   attempt/success/failure, labeled by `stage` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Network-bound or decision stages of a login.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoginStage {
	/// Registry activation.
	Activate,
	/// Discovery document autofill.
	Discovery,
	/// Authorization redirect construction.
	Authorize,
	/// Authorization code exchange.
	Exchange,
	/// ID token decoding and validation.
	Validate,
	/// User attribute loading.
	LoadUser,
	/// Role resolution.
	ResolveRoles,
}
impl LoginStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LoginStage::Activate => "activate",
			LoginStage::Discovery => "discovery",
			LoginStage::Authorize => "authorize",
			LoginStage::Exchange => "exchange",
			LoginStage::Validate => "validate",
			LoginStage::LoadUser => "load_user",
			LoginStage::ResolveRoles => "resolve_roles",
		}
	}
}
impl Display for LoginStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoginOutcome {
	/// Entry to a stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl LoginOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			LoginOutcome::Attempt => "attempt",
			LoginOutcome::Success => "success",
			LoginOutcome::Failure => "failure",
		}
	}
}
impl Display for LoginOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records the outcome of `result` for `stage` and passes it through.
pub(crate) fn observe<T, E>(stage: LoginStage, result: Result<T, E>) -> Result<T, E> {
	record_login_outcome(
		stage,
		if result.is_ok() { LoginOutcome::Success } else { LoginOutcome::Failure },
	);

	result
}

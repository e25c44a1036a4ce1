// self
use crate::obs::{LoginOutcome, LoginStage};

/// Records a stage outcome via the global metrics recorder (when enabled).
pub fn record_login_outcome(stage: LoginStage, outcome: LoginOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oidc_broker_login_total",
			"stage" => stage.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (stage, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_login_outcome_is_infallible() {
		record_login_outcome(LoginStage::Exchange, LoginOutcome::Failure);
	}
}

//! Claim validators: timestamps, issuer, audience, and the relaxed wrapper.

// self
use crate::{_prelude::*, auth::Claims, error::TokenValidationError, provider::ClientRegistration};

/// Clock skew tolerated on `exp`, `nbf`, and `iat`.
pub const CLOCK_SKEW: Duration = Duration::seconds(60);

/// Inputs every validator sees besides the claims.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationContext {
	/// Client identifier that must appear in `aud`.
	pub client_id: String,
	/// Issuer the token must carry, when one is known.
	pub expected_issuer: Option<String>,
	/// Reference instant for time checks.
	pub now: OffsetDateTime,
}
impl ValidationContext {
	/// Context for `registration` evaluated at the current time.
	pub fn for_registration(registration: &ClientRegistration) -> Self {
		Self {
			client_id: registration.client_id.clone(),
			expected_issuer: registration.issuer.clone(),
			now: OffsetDateTime::now_utc(),
		}
	}

	/// Overrides the reference instant.
	pub fn with_now(mut self, now: OffsetDateTime) -> Self {
		self.now = now;

		self
	}
}

/// Single validation step over decoded claims.
pub trait TokenValidator
where
	Self: Send + Sync,
{
	/// Returns the first failed check, if any.
	fn validate(&self, claims: &Claims, ctx: &ValidationContext)
	-> Result<(), TokenValidationError>;
}

/// Checks `exp` (required), `nbf`, and `iat` with [`CLOCK_SKEW`].
#[derive(Clone, Copy, Debug)]
pub struct TimestampValidator {
	skew: Duration,
}
impl TimestampValidator {
	/// Validator tolerating `skew` in both directions.
	pub fn with_skew(skew: Duration) -> Self {
		Self { skew }
	}
}
impl Default for TimestampValidator {
	fn default() -> Self {
		Self::with_skew(CLOCK_SKEW)
	}
}
impl TokenValidator for TimestampValidator {
	fn validate(
		&self,
		claims: &Claims,
		ctx: &ValidationContext,
	) -> Result<(), TokenValidationError> {
		let expires_at = instant_claim(claims, "exp")?.ok_or_else(|| {
			TokenValidationError::Malformed { reason: "missing `exp` claim".into() }
		})?;

		if expires_at.checked_add(self.skew).ok_or_else(|| out_of_range("exp"))? < ctx.now {
			return Err(TokenValidationError::Expired { expired_at: expires_at });
		}

		for name in ["nbf", "iat"] {
			if let Some(valid_from) = instant_claim(claims, name)?
				&& valid_from.checked_sub(self.skew).ok_or_else(|| out_of_range(name))? > ctx.now
			{
				return Err(TokenValidationError::NotYetValid { valid_from });
			}
		}

		Ok(())
	}
}

/// Checks `iss`, `aud`, and `azp` against the registration.
///
/// A token with several audiences must name the client as its authorized party.
#[derive(Clone, Copy, Debug, Default)]
pub struct IssuerAudienceValidator;
impl TokenValidator for IssuerAudienceValidator {
	fn validate(
		&self,
		claims: &Claims,
		ctx: &ValidationContext,
	) -> Result<(), TokenValidationError> {
		let actual = claims.get("iss").and_then(JsonValue::as_str);
		let issuer_ok = match (ctx.expected_issuer.as_deref(), actual) {
			(Some(expected), Some(actual)) => same_issuer(expected, actual),
			(None, Some(actual)) => !actual.trim().is_empty(),
			(_, None) => false,
		};

		if !issuer_ok {
			return Err(TokenValidationError::IssuerMismatch {
				expected: ctx.expected_issuer.clone(),
				actual: actual.map(str::to_owned),
			});
		}

		let audiences = audiences(claims);
		let mismatch =
			|| TokenValidationError::AudienceMismatch { client_id: ctx.client_id.clone() };

		if !audiences.contains(&ctx.client_id.as_str()) {
			return Err(mismatch());
		}
		if audiences.len() > 1
			&& claims.get("azp").and_then(JsonValue::as_str) != Some(ctx.client_id.as_str())
		{
			return Err(mismatch());
		}

		Ok(())
	}
}

/// Runs validators in order and stops at the first failure.
#[derive(Clone, Default)]
pub struct DelegatingValidator {
	validators: Vec<Arc<dyn TokenValidator>>,
}
impl DelegatingValidator {
	/// Appends a validator.
	pub fn with(mut self, validator: impl 'static + TokenValidator) -> Self {
		self.validators.push(Arc::new(validator));

		self
	}

	/// Number of chained validators.
	pub fn len(&self) -> usize {
		self.validators.len()
	}

	/// Returns true when the chain is empty.
	pub fn is_empty(&self) -> bool {
		self.validators.is_empty()
	}
}
impl TokenValidator for DelegatingValidator {
	fn validate(
		&self,
		claims: &Claims,
		ctx: &ValidationContext,
	) -> Result<(), TokenValidationError> {
		self.validators.iter().try_for_each(|validator| validator.validate(claims, ctx))
	}
}
impl Debug for DelegatingValidator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("DelegatingValidator").field("validators", &self.validators.len()).finish()
	}
}

/// Wraps a validator; when not enforcing, failures are logged and the token accepted.
#[derive(Clone)]
pub struct ConfigurableValidator {
	inner: Arc<dyn TokenValidator>,
	enforce: bool,
}
impl ConfigurableValidator {
	/// Wraps `inner`.
	pub fn new(inner: impl 'static + TokenValidator, enforce: bool) -> Self {
		Self { inner: Arc::new(inner), enforce }
	}

	/// Whether failures are propagated.
	pub fn enforces(&self) -> bool {
		self.enforce
	}
}
impl TokenValidator for ConfigurableValidator {
	fn validate(
		&self,
		claims: &Claims,
		ctx: &ValidationContext,
	) -> Result<(), TokenValidationError> {
		match self.inner.validate(claims, ctx) {
			Err(e) if !self.enforce => {
				#[cfg(feature = "tracing")]
				tracing::warn!(
					error = %e,
					"Accepting token that failed validation; enforcement is off."
				);
				#[cfg(not(feature = "tracing"))]
				let _ = e;

				Ok(())
			},
			result => result,
		}
	}
}
impl Debug for ConfigurableValidator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConfigurableValidator").field("enforce", &self.enforce).finish()
	}
}

fn instant_claim(
	claims: &Claims,
	name: &str,
) -> Result<Option<OffsetDateTime>, TokenValidationError> {
	let Some(value) = claims.get(name) else {
		return Ok(None);
	};
	let malformed =
		|| TokenValidationError::Malformed { reason: format!("`{name}` is not a timestamp") };
	// NumericDate may carry a fractional part.
	let secs = match value.as_i64() {
		Some(secs) => secs,
		None => value
			.as_f64()
			.filter(|secs| secs.is_finite() && secs.abs() < i64::MAX as f64)
			.map(|secs| secs.floor() as i64)
			.ok_or_else(malformed)?,
	};

	OffsetDateTime::from_unix_timestamp(secs).map(Some).map_err(|_| out_of_range(name))
}

fn out_of_range(name: &str) -> TokenValidationError {
	TokenValidationError::Malformed { reason: format!("`{name}` is out of range") }
}

fn audiences(claims: &Claims) -> Vec<&str> {
	match claims.get("aud") {
		Some(JsonValue::String(aud)) => vec![aud.as_str()],
		Some(JsonValue::Array(values)) => values.iter().filter_map(JsonValue::as_str).collect(),
		_ => Vec::new(),
	}
}

fn same_issuer(expected: &str, actual: &str) -> bool {
	expected.trim().trim_end_matches('/') == actual.trim().trim_end_matches('/')
}

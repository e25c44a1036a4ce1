//! Opt-in audit record of a code exchange, written to a dedicated log target.
//!
//! Records are rendered for the generic OIDC provider only and only when the runtime flag
//! is on. Token signatures never appear in a record. A token that fails to decode is
//! reported as a warning and logged without claims; the exchange result never changes.

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	oauth::{AccessTokenResponse, CodeExchange},
	token::{SegmentError, read_unverified},
};

/// Log target of the confidential channel.
pub const CONFIDENTIAL_TARGET: &str = "oidc_broker::confidential";

/// Redacted rendering of a token value.
///
/// Three-part tokens become `body:<payload>`; anything else becomes `opaque:<value>`.
pub fn redact_token_value(value: &str) -> String {
	let parts = value.split('.').collect::<Vec<_>>();

	match parts.as_slice() {
		[_, body, _] => format!("body:{body}"),
		_ => format!("opaque:{value}"),
	}
}

/// Token prepared for the audit record.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedToken {
	/// Redacted value; see [`redact_token_value`].
	pub redacted: String,
	/// JOSE header claims, for JWTs.
	pub header: Option<JsonValue>,
	/// Body claims, for JWTs.
	pub body: Option<JsonValue>,
}
impl DecodedToken {
	/// Decodes `value`; opaque values carry no claims.
	pub fn decode(value: &str) -> Result<Self, SegmentError> {
		let redacted = redact_token_value(value);

		match read_unverified(value) {
			Ok(jwt) => Ok(Self { redacted, header: Some(jwt.header), body: Some(jwt.body) }),
			Err(SegmentError::NotJwt) => Ok(Self { redacted, header: None, body: None }),
			Err(e) => Err(e),
		}
	}
}

/// Everything the confidential channel logs about one exchange.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeAuditRecord {
	/// Provider that issued the tokens.
	pub provider: ProviderId,
	/// Authorization code that was exchanged.
	pub code: String,
	/// Token type.
	pub token_type: String,
	/// Granted scopes.
	pub scopes: String,
	/// Access token.
	pub access_token: DecodedToken,
	/// ID token, when issued.
	pub id_token: Option<DecodedToken>,
}
impl ExchangeAuditRecord {
	/// Builds the record for a completed exchange.
	///
	/// A token that cannot be decoded keeps its redacted value but carries no claims; the
	/// rest of the record is unaffected.
	pub fn build(
		provider: &ProviderId,
		exchange: &CodeExchange,
		response: &AccessTokenResponse,
	) -> Self {
		Self {
			provider: provider.clone(),
			code: exchange.code.expose().to_owned(),
			token_type: response.token_type.clone(),
			scopes: response.scopes.normalized(),
			access_token: decode_or_warn("access token", response.access_token.expose()),
			id_token: response
				.id_token
				.as_ref()
				.map(|token| decode_or_warn("id token", token.expose())),
		}
	}
}
impl Display for ExchangeAuditRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		writeln!(f, "Exchanged authorization code for provider `{}`:", self.provider)?;
		writeln!(f, "  code: {}", self.code)?;
		writeln!(f, "  token type: {}", self.token_type)?;
		writeln!(f, "  scopes: {}", self.scopes)?;
		write_token(f, "access token", &self.access_token)?;

		if let Some(id_token) = self.id_token.as_ref() {
			write_token(f, "id token", id_token)?;
		}

		Ok(())
	}
}

fn write_token(f: &mut Formatter, label: &str, token: &DecodedToken) -> FmtResult {
	writeln!(f, "  {label}: {}", token.redacted)?;

	if let Some(header) = token.header.as_ref() {
		writeln!(f, "  {label} header: {header}")?;
	}
	if let Some(body) = token.body.as_ref() {
		writeln!(f, "  {label} body: {body}")?;
	}

	Ok(())
}

fn decode_or_warn(label: &str, value: &str) -> DecodedToken {
	DecodedToken::decode(value).unwrap_or_else(|e| {
		#[cfg(feature = "tracing")]
		tracing::warn!(
			target: CONFIDENTIAL_TARGET,
			token = label,
			error = %e,
			"Could not decode token."
		);
		#[cfg(not(feature = "tracing"))]
		let _ = (label, e);

		DecodedToken { redacted: redact_token_value(value), header: None, body: None }
	})
}

/// Runtime-gated writer for [`ExchangeAuditRecord`] values.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfidentialLogger {
	enabled: bool,
}
impl ConfidentialLogger {
	/// Logger emitting records only when `enabled`.
	pub fn new(enabled: bool) -> Self {
		Self { enabled }
	}

	/// Whether records are emitted.
	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// Logs the exchange for the generic OIDC provider and returns the emitted record.
	///
	/// Returns `None` when disabled or for other providers.
	pub fn log_exchange(
		&self,
		provider: &ProviderId,
		exchange: &CodeExchange,
		response: &AccessTokenResponse,
	) -> Option<ExchangeAuditRecord> {
		if !self.enabled || !provider.is_oidc() {
			return None;
		}

		let record = ExchangeAuditRecord::build(provider, exchange, response);

		#[cfg(feature = "tracing")]
		tracing::debug!(target: CONFIDENTIAL_TARGET, "{record}");

		Some(record)
	}
}

//! Provider strategy hooks that classify token endpoint failures.
//!
//! Strategies see only crate-owned data (status codes, OAuth fields, body previews), so
//! they stay independent of the HTTP client that performed the exchange.

// self
use crate::{_prelude::*, auth::ProviderId};

/// Strategy hook mapping token endpoint failures into the broker taxonomy.
pub trait ProviderStrategy
where
	Self: Send + Sync,
{
	/// Classifies a structured OAuth error response.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Classifies a response body that did not parse as a token response.
	///
	/// Returning `None` keeps the failure as a parse error. Providers that answer
	/// errors with `200 OK` override this.
	fn classify_unparsed_body(&self, _body: &str) -> Option<ProviderErrorKind> {
		None
	}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the authorization code.
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Provider refused the requested scopes.
	InvalidScope,
	/// Any other failure reported by the token endpoint.
	Unexpected,
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Provider whose token endpoint failed.
	pub provider: ProviderId,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Creates a new context for `provider`.
	pub fn new(provider: ProviderId) -> Self {
		Self { provider, http_status: None, oauth_error: None, error_description: None }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// RFC 6749 heuristics: structured `error` first, then the description, then status.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(match_error_code)
			.or_else(|| ctx.error_description.as_deref().and_then(match_error_text))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

/// GitHub answers failed exchanges with `200 OK` and its own error codes.
#[derive(Debug, Default)]
pub struct GitHubProviderStrategy;
impl ProviderStrategy for GitHubProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_token_error(ctx)
	}

	fn classify_unparsed_body(&self, body: &str) -> Option<ProviderErrorKind> {
		let value = serde_json::from_str::<JsonValue>(body).ok()?;
		let code = value.get("error")?.as_str()?;

		match code {
			"bad_verification_code" | "redirect_uri_mismatch" =>
				Some(ProviderErrorKind::InvalidGrant),
			"incorrect_client_credentials" => Some(ProviderErrorKind::InvalidClient),
			other => Some(match_error_code(other).unwrap_or(ProviderErrorKind::Unexpected)),
		}
	}
}

/// Strategy used for `provider`.
pub fn strategy_for(provider: &ProviderId) -> Arc<dyn ProviderStrategy> {
	if provider.as_ref() == ProviderId::GITHUB {
		Arc::new(GitHubProviderStrategy)
	} else {
		Arc::new(DefaultProviderStrategy)
	}
}

fn match_error_code(value: &str) -> Option<ProviderErrorKind> {
	if value.eq_ignore_ascii_case("invalid_grant") || value.eq_ignore_ascii_case("access_denied") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if value.eq_ignore_ascii_case("invalid_client")
		|| value.eq_ignore_ascii_case("unauthorized_client")
	{
		Some(ProviderErrorKind::InvalidClient)
	} else if value.eq_ignore_ascii_case("invalid_scope") {
		Some(ProviderErrorKind::InvalidScope)
	} else {
		None
	}
}

fn match_error_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	if lowered.contains("invalid_grant") || lowered.contains("expired") {
		Some(ProviderErrorKind::InvalidGrant)
	} else if lowered.contains("invalid_client") {
		Some(ProviderErrorKind::InvalidClient)
	} else if lowered.contains("invalid_scope") {
		Some(ProviderErrorKind::InvalidScope)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		_ => ProviderErrorKind::Unexpected,
	}
}

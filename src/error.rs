//! Broker-level error types shared across configuration, flows, validation, and role mapping.

// self
use crate::{_prelude::*, auth::ProviderId};

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// An enabled provider failed configuration validation during activation.
	#[error("Provider `{provider}` configuration is invalid: {}.", join_config_errors(errors))]
	InvalidProvider {
		/// Provider whose configuration was rejected.
		provider: ProviderId,
		/// Every validation finding, in check order.
		errors: Vec<ConfigError>,
	},
	/// Local setup problem (HTTP client construction, endpoint parsing).
	#[error(transparent)]
	Setup(#[from] SetupError),
	/// Discovery document could not be fetched or parsed.
	#[error(transparent)]
	Discovery(#[from] DiscoveryError),
	/// Authorization code exchange failed.
	#[error(transparent)]
	Exchange(#[from] ExchangeError),
	/// Returned tokens failed validation.
	#[error(transparent)]
	TokenValidation(#[from] TokenValidationError),
	/// User attributes could not be loaded.
	#[error(transparent)]
	UserInfo(#[from] UserInfoError),
	/// Roles could not be resolved for an authenticated identity.
	#[error(transparent)]
	RoleResolution(#[from] RoleResolutionError),
	/// Network failure outside the token endpoint call.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Session-scoped state could not be read or written.
	#[error(transparent)]
	Session(#[from] SessionStoreError),

	/// Login targeted a provider that is unknown or disabled.
	#[error("Provider `{provider}` is not enabled.")]
	UnknownProvider {
		/// Provider identifier requested by the caller.
		provider: String,
	},
	/// The provider redirected back with an OAuth error instead of a code.
	#[error("Authorization was denied by the provider: {error}.")]
	AuthorizationDenied {
		/// OAuth `error` parameter.
		error: String,
		/// Optional OAuth `error_description` parameter.
		description: Option<String>,
	},
	/// The callback did not match any pending authorization request.
	#[error("Authorization callback does not match a pending request: {reason}.")]
	InvalidCallback {
		/// Broker-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Generic message safe to render to end users.
	///
	/// Never includes tokens, secrets, or upstream error payloads.
	pub fn user_message(&self) -> &'static str {
		match self {
			Error::InvalidProvider { .. } | Error::Setup(_) | Error::Discovery(_) =>
				"Login is not available because the identity provider is misconfigured.",
			Error::UnknownProvider { .. } => "The requested login provider is not available.",
			Error::AuthorizationDenied { .. } => "Login was cancelled or denied.",
			Error::Exchange(_)
			| Error::TokenValidation(_)
			| Error::UserInfo(_)
			| Error::RoleResolution(_)
			| Error::Transport(_)
			| Error::Session(_)
			| Error::InvalidCallback { .. } => "Login failed. Please try again.",
		}
	}
}

/// Named URL fields checked by the configuration validator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlField {
	/// Token endpoint.
	TokenUri,
	/// Authorization endpoint.
	AuthorizationUri,
	/// User-info endpoint.
	UserInfoUri,
	/// JSON Web Key set endpoint.
	JwkSetUri,
	/// Redirect (callback) URI.
	RedirectUri,
	/// End-session (logout) endpoint.
	LogoutUri,
}
impl UrlField {
	/// Returns a stable label for messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			UrlField::TokenUri => "token_uri",
			UrlField::AuthorizationUri => "authorization_uri",
			UrlField::UserInfoUri => "user_info_uri",
			UrlField::JwkSetUri => "jwk_set_uri",
			UrlField::RedirectUri => "redirect_uri",
			UrlField::LogoutUri => "logout_uri",
		}
	}
}
impl Display for UrlField {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Findings reported by [`ConfigValidator`](crate::config::ConfigValidator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ConfigError {
	/// A configured URL is not a well-formed absolute URL.
	#[error("The {0} is not a well-formed absolute URL.")]
	MalformedUrl(UrlField),
	/// A URL that must use HTTPS uses another scheme.
	#[error("The {0} must use HTTPS.")]
	InsecureScheme(UrlField),
	/// Client identifier is missing.
	#[error("Client ID is required.")]
	MissingClientId,
	/// Client secret is missing and PKCE is not enabled.
	#[error("Client secret is required unless PKCE is enabled.")]
	MissingClientSecret,
	/// Scope list is empty.
	#[error("At least one scope is required.")]
	MissingScope,
	/// Neither a user-info endpoint nor a JWK set endpoint is configured.
	#[error("Either the user-info URI or the JWK set URI is required.")]
	MissingVerificationEndpoint,
}

fn join_config_errors(errors: &[ConfigError]) -> String {
	errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
}

/// Local setup failures raised while building clients or registrations.
#[derive(Debug, ThisError)]
pub enum SetupError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A registration endpoint the flow needs is not configured.
	#[error("The {field} endpoint is not configured.")]
	MissingEndpoint {
		/// Which endpoint is missing.
		field: UrlField,
	},
	/// A registration endpoint could not be parsed.
	#[error("The {field} endpoint is invalid.")]
	InvalidEndpoint {
		/// Which endpoint failed to parse.
		field: UrlField,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
}
impl SetupError {
	/// Wraps a transport's builder failure inside [`SetupError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
impl From<ReqwestError> for SetupError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request did not complete within the configured timeout.
	#[error("Request to the provider timed out.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

/// Failures of the JSON GET helper shared by discovery, user-info, graph, and JWKS calls.
#[derive(Debug, ThisError)]
pub enum FetchError {
	/// Transport failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Endpoint answered with a non-success status.
	#[error("Endpoint responded with HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
	},
	/// Endpoint answered with a body that is not the expected JSON document.
	#[error("Endpoint returned malformed JSON.")]
	Parse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Failures reported by session store backends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum SessionStoreError {
	/// Stored state could not be (de)serialized.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Discovery document failures; the prior configuration is never touched.
#[derive(Debug, ThisError)]
pub enum DiscoveryError {
	/// The provider configuration carries no discovery URL.
	#[error("No discovery URL is configured.")]
	MissingUri,
	/// Discovery URL is not a valid absolute URL.
	#[error("Discovery URL is invalid.")]
	InvalidUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Fetching or parsing the document failed.
	#[error("Discovery document could not be loaded.")]
	Fetch {
		/// Underlying fetch failure.
		#[source]
		source: FetchError,
	},
}

/// Authorization code exchange failures.
#[derive(Debug, ThisError)]
pub enum ExchangeError {
	/// Provider rejected the grant (bad, expired, or replayed code).
	#[error("Provider rejected the authorization code: {reason}.")]
	InvalidGrant {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Provider refused the requested scopes.
	#[error("Provider refused the requested scopes: {reason}.")]
	InvalidScope {
		/// Provider- or broker-supplied reason string.
		reason: String,
	},
	/// Token endpoint returned an unexpected but non-OAuth failure.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Broker-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Exchange could not be prepared locally.
	#[error(transparent)]
	Setup(#[from] SetupError),
}

/// Typed token validation failures.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenValidationError {
	/// Token could not be decoded as a JWT.
	#[error("Token is malformed: {reason}.")]
	Malformed {
		/// Decoder-supplied reason string.
		reason: String,
	},
	/// Token `exp` lies in the past (beyond the allowed clock skew).
	#[error("Token expired at {expired_at}.")]
	Expired {
		/// Expiry instant taken from the token.
		expired_at: OffsetDateTime,
	},
	/// Token `nbf`/`iat` lies in the future (beyond the allowed clock skew).
	#[error("Token is not valid before {valid_from}.")]
	NotYetValid {
		/// Earliest validity instant taken from the token.
		valid_from: OffsetDateTime,
	},
	/// Token issuer differs from the expected issuer or is absent.
	#[error("Token issuer does not match the expected issuer.")]
	IssuerMismatch {
		/// Expected issuer, when one is configured.
		expected: Option<String>,
		/// Issuer found in the token.
		actual: Option<String>,
	},
	/// Token audience does not include the client or the authorized party differs.
	#[error("Token audience does not include client `{client_id}`.")]
	AudienceMismatch {
		/// Client identifier that should have been present.
		client_id: String,
	},
	/// ID token nonce does not match the authorization request.
	#[error("Token nonce does not match the authorization request.")]
	NonceMismatch,
	/// Signature could not be verified.
	#[error("Token signature is invalid: {reason}.")]
	SignatureInvalid {
		/// Verifier-supplied reason string.
		reason: String,
	},
	/// Signing keys could not be loaded.
	#[error("Signing keys could not be loaded: {reason}.")]
	KeySetUnavailable {
		/// Fetch failure summary.
		reason: String,
	},
}

/// Failures raised by user loaders before role resolution.
#[derive(Debug, ThisError)]
pub enum UserInfoError {
	/// User-info endpoint call failed.
	#[error("User-info endpoint could not be loaded.")]
	Fetch {
		/// Underlying fetch failure.
		#[source]
		source: FetchError,
	},
	/// OAuth 2.0 login requires a user-info endpoint but none is configured.
	#[error("Provider `{provider}` has no user-info endpoint.")]
	MissingEndpoint {
		/// Provider identifier.
		provider: ProviderId,
	},
	/// The configured user-name attribute is absent from the user attributes.
	#[error("User attribute `{attribute}` is missing.")]
	MissingUserNameAttribute {
		/// Attribute name that was looked up.
		attribute: String,
	},
	/// User-info `sub` differs from the ID token `sub`.
	#[error("User-info subject does not match the ID token subject.")]
	SubjectMismatch,
}

/// Role resolution failures, distinct from a successful login with zero roles.
#[derive(Debug, ThisError)]
pub enum RoleResolutionError {
	/// User-info endpoint call failed.
	#[error("User-info endpoint could not be loaded for role resolution.")]
	UserInfo {
		/// Underlying fetch failure.
		#[source]
		source: FetchError,
	},
	/// Graph API call failed.
	#[error("Graph API call failed.")]
	Graph {
		/// Underlying fetch failure.
		#[source]
		source: FetchError,
	},
	/// The user-info endpoint is not on the graph host, so the access token cannot be
	/// used against the graph API.
	#[error("User-info URI `{user_info_uri}` is not served by graph host `{graph_host}`.")]
	GraphHostMismatch {
		/// Configured user-info URI (empty when absent).
		user_info_uri: String,
		/// Host of the configured graph endpoint.
		graph_host: String,
	},
	/// The role source needs an endpoint the provider does not expose.
	#[error("Provider `{provider}` has no user-info endpoint for role resolution.")]
	MissingUserInfoEndpoint {
		/// Provider identifier.
		provider: ProviderId,
	},
	/// External role or user-group service failed.
	#[error("Role service `{service}` failed: {message}.")]
	Service {
		/// Service name.
		service: String,
		/// Service-supplied message.
		message: String,
	},
}

//! Authorization redirect construction: state, nonce, PKCE, and provider parameters.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{ProviderId, ScopeSet},
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
	provider::ClientRegistration,
};

const STATE_LEN: usize = 32;
const NONCE_LEN: usize = 32;
const PKCE_VERIFIER_LEN: usize = 64;

/// Supported PKCE challenge methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceCodeChallengeMethod {
	/// SHA-256 based PKCE (RFC 7636 S256).
	S256,
}
impl PkceCodeChallengeMethod {
	/// Returns the RFC 7636 identifier for the challenge method.
	pub fn as_str(self) -> &'static str {
		match self {
			PkceCodeChallengeMethod::S256 => "S256",
		}
	}
}

/// PKCE verifier plus the challenge derived from it.
#[derive(Clone)]
pub struct PkcePair {
	verifier: String,
	challenge: String,
	method: PkceCodeChallengeMethod,
}
impl PkcePair {
	/// Generates a fresh verifier and its S256 challenge.
	pub fn generate() -> Self {
		let verifier = random_string(PKCE_VERIFIER_LEN);
		let challenge = compute_pkce_challenge(&verifier);

		Self { verifier, challenge, method: PkceCodeChallengeMethod::S256 }
	}

	/// Secret verifier sent with the code exchange.
	pub fn verifier(&self) -> &str {
		&self.verifier
	}

	/// Challenge sent with the authorization request.
	pub fn challenge(&self) -> &str {
		&self.challenge
	}

	/// Challenge method (currently always `S256`).
	pub fn method(&self) -> PkceCodeChallengeMethod {
		self.method
	}
}
impl Debug for PkcePair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PkcePair")
			.field("challenge", &self.challenge)
			.field("method", &self.method)
			.finish_non_exhaustive()
	}
}

/// Mutable view of the optional authorization request parameters.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationParameters {
	/// Additional query parameters, appended in insertion order.
	pub extra: Vec<(String, String)>,
	/// PKCE pair, when a challenge should be sent.
	pub pkce: Option<PkcePair>,
}
impl AuthorizationParameters {
	/// Appends an extra query parameter.
	pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
		self.extra.push((name.into(), value.into()));
	}

	/// Value of the extra parameter `name`, if present.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.extra.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
	}
}

/// Hook that shapes an authorization request before the redirect is issued.
pub trait AuthorizationRequestCustomizer
where
	Self: Send + Sync,
{
	/// Adjusts `params` for `registration`.
	fn customize(&self, registration: &ClientRegistration, params: &mut AuthorizationParameters);
}

/// Adds `response_mode` and then the PKCE challenge for the generic OIDC provider.
///
/// Other providers pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct OidcAuthorizationCustomizer;
impl AuthorizationRequestCustomizer for OidcAuthorizationCustomizer {
	fn customize(&self, registration: &ClientRegistration, params: &mut AuthorizationParameters) {
		if !registration.id.is_oidc() {
			return;
		}

		if let Some(mode) = registration.response_mode.as_deref().map(str::trim)
			&& !mode.is_empty()
		{
			params.push("response_mode", mode);
		}
		if registration.use_pkce {
			params.pkce = Some(PkcePair::generate());
		}
	}
}

/// Pending authorization request kept in the session until the callback arrives.
#[derive(Clone)]
pub struct AuthorizationRequest {
	/// Provider the browser was sent to.
	pub provider: ProviderId,
	/// Opaque state that must round-trip through the provider.
	pub state: String,
	/// Nonce the ID token must echo, for `openid` registrations.
	pub nonce: Option<String>,
	/// Callback URI sent with the request.
	pub redirect_uri: Url,
	/// Requested scopes.
	pub scopes: ScopeSet,
	/// Fully-formed authorization URL.
	pub authorize_url: Url,
	/// Creation instant.
	pub created_at: OffsetDateTime,
	pkce: Option<PkcePair>,
}
impl AuthorizationRequest {
	/// Builds the request for `registration`, letting `customizer` add parameters.
	pub fn build(
		registration: &ClientRegistration,
		customizer: &dyn AuthorizationRequestCustomizer,
	) -> Self {
		let _span = LoginSpan::new(LoginStage::Authorize, registration.id.as_ref()).entered();

		obs::record_login_outcome(LoginStage::Authorize, LoginOutcome::Attempt);

		let mut params = AuthorizationParameters::default();

		customizer.customize(registration, &mut params);

		let state = random_string(STATE_LEN);
		let nonce = registration.is_openid().then(|| random_string(NONCE_LEN));
		let authorize_url = build_authorize_url(registration, &state, nonce.as_deref(), &params);

		obs::record_login_outcome(LoginStage::Authorize, LoginOutcome::Success);

		Self {
			provider: registration.id.clone(),
			state,
			nonce,
			redirect_uri: registration.redirect_uri.clone(),
			scopes: registration.scopes.clone(),
			authorize_url,
			created_at: OffsetDateTime::now_utc(),
			pkce: params.pkce,
		}
	}

	/// PKCE verifier to send with the code exchange.
	pub fn pkce_verifier(&self) -> Option<&str> {
		self.pkce.as_ref().map(PkcePair::verifier)
	}

	/// Checks that a callback for `provider` carrying `returned_state` belongs here.
	pub fn validate_callback(&self, provider: &str, returned_state: &str) -> Result<()> {
		if returned_state != self.state {
			return Err(Error::InvalidCallback { reason: "state mismatch".into() });
		}
		if provider != self.provider.as_ref() {
			return Err(Error::InvalidCallback { reason: "provider mismatch".into() });
		}

		Ok(())
	}
}
impl Debug for AuthorizationRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationRequest")
			.field("provider", &self.provider)
			.field("state", &self.state)
			.field("nonce_set", &self.nonce.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.field("scopes", &self.scopes)
			.field("authorize_url", &self.authorize_url)
			.field("pkce", &self.pkce)
			.finish()
	}
}

fn build_authorize_url(
	registration: &ClientRegistration,
	state: &str,
	nonce: Option<&str>,
	params: &AuthorizationParameters,
) -> Url {
	let mut url = registration.endpoints.authorization.clone();
	let mut pairs = url.query_pairs_mut();

	pairs.append_pair("response_type", "code");
	pairs.append_pair("client_id", &registration.client_id);

	if !registration.scopes.is_empty() {
		pairs.append_pair("scope", &registration.scopes.normalized());
	}

	pairs.append_pair("state", state);
	pairs.append_pair("redirect_uri", registration.redirect_uri.as_str());

	if let Some(nonce) = nonce {
		pairs.append_pair("nonce", nonce);
	}
	for (name, value) in &params.extra {
		pairs.append_pair(name, value);
	}
	if let Some(pkce) = params.pkce.as_ref() {
		pairs.append_pair("code_challenge", &pkce.challenge);
		pairs.append_pair("code_challenge_method", pkce.method.as_str());
	}

	drop(pairs);

	url
}

fn random_string(len: usize) -> String {
	rand::rng().sample_iter(Alphanumeric).take(len).map(char::from).collect()
}

fn compute_pkce_challenge(verifier: &str) -> String {
	URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::config::ProviderConfig;

	const REDIRECT: &str = "https://app.example.com/geo/login/oauth2/code/oidc";

	fn oidc(config: ProviderConfig) -> ClientRegistration {
		let config = config
			.with_enabled(true)
			.with_client_id("client")
			.with_authorization_uri("https://idp.example.com/authorize")
			.with_token_uri("https://idp.example.com/token")
			.with_jwk_set_uri("https://idp.example.com/jwks");

		ClientRegistration::from_config(&ProviderId::oidc(), &config, REDIRECT)
			.expect("OIDC registration fixture should build.")
	}

	fn query(url: &Url) -> BTreeMap<String, String> {
		url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect()
	}

	#[test]
	fn response_mode_is_trimmed_and_blank_is_dropped() {
		let registration = oidc(ProviderConfig::oidc().with_response_mode(" form_post "));
		let mut params = AuthorizationParameters::default();

		OidcAuthorizationCustomizer.customize(&registration, &mut params);

		assert_eq!(params.get("response_mode"), Some("form_post"));

		for blank in [ProviderConfig::oidc().with_response_mode("   "), ProviderConfig::oidc()] {
			let mut params = AuthorizationParameters::default();

			OidcAuthorizationCustomizer.customize(&oidc(blank), &mut params);

			assert!(params.get("response_mode").is_none());
		}
	}

	#[test]
	fn customizer_ignores_builtin_providers() {
		let config = ProviderConfig::google()
			.with_enabled(true)
			.with_client_id("client")
			.with_client_secret("secret")
			.with_response_mode("form_post")
			.with_pkce(true);
		let registration = ClientRegistration::from_config(&ProviderId::google(), &config, REDIRECT)
			.expect("Google registration fixture should build.");
		let mut params = AuthorizationParameters::default();

		OidcAuthorizationCustomizer.customize(&registration, &mut params);

		assert!(params.extra.is_empty());
		assert!(params.pkce.is_none());
	}

	#[test]
	fn authorize_url_carries_state_nonce_and_pkce() {
		let registration = oidc(
			ProviderConfig::oidc()
				.with_client_secret("secret")
				.with_pkce(true)
				.with_response_mode("query"),
		);
		let request = AuthorizationRequest::build(&registration, &OidcAuthorizationCustomizer);
		let query = query(&request.authorize_url);

		assert_eq!(query.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(query.get("client_id").map(String::as_str), Some("client"));
		assert_eq!(query.get("scope").map(String::as_str), Some("email openid profile"));
		assert_eq!(query.get("state"), Some(&request.state));
		assert_eq!(query.get("nonce"), request.nonce.as_ref());
		assert_eq!(query.get("redirect_uri").map(String::as_str), Some(REDIRECT));
		assert_eq!(query.get("response_mode").map(String::as_str), Some("query"));
		assert_eq!(query.get("code_challenge_method").map(String::as_str), Some("S256"));

		let verifier = request.pkce_verifier().expect("PKCE verifier should be generated.");

		assert_eq!(
			query.get("code_challenge").map(String::as_str),
			Some(compute_pkce_challenge(verifier).as_str())
		);
		assert!(!format!("{request:?}").contains(verifier));
	}

	#[test]
	fn non_openid_requests_have_no_nonce() {
		let registration =
			oidc(ProviderConfig::oidc().with_client_secret("secret").with_scopes("read"));
		let request = AuthorizationRequest::build(&registration, &OidcAuthorizationCustomizer);

		assert!(request.nonce.is_none());
		assert!(request.pkce_verifier().is_none());
		assert!(!query(&request.authorize_url).contains_key("nonce"));
	}

	#[test]
	fn callback_must_match_state_and_provider() {
		let registration = oidc(ProviderConfig::oidc().with_client_secret("secret"));
		let request = AuthorizationRequest::build(&registration, &OidcAuthorizationCustomizer);

		assert!(request.validate_callback("oidc", &request.state).is_ok());
		assert!(matches!(
			request.validate_callback("oidc", "forged"),
			Err(Error::InvalidCallback { .. })
		));
		assert!(matches!(
			request.validate_callback("google", &request.state),
			Err(Error::InvalidCallback { .. })
		));
	}

	#[test]
	fn pkce_challenge_matches_rfc_7636_example() {
		assert_eq!(
			compute_pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFjgMTXEX-RTIm22FT6_6KeJ0GYPQfZ8"
		);
	}
}

//! Per-provider validator chains and ID token decoders.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	http::ReqwestHttpClient,
	provider::ClientRegistration,
	token::{
		ConfigurableValidator, DelegatingValidator, IdTokenDecoder, IssuerAudienceValidator,
		TimestampValidator, TokenValidator,
	},
};

/// Builds and caches validators and decoders keyed by provider id.
///
/// One factory lives per activated registry, so cached entries never outlive the
/// registration they were derived from. Entries are never shared across providers.
pub struct TokenValidatorFactory {
	http_client: ReqwestHttpClient,
	timeout: StdDuration,
	validators: RwLock<HashMap<ProviderId, Arc<dyn TokenValidator>>>,
	decoders: RwLock<HashMap<ProviderId, Arc<IdTokenDecoder>>>,
}
impl TokenValidatorFactory {
	/// Factory whose decoders fetch key sets through `http_client`.
	pub fn new(http_client: ReqwestHttpClient, timeout: StdDuration) -> Self {
		Self {
			http_client,
			timeout,
			validators: Default::default(),
			decoders: Default::default(),
		}
	}

	/// Timestamp plus issuer/audience chain shared by every provider.
	pub fn default_chain() -> DelegatingValidator {
		DelegatingValidator::default()
			.with(TimestampValidator::default())
			.with(IssuerAudienceValidator)
	}

	/// Validator for `registration`.
	///
	/// The generic OIDC provider gets the default chain wrapped in a
	/// [`ConfigurableValidator`] honoring its enforcement toggle; built-in providers get
	/// the plain chain.
	pub fn validator_for(&self, registration: &ClientRegistration) -> Arc<dyn TokenValidator> {
		if let Some(validator) = self.validators.read().get(&registration.id) {
			return validator.clone();
		}

		let validator: Arc<dyn TokenValidator> = if registration.id.is_oidc() {
			Arc::new(ConfigurableValidator::new(
				Self::default_chain(),
				registration.enforce_token_validation,
			))
		} else {
			Arc::new(Self::default_chain())
		};

		self.validators.write().entry(registration.id.clone()).or_insert(validator).clone()
	}

	/// ID token decoder for `registration`.
	pub fn decoder_for(&self, registration: &ClientRegistration) -> Arc<IdTokenDecoder> {
		if let Some(decoder) = self.decoders.read().get(&registration.id) {
			return decoder.clone();
		}

		let decoder = Arc::new(IdTokenDecoder::new(
			registration.id.clone(),
			registration.endpoints.jwk_set.clone(),
			self.http_client.clone(),
			self.timeout,
		));

		self.decoders.write().entry(registration.id.clone()).or_insert(decoder).clone()
	}
}
impl Debug for TokenValidatorFactory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenValidatorFactory")
			.field("validators", &self.validators.read().len())
			.field("decoders", &self.decoders.read().len())
			.finish()
	}
}

//! Callback stage: code exchange, ID token verification, user loading.

// self
use crate::{
	_prelude::*,
	auth::IdToken,
	config::CALLBACK_PATH,
	error::TokenValidationError,
	filter::{
		AuthorizationRequestStore, FilterFuture, FilterKind, FilterOutcome, InboundRequest,
		LoginFilter, SavedRequestStore,
	},
	flows::{AuthorizationRequest, ReqwestTokenExchangeClient},
	oauth::{AccessTokenResponse, CodeExchange},
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
	provider::{ClientRegistration, ProviderRegistry},
	token::{TokenValidatorFactory, ValidationContext},
	user::{RoleResolvingLoader, UserRequest},
};

/// Handles `/login/oauth2/code/{id}` callbacks.
///
/// Unknown or disabled providers and provider error callbacks fail before any network
/// call. Otherwise the pending request is matched by `state`, the code is exchanged, the
/// ID token (for `openid` registrations) is verified, and the user is loaded with roles.
#[derive(Clone)]
pub struct LoginAuthenticationFilter {
	registry: Arc<ProviderRegistry>,
	requests: Arc<dyn AuthorizationRequestStore>,
	saved: Arc<dyn SavedRequestStore>,
	exchange: ReqwestTokenExchangeClient,
	tokens: Arc<TokenValidatorFactory>,
	oauth2_loader: RoleResolvingLoader,
	oidc_loader: RoleResolvingLoader,
}
impl LoginAuthenticationFilter {
	/// Callback stage for the registrations in `registry`.
	///
	/// `oidc_loader` handles logins that produced a verified ID token, `oauth2_loader`
	/// every other login.
	pub fn new(
		registry: Arc<ProviderRegistry>,
		requests: Arc<dyn AuthorizationRequestStore>,
		saved: Arc<dyn SavedRequestStore>,
		exchange: ReqwestTokenExchangeClient,
		tokens: Arc<TokenValidatorFactory>,
		oauth2_loader: RoleResolvingLoader,
		oidc_loader: RoleResolvingLoader,
	) -> Self {
		Self { registry, requests, saved, exchange, tokens, oauth2_loader, oidc_loader }
	}

	async fn authenticate(
		&self,
		request: &InboundRequest,
		provider: &str,
	) -> Result<FilterOutcome> {
		let registration = self
			.registry
			.get(provider)
			.ok_or_else(|| Error::UnknownProvider { provider: provider.to_owned() })?;

		if let Some(error) = request.param("error") {
			if let Some(state) = request.param("state") {
				self.requests.take(&request.session, state).await?;
			}

			#[cfg(feature = "tracing")]
			tracing::warn!(provider, error, "Provider returned an authorization error.");

			return Err(Error::AuthorizationDenied {
				error: error.to_owned(),
				description: request.param("error_description").map(str::to_owned),
			});
		}

		let state = request
			.param("state")
			.ok_or_else(|| Error::InvalidCallback { reason: "missing state".into() })?;
		let code = request
			.param("code")
			.ok_or_else(|| Error::InvalidCallback { reason: "missing code".into() })?;
		let pending = self
			.requests
			.take(&request.session, state)
			.await?
			.ok_or_else(|| Error::InvalidCallback { reason: "unknown state".into() })?;

		pending.validate_callback(provider, state)?;

		let response = self.exchange.exchange(registration, code_exchange(&pending, code)).await?;
		let id_token =
			self.verify_id_token(registration, &response, pending.nonce.as_deref()).await?;
		let loader = if id_token.is_some() { &self.oidc_loader } else { &self.oauth2_loader };
		let principal = loader
			.load(UserRequest {
				registration,
				access_token: &response.access_token,
				id_token: id_token.as_ref(),
				headers: &request.headers,
			})
			.await?;
		let redirect_to = self
			.saved
			.get(&request.session)
			.await?
			.map(|saved| saved.target)
			.unwrap_or_else(|| "/".to_owned());

		#[cfg(feature = "tracing")]
		tracing::info!(provider, username = %principal.username, "Login succeeded.");

		Ok(FilterOutcome::Authenticated { principal: Box::new(principal), redirect_to })
	}

	async fn verify_id_token(
		&self,
		registration: &ClientRegistration,
		response: &AccessTokenResponse,
		nonce: Option<&str>,
	) -> Result<Option<IdToken>> {
		if !registration.is_openid() {
			return Ok(None);
		}

		let span = LoginSpan::new(LoginStage::Validate, registration.id.as_ref());

		obs::record_login_outcome(LoginStage::Validate, LoginOutcome::Attempt);

		let result = span.instrument(self.decode_id_token(registration, response, nonce)).await;

		Ok(Some(obs::observe(LoginStage::Validate, result)?))
	}

	async fn decode_id_token(
		&self,
		registration: &ClientRegistration,
		response: &AccessTokenResponse,
		nonce: Option<&str>,
	) -> Result<IdToken, TokenValidationError> {
		let raw = response.id_token.as_ref().ok_or_else(|| TokenValidationError::Malformed {
			reason: "token response carries no id_token".into(),
		})?;
		let claims = self.tokens.decoder_for(registration).decode(raw.expose(), nonce).await?;

		self.tokens
			.validator_for(registration)
			.validate(&claims, &ValidationContext::for_registration(registration))?;

		Ok(IdToken { raw: raw.clone(), claims })
	}
}
impl LoginFilter for LoginAuthenticationFilter {
	fn kind(&self) -> FilterKind {
		FilterKind::LoginAuthentication
	}

	fn filter<'a>(&'a self, request: &'a InboundRequest) -> FilterFuture<'a> {
		Box::pin(async move {
			match callback_provider(&request.path) {
				Some(provider) => self.authenticate(request, provider).await,
				None => Ok(FilterOutcome::Continue),
			}
		})
	}
}
impl Debug for LoginAuthenticationFilter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginAuthenticationFilter")
			.field("providers", &self.registry.ids().collect::<Vec<_>>())
			.field("exchange", &self.exchange)
			.finish_non_exhaustive()
	}
}

/// Provider id of a callback path, if `path` is one.
pub fn callback_provider(path: &str) -> Option<&str> {
	path.strip_prefix('/')?
		.strip_prefix(CALLBACK_PATH)
		.filter(|provider| !provider.is_empty() && !provider.contains('/'))
}

fn code_exchange(pending: &AuthorizationRequest, code: &str) -> CodeExchange {
	CodeExchange {
		code: code.into(),
		pkce_verifier: pending.pkce_verifier().map(Into::into),
		redirect_uri: pending.redirect_uri.clone(),
		requested_scope: pending.scopes.clone(),
	}
}

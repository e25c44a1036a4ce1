//! Internal OAuth client facade around the `oauth2` crate's code exchange.

pub use oauth2;

// std
use std::borrow::Cow;
// crates.io
use oauth2::{
	AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl, RequestTokenError,
	StandardRevocableToken, StandardTokenResponse, TokenResponse as _, TokenUrl,
	basic::{
		BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
		BasicTokenType,
	},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::{ExchangeError, SetupError, TransportError, UrlField},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	provider::{
		ClientAuthMethod, ClientRegistration, ProviderErrorContext, ProviderErrorKind,
		ProviderStrategy,
	},
};

/// `id_token` carried next to the standard token response fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
	/// Compact ID token, present for OpenID Connect logins.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id_token: Option<String>,
}
impl ExtraTokenFields for IdTokenFields {}

type OidcTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;
type ConfiguredClient = Client<
	BasicErrorResponse,
	OidcTokenResponse,
	BasicTokenIntrospectionResponse,
	StandardRevocableToken,
	BasicRevocationErrorResponse,
	EndpointSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointNotSet,
	EndpointSet,
>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExchangeError>> + 'a + Send>>;

/// Tokens returned by a successful authorization code exchange.
#[derive(Clone, Debug)]
pub struct AccessTokenResponse {
	/// Access token.
	pub access_token: TokenSecret,
	/// Token type (`Bearer` for every supported provider).
	pub token_type: String,
	/// Granted scopes; the requested scopes when the provider omits the field.
	pub scopes: ScopeSet,
	/// Lifetime of the access token, when reported.
	pub expires_in: Option<Duration>,
	/// Refresh token, when issued.
	pub refresh_token: Option<TokenSecret>,
	/// Compact ID token for OpenID Connect logins.
	pub id_token: Option<TokenSecret>,
}

/// Inputs of one authorization code exchange.
#[derive(Clone, Debug)]
pub struct CodeExchange {
	/// Authorization code returned on the callback.
	pub code: TokenSecret,
	/// PKCE verifier generated with the authorization request.
	pub pkce_verifier: Option<TokenSecret>,
	/// Redirect URI sent with the authorization request.
	pub redirect_uri: Url,
	/// Scopes sent with the authorization request.
	pub requested_scope: ScopeSet,
}

/// Maps HTTP transport failures into [`ExchangeError`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into an exchange error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> ExchangeError;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> ExchangeError {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() =>
				SetupError::from(*inner).into(),
			HttpClientError::Reqwest(inner) => TransportError::from(*inner).into(),
			HttpClientError::Http(inner) => SetupError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => unexpected(meta, message),
			_ => unexpected(meta, "unknown HTTP client failure"),
		}
	}
}

/// Authorization code exchange bound to one registration.
pub(crate) struct OAuthFacade<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: ConfiguredClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> OAuthFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn from_registration(
		registration: &ClientRegistration,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Result<Self, SetupError> {
		let auth_url = AuthUrl::new(registration.endpoints.authorization.to_string()).map_err(
			|source| SetupError::InvalidEndpoint { field: UrlField::AuthorizationUri, source },
		)?;
		let token_url = TokenUrl::new(registration.endpoints.token.to_string())
			.map_err(|source| SetupError::InvalidEndpoint { field: UrlField::TokenUri, source })?;
		let mut oauth_client: ConfiguredClient =
			Client::new(ClientId::new(registration.client_id.clone()))
				.set_auth_uri(auth_url)
				.set_token_uri(token_url);

		if registration.client_auth_method == ClientAuthMethod::ClientSecretBasic
			&& let Some(secret) = registration.client_secret.as_ref()
		{
			oauth_client =
				oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}

		Ok(Self {
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		})
	}

	pub(crate) fn exchange_authorization_code<'a>(
		&'a self,
		strategy: &'a dyn ProviderStrategy,
		ctx: ProviderErrorContext,
		exchange: &'a CodeExchange,
	) -> FacadeFuture<'a, AccessTokenResponse> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let mut request = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(exchange.code.expose().to_owned()))
				.set_redirect_uri(Cow::Owned(RedirectUrl::from_url(exchange.redirect_uri.clone())));

			if let Some(verifier) = exchange.pkce_verifier.as_ref() {
				request =
					request.set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_owned()));
			}

			let response = request.request_async(&instrumented).await.map_err(|err| {
				map_request_error(strategy, ctx, meta.take(), err, self.error_mapper.as_ref())
			})?;

			Ok(map_token_response(response, &exchange.requested_scope))
		})
	}
}

fn map_token_response(response: OidcTokenResponse, requested: &ScopeSet) -> AccessTokenResponse {
	let scopes = response
		.scopes()
		.and_then(|scopes| ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).ok())
		.unwrap_or_else(|| requested.clone());
	let token_type = match response.token_type() {
		BasicTokenType::Bearer => "Bearer".to_owned(),
		BasicTokenType::Mac => "MAC".to_owned(),
		BasicTokenType::Extension(other) => other.clone(),
	};

	AccessTokenResponse {
		access_token: TokenSecret::new(response.access_token().secret().to_owned()),
		token_type,
		scopes,
		expires_in: response.expires_in().and_then(|lifetime| Duration::try_from(lifetime).ok()),
		refresh_token: response
			.refresh_token()
			.map(|token| TokenSecret::new(token.secret().to_owned())),
		id_token: response.extra_fields().id_token.clone().map(TokenSecret::new),
	}
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	ctx: ProviderErrorContext,
	meta: Option<ResponseMetadata>,
	err: RequestTokenError<HttpClientError<E>, BasicErrorResponse>,
	mapper: &M,
) -> ExchangeError
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, ctx, response, meta_ref),
		RequestTokenError::Request(error) => mapper.map_transport_error(meta_ref, error),
		RequestTokenError::Parse(source, body) => {
			let text = String::from_utf8_lossy(&body);

			match strategy.classify_unparsed_body(&text) {
				Some(kind) => classified(
					kind,
					"Token endpoint returned a provider-specific error.".into(),
					meta_ref,
				),
				None => ExchangeError::TokenResponseParse { source, status: meta_status(meta_ref) },
			}
		},
		RequestTokenError::Other(message) => unexpected(meta_ref, message),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	mut ctx: ProviderErrorContext,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> ExchangeError {
	ctx = ctx.with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = format!("Token endpoint returned OAuth error `{}`", response.error().as_ref());

	classified(strategy.classify_token_error(&ctx), message, meta)
}

fn classified(
	kind: ProviderErrorKind,
	reason: String,
	meta: Option<&ResponseMetadata>,
) -> ExchangeError {
	match kind {
		ProviderErrorKind::InvalidGrant => ExchangeError::InvalidGrant { reason },
		ProviderErrorKind::InvalidClient => ExchangeError::InvalidClient { reason },
		ProviderErrorKind::InvalidScope => ExchangeError::InvalidScope { reason },
		ProviderErrorKind::Unexpected => ExchangeError::TokenEndpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		},
	}
}

fn unexpected(meta: Option<&ResponseMetadata>, message: impl Display) -> ExchangeError {
	ExchangeError::TokenEndpoint {
		message: format!("HTTP client error occurred while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

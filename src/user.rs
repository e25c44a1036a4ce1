//! User loaders: attributes from user-info and ID tokens, then roles on top.
//!
//! [`DefaultOAuth2UserLoader`] and [`DefaultOidcUserLoader`] produce a [`LoadedUser`];
//! [`RoleResolvingLoader`] wraps either one, resolves roles for the loaded user name, and
//! builds the [`AuthenticatedPrincipal`] handed to the hosting layer.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{AuthenticatedPrincipal, Claims, IdToken, TokenSecret, attribute_as_username},
	config::RoleSettings,
	error::UserInfoError,
	http::ReqwestHttpClient,
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
	provider::ClientRegistration,
	roles::{ResolverContext, RoleClaims, RoleResolver},
};

/// Boxed future returned by [`UserLoader`] implementations.
pub type UserFuture<'a> =
	Pin<Box<dyn Future<Output = Result<LoadedUser, UserInfoError>> + 'a + Send>>;

/// Inputs of one user load.
#[derive(Clone, Copy, Debug)]
pub struct UserRequest<'a> {
	/// Registration the user authenticated against.
	pub registration: &'a ClientRegistration,
	/// Access token issued by the exchange.
	pub access_token: &'a TokenSecret,
	/// Verified ID token, for OIDC logins.
	pub id_token: Option<&'a IdToken>,
	/// Headers of the callback request.
	pub headers: &'a BTreeMap<String, String>,
}

/// User attributes before role resolution.
#[derive(Clone, Debug)]
pub struct LoadedUser {
	/// Value of the registration's user-name attribute.
	pub username: String,
	/// Merged attributes.
	pub attributes: Claims,
	/// ID token, for OIDC logins.
	pub id_token: Option<IdToken>,
	/// User-info document, when the endpoint was called.
	pub user_info: Option<Claims>,
}

/// Loads user attributes after a successful exchange.
pub trait UserLoader
where
	Self: Send + Sync,
{
	/// Loads the user described by `request`.
	fn load<'a>(&'a self, request: UserRequest<'a>) -> UserFuture<'a>;
}

/// OAuth 2.0 loader: the user-info document is the attribute set.
#[derive(Clone, Debug)]
pub struct DefaultOAuth2UserLoader {
	http_client: ReqwestHttpClient,
	timeout: StdDuration,
}
impl DefaultOAuth2UserLoader {
	/// Loader calling user-info through `http_client`.
	pub fn new(http_client: ReqwestHttpClient, timeout: StdDuration) -> Self {
		Self { http_client, timeout }
	}

	async fn fetch_user_info(
		&self,
		request: &UserRequest<'_>,
	) -> Result<Option<Claims>, UserInfoError> {
		let Some(uri) = request.registration.endpoints.user_info.as_ref() else {
			return Ok(None);
		};
		let user_info = self
			.http_client
			.get_json(uri, Some(request.access_token.expose()), self.timeout)
			.await
			.map_err(|source| UserInfoError::Fetch { source })?;

		Ok(Some(user_info))
	}
}
impl UserLoader for DefaultOAuth2UserLoader {
	fn load<'a>(&'a self, request: UserRequest<'a>) -> UserFuture<'a> {
		Box::pin(async move {
			let attributes = self.fetch_user_info(&request).await?.ok_or_else(|| {
				UserInfoError::MissingEndpoint { provider: request.registration.id.clone() }
			})?;
			let username = username_from(&attributes, &request.registration.user_name_attribute)?;

			Ok(LoadedUser {
				username,
				attributes: attributes.clone(),
				id_token: None,
				user_info: Some(attributes),
			})
		})
	}
}

/// OpenID Connect loader: ID token claims overlaid with user-info when available.
///
/// A user-info document whose `sub` differs from the ID token's is rejected.
#[derive(Clone, Debug)]
pub struct DefaultOidcUserLoader {
	oauth2: DefaultOAuth2UserLoader,
}
impl DefaultOidcUserLoader {
	/// Loader calling user-info through `http_client`.
	pub fn new(http_client: ReqwestHttpClient, timeout: StdDuration) -> Self {
		Self { oauth2: DefaultOAuth2UserLoader::new(http_client, timeout) }
	}
}
impl UserLoader for DefaultOidcUserLoader {
	fn load<'a>(&'a self, request: UserRequest<'a>) -> UserFuture<'a> {
		Box::pin(async move {
			let Some(id_token) = request.id_token else {
				return self.oauth2.load(request).await;
			};
			let user_info = self.oauth2.fetch_user_info(&request).await?;
			let mut attributes = id_token.claims.clone();

			if let Some(user_info) = user_info.as_ref() {
				let subject = user_info.get("sub").and_then(JsonValue::as_str);

				if subject != id_token.subject() {
					return Err(UserInfoError::SubjectMismatch);
				}

				attributes
					.extend(user_info.iter().map(|(key, value)| (key.clone(), value.clone())));
			}

			let username = username_from(&attributes, &request.registration.user_name_attribute)?;

			Ok(LoadedUser { username, attributes, id_token: Some(id_token.clone()), user_info })
		})
	}
}

/// Wraps a [`UserLoader`] and attaches the roles resolved for the loaded user.
#[derive(Clone)]
pub struct RoleResolvingLoader {
	inner: Arc<dyn UserLoader>,
	resolver: RoleResolver,
	settings: RoleSettings,
}
impl RoleResolvingLoader {
	/// Loader resolving roles per `settings` after `inner` succeeds.
	pub fn new(inner: Arc<dyn UserLoader>, resolver: RoleResolver, settings: RoleSettings) -> Self {
		Self { inner, resolver, settings }
	}

	/// Loads the user and resolves their roles into a fresh principal.
	pub async fn load(&self, request: UserRequest<'_>) -> Result<AuthenticatedPrincipal> {
		let registration = request.registration;
		let span = LoginSpan::new(LoginStage::LoadUser, registration.id.as_ref());

		obs::record_login_outcome(LoginStage::LoadUser, LoginOutcome::Attempt);

		let user =
			obs::observe(LoginStage::LoadUser, span.instrument(self.inner.load(request)).await)?;
		let ctx = ResolverContext::from_settings(
			registration.id.clone(),
			&self.settings,
			self.resolver.services(),
		);
		let claims = RoleClaims {
			id_token: user.id_token.as_ref().map(|token| &token.claims),
			access_token: request.access_token,
			user_info: user.user_info.as_ref(),
			user_info_uri: registration.endpoints.user_info.as_ref(),
			headers: request.headers,
		};
		let roles = self.resolver.resolve(&user.username, &claims, &ctx).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(
			provider = %registration.id,
			username = %user.username,
			roles = roles.len(),
			"User loaded."
		);

		Ok(AuthenticatedPrincipal {
			provider: registration.id.clone(),
			username: user.username,
			attributes: user.attributes,
			roles,
			id_token: user.id_token,
			user_info: user.user_info,
		})
	}
}
impl Debug for RoleResolvingLoader {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RoleResolvingLoader")
			.field("resolver", &self.resolver)
			.field("settings", &self.settings)
			.finish_non_exhaustive()
	}
}

fn username_from(attributes: &Claims, attribute: &str) -> Result<String, UserInfoError> {
	attributes
		.get(attribute)
		.and_then(attribute_as_username)
		.ok_or_else(|| UserInfoError::MissingUserNameAttribute { attribute: attribute.to_owned() })
}

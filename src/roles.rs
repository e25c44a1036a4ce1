//! Claims-to-role resolution.
//!
//! [`RoleSource`] selects where roles come from; [`RoleResolver`] turns an authenticated
//! identity plus its raw claims into a [`RoleSet`](crate::auth::RoleSet) with one
//! exhaustive match over the source. An absent claim yields an empty set; only failed
//! lookups are errors.

pub mod converter;
pub mod graph;
pub mod resolver;
pub mod service;

pub use converter::*;
pub use graph::*;
pub use resolver::*;
pub use service::*;

// self
use crate::{
	_prelude::*,
	auth::{Claims, ProviderId, TokenSecret},
	config::RoleSettings,
};

/// Default Microsoft Graph endpoint listing the signed-in user's groups.
pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0/me/memberOf";

/// Where roles are read from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleSource {
	/// Claim of the verified ID token.
	IdTokenClaim {
		/// Claim name.
		claim: String,
	},
	/// Claim of the access token body, when the access token is a JWT.
	AccessTokenClaim {
		/// Claim name.
		claim: String,
	},
	/// Claim of the user-info document, fetched when not already loaded.
	UserInfoEndpoint {
		/// Claim name.
		claim: String,
	},
	/// Group memberships from the provider's graph API.
	///
	/// Only valid when the user-info endpoint is served by the same host, since the
	/// access token is presented to it.
	ProviderGraphApi {
		/// Graph endpoint listing group memberships.
		#[serde(default = "default_graph_endpoint")]
		endpoint: String,
	},
	/// Request header converted with the configured [`RoleConverter`].
	Header {
		/// Header name.
		attribute: String,
	},
	/// Roles assigned to the user name by the configured user/group service.
	UserGroupService,
	/// Roles assigned to the user name by the configured role service.
	RoleService,
}
impl RoleSource {
	/// Graph source using [`DEFAULT_GRAPH_ENDPOINT`].
	pub fn graph() -> Self {
		Self::ProviderGraphApi { endpoint: DEFAULT_GRAPH_ENDPOINT.into() }
	}

	/// Stable label for logs.
	pub fn kind(&self) -> &'static str {
		match self {
			RoleSource::IdTokenClaim { .. } => "id_token_claim",
			RoleSource::AccessTokenClaim { .. } => "access_token_claim",
			RoleSource::UserInfoEndpoint { .. } => "user_info_endpoint",
			RoleSource::ProviderGraphApi { .. } => "provider_graph_api",
			RoleSource::Header { .. } => "header",
			RoleSource::UserGroupService => "user_group_service",
			RoleSource::RoleService => "role_service",
		}
	}
}

fn default_graph_endpoint() -> String {
	DEFAULT_GRAPH_ENDPOINT.into()
}

/// Per-login resolution settings.
#[derive(Clone)]
pub struct ResolverContext {
	/// Provider the user authenticated against.
	pub provider: ProviderId,
	/// Role source; `None` grants no roles.
	pub source: Option<RoleSource>,
	/// Role service consulted by [`RoleSource::RoleService`].
	pub role_service_name: Option<String>,
	/// User/group service consulted by [`RoleSource::UserGroupService`].
	pub user_group_service_name: Option<String>,
	/// Converter applied to header values.
	pub converter: Option<Arc<dyn RoleConverter>>,
}
impl ResolverContext {
	/// Context for `provider` built from shared role settings.
	///
	/// The converter name is looked up in `services`; unknown names fall back to the
	/// default converter at resolution time.
	pub fn from_settings(
		provider: ProviderId,
		settings: &RoleSettings,
		services: &RoleServices,
	) -> Self {
		Self {
			provider,
			source: settings.source.clone(),
			role_service_name: settings.role_service_name.clone(),
			user_group_service_name: settings.user_group_service_name.clone(),
			converter: settings
				.role_converter_name
				.as_deref()
				.and_then(|name| services.converter(name)),
		}
	}
}
impl Debug for ResolverContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ResolverContext")
			.field("provider", &self.provider)
			.field("source", &self.source)
			.field("role_service_name", &self.role_service_name)
			.field("user_group_service_name", &self.user_group_service_name)
			.field("converter_set", &self.converter.is_some())
			.finish()
	}
}

/// Raw identity material available to the resolver.
#[derive(Clone, Copy, Debug)]
pub struct RoleClaims<'a> {
	/// Verified ID token claims, for OIDC logins.
	pub id_token: Option<&'a Claims>,
	/// Access token issued by the exchange.
	pub access_token: &'a TokenSecret,
	/// User-info claims, when already fetched.
	pub user_info: Option<&'a Claims>,
	/// User-info endpoint of the registration.
	pub user_info_uri: Option<&'a Url>,
	/// Headers of the inbound callback request.
	pub headers: &'a BTreeMap<String, String>,
}
impl RoleClaims<'_> {
	/// Case-insensitive header lookup.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

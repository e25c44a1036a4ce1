//! [`RoleResolver`]: one exhaustive dispatch over [`RoleSource`].

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{Claims, RoleSet},
	error::RoleResolutionError,
	http::ReqwestHttpClient,
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
	roles::{
		DelimitedRoleConverter, ResolverContext, RoleClaims, RoleConverter, RoleServices,
		RoleSource,
		check_graph_host, claim_roles, fetch_group_roles,
	},
	token,
};

/// Maps an authenticated identity to roles.
#[derive(Clone, Debug)]
pub struct RoleResolver {
	http_client: ReqwestHttpClient,
	timeout: StdDuration,
	services: RoleServices,
}
impl RoleResolver {
	/// Resolver fetching user-info and graph documents through `http_client`.
	pub fn new(
		http_client: ReqwestHttpClient,
		timeout: StdDuration,
		services: RoleServices,
	) -> Self {
		Self { http_client, timeout, services }
	}

	/// Registered services and converters.
	pub fn services(&self) -> &RoleServices {
		&self.services
	}

	/// Resolves the roles of `username`.
	///
	/// No configured source, or a source whose claim is absent, yields an empty set.
	pub async fn resolve(
		&self,
		username: &str,
		claims: &RoleClaims<'_>,
		ctx: &ResolverContext,
	) -> Result<RoleSet, RoleResolutionError> {
		let Some(source) = ctx.source.as_ref() else {
			return Ok(RoleSet::new());
		};
		let span = LoginSpan::new(LoginStage::ResolveRoles, ctx.provider.as_ref());

		obs::record_login_outcome(LoginStage::ResolveRoles, LoginOutcome::Attempt);

		let result = span.instrument(self.dispatch(source, username, claims, ctx)).await;

		#[cfg(feature = "tracing")]
		if let Ok(roles) = result.as_ref() {
			tracing::debug!(
				provider = %ctx.provider,
				source = source.kind(),
				roles = roles.len(),
				"Resolved roles."
			);
		}

		obs::observe(LoginStage::ResolveRoles, result)
	}

	async fn dispatch(
		&self,
		source: &RoleSource,
		username: &str,
		claims: &RoleClaims<'_>,
		ctx: &ResolverContext,
	) -> Result<RoleSet, RoleResolutionError> {
		match source {
			RoleSource::IdTokenClaim { claim } =>
				Ok(claim_roles(claims.id_token.and_then(|token| token.get(claim)))),
			RoleSource::AccessTokenClaim { claim } => {
				let body =
					token::read_unverified(claims.access_token.expose()).ok().map(|jwt| jwt.body);

				Ok(claim_roles(body.as_ref().and_then(|body| body.get(claim))))
			},
			RoleSource::UserInfoEndpoint { claim } => match claims.user_info {
				Some(user_info) => Ok(claim_roles(user_info.get(claim))),
				None => {
					let user_info = self.fetch_user_info(claims, ctx).await?;

					Ok(claim_roles(user_info.get(claim)))
				},
			},
			RoleSource::ProviderGraphApi { endpoint } => {
				let endpoint = Url::parse(endpoint).map_err(|e| RoleResolutionError::Service {
					service: "graph".into(),
					message: format!("invalid graph endpoint: {e}"),
				})?;

				check_graph_host(claims.user_info_uri, &endpoint)?;

				fetch_group_roles(
					&self.http_client,
					&endpoint,
					claims.access_token.expose(),
					self.timeout,
				)
				.await
			},
			RoleSource::Header { attribute } => {
				let Some(raw) = claims.header(attribute) else {
					return Ok(RoleSet::new());
				};

				Ok(match ctx.converter.as_ref() {
					Some(converter) => converter.convert(raw),
					None => DelimitedRoleConverter::default().convert(raw),
				})
			},
			RoleSource::UserGroupService =>
				self.delegate(ctx.user_group_service_name.as_deref(), "user/group", username).await,
			RoleSource::RoleService =>
				self.delegate(ctx.role_service_name.as_deref(), "role", username).await,
		}
	}

	async fn fetch_user_info(
		&self,
		claims: &RoleClaims<'_>,
		ctx: &ResolverContext,
	) -> Result<Claims, RoleResolutionError> {
		let uri = claims
			.user_info_uri
			.ok_or_else(|| RoleResolutionError::MissingUserInfoEndpoint {
				provider: ctx.provider.clone(),
			})?;

		self.http_client
			.get_json(uri, Some(claims.access_token.expose()), self.timeout)
			.await
			.map_err(|source| RoleResolutionError::UserInfo { source })
	}

	async fn delegate(
		&self,
		name: Option<&str>,
		kind: &str,
		username: &str,
	) -> Result<RoleSet, RoleResolutionError> {
		let name = name.ok_or_else(|| RoleResolutionError::Service {
			service: kind.into(),
			message: format!("no {kind} service is configured"),
		})?;
		let service = self.services.service(name).ok_or_else(|| RoleResolutionError::Service {
			service: name.into(),
			message: "service is not registered".into(),
		})?;

		service.roles_for(username).await
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::{
		auth::{ProviderId, TokenSecret},
		roles::StaticRoleService,
	};

	fn resolver() -> RoleResolver {
		RoleResolver::new(
			ReqwestHttpClient::default(),
			StdDuration::from_secs(5),
			RoleServices::default()
				.with_service("users", StaticRoleService::default().with_user("jane", ["EDITOR"])),
		)
	}

	fn ctx(source: RoleSource) -> ResolverContext {
		ResolverContext {
			provider: ProviderId::oidc(),
			source: Some(source),
			role_service_name: Some("users".into()),
			user_group_service_name: None,
			converter: None,
		}
	}

	fn object(value: JsonValue) -> Claims {
		match value {
			JsonValue::Object(map) => map,
			other => panic!("Claims fixture must be an object, got {other}."),
		}
	}

	#[tokio::test]
	async fn id_token_claim_lists_and_absent_claims() {
		let id_token = object(json!({ "groups": ["admin", "user"] }));
		let token = TokenSecret::new("opaque");
		let headers = BTreeMap::new();
		let claims = RoleClaims {
			id_token: Some(&id_token),
			access_token: &token,
			user_info: None,
			user_info_uri: None,
			headers: &headers,
		};
		let resolver = resolver();
		let roles = resolver
			.resolve("jane", &claims, &ctx(RoleSource::IdTokenClaim { claim: "groups".into() }))
			.await
			.expect("Claim lookup should succeed.");

		assert!(roles.contains("admin") && roles.contains("user"));
		assert!(
			resolver
				.resolve("jane", &claims, &ctx(RoleSource::IdTokenClaim { claim: "roles".into() }))
				.await
				.expect("Absent claim should succeed.")
				.is_empty()
		);
		assert!(
			resolver
				.resolve(
					"jane",
					&claims,
					&ctx(RoleSource::AccessTokenClaim { claim: "groups".into() }),
				)
				.await
				.expect("Opaque access token should yield no roles.")
				.is_empty()
		);
	}

	#[tokio::test]
	async fn header_and_services() {
		let token = TokenSecret::new("opaque");
		let headers = BTreeMap::from([("X-Roles".to_owned(), "a;b".to_owned())]);
		let claims = RoleClaims {
			id_token: None,
			access_token: &token,
			user_info: None,
			user_info_uri: None,
			headers: &headers,
		};
		let resolver = resolver();
		let header = resolver
			.resolve("jane", &claims, &ctx(RoleSource::Header { attribute: "x-roles".into() }))
			.await
			.expect("Header lookup should succeed.");

		assert_eq!(header.len(), 2);
		assert!(
			resolver
				.resolve("jane", &claims, &ctx(RoleSource::RoleService))
				.await
				.expect("Role service should answer.")
				.contains("EDITOR")
		);
		assert!(matches!(
			resolver.resolve("jane", &claims, &ctx(RoleSource::UserGroupService)).await,
			Err(RoleResolutionError::Service { .. })
		));
	}

	#[tokio::test]
	async fn graph_fails_fast_on_foreign_user_info_host() {
		let token = TokenSecret::new("opaque");
		let headers = BTreeMap::new();
		let user_info_uri =
			Url::parse("https://idp.example.com/userinfo").expect("URL should parse.");
		let claims = RoleClaims {
			id_token: None,
			access_token: &token,
			user_info: None,
			user_info_uri: Some(&user_info_uri),
			headers: &headers,
		};
		let err = resolver()
			.resolve("jane", &claims, &ctx(RoleSource::graph()))
			.await
			.expect_err("Mismatched host should fail before any request.");

		assert!(matches!(err, RoleResolutionError::GraphHostMismatch { .. }));
	}

	#[tokio::test]
	async fn missing_source_grants_nothing() {
		let token = TokenSecret::new("opaque");
		let headers = BTreeMap::new();
		let claims = RoleClaims {
			id_token: None,
			access_token: &token,
			user_info: None,
			user_info_uri: None,
			headers: &headers,
		};
		let mut ctx = ctx(RoleSource::RoleService);

		ctx.source = None;

		assert!(
			resolver().resolve("jane", &claims, &ctx).await.expect("No source is fine.").is_empty()
		);
	}
}

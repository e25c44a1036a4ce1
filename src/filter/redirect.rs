//! Authorization redirect and saved-request replay stages.

// self
use crate::{
	_prelude::*,
	config::AUTHORIZATION_PATH,
	filter::{
		AuthorizationRequestStore, FilterFuture, FilterKind, FilterOutcome, InboundRequest,
		LoginFilter, SavedRequestStore,
	},
	flows::{AuthorizationRequest, AuthorizationRequestCustomizer},
	provider::ProviderRegistry,
};

/// Answers `/oauth2/authorization/{id}` with a redirect to the provider.
///
/// The pending request is stored for the session before the redirect is returned.
#[derive(Clone)]
pub struct AuthorizationRedirectFilter {
	registry: Arc<ProviderRegistry>,
	customizer: Arc<dyn AuthorizationRequestCustomizer>,
	requests: Arc<dyn AuthorizationRequestStore>,
}
impl AuthorizationRedirectFilter {
	/// Redirect stage for the registrations in `registry`.
	pub fn new(
		registry: Arc<ProviderRegistry>,
		customizer: Arc<dyn AuthorizationRequestCustomizer>,
		requests: Arc<dyn AuthorizationRequestStore>,
	) -> Self {
		Self { registry, customizer, requests }
	}

	async fn redirect(&self, request: &InboundRequest, provider: &str) -> Result<FilterOutcome> {
		let registration = self
			.registry
			.get(provider)
			.ok_or_else(|| Error::UnknownProvider { provider: provider.to_owned() })?;
		let pending = AuthorizationRequest::build(registration, self.customizer.as_ref());
		let location = pending.authorize_url.to_string();

		self.requests.save(&request.session, pending).await?;

		#[cfg(feature = "tracing")]
		tracing::debug!(provider, "Redirecting to the authorization endpoint.");

		Ok(FilterOutcome::Redirect { location })
	}
}
impl LoginFilter for AuthorizationRedirectFilter {
	fn kind(&self) -> FilterKind {
		FilterKind::AuthorizationRedirect
	}

	fn filter<'a>(&'a self, request: &'a InboundRequest) -> FilterFuture<'a> {
		Box::pin(async move {
			match request.path.strip_prefix(AUTHORIZATION_PATH) {
				Some(provider) if !provider.is_empty() => self.redirect(request, provider).await,
				_ => Ok(FilterOutcome::Continue),
			}
		})
	}
}
impl Debug for AuthorizationRedirectFilter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthorizationRedirectFilter")
			.field("providers", &self.registry.ids().collect::<Vec<_>>())
			.finish_non_exhaustive()
	}
}

/// Replays the request saved before the login redirect once the browser returns to it.
#[derive(Clone)]
pub struct RequestCacheAwareFilter {
	saved: Arc<dyn SavedRequestStore>,
}
impl RequestCacheAwareFilter {
	/// Request-cache stage reading from `saved`.
	pub fn new(saved: Arc<dyn SavedRequestStore>) -> Self {
		Self { saved }
	}
}
impl LoginFilter for RequestCacheAwareFilter {
	fn kind(&self) -> FilterKind {
		FilterKind::RequestCacheAware
	}

	fn filter<'a>(&'a self, request: &'a InboundRequest) -> FilterFuture<'a> {
		Box::pin(async move {
			let Some(saved) = self.saved.get(&request.session).await? else {
				return Ok(FilterOutcome::Continue);
			};

			if !saved.matches(request) {
				return Ok(FilterOutcome::Continue);
			}

			self.saved.remove(&request.session).await?;

			Ok(FilterOutcome::Restored(saved))
		})
	}
}
impl Debug for RequestCacheAwareFilter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("RequestCacheAwareFilter(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{ProviderId, SessionId},
		config::ProviderConfig,
		filter::{MemoryAuthorizationRequestStore, MemorySavedRequestStore, SavedRequest},
		flows::OidcAuthorizationCustomizer,
		provider::ClientRegistration,
	};

	fn session() -> SessionId {
		SessionId::new("s-1").expect("Session fixture should be valid.")
	}

	fn registry() -> Arc<ProviderRegistry> {
		let config =
			ProviderConfig::google().with_client_id("google-client").with_client_secret("secret");
		let registration = ClientRegistration::from_config(
			&ProviderId::google(),
			&config,
			"https://app.example.com/login/oauth2/code/google",
		)
		.expect("Registration fixture should build.");

		Arc::new(ProviderRegistry::from_registrations([registration]))
	}

	#[tokio::test]
	async fn redirect_stores_pending_request() {
		let store = Arc::new(MemoryAuthorizationRequestStore::default());
		let filter =
			AuthorizationRedirectFilter::new(
				registry(),
				Arc::new(OidcAuthorizationCustomizer),
				store.clone(),
			);
		let outcome = filter
			.filter(&InboundRequest::get(session(), "/oauth2/authorization/google"))
			.await
			.expect("Redirect should be issued.");

		match outcome {
			FilterOutcome::Redirect { location } =>
				assert!(location.starts_with("https://accounts.google.com/")),
			other => panic!("Unexpected outcome: {other:?}."),
		}

		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn disabled_or_unknown_providers_are_rejected() {
		let store = Arc::new(MemoryAuthorizationRequestStore::default());
		let filter =
			AuthorizationRedirectFilter::new(
				registry(),
				Arc::new(OidcAuthorizationCustomizer),
				store.clone(),
			);
		let err = filter
			.filter(&InboundRequest::get(session(), "/oauth2/authorization/github"))
			.await
			.expect_err("Disabled provider must be rejected.");

		assert!(matches!(err, Error::UnknownProvider { .. }));
		assert!(store.is_empty());
		assert!(
			filter
				.filter(&InboundRequest::get(session(), "/maps"))
				.await
				.expect("Unrelated paths pass through.")
				.is_continue()
		);
	}

	#[tokio::test]
	async fn saved_request_is_replayed_once() {
		let saved = Arc::new(MemorySavedRequestStore::default());
		let original = InboundRequest::get(session(), "/maps/wms?layers=roads");

		saved
			.save(&session(), SavedRequest::from_request(&original))
			.await
			.expect("Save should succeed.");

		let filter = RequestCacheAwareFilter::new(saved);

		assert!(
			filter
				.filter(&InboundRequest::get(session(), "/other"))
				.await
				.expect("Filter should run.")
				.is_continue()
		);
		assert!(matches!(
			filter.filter(&original).await.expect("Filter should run."),
			FilterOutcome::Restored(_)
		));
		assert!(filter.filter(&original).await.expect("Filter should run.").is_continue());
	}
}

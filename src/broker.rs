//! Process-wide login broker: activation, login page model, entry point, and logout.
//!
//! [`LoginBroker`] owns one immutable [`BrokerSnapshot`] (configuration, registry, filter
//! chain) behind an [`ArcSwap`]. Activation builds a complete new snapshot and publishes it
//! with one pointer swap, so a login always runs against a single consistent registry and
//! a failed activation leaves the previous snapshot authoritative.

// std
use std::time::Duration as StdDuration;
// crates.io
use arc_swap::ArcSwap;
// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	config::{BrokerConfig, ConfigValidator, LOGIN_PATH, ProviderConfig, non_blank},
	discovery::DiscoveryResolver,
	error::DiscoveryError,
	filter::{
		AuthorizationRedirectFilter, AuthorizationRequestStore, CompositeLoginFilter,
		FilterOutcome, InboundRequest, LoginAuthenticationFilter, LoginFilter,
		MemoryAuthorizationRequestStore, MemorySavedRequestStore, RequestCacheAwareFilter,
		SavedRequest, SavedRequestStore,
	},
	flows::{
		AuthorizationRequestCustomizer, ConfidentialLogger, OidcAuthorizationCustomizer,
		ReqwestTokenExchangeClient,
	},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	obs::{self, LoginOutcome, LoginSpan, LoginStage},
	provider::{ProviderEvent, ProviderEventListener, ProviderRegistry},
	roles::{RoleResolver, RoleServices},
	token::TokenValidatorFactory,
	user::{DefaultOAuth2UserLoader, DefaultOidcUserLoader, RoleResolvingLoader, UserLoader},
};

/// Provider entry of the login page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginOption {
	/// Provider offered for login.
	pub provider: ProviderId,
	/// Application-relative path starting the authorization redirect.
	pub authorization_path: String,
}

/// Everything one activation produced.
#[derive(Debug)]
pub struct BrokerSnapshot {
	/// Configuration the snapshot was built from.
	pub config: BrokerConfig,
	/// Enabled registrations.
	pub registry: Arc<ProviderRegistry>,
	/// Login chain bound to `registry`.
	pub filters: CompositeLoginFilter,
}
impl BrokerSnapshot {
	fn empty() -> Self {
		Self {
			config: BrokerConfig::default(),
			registry: Arc::new(ProviderRegistry::default()),
			filters: CompositeLoginFilter::default(),
		}
	}

	/// Enabled providers with their authorization paths, in stable order.
	pub fn login_options(&self) -> Vec<LoginOption> {
		self.registry
			.iter()
			.map(|registration| LoginOption {
				provider: registration.id.clone(),
				authorization_path: registration.authorization_path(),
			})
			.collect()
	}
}

/// Login broker shared by every request of the hosting application.
///
/// Session stores, role services, and custom filters are fixed at construction; every
/// [`activate`](LoginBroker::activate) rebuilds the registry and the filter chain on top
/// of them.
pub struct LoginBroker {
	snapshot: ArcSwap<BrokerSnapshot>,
	publish: Mutex<()>,
	fetch_client: ReqwestHttpClient,
	exchange_client: ReqwestHttpClient,
	validator: ConfigValidator,
	customizer: Arc<dyn AuthorizationRequestCustomizer>,
	requests: Arc<dyn AuthorizationRequestStore>,
	saved: Arc<dyn SavedRequestStore>,
	role_services: RoleServices,
	custom_filters: Vec<Arc<dyn LoginFilter>>,
	listeners: RwLock<Vec<Arc<dyn ProviderEventListener>>>,
}
impl LoginBroker {
	/// Broker with default transports and in-memory session stores.
	pub fn new() -> Self {
		Self::with_http_clients(ReqwestHttpClient::default(), ReqwestHttpClient::default())
	}

	/// Broker whose transports never follow redirects and give up after `timeout`.
	pub fn try_new(timeout: StdDuration) -> Result<Self> {
		let client = ReqwestHttpClient::try_new(timeout)?;

		Ok(Self::with_http_clients(client.clone(), client))
	}

	/// Broker using `fetch_client` for JSON lookups (discovery, user-info, graph, JWKS)
	/// and `exchange_client` for token requests.
	pub fn with_http_clients(
		fetch_client: ReqwestHttpClient,
		exchange_client: ReqwestHttpClient,
	) -> Self {
		Self {
			snapshot: ArcSwap::from_pointee(BrokerSnapshot::empty()),
			publish: Mutex::new(()),
			fetch_client,
			exchange_client,
			validator: ConfigValidator::default(),
			customizer: Arc::new(OidcAuthorizationCustomizer),
			requests: Arc::new(MemoryAuthorizationRequestStore::default()),
			saved: Arc::new(MemorySavedRequestStore::default()),
			role_services: RoleServices::default(),
			custom_filters: Vec::new(),
			listeners: RwLock::new(Vec::new()),
		}
	}

	/// Replaces the configuration validator.
	pub fn with_validator(mut self, validator: ConfigValidator) -> Self {
		self.validator = validator;

		self
	}

	/// Replaces the authorization request customizer.
	pub fn with_customizer(
		mut self,
		customizer: impl 'static + AuthorizationRequestCustomizer,
	) -> Self {
		self.customizer = Arc::new(customizer);

		self
	}

	/// Replaces the pending authorization request store.
	pub fn with_request_store(mut self, store: impl 'static + AuthorizationRequestStore) -> Self {
		self.requests = Arc::new(store);

		self
	}

	/// Replaces the saved request store.
	pub fn with_saved_request_store(mut self, store: impl 'static + SavedRequestStore) -> Self {
		self.saved = Arc::new(store);

		self
	}

	/// Replaces the named role services and converters.
	pub fn with_role_services(mut self, services: RoleServices) -> Self {
		self.role_services = services;

		self
	}

	/// Adds a filter offered to the login chain.
	///
	/// Custom filters win over the built-in filter of the same [`kind`](LoginFilter::kind);
	/// filters outside the login stages are ignored.
	pub fn with_filter(mut self, filter: impl 'static + LoginFilter) -> Self {
		self.custom_filters.push(Arc::new(filter));

		self
	}

	/// Registers `listener` for provider enable/disable events of later activations.
	pub fn subscribe(&self, listener: Arc<dyn ProviderEventListener>) {
		self.listeners.write().push(listener);
	}

	/// Validates `config`, builds a new snapshot, and publishes it.
	///
	/// On failure the previously published snapshot stays in place and no event is sent.
	pub fn activate(&self, config: BrokerConfig) -> Result<()> {
		let _span = LoginSpan::new(LoginStage::Activate, "*").entered();

		obs::record_login_outcome(LoginStage::Activate, LoginOutcome::Attempt);

		let (snapshot, events) = obs::observe(LoginStage::Activate, self.build(config))?;
		let providers = snapshot.registry.len();
		let _publish = self.publish.lock();

		self.snapshot.store(Arc::new(snapshot));

		let listeners = self.listeners.read().clone();

		for event in &events {
			for listener in &listeners {
				listener.on_provider_event(event);
			}
		}

		#[cfg(feature = "tracing")]
		tracing::info!(providers, "Provider registry activated.");
		#[cfg(not(feature = "tracing"))]
		let _ = providers;

		Ok(())
	}

	/// Currently published snapshot.
	pub fn snapshot(&self) -> Arc<BrokerSnapshot> {
		self.snapshot.load_full()
	}

	/// Currently published registry.
	pub fn registry(&self) -> Arc<ProviderRegistry> {
		self.snapshot.load().registry.clone()
	}

	/// Providers offered on the login page.
	pub fn login_options(&self) -> Vec<LoginOption> {
		self.snapshot.load().login_options()
	}

	/// Autofills the active configuration of `provider` from its discovery URL.
	///
	/// The result is returned for the caller to activate; the published snapshot is
	/// never changed here.
	pub async fn discover(&self, provider: &ProviderId) -> Result<ProviderConfig> {
		let snapshot = self.snapshot.load_full();
		let config = snapshot
			.config
			.provider(provider)
			.ok_or_else(|| Error::UnknownProvider { provider: provider.to_string() })?;
		let url = non_blank(&config.discovery_uri).ok_or(DiscoveryError::MissingUri)?;

		Ok(DiscoveryResolver::new(self.fetch_client.clone(), snapshot.config.http_timeout())
			.autofill(url, config)
			.await?)
	}

	/// RP-initiated logout URL of `provider`, or `None` when it has no logout endpoint.
	///
	/// Carries `id_token_hint` when supplied (otherwise `client_id`) and the configured
	/// `post_logout_redirect_uri`.
	pub fn logout_redirect(
		&self,
		provider: &str,
		id_token_hint: Option<&str>,
	) -> Result<Option<Url>> {
		let snapshot = self.snapshot.load();
		let registration = snapshot
			.registry
			.get(provider)
			.ok_or_else(|| Error::UnknownProvider { provider: provider.to_owned() })?;
		let Some(mut url) = registration.endpoints.logout.clone() else {
			return Ok(None);
		};

		{
			let mut query = url.query_pairs_mut();

			match id_token_hint.filter(|hint| !hint.trim().is_empty()) {
				Some(hint) => query.append_pair("id_token_hint", hint),
				None => query.append_pair("client_id", &registration.client_id),
			};

			if let Some(uri) = non_blank(&snapshot.config.post_logout_redirect_uri) {
				query.append_pair("post_logout_redirect_uri", uri);
			}
		}

		Ok(Some(url))
	}

	/// Answers an unauthenticated request.
	///
	/// With the redirect entry point enabled the request is saved and the browser is sent
	/// to the only enabled provider, or to the login page when several are enabled.
	/// Otherwise the request is left to the hosting layer.
	pub async fn entry_point(&self, request: &InboundRequest) -> Result<FilterOutcome> {
		let snapshot = self.snapshot.load_full();

		if !snapshot.config.enable_redirect_authentication_entry_point {
			return Ok(FilterOutcome::Continue);
		}

		self.saved.save(&request.session, SavedRequest::from_request(request)).await?;

		let location = match snapshot.login_options().as_slice() {
			[only] => only.authorization_path.clone(),
			_ => LOGIN_PATH.to_owned(),
		};

		Ok(FilterOutcome::Redirect { location })
	}

	/// Runs `request` through the login page and the active filter chain.
	pub async fn handle(&self, request: &InboundRequest) -> Result<FilterOutcome> {
		let snapshot = self.snapshot.load_full();

		if request.path == LOGIN_PATH {
			return Ok(FilterOutcome::LoginPage(snapshot.login_options()));
		}

		snapshot.filters.filter(request).await
	}

	/// Drops every pending authorization request of an expired session.
	pub async fn end_session(&self, request: &InboundRequest) -> Result<()> {
		self.requests.remove_session(&request.session).await?;
		self.saved.remove(&request.session).await?;

		Ok(())
	}

	fn build(&self, config: BrokerConfig) -> Result<(BrokerSnapshot, Vec<ProviderEvent>)> {
		let (registry, events) = ProviderRegistry::build(&config, &self.validator)?;
		let registry = Arc::new(registry);
		let timeout = config.http_timeout();
		let tokens = Arc::new(TokenValidatorFactory::new(self.fetch_client.clone(), timeout));
		let exchange = ReqwestTokenExchangeClient::new(
			self.exchange_client.clone().with_request_timeout(timeout),
			ReqwestTransportErrorMapper,
		)
		.with_confidential_logger(ConfidentialLogger::new(config.confidential_logging));
		let resolver =
			RoleResolver::new(self.fetch_client.clone(), timeout, self.role_services.clone());
		let oauth2: Arc<dyn UserLoader> =
			Arc::new(DefaultOAuth2UserLoader::new(self.fetch_client.clone(), timeout));
		let oidc: Arc<dyn UserLoader> =
			Arc::new(DefaultOidcUserLoader::new(self.fetch_client.clone(), timeout));
		let login = LoginAuthenticationFilter::new(
			registry.clone(),
			self.requests.clone(),
			self.saved.clone(),
			exchange,
			tokens,
			RoleResolvingLoader::new(oauth2, resolver.clone(), config.roles.clone()),
			RoleResolvingLoader::new(oidc, resolver, config.roles.clone()),
		);
		let built: [Arc<dyn LoginFilter>; 3] = [
			Arc::new(AuthorizationRedirectFilter::new(
				registry.clone(),
				self.customizer.clone(),
				self.requests.clone(),
			)),
			Arc::new(login),
			Arc::new(RequestCacheAwareFilter::new(self.saved.clone())),
		];
		let filters =
			CompositeLoginFilter::select(self.custom_filters.iter().cloned().chain(built));

		Ok((BrokerSnapshot { config, registry, filters }, events))
	}
}
impl Default for LoginBroker {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for LoginBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LoginBroker")
			.field("providers", &self.snapshot.load().registry.ids().collect::<Vec<_>>())
			.field("role_services", &self.role_services)
			.field("custom_filters", &self.custom_filters.len())
			.field("listeners", &self.listeners.read().len())
			.finish_non_exhaustive()
	}
}

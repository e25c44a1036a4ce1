// std
use std::{
	sync::atomic::{AtomicBool, Ordering},
	thread,
};
// self
use oidc_broker::{
	_preludet::*,
	auth::ProviderId,
	broker::LoginBroker,
	config::{BrokerConfig, ProviderConfig},
	error::{ConfigError, UrlField},
	provider::{ProviderEvent, ProviderEventListener},
};

#[derive(Default)]
struct LastState(Mutex<BTreeMap<ProviderId, bool>>);
impl ProviderEventListener for LastState {
	fn on_provider_event(&self, event: &ProviderEvent) {
		self.0.lock().insert(event.provider.clone(), event.enabled);
	}
}

fn google() -> ProviderConfig {
	ProviderConfig::google()
		.with_enabled(true)
		.with_client_id("google-client")
		.with_client_secret("google-secret")
}

fn microsoft(scope: &str) -> ProviderConfig {
	ProviderConfig::microsoft()
		.with_enabled(true)
		.with_client_id("ms-client")
		.with_client_secret("ms-secret")
		.with_scopes(scope)
}

#[test]
fn json_configuration_activates_every_enabled_provider() {
	let config: BrokerConfig = serde_json::from_str(
		r#"{
			"base_redirect_uri": "https://maps.example.org/geoserver",
			"providers": {
				"google": { "enabled": true, "client_id": "g", "client_secret": "gs" },
				"microsoft": {
					"enabled": true,
					"client_id": "m",
					"client_secret": "ms",
					"scope": " openid, profile "
				},
				"github": { "enabled": false }
			}
		}"#,
	)
	.expect("Broker configuration should deserialize.");
	let broker = build_test_broker();

	broker.activate(config).expect("Configuration should activate.");

	let registry = broker.registry();
	let microsoft = registry.get("microsoft").expect("Microsoft should be registered.");

	assert_eq!(registry.len(), 2);
	assert_eq!(microsoft.scopes.as_slice(), ["openid", "profile"]);
	assert_eq!(
		microsoft.redirect_uri.as_str(),
		"https://maps.example.org/geoserver/login/oauth2/code/microsoft"
	);
	assert!(registry.get("github").is_none());
}

#[test]
fn invalid_provider_reports_every_finding_and_keeps_the_old_registry() {
	let broker = build_test_broker();

	broker
		.activate(mock_broker_config(mock_oidc_config("https://idp.example.com")))
		.expect("Configuration should activate.");

	let broken = ProviderConfig::oidc()
		.with_enabled(true)
		.with_scopes(" ")
		.with_token_uri("http://idp.example.com/token")
		.with_authorization_uri("https://idp.example.com/authorize")
		.without_jwk_set_uri()
		.without_user_info_uri();
	let err = broker
		.activate(mock_broker_config(broken))
		.expect_err("Broken configuration must be rejected.");

	match &err {
		Error::InvalidProvider { provider, errors } => {
			assert_eq!(provider, &ProviderId::oidc());
			assert_eq!(errors.first(), Some(&ConfigError::InsecureScheme(UrlField::TokenUri)));
			assert!(errors.contains(&ConfigError::MissingClientId));
			assert!(errors.contains(&ConfigError::MissingClientSecret));
			assert!(errors.contains(&ConfigError::MissingScope));
			assert_eq!(errors.last(), Some(&ConfigError::MissingVerificationEndpoint));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert!(!err.to_string().contains("oidc-secret"));
	assert!(broker.registry().get("oidc").is_some(), "Previous registry must stay authoritative.");
}

#[test]
fn listeners_observe_the_last_transition_per_provider() {
	let broker = build_test_broker();
	let state = Arc::new(LastState::default());

	broker.subscribe(state.clone());
	broker
		.activate(BrokerConfig::default().with_provider(ProviderId::google(), google()))
		.expect("First configuration should activate.");
	broker
		.activate(
			BrokerConfig::default()
				.with_provider(ProviderId::google(), google().with_enabled(false))
				.with_provider(ProviderId::microsoft(), microsoft("openid")),
		)
		.expect("Second configuration should activate.");

	let state = state.0.lock();

	assert_eq!(state.get(&ProviderId::google()), Some(&false));
	assert_eq!(state.get(&ProviderId::microsoft()), Some(&true));
	assert_eq!(state.get(&ProviderId::github()), Some(&false));
}

#[test]
fn concurrent_readers_never_observe_a_mixed_registry() {
	let broker =
		LoginBroker::with_http_clients(test_reqwest_http_client(), test_reqwest_http_client());
	let small = BrokerConfig::default()
		.with_base_redirect_uri("https://one.example.com/")
		.with_provider(ProviderId::google(), google());
	let large = BrokerConfig::default()
		.with_base_redirect_uri("https://two.example.com/")
		.with_provider(ProviderId::google(), google())
		.with_provider(ProviderId::microsoft(), microsoft("openid profile"));
	let done = AtomicBool::new(false);

	broker.activate(small.clone()).expect("Initial configuration should activate.");

	thread::scope(|scope| {
		for _ in 0..4 {
			scope.spawn(|| {
				while !done.load(Ordering::Acquire) {
					let snapshot = broker.snapshot();
					let base = snapshot.config.normalized_base();
					let expected = if base.starts_with("https://one.") { 1 } else { 2 };

					assert_eq!(snapshot.registry.len(), expected);

					for registration in snapshot.registry.iter() {
						assert!(registration.redirect_uri.as_str().starts_with(&base));
					}
				}
			});
		}

		for round in 0..200 {
			let config = if round % 2 == 0 { large.clone() } else { small.clone() };

			broker.activate(config).expect("Configuration should activate.");
		}

		done.store(true, Ordering::Release);
	});
}

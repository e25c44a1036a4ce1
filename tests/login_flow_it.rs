// std
use std::time::{Duration as StdDuration, Instant};
// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use oidc_broker::{
	_preludet::*,
	auth::{ProviderId, SessionId},
	config::{BrokerConfig, ProviderConfig, RoleSettings},
	error::{ExchangeError, TokenValidationError, TransportError},
	filter::{FilterOutcome, InboundRequest},
	roles::RoleSource,
};

fn session() -> SessionId {
	SessionId::new("browser-1").expect("Failed to build session identifier for login tests.")
}

fn google() -> ProviderConfig {
	ProviderConfig::google()
		.with_enabled(true)
		.with_client_id("google-client")
		.with_client_secret("google-secret")
}

fn public_oidc(server: &MockServer) -> ProviderConfig {
	mock_oidc_config(&server.base_url())
		.without_client_secret()
		.without_user_info_uri()
		.with_pkce(true)
		.with_user_name_attribute("preferred_username")
}

fn broker_config(server: &MockServer) -> BrokerConfig {
	mock_broker_config(public_oidc(server))
		.with_provider(ProviderId::google(), google())
		.with_provider(ProviderId::github(), ProviderConfig::github().with_client_id("gh-client"))
		.with_redirect_entry_point(true)
		.with_roles(RoleSettings::from_source(RoleSource::IdTokenClaim { claim: "groups".into() }))
}

fn query_of(location: &str) -> BTreeMap<String, String> {
	Url::parse(location)
		.expect("Authorization redirect should be an absolute URL.")
		.query_pairs()
		.into_owned()
		.collect()
}

async fn start_login(broker: &oidc_broker::broker::LoginBroker) -> BTreeMap<String, String> {
	match broker
		.handle(&InboundRequest::get(session(), "/oauth2/authorization/oidc"))
		.await
		.expect("Authorization redirect should be issued.")
	{
		FilterOutcome::Redirect { location } => query_of(&location),
		other => panic!("Unexpected outcome: {other:?}."),
	}
}

fn id_token(nonce: &str) -> String {
	let now = OffsetDateTime::now_utc().unix_timestamp();

	mint_test_id_token(&json!({
		"iss": "https://idp.example.com",
		"aud": "oidc-client",
		"sub": "user-42",
		"preferred_username": "alice",
		"groups": ["admin", "user"],
		"nonce": nonce,
		"iat": now,
		"exp": now + 300,
	}))
}

async fn mock_token_endpoint<'a>(server: &'a MockServer, id_token: &str) -> httpmock::Mock<'a> {
	let body = json!({
		"access_token": "opaque-access-token",
		"token_type": "Bearer",
		"expires_in": 3600,
		"id_token": id_token,
	})
	.to_string();

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(&body);
		})
		.await
}

#[tokio::test]
async fn oidc_pkce_login_resolves_roles_and_restores_the_saved_request() {
	let server = MockServer::start_async().await;
	let broker = build_test_broker();

	broker.activate(broker_config(&server)).expect("Configuration should activate.");

	let registry = broker.registry();

	assert_eq!(
		registry.ids().cloned().collect::<Vec<_>>(),
		[ProviderId::google(), ProviderId::oidc()]
	);

	let original = InboundRequest::get(session(), "/maps/wms?layers=roads");

	match broker.entry_point(&original).await.expect("Entry point should answer.") {
		FilterOutcome::Redirect { location } => assert_eq!(location, "/login"),
		other => panic!("Unexpected outcome: {other:?}."),
	}

	let params = start_login(&broker).await;

	assert_eq!(params.get("code_challenge_method").map(String::as_str), Some("S256"));
	assert_eq!(
		params.get("redirect_uri").map(String::as_str),
		Some("https://app.example.com/geo/login/oauth2/code/oidc")
	);

	let jwks = server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks");
			then.status(200).header("content-type", "application/json").body(test_jwks());
		})
		.await;
	let token = mock_token_endpoint(&server, &id_token(&params["nonce"])).await;
	let callback = format!("/login/oauth2/code/oidc?code=auth-code&state={}", params["state"]);
	let outcome = broker
		.handle(&InboundRequest::get(session(), &callback))
		.await
		.expect("Callback should authenticate.");
	let (principal, redirect_to) = match outcome {
		FilterOutcome::Authenticated { principal, redirect_to } => (principal, redirect_to),
		other => panic!("Unexpected outcome: {other:?}."),
	};

	token.assert_calls_async(1).await;
	jwks.assert_calls_async(1).await;

	assert_eq!(principal.provider, ProviderId::oidc());
	assert_eq!(principal.username, "alice");
	assert!(principal.has_role("admin") && principal.has_role("user"));
	assert!(principal.id_token.is_some());
	assert_eq!(redirect_to, "/maps/wms?layers=roads");
	assert!(matches!(
		broker.handle(&original).await.expect("Saved request should replay."),
		FilterOutcome::Restored(_)
	));
	assert!(
		broker
			.handle(&InboundRequest::get(session(), &callback))
			.await
			.is_err_and(|e| matches!(e, Error::InvalidCallback { .. })),
		"A replayed callback must not authenticate twice."
	);
}

#[tokio::test]
async fn disabled_provider_is_rejected_before_any_network_call() {
	let server = MockServer::start_async().await;
	let broker = build_test_broker();

	broker.activate(broker_config(&server)).expect("Configuration should activate.");

	let token = mock_token_endpoint(&server, "unused").await;

	for target in ["/oauth2/authorization/github", "/login/oauth2/code/github?code=c&state=s"] {
		let err = broker
			.handle(&InboundRequest::get(session(), target))
			.await
			.expect_err("Disabled provider must be rejected.");

		assert!(matches!(err, Error::UnknownProvider { .. }));
		assert_eq!(err.user_message(), "The requested login provider is not available.");
	}

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn provider_error_callback_fails_without_exchange() {
	let server = MockServer::start_async().await;
	let broker = build_test_broker();

	broker.activate(broker_config(&server)).expect("Configuration should activate.");

	let params = start_login(&broker).await;
	let token = mock_token_endpoint(&server, "unused").await;
	let state = &params["state"];
	let err = broker
		.handle(&InboundRequest::get(
			session(),
			&format!("/login/oauth2/code/oidc?error=access_denied&state={state}"),
		))
		.await
		.expect_err("Error callback must fail.");

	assert!(matches!(
		err,
		Error::AuthorizationDenied { ref error, .. } if error == "access_denied"
	));

	let err = broker
		.handle(&InboundRequest::get(
			session(),
			&format!("/login/oauth2/code/oidc?code=late&state={state}"),
		))
		.await
		.expect_err("The pending request is gone.");

	assert!(matches!(err, Error::InvalidCallback { .. }));

	token.assert_calls_async(0).await;
}

#[tokio::test]
async fn id_token_with_foreign_nonce_fails_the_login() {
	let server = MockServer::start_async().await;
	let broker = build_test_broker();

	broker.activate(broker_config(&server)).expect("Configuration should activate.");
	server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks");
			then.status(200).header("content-type", "application/json").body(test_jwks());
		})
		.await;

	let params = start_login(&broker).await;

	mock_token_endpoint(&server, &id_token("someone-elses-nonce")).await;

	let err = broker
		.handle(&InboundRequest::get(
			session(),
			&format!("/login/oauth2/code/oidc?code=auth-code&state={}", params["state"]),
		))
		.await
		.expect_err("Nonce mismatch must fail.");

	assert!(matches!(err, Error::TokenValidation(TokenValidationError::NonceMismatch)));
	assert_eq!(err.user_message(), "Login failed. Please try again.");
}

#[tokio::test]
async fn slow_token_endpoint_times_out_with_the_configured_bound() {
	let server = MockServer::start_async().await;
	let broker = build_test_broker();

	broker
		.activate(broker_config(&server).with_http_timeout_secs(1))
		.expect("Configuration should activate.");

	let params = start_login(&broker).await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"late","token_type":"Bearer"}"#)
				.delay(StdDuration::from_secs(3));
		})
		.await;

	let started = Instant::now();
	let err = broker
		.handle(&InboundRequest::get(
			session(),
			&format!("/login/oauth2/code/oidc?code=auth-code&state={}", params["state"]),
		))
		.await
		.expect_err("A stalled token endpoint must fail the login.");

	assert!(matches!(err, Error::Exchange(ExchangeError::Transport(TransportError::Timeout))));
	assert!(started.elapsed() < StdDuration::from_millis(2_500));
}

#[tokio::test]
async fn form_post_callback_completes_the_login() {
	let server = MockServer::start_async().await;
	let broker = build_test_broker();

	broker
		.activate(
			broker_config(&server).with_provider(
				ProviderId::oidc(),
				public_oidc(&server).with_response_mode(" form_post "),
			),
		)
		.expect("Configuration should activate.");

	let params = start_login(&broker).await;

	assert_eq!(params.get("response_mode").map(String::as_str), Some("form_post"));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/jwks");
			then.status(200).header("content-type", "application/json").body(test_jwks());
		})
		.await;
	mock_token_endpoint(&server, &id_token(&params["nonce"])).await;

	let body = format!("code=auth-code&state={}", params["state"]);
	let outcome = broker
		.handle(&InboundRequest::post(session(), "/login/oauth2/code/oidc", &body))
		.await
		.expect("Form-posted callback should authenticate.");

	match outcome {
		FilterOutcome::Authenticated { principal, .. } => assert_eq!(principal.username, "alice"),
		other => panic!("Unexpected outcome: {other:?}."),
	}
}

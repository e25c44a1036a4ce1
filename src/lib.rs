//! Multi-provider OAuth 2.0 / OpenID Connect login broker: authorization-code flows against
//! Google, GitHub, Microsoft, and any OIDC provider, with token validation and pluggable
//! claims-to-role resolution.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod broker;
pub mod config;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod flows;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod roles;
pub mod token;
pub mod user;
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// crates.io
	use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
	use jsonwebtoken::{Algorithm, EncodingKey, Header};
	// self
	use crate::{
		auth::ProviderId,
		broker::LoginBroker,
		config::{BrokerConfig, ProviderConfig},
		http::ReqwestHttpClient,
	};

	/// Base redirect URI used by test configurations.
	pub const TEST_BASE_REDIRECT_URI: &str = "https://app.example.com/geo/";
	/// Key id of the HS256 key served by [`test_jwks`].
	pub const TEST_JWT_KID: &str = "test-key";

	const TEST_JWT_SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

	/// JWK set body holding the `oct` key that signs [`mint_test_id_token`] tokens.
	pub fn test_jwks() -> String {
		serde_json::json!({
			"keys": [{
				"kty": "oct",
				"kid": TEST_JWT_KID,
				"alg": "HS256",
				"k": URL_SAFE_NO_PAD.encode(TEST_JWT_SECRET),
			}]
		})
		.to_string()
	}

	/// Signs `claims` with the [`test_jwks`] key.
	pub fn mint_test_id_token(claims: &JsonValue) -> String {
		let mut header = Header::new(Algorithm::HS256);

		header.kid = Some(TEST_JWT_KID.into());

		jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(TEST_JWT_SECRET))
			.expect("Failed to sign test ID token.")
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Generic OIDC provider configuration pointing every endpoint at `base` (typically a
	/// mock server URL without a trailing slash).
	pub fn mock_oidc_config(base: &str) -> ProviderConfig {
		ProviderConfig::oidc()
			.with_enabled(true)
			.with_client_id("oidc-client")
			.with_client_secret("oidc-secret")
			.with_scopes("openid profile email")
			.with_authorization_uri(format!("{base}/authorize"))
			.with_token_uri(format!("{base}/token"))
			.with_user_info_uri(format!("{base}/userinfo"))
			.with_jwk_set_uri(format!("{base}/jwks"))
			.with_force_https(false)
	}

	/// Broker configuration with only the generic OIDC provider configured.
	pub fn mock_broker_config(oidc: ProviderConfig) -> BrokerConfig {
		BrokerConfig::default()
			.with_base_redirect_uri(TEST_BASE_REDIRECT_URI)
			.with_provider(ProviderId::oidc(), oidc)
	}

	/// Constructs a [`LoginBroker`] backed by the insecure test transport.
	pub fn build_test_broker() -> LoginBroker {
		LoginBroker::with_http_clients(test_reqwest_http_client(), test_reqwest_http_client())
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::{Map as JsonMap, Value as JsonValue};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tokio as _};

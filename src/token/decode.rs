//! Signature verification against a cached JWK set, plus unverified segment reads.

// std
use std::{collections::HashSet, time::Duration as StdDuration};
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{
	DecodingKey, Header, Validation,
	errors::ErrorKind,
	jwk::{Jwk, JwkSet, PublicKeyUse},
};
// self
use crate::{
	_prelude::*,
	auth::{Claims, ProviderId},
	error::TokenValidationError,
	http::ReqwestHttpClient,
};

/// Verifies ID token signatures for one provider.
///
/// The JWK set is fetched lazily and cached; a token whose `kid` is not in the cached
/// set triggers one refetch, shared by concurrent callers.
pub struct IdTokenDecoder {
	provider: ProviderId,
	jwk_set_uri: Option<Url>,
	http_client: ReqwestHttpClient,
	timeout: StdDuration,
	keys: RwLock<Option<Arc<JwkSet>>>,
	refresh_lock: AsyncMutex<()>,
}
impl IdTokenDecoder {
	/// Decoder for `provider` reading keys from `jwk_set_uri`.
	pub fn new(
		provider: ProviderId,
		jwk_set_uri: Option<Url>,
		http_client: ReqwestHttpClient,
		timeout: StdDuration,
	) -> Self {
		Self {
			provider,
			jwk_set_uri,
			http_client,
			timeout,
			keys: RwLock::new(None),
			refresh_lock: AsyncMutex::new(()),
		}
	}

	/// Provider this decoder belongs to.
	pub fn provider(&self) -> &ProviderId {
		&self.provider
	}

	/// Verifies the signature of `raw` and returns its claims.
	///
	/// When `expected_nonce` is set the token must carry the same `nonce`. Time, issuer,
	/// and audience claims are left to the [`TokenValidator`](crate::token::TokenValidator)
	/// chain.
	pub async fn decode(
		&self,
		raw: &str,
		expected_nonce: Option<&str>,
	) -> Result<Claims, TokenValidationError> {
		let header = jsonwebtoken::decode_header(raw)
			.map_err(|e| TokenValidationError::Malformed { reason: e.to_string() })?;
		let keys = self.key_set(None).await?;
		let claims = match self.verify(raw, &header, &keys) {
			Err(TokenValidationError::SignatureInvalid { .. }) if header.kid.is_some() => {
				let refreshed = self.key_set(Some(&keys)).await?;

				self.verify(raw, &header, &refreshed)?
			},
			result => result?,
		};

		if let Some(expected) = expected_nonce
			&& claims.get("nonce").and_then(JsonValue::as_str) != Some(expected)
		{
			return Err(TokenValidationError::NonceMismatch);
		}

		Ok(claims)
	}

	fn verify(
		&self,
		raw: &str,
		header: &Header,
		keys: &JwkSet,
	) -> Result<Claims, TokenValidationError> {
		let candidates: Vec<&Jwk> = match header.kid.as_deref() {
			Some(kid) => keys.find(kid).into_iter().collect(),
			None => keys
				.keys
				.iter()
				.filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
				.collect(),
		};

		if candidates.is_empty() {
			return Err(TokenValidationError::SignatureInvalid {
				reason: "no matching signing key".into(),
			});
		}

		let mut validation = Validation::new(header.alg);

		validation.validate_exp = false;
		validation.validate_nbf = false;
		validation.validate_aud = false;
		validation.required_spec_claims = HashSet::new();

		let mut last = None;

		for jwk in candidates {
			let key = match DecodingKey::from_jwk(jwk) {
				Ok(key) => key,
				Err(e) => {
					last = Some(TokenValidationError::SignatureInvalid { reason: e.to_string() });

					continue;
				},
			};

			match jsonwebtoken::decode::<Claims>(raw, &key, &validation) {
				Ok(data) => return Ok(data.claims),
				Err(e) => last = Some(map_jwt_error(e.kind())),
			}
		}

		Err(last.unwrap_or(TokenValidationError::SignatureInvalid {
			reason: "no usable signing key".into(),
		}))
	}

	async fn key_set(
		&self,
		stale: Option<&Arc<JwkSet>>,
	) -> Result<Arc<JwkSet>, TokenValidationError> {
		let cached = self.keys.read().clone();

		if let Some(current) = cached.as_ref()
			&& stale.is_none_or(|stale| !Arc::ptr_eq(stale, current))
		{
			return Ok(current.clone());
		}

		let _guard = self.refresh_lock.lock().await;
		let cached = self.keys.read().clone();

		if let Some(current) = cached
			&& stale.is_none_or(|stale| !Arc::ptr_eq(stale, &current))
		{
			return Ok(current);
		}

		let Some(uri) = self.jwk_set_uri.as_ref() else {
			return Err(TokenValidationError::KeySetUnavailable {
				reason: "no JWK set endpoint is configured".into(),
			});
		};
		let fetched = self
			.http_client
			.get_json::<JwkSet>(uri, None, self.timeout)
			.await
			.map_err(|e| TokenValidationError::KeySetUnavailable { reason: e.to_string() })?;
		let fetched = Arc::new(fetched);

		#[cfg(feature = "tracing")]
		tracing::debug!(provider = %self.provider, keys = fetched.keys.len(), "Loaded JWK set.");

		*self.keys.write() = Some(fetched.clone());

		Ok(fetched)
	}
}
impl Debug for IdTokenDecoder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("IdTokenDecoder")
			.field("provider", &self.provider)
			.field("jwk_set_uri", &self.jwk_set_uri)
			.field("keys_cached", &self.keys.read().is_some())
			.finish()
	}
}

/// Header and body of a compact JWT read without signature verification.
#[derive(Clone, Debug, PartialEq)]
pub struct UnverifiedJwt {
	/// JOSE header.
	pub header: JsonValue,
	/// Payload claims.
	pub body: JsonValue,
}

/// Failures reading JWT segments.
#[derive(Debug, ThisError)]
pub enum SegmentError {
	/// Value is not a three-part compact JWT.
	#[error("Value is not a compact JWT.")]
	NotJwt,
	/// A segment is not valid base64url.
	#[error(transparent)]
	Base64(#[from] base64::DecodeError),
	/// A segment is not valid JSON.
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

/// Reads the header and body of `raw` without verifying anything.
///
/// Only for logging and for claims the provider already vouched for over TLS.
pub fn read_unverified(raw: &str) -> Result<UnverifiedJwt, SegmentError> {
	let mut parts = raw.split('.');
	let (Some(header), Some(body), Some(_), None) =
		(parts.next(), parts.next(), parts.next(), parts.next())
	else {
		return Err(SegmentError::NotJwt);
	};

	Ok(UnverifiedJwt { header: decode_segment(header)?, body: decode_segment(body)? })
}

fn decode_segment(segment: &str) -> Result<JsonValue, SegmentError> {
	let bytes = URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))?;

	Ok(serde_json::from_slice(&bytes)?)
}

fn map_jwt_error(kind: &ErrorKind) -> TokenValidationError {
	match kind {
		ErrorKind::InvalidSignature =>
			TokenValidationError::SignatureInvalid { reason: "signature mismatch".into() },
		ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) =>
			TokenValidationError::Malformed { reason: format!("{kind:?}") },
		other => TokenValidationError::SignatureInvalid { reason: format!("{other:?}") },
	}
}

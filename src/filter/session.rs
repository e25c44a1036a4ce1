//! Session-scoped state: pending authorization requests and saved requests.

// self
use crate::{
	_prelude::*,
	auth::SessionId,
	error::SessionStoreError,
	filter::InboundRequest,
	flows::AuthorizationRequest,
};

/// Boxed future returned by session store implementations.
pub type SessionFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, SessionStoreError>> + 'a + Send>>;

/// Holds authorization requests between the redirect and the callback.
///
/// Requests are keyed by session and `state`; a request can be taken exactly once.
pub trait AuthorizationRequestStore
where
	Self: Send + Sync,
{
	/// Stores `request` for `session`.
	fn save<'a>(
		&'a self,
		session: &'a SessionId,
		request: AuthorizationRequest,
	) -> SessionFuture<'a, ()>;

	/// Removes and returns the request for `session` issued with `state`.
	fn take<'a>(
		&'a self,
		session: &'a SessionId,
		state: &'a str,
	) -> SessionFuture<'a, Option<AuthorizationRequest>>;

	/// Drops every pending request of an expired session.
	fn remove_session<'a>(&'a self, session: &'a SessionId) -> SessionFuture<'a, ()>;
}

type PendingMap = Arc<RwLock<HashMap<SessionId, HashMap<String, AuthorizationRequest>>>>;

/// Default lifetime of a pending authorization request.
pub const DEFAULT_PENDING_TTL: Duration = Duration::minutes(10);
/// Default number of concurrent pending requests kept per session.
pub const DEFAULT_PENDING_PER_SESSION: usize = 8;

/// In-process [`AuthorizationRequestStore`].
///
/// Requests older than the TTL are pruned on every save and never handed out by
/// [`take`](AuthorizationRequestStore::take). Each session keeps at most
/// `max_per_session` requests; saving one more evicts the oldest.
#[derive(Clone, Debug)]
pub struct MemoryAuthorizationRequestStore {
	pending: PendingMap,
	ttl: Duration,
	max_per_session: usize,
}
impl MemoryAuthorizationRequestStore {
	/// Overrides how long a pending request stays valid.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Overrides the per-session cap (at least one request is always kept).
	pub fn with_max_per_session(mut self, max: usize) -> Self {
		self.max_per_session = max.max(1);

		self
	}

	/// Number of pending requests across all sessions.
	pub fn len(&self) -> usize {
		self.pending.read().values().map(HashMap::len).sum()
	}

	/// Returns true when nothing is pending.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn is_expired(&self, request: &AuthorizationRequest, now: OffsetDateTime) -> bool {
		now - request.created_at > self.ttl
	}

	fn save_now(&self, session: SessionId, request: AuthorizationRequest) {
		let now = OffsetDateTime::now_utc();
		let mut guard = self.pending.write();

		guard.retain(|_, pending| {
			pending.retain(|_, request| !self.is_expired(request, now));

			!pending.is_empty()
		});

		let pending = guard.entry(session).or_default();

		while pending.len() >= self.max_per_session {
			let Some(oldest) = pending
				.iter()
				.min_by_key(|(_, request)| request.created_at)
				.map(|(state, _)| state.clone())
			else {
				break;
			};

			pending.remove(&oldest);
		}

		pending.insert(request.state.clone(), request);
	}

	fn take_now(&self, session: &SessionId, state: &str) -> Option<AuthorizationRequest> {
		let mut guard = self.pending.write();
		let pending = guard.get_mut(session)?;
		let request = pending.remove(state);

		if pending.is_empty() {
			guard.remove(session);
		}

		request.filter(|request| !self.is_expired(request, OffsetDateTime::now_utc()))
	}
}
impl Default for MemoryAuthorizationRequestStore {
	fn default() -> Self {
		Self {
			pending: PendingMap::default(),
			ttl: DEFAULT_PENDING_TTL,
			max_per_session: DEFAULT_PENDING_PER_SESSION,
		}
	}
}
impl AuthorizationRequestStore for MemoryAuthorizationRequestStore {
	fn save<'a>(
		&'a self,
		session: &'a SessionId,
		request: AuthorizationRequest,
	) -> SessionFuture<'a, ()> {
		Box::pin(async move {
			self.save_now(session.to_owned(), request);

			Ok(())
		})
	}

	fn take<'a>(
		&'a self,
		session: &'a SessionId,
		state: &'a str,
	) -> SessionFuture<'a, Option<AuthorizationRequest>> {
		Box::pin(async move { Ok(self.take_now(session, state)) })
	}

	fn remove_session<'a>(&'a self, session: &'a SessionId) -> SessionFuture<'a, ()> {
		Box::pin(async move {
			self.pending.write().remove(session);

			Ok(())
		})
	}
}

/// Request interrupted by the login redirect, replayed once the user is authenticated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedRequest {
	/// Application-relative path plus query string.
	pub target: String,
	/// Headers of the original request.
	pub headers: BTreeMap<String, String>,
}
impl SavedRequest {
	/// Snapshot of `request`.
	pub fn from_request(request: &InboundRequest) -> Self {
		Self { target: request.target(), headers: request.headers.clone() }
	}

	/// Returns true when `request` targets the saved location.
	pub fn matches(&self, request: &InboundRequest) -> bool {
		self.target == request.target()
	}
}

/// Holds at most one [`SavedRequest`] per session.
pub trait SavedRequestStore
where
	Self: Send + Sync,
{
	/// Stores `request`, replacing any previous one.
	fn save<'a>(&'a self, session: &'a SessionId, request: SavedRequest) -> SessionFuture<'a, ()>;

	/// Saved request of `session`, left in place.
	fn get<'a>(&'a self, session: &'a SessionId) -> SessionFuture<'a, Option<SavedRequest>>;

	/// Removes and returns the saved request of `session`.
	fn remove<'a>(&'a self, session: &'a SessionId) -> SessionFuture<'a, Option<SavedRequest>>;
}

/// In-process [`SavedRequestStore`].
#[derive(Clone, Debug, Default)]
pub struct MemorySavedRequestStore(Arc<RwLock<HashMap<SessionId, SavedRequest>>>);
impl SavedRequestStore for MemorySavedRequestStore {
	fn save<'a>(&'a self, session: &'a SessionId, request: SavedRequest) -> SessionFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(session.to_owned(), request);

			Ok(())
		})
	}

	fn get<'a>(&'a self, session: &'a SessionId) -> SessionFuture<'a, Option<SavedRequest>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(session).cloned()) })
	}

	fn remove<'a>(&'a self, session: &'a SessionId) -> SessionFuture<'a, Option<SavedRequest>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.write().remove(session)) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::ProviderId,
		config::ProviderConfig,
		flows::OidcAuthorizationCustomizer,
		provider::ClientRegistration,
	};

	fn session(value: &str) -> SessionId {
		SessionId::new(value).expect("Session fixture should be valid.")
	}

	fn pending() -> AuthorizationRequest {
		let config = ProviderConfig::oidc()
			.with_client_id("client")
			.with_client_secret("secret")
			.with_authorization_uri("https://idp.example.com/authorize")
			.with_token_uri("https://idp.example.com/token");
		let registration = ClientRegistration::from_config(
			&ProviderId::oidc(),
			&config,
			"https://app.example.com/login/oauth2/code/oidc",
		)
		.expect("Registration fixture should build.");

		AuthorizationRequest::build(&registration, &OidcAuthorizationCustomizer)
	}

	#[tokio::test]
	async fn pending_requests_are_taken_once_per_session() {
		let store = MemoryAuthorizationRequestStore::default();
		let request = pending();
		let state = request.state.clone();

		store.save(&session("s-1"), request).await.expect("Save should succeed.");

		assert!(
			store.take(&session("s-2"), &state).await.expect("Take should succeed.").is_none(),
			"Other sessions must not see the request."
		);
		assert!(store.take(&session("s-1"), &state).await.expect("Take should succeed.").is_some());
		assert!(store.take(&session("s-1"), &state).await.expect("Take should succeed.").is_none());
		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn expired_sessions_drop_pending_requests() {
		let store = MemoryAuthorizationRequestStore::default();

		store.save(&session("s-1"), pending()).await.expect("Save should succeed.");
		store.save(&session("s-1"), pending()).await.expect("Save should succeed.");

		assert_eq!(store.len(), 2);

		store.remove_session(&session("s-1")).await.expect("Removal should succeed.");

		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn stale_requests_expire_and_sessions_are_capped() {
		let store = MemoryAuthorizationRequestStore::default().with_max_per_session(3);
		let mut stale = pending();
		let stale_state = stale.state.clone();

		stale.created_at -= DEFAULT_PENDING_TTL + Duration::seconds(1);
		store.save(&session("s-1"), stale.clone()).await.expect("Save should succeed.");

		assert!(
			store
				.take(&session("s-1"), &stale_state)
				.await
				.expect("Take should succeed.")
				.is_none(),
			"Expired requests must not complete a login."
		);

		store.save(&session("s-2"), stale).await.expect("Save should succeed.");
		store.save(&session("s-3"), pending()).await.expect("Save should succeed.");

		assert_eq!(store.len(), 1, "Saving prunes expired requests of every session.");

		let mut first = pending();
		let first_state = first.state.clone();

		first.created_at -= Duration::seconds(30);
		store.save(&session("s-1"), first).await.expect("Save should succeed.");

		for _ in 0..500 {
			store.save(&session("s-1"), pending()).await.expect("Save should succeed.");
		}

		assert_eq!(store.len(), 4);
		assert!(
			store
				.take(&session("s-1"), &first_state)
				.await
				.expect("Take should succeed.")
				.is_none(),
			"The oldest request is evicted first."
		);
	}

	#[tokio::test]
	async fn saved_request_survives_reads_until_removed() {
		let store = MemorySavedRequestStore::default();
		let request = InboundRequest::get(session("s-1"), "/maps/wms?layers=roads");

		store
			.save(&session("s-1"), SavedRequest::from_request(&request))
			.await
			.expect("Save should succeed.");

		let saved = store.get(&session("s-1")).await.expect("Get should succeed.");

		assert!(saved.as_ref().is_some_and(|saved| saved.matches(&request)));
		assert!(store.remove(&session("s-1")).await.expect("Remove should succeed.").is_some());
		assert!(store.get(&session("s-1")).await.expect("Get should succeed.").is_none());
	}
}

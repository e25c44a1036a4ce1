//! Login filter chain: authorization redirect, callback authentication, saved-request replay.
//!
//! Each stage implements [`LoginFilter`]. [`CompositeLoginFilter`] keeps exactly one filter
//! per [`FilterKind`] stage, picked by kind rather than by position, and runs them in stage
//! order until one produces an outcome.

pub mod login;
pub mod redirect;
pub mod session;

pub use login::*;
pub use redirect::*;
pub use session::*;

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::{AuthenticatedPrincipal, SessionId},
	broker::LoginOption,
};

/// Boxed future returned by [`LoginFilter`] implementations.
pub type FilterFuture<'a> = Pin<Box<dyn Future<Output = Result<FilterOutcome>> + 'a + Send>>;

/// Inbound request as seen by the broker.
///
/// `path` is relative to the application base, so `/login/oauth2/code/oidc` regardless
/// of where the application is mounted. Callbacks sent with `response_mode=form_post`
/// arrive as `POST` requests; build those with [`InboundRequest::post`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequest {
	/// Browser session the request belongs to.
	pub session: SessionId,
	/// Application-relative path.
	pub path: String,
	/// Decoded query parameters; the last occurrence of a name wins.
	pub query: BTreeMap<String, String>,
	/// Decoded `application/x-www-form-urlencoded` body parameters.
	pub form: BTreeMap<String, String>,
	/// Request headers.
	pub headers: BTreeMap<String, String>,
}
impl InboundRequest {
	/// Parses `target` (`/path?query`) into a request without headers.
	pub fn get(session: SessionId, target: &str) -> Self {
		let (path, query) = target.split_once('?').unwrap_or((target, ""));
		let path = if path.is_empty() { "/".to_owned() } else { path.to_owned() };

		Self {
			session,
			path,
			query: form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
			form: BTreeMap::new(),
			headers: BTreeMap::new(),
		}
	}

	/// Parses `target` plus a form-encoded `body` into a request without headers.
	pub fn post(session: SessionId, target: &str, body: &str) -> Self {
		let mut request = Self::get(session, target);

		request.form = form_urlencoded::parse(body.as_bytes()).into_owned().collect();

		request
	}

	/// Adds a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.insert(name.into(), value.into());

		self
	}

	/// Query parameter `name`.
	pub fn query(&self, name: &str) -> Option<&str> {
		self.query.get(name).map(String::as_str)
	}

	/// Form parameter `name`, falling back to the query parameter of the same name.
	pub fn param(&self, name: &str) -> Option<&str> {
		self.form.get(name).or_else(|| self.query.get(name)).map(String::as_str)
	}

	/// Path plus normalized query string.
	pub fn target(&self) -> String {
		if self.query.is_empty() {
			return self.path.clone();
		}

		let query =
			form_urlencoded::Serializer::new(String::new()).extend_pairs(&self.query).finish();

		format!("{}?{query}", self.path)
	}
}

/// What the broker wants the hosting layer to do with a request.
#[derive(Clone, Debug)]
pub enum FilterOutcome {
	/// Not a login request; continue with the hosting pipeline.
	Continue,
	/// Send the browser to `location`.
	Redirect {
		/// Absolute URL or application-relative path.
		location: String,
	},
	/// Render the login page offering these providers.
	LoginPage(Vec<LoginOption>),
	/// Login completed; establish the session and redirect.
	Authenticated {
		/// Principal built for this login.
		principal: Box<AuthenticatedPrincipal>,
		/// Saved request target, or `/`.
		redirect_to: String,
	},
	/// The request matches the one saved before login; replay it.
	Restored(SavedRequest),
}
impl FilterOutcome {
	/// Returns true for [`FilterOutcome::Continue`].
	pub fn is_continue(&self) -> bool {
		matches!(self, FilterOutcome::Continue)
	}
}

/// Stage a filter implements, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterKind {
	/// Starts the redirect to the provider.
	AuthorizationRedirect,
	/// Handles the provider callback.
	LoginAuthentication,
	/// Replays the request saved before login.
	RequestCacheAware,
	/// Any filter outside the login chain.
	Other,
}

/// One stage of the login chain.
pub trait LoginFilter
where
	Self: Send + Sync,
{
	/// Stage this filter implements.
	fn kind(&self) -> FilterKind;

	/// Handles `request`, returning [`FilterOutcome::Continue`] when it does not apply.
	fn filter<'a>(&'a self, request: &'a InboundRequest) -> FilterFuture<'a>;
}

/// Login chain holding exactly the redirect, authentication, and request-cache stages.
#[derive(Clone, Default)]
pub struct CompositeLoginFilter {
	stages: Vec<Arc<dyn LoginFilter>>,
}
impl CompositeLoginFilter {
	/// Keeps the first filter of each login stage from `filters`, in stage order.
	///
	/// Filters of kind [`FilterKind::Other`] and later duplicates of a stage are dropped,
	/// so the input order never matters.
	pub fn select(filters: impl IntoIterator<Item = Arc<dyn LoginFilter>>) -> Self {
		let mut by_kind = BTreeMap::new();

		for filter in filters {
			let kind = filter.kind();

			if kind != FilterKind::Other {
				by_kind.entry(kind).or_insert(filter);
			}
		}

		Self { stages: by_kind.into_values().collect() }
	}

	/// Kinds of the kept stages, in execution order.
	pub fn kinds(&self) -> Vec<FilterKind> {
		self.stages.iter().map(|stage| stage.kind()).collect()
	}

	/// Runs the stages until one produces an outcome.
	pub async fn filter(&self, request: &InboundRequest) -> Result<FilterOutcome> {
		for stage in &self.stages {
			let outcome = stage.filter(request).await?;

			if !outcome.is_continue() {
				return Ok(outcome);
			}
		}

		Ok(FilterOutcome::Continue)
	}
}
impl Debug for CompositeLoginFilter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CompositeLoginFilter").field("stages", &self.kinds()).finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	struct Fixed(FilterKind, &'static str);
	impl LoginFilter for Fixed {
		fn kind(&self) -> FilterKind {
			self.0
		}

		fn filter<'a>(&'a self, request: &'a InboundRequest) -> FilterFuture<'a> {
			Box::pin(async move {
				Ok(if request.path == self.1 {
					FilterOutcome::Redirect { location: format!("{:?}", self.0) }
				} else {
					FilterOutcome::Continue
				})
			})
		}
	}

	fn session() -> SessionId {
		SessionId::new("s-1").expect("Session fixture should be valid.")
	}

	#[test]
	fn requests_parse_path_and_query() {
		let request = InboundRequest::get(session(), "/login/oauth2/code/oidc?state=abc&code=x%2By")
			.with_header("X-Roles", "a");

		assert_eq!(request.path, "/login/oauth2/code/oidc");
		assert_eq!(request.query("code"), Some("x+y"));
		assert_eq!(request.target(), "/login/oauth2/code/oidc?code=x%2By&state=abc");
		assert_eq!(InboundRequest::get(session(), "").path, "/");
	}

	#[test]
	fn form_posts_carry_body_parameters() {
		let request = InboundRequest::post(
			session(),
			"/login/oauth2/code/oidc?state=from-query",
			"state=from-body&code=a%2Bb",
		);

		assert_eq!(request.param("state"), Some("from-body"));
		assert_eq!(request.param("code"), Some("a+b"));
		assert_eq!(request.query("code"), None);
		assert_eq!(request.target(), "/login/oauth2/code/oidc?state=from-query");
	}

	#[tokio::test]
	async fn composite_selects_by_kind_in_stage_order() {
		let filters: Vec<Arc<dyn LoginFilter>> = vec![
			Arc::new(Fixed(FilterKind::RequestCacheAware, "/a")),
			Arc::new(Fixed(FilterKind::Other, "/a")),
			Arc::new(Fixed(FilterKind::AuthorizationRedirect, "/b")),
			Arc::new(Fixed(FilterKind::LoginAuthentication, "/a")),
			Arc::new(Fixed(FilterKind::AuthorizationRedirect, "/a")),
		];
		let composite = CompositeLoginFilter::select(filters);

		assert_eq!(
			composite.kinds(),
			[
				FilterKind::AuthorizationRedirect,
				FilterKind::LoginAuthentication,
				FilterKind::RequestCacheAware,
			]
		);

		match composite
			.filter(&InboundRequest::get(session(), "/a"))
			.await
			.expect("Chain should run.")
		{
			FilterOutcome::Redirect { location } => assert_eq!(location, "LoginAuthentication"),
			other => panic!("Unexpected outcome: {other:?}."),
		}

		assert!(
			composite
				.filter(&InboundRequest::get(session(), "/c"))
				.await
				.expect("Chain should run.")
				.is_continue()
		);
	}
}

//! Group memberships from a Microsoft Graph style `memberOf` endpoint.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{Role, RoleSet},
	error::RoleResolutionError,
	http::ReqwestHttpClient,
};

/// Upper bound on followed `@odata.nextLink` pages.
pub const GRAPH_PAGE_LIMIT: usize = 10;

const GROUP_TYPE: &str = "#microsoft.graph.group";

#[derive(Debug, Deserialize)]
struct MemberOfPage {
	#[serde(default)]
	value: Vec<DirectoryObject>,
	#[serde(rename = "@odata.nextLink")]
	next_link: Option<Url>,
}

#[derive(Debug, Deserialize)]
struct DirectoryObject {
	#[serde(rename = "@odata.type")]
	odata_type: Option<String>,
	id: Option<String>,
}

/// Fails unless `user_info_uri` is served by the host of `graph_endpoint`.
///
/// The access token was issued for the user-info audience, so presenting it to another
/// host would leak it to a third party.
pub fn check_graph_host(
	user_info_uri: Option<&Url>,
	graph_endpoint: &Url,
) -> Result<(), RoleResolutionError> {
	let graph_host = graph_endpoint.host_str().unwrap_or_default();

	match user_info_uri {
		Some(uri) if uri.host_str().is_some_and(|host| host.eq_ignore_ascii_case(graph_host)) =>
			Ok(()),
		other => Err(RoleResolutionError::GraphHostMismatch {
			user_info_uri: other.map(Url::to_string).unwrap_or_default(),
			graph_host: graph_host.to_owned(),
		}),
	}
}

/// Collects the ids of every group on `endpoint`, following pagination links.
///
/// Entries typed as something other than a group (directory roles, administrative
/// units) are skipped.
pub async fn fetch_group_roles(
	http_client: &ReqwestHttpClient,
	endpoint: &Url,
	access_token: &str,
	timeout: StdDuration,
) -> Result<RoleSet, RoleResolutionError> {
	let mut roles = RoleSet::new();
	let mut next = Some(endpoint.clone());
	let mut pages = 0;

	while let Some(url) = next.take() {
		if pages == GRAPH_PAGE_LIMIT {
			#[cfg(feature = "tracing")]
			tracing::warn!(
				limit = GRAPH_PAGE_LIMIT,
				"Graph membership listing truncated at page limit."
			);

			break;
		}

		let page: MemberOfPage = http_client
			.get_json(&url, Some(access_token), timeout)
			.await
			.map_err(|source| RoleResolutionError::Graph { source })?;

		pages += 1;
		roles.extend(
			page.value
				.into_iter()
				.filter(|object| object.odata_type.as_deref().is_none_or(|ty| ty == GROUP_TYPE))
				.filter_map(|object| object.id)
				.map(Role::new),
		);
		next = page.next_link;
	}

	Ok(roles)
}

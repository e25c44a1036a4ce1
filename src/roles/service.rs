//! External role and user/group services plus the named converter registry.

// self
use crate::{
	_prelude::*,
	auth::RoleSet,
	error::RoleResolutionError,
	roles::RoleConverter,
};

/// Boxed future returned by [`RoleService`] implementations.
pub type RoleFuture<'a> =
	Pin<Box<dyn Future<Output = Result<RoleSet, RoleResolutionError>> + 'a + Send>>;

/// Hosting-layer service that knows the roles of a user name.
pub trait RoleService
where
	Self: Send + Sync,
{
	/// Roles assigned to `username`.
	fn roles_for<'a>(&'a self, username: &'a str) -> RoleFuture<'a>;
}

/// Fixed user-to-roles table, for tests and static deployments.
#[derive(Clone, Debug, Default)]
pub struct StaticRoleService(BTreeMap<String, RoleSet>);
impl StaticRoleService {
	/// Assigns `roles` to `username`.
	pub fn with_user<I, S>(mut self, username: impl Into<String>, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		self.0
			.insert(username.into(), roles.into_iter().map(|role| role.as_ref().into()).collect());

		self
	}
}
impl RoleService for StaticRoleService {
	fn roles_for<'a>(&'a self, username: &'a str) -> RoleFuture<'a> {
		let roles = self.0.get(username).cloned().unwrap_or_default();

		Box::pin(async move { Ok(roles) })
	}
}

/// Named services and converters available to role resolution.
#[derive(Clone, Default)]
pub struct RoleServices {
	services: BTreeMap<String, Arc<dyn RoleService>>,
	converters: BTreeMap<String, Arc<dyn RoleConverter>>,
}
impl RoleServices {
	/// Registers a role or user/group service under `name`.
	pub fn with_service(
		mut self,
		name: impl Into<String>,
		service: impl 'static + RoleService,
	) -> Self {
		self.services.insert(name.into(), Arc::new(service));

		self
	}

	/// Registers a converter under `name`.
	pub fn with_converter(
		mut self,
		name: impl Into<String>,
		converter: impl 'static + RoleConverter,
	) -> Self {
		self.converters.insert(name.into(), Arc::new(converter));

		self
	}

	/// Service registered under `name`.
	pub fn service(&self, name: &str) -> Option<Arc<dyn RoleService>> {
		self.services.get(name).cloned()
	}

	/// Converter registered under `name`.
	pub fn converter(&self, name: &str) -> Option<Arc<dyn RoleConverter>> {
		self.converters.get(name).cloned()
	}
}
impl Debug for RoleServices {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RoleServices")
			.field("services", &self.services.keys().collect::<Vec<_>>())
			.field("converters", &self.converters.keys().collect::<Vec<_>>())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn static_service_returns_assigned_roles() {
		let services = RoleServices::default()
			.with_service("default", StaticRoleService::default().with_user("jane", ["ADMIN"]));
		let service = services.service("default").expect("Service should be registered.");

		assert!(service.roles_for("jane").await.expect("Lookup should succeed.").contains("ADMIN"));
		assert!(service.roles_for("joe").await.expect("Lookup should succeed.").is_empty());
		assert!(services.service("missing").is_none());
	}
}

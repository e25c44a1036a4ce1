//! Immutable registration set built on activation plus enable/disable events.

// self
use crate::{
	_prelude::*,
	auth::ProviderId,
	config::{BrokerConfig, ConfigValidator},
	provider::ClientRegistration,
};

/// Enable/disable transition emitted for every known provider on activation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderEvent {
	/// Provider the event refers to.
	pub provider: ProviderId,
	/// Whether the provider is now offered for login.
	pub enabled: bool,
}

/// Subscription interface for provider enable/disable events.
///
/// Events arrive in activation order; the last event for a provider wins.
pub trait ProviderEventListener
where
	Self: Send + Sync,
{
	/// Receives one event.
	fn on_provider_event(&self, event: &ProviderEvent);
}

/// Immutable map of provider id to [`ClientRegistration`].
///
/// Disabled providers are omitted. A registry is never mutated after construction;
/// activation builds a new one and publishes it atomically.
#[derive(Clone, Debug, Default)]
pub struct ProviderRegistry {
	registrations: BTreeMap<ProviderId, Arc<ClientRegistration>>,
}
impl ProviderRegistry {
	/// Validates every enabled provider and builds the registration set.
	///
	/// Fails on the first invalid provider without producing a partial registry. On
	/// success, returns one [`ProviderEvent`] per known provider id.
	pub fn build(
		config: &BrokerConfig,
		validator: &ConfigValidator,
	) -> Result<(Self, Vec<ProviderEvent>)> {
		let mut registrations = BTreeMap::new();
		let mut events = Vec::new();

		for id in ProviderId::all() {
			let Some(provider) = config.provider(&id).filter(|provider| provider.enabled) else {
				events.push(ProviderEvent { provider: id, enabled: false });

				continue;
			};
			let errors = validator.validate(&id, provider);

			if !errors.is_empty() {
				return Err(Error::InvalidProvider { provider: id, errors });
			}

			let registration =
				ClientRegistration::from_config(&id, provider, &config.redirect_uri(&id))?;

			registrations.insert(id.clone(), Arc::new(registration));
			events.push(ProviderEvent { provider: id, enabled: true });
		}

		#[cfg(feature = "tracing")]
		{
			for id in config.providers.keys().filter(|id| !ProviderId::all().contains(id)) {
				tracing::warn!(provider = %id, "Ignoring configuration for unsupported provider.");
			}
		}

		Ok((Self { registrations }, events))
	}

	/// Builds a registry from ready-made registrations.
	pub fn from_registrations(registrations: impl IntoIterator<Item = ClientRegistration>) -> Self {
		Self {
			registrations: registrations
				.into_iter()
				.map(|registration| (registration.id.clone(), Arc::new(registration)))
				.collect(),
		}
	}

	/// Registration for `id`, if the provider is enabled.
	pub fn get(&self, id: &str) -> Option<&Arc<ClientRegistration>> {
		self.registrations.get(id)
	}

	/// Enabled provider ids in stable order.
	pub fn ids(&self) -> impl Iterator<Item = &ProviderId> {
		self.registrations.keys()
	}

	/// Iterator over enabled registrations.
	pub fn iter(&self) -> impl Iterator<Item = &Arc<ClientRegistration>> {
		self.registrations.values()
	}

	/// Number of enabled providers.
	pub fn len(&self) -> usize {
		self.registrations.len()
	}

	/// Returns true when no provider is enabled.
	pub fn is_empty(&self) -> bool {
		self.registrations.is_empty()
	}
}

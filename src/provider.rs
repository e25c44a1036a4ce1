//! Provider-facing registrations (data) and strategies (behavior).
//!
//! `preset` holds the fixed endpoints of the built-in integrations, `registration`
//! exposes the immutable [`ClientRegistration`] derived from an enabled provider
//! configuration, `registry` publishes the full registration set built on activation,
//! and `strategy` defines [`ProviderStrategy`], the hook that maps token endpoint
//! failures into the broker error taxonomy.

pub mod preset;
pub mod registration;
pub mod registry;
pub mod strategy;

pub use registration::*;
pub use registry::*;
pub use strategy::*;

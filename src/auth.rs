//! Auth-domain identifiers, scope sets, secrets, and the authenticated principal.

pub mod id;
pub mod principal;
pub mod scope;
pub mod secret;

pub use id::*;
pub use principal::*;
pub use scope::*;
pub use secret::*;

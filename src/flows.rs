//! Authorization-code login steps.
//!
//! `authorize` builds the redirect (state, nonce, PKCE, provider-specific parameters),
//! `exchange` trades the returned code for tokens, and `confidential` renders the
//! opt-in audit record of an exchange.

pub mod authorize;
pub mod confidential;
pub mod exchange;

pub use authorize::*;
pub use confidential::*;
pub use exchange::*;

//! ID token decoding and the per-provider validation chain.
//!
//! [`IdTokenDecoder`] verifies signatures against the provider's JWK set and checks the
//! nonce; [`TokenValidator`] implementations check time, issuer, and audience claims.
//! [`TokenValidatorFactory`] hands out both per provider id.

pub mod decode;
pub mod factory;
pub mod validate;

pub use decode::*;
pub use factory::*;
pub use validate::*;

//! Provider-facing descriptors (data) and strategies (behavior).
//!
//! `descriptor` holds what discovery resolved about the identity provider: the token
//! endpoint, the client identifier, default scopes, declared grant types, and quirks such as
//! the Microsoft identity platform's restrictions. `strategy` defines [`ProviderStrategy`], an
//! HTTP-client-agnostic hook used by sessions to augment outgoing token requests and map
//! responses into the crate error taxonomy.

pub mod descriptor;
pub mod strategy;

pub use descriptor::*;
pub use strategy::*;

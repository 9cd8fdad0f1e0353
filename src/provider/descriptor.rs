//! Provider descriptor assembled from discovery and shared by every session flow.

/// Grant identifiers used by sessions.
pub mod grant;
/// Provider-specific quirk detection.
pub mod quirks;

pub use grant::*;
pub use quirks::*;

// self
use crate::{
	_prelude::*,
	auth::ScopeList,
	discovery::{OidcDiscoveryConfig, OidcDiscoveryDocument},
};

/// Immutable view of the identity provider consumed by sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Token endpoint used for grants and refreshes.
	pub token_endpoint: Url,
	/// OAuth 2.0 client identifier published by the database server.
	pub client_id: String,
	/// Scopes the database server asks every session to request.
	pub default_scopes: ScopeList,
	/// Grant types the provider declares, when it declares any.
	pub grant_types_supported: Option<Vec<String>>,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl ProviderDescriptor {
	/// Creates a descriptor for a known token endpoint, detecting quirks from its host.
	pub fn new(
		token_endpoint: Url,
		client_id: impl Into<String>,
		default_scopes: ScopeList,
	) -> Self {
		let quirks = ProviderQuirks::detect(&token_endpoint);

		Self {
			token_endpoint,
			client_id: client_id.into(),
			default_scopes,
			grant_types_supported: None,
			quirks,
		}
	}

	/// Combines the server-side discovery config with the provider's discovery document.
	///
	/// A `grant_types_supported` list on the config wins over the one in the document.
	pub fn from_discovery(config: &OidcDiscoveryConfig, document: &OidcDiscoveryDocument) -> Self {
		let grants = config
			.grant_types_supported
			.clone()
			.or_else(|| document.grant_types_supported.clone());

		Self::new(document.token_endpoint.clone(), config.client_id.clone(), config.scopes.clone())
			.with_grant_types_supported(grants)
	}

	/// Overrides the declared grant types.
	pub fn with_grant_types_supported(mut self, grants: Option<Vec<String>>) -> Self {
		self.grant_types_supported = grants;

		self
	}

	/// Returns false only when the provider declares its grants and omits `grant`.
	pub fn supports(&self, grant: GrantType) -> bool {
		match &self.grant_types_supported {
			Some(grants) => grants.iter().any(|declared| declared == grant.as_str()),
			None => true,
		}
	}

	/// Shorthand for [`ProviderQuirks::microsoft_identity_platform`].
	pub fn is_microsoft(&self) -> bool {
		self.quirks.microsoft_identity_platform
	}
}

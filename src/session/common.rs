//! Scope resolution shared by the password and client-credentials grants.

// self
use crate::{_prelude::*, auth::ScopeList, error::ConfigError, provider::ProviderDescriptor};

/// Discovery defaults that are never forwarded to the client-credentials grant.
pub const CLIENT_CREDENTIALS_EXCLUDED_SCOPES: [&str; 2] = ["openid", "email"];

/// Scope for the password grant: discovery defaults followed by `extra_scopes`.
///
/// Order is kept and duplicates are not collapsed.
pub fn resolve_password_scope(
	descriptor: &ProviderDescriptor,
	extra_scopes: &ScopeList,
) -> ScopeList {
	descriptor.default_scopes.chain(extra_scopes)
}

/// Scope for the client-credentials grant.
///
/// Discovery defaults lose `openid` and `email`, then the credential's own scope is appended.
/// An empty result falls back to `{client_id}/.default` on the Microsoft identity platform and
/// is an [`Error::MissingScope`] everywhere else.
pub fn resolve_client_credentials_scope(
	descriptor: &ProviderDescriptor,
	credential_scope: Option<&ScopeList>,
) -> Result<ScopeList> {
	let filtered = descriptor.default_scopes.without(&CLIENT_CREDENTIALS_EXCLUDED_SCOPES);
	let scope = match credential_scope {
		Some(extra) => filtered.chain(extra),
		None => filtered,
	};

	if !scope.is_empty() {
		return Ok(scope);
	}
	if descriptor.is_microsoft() {
		let fallback = format!("{}/.default", descriptor.client_id);

		return ScopeList::new([fallback]).map_err(|err| ConfigError::from(err).into());
	}

	Err(Error::MissingScope)
}

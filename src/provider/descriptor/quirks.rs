// self
use crate::_prelude::*;

const MICROSOFT_LOGIN_HOST: &str = "login.microsoftonline.com";
const MICROSOFT_LOGIN_DOMAIN: &str = ".microsoftonline.com";

/// Provider-specific quirks that influence how sessions are negotiated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderQuirks {
	/// Token endpoint belongs to the Microsoft identity platform (Azure AD / Entra ID), which
	/// refuses the password grant for this client and expects `{client_id}/.default` when a
	/// client credentials request carries no other scope.
	pub microsoft_identity_platform: bool,
}
impl ProviderQuirks {
	/// Derives quirks from the resolved token endpoint.
	pub fn detect(token_endpoint: &Url) -> Self {
		let microsoft_identity_platform = token_endpoint.host_str().is_some_and(|host| {
			let host = host.to_ascii_lowercase();

			host == MICROSOFT_LOGIN_HOST || host.ends_with(MICROSOFT_LOGIN_DOMAIN)
		});

		Self { microsoft_identity_platform }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn detects_microsoft_hosts_only() {
		let azure = Url::parse("https://login.microsoftonline.com/tenant/oauth2/v2.0/token")
			.expect("Azure fixture should parse.");
		let keycloak = Url::parse("https://idp.example/realms/db/protocol/openid-connect/token")
			.expect("Keycloak fixture should parse.");
		let lookalike = Url::parse("https://login.microsoftonline.com.evil.example/token")
			.expect("Lookalike fixture should parse.");

		assert!(ProviderQuirks::detect(&azure).microsoft_identity_platform);
		assert!(!ProviderQuirks::detect(&keycloak).microsoft_identity_platform);
		assert!(!ProviderQuirks::detect(&lookalike).microsoft_identity_platform);
	}
}

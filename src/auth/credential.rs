//! Caller credentials accepted by
//! [`Authenticator::create_session`](crate::session::Authenticator::create_session).

// self
use crate::{
	_prelude::*,
	auth::{ScopeList, Secret},
};

/// How the caller authenticates against the identity provider.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
	/// Pre-issued bearer token, optionally refreshable.
	BearerToken {
		/// Access token to attach to requests.
		access_token: Secret,
		/// Remaining lifetime of the access token, if known.
		#[serde(default, with = "opt_seconds")]
		expires_in: Option<Duration>,
		/// Refresh token used to renew the session.
		#[serde(default)]
		refresh_token: Option<Secret>,
	},
	/// Resource-owner password grant.
	ClientPassword {
		/// End-user name.
		username: String,
		/// End-user password.
		password: Secret,
		/// Scopes appended after the discovery defaults.
		#[serde(default)]
		extra_scopes: ScopeList,
	},
	/// Client credentials grant for service principals.
	ClientCredentials {
		/// Client secret sent with `client_secret_post`.
		client_secret: Secret,
		/// Scopes appended after the filtered discovery defaults.
		#[serde(default)]
		scope: Option<ScopeList>,
	},
	/// Anonymous access; no session is created.
	#[default]
	None,
}
impl Credential {
	/// Bearer token without refresh support.
	pub fn bearer(access_token: impl Into<Secret>) -> Self {
		Self::BearerToken {
			access_token: access_token.into(),
			expires_in: None,
			refresh_token: None,
		}
	}

	/// Password grant without extra scopes.
	pub fn password(username: impl Into<String>, password: impl Into<Secret>) -> Self {
		Self::ClientPassword {
			username: username.into(),
			password: password.into(),
			extra_scopes: ScopeList::default(),
		}
	}

	/// Client credentials grant relying on discovery defaults for its scope.
	pub fn client_credentials(client_secret: impl Into<Secret>) -> Self {
		Self::ClientCredentials { client_secret: client_secret.into(), scope: None }
	}

	/// Returns a stable label for logs.
	pub const fn kind(&self) -> &'static str {
		match self {
			Self::BearerToken { .. } => "bearer_token",
			Self::ClientPassword { .. } => "client_password",
			Self::ClientCredentials { .. } => "client_credentials",
			Self::None => "none",
		}
	}

	/// Returns true for [`Credential::None`].
	pub const fn is_anonymous(&self) -> bool {
		matches!(self, Self::None)
	}
}

mod opt_seconds {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(super) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		value.map(|duration| duration.whole_seconds()).serialize(serializer)
	}

	pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
	where
		D: Deserializer<'de>,
	{
		Ok(<Option<i64>>::deserialize(deserializer)?.map(Duration::seconds))
	}
}

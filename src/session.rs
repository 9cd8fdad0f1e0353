//! Session factory: turns a discovery config plus a [`Credential`] into a live [`TokenSession`].
//!
//! [`Authenticator::create_session`] always resolves the provider's discovery document first,
//! validates the credential against the provider's policy, and only then acquires tokens.
//! Password and client-credentials grants are performed eagerly, so the returned session
//! already holds a usable access token and nothing is deferred to the first request.

pub mod common;
pub mod refresh;

mod client_credentials;
mod password;

pub use common::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::{Credential, Secret, TokenRecord},
	discovery::{DiscoveryClient, OidcDiscoveryConfig},
	error::ConfigError,
	http::IdpHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	obs,
	provider::{DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{
	http::{HttpClientConfig, ReqwestHttpClient},
	oauth::ReqwestTransportErrorMapper,
};

#[cfg(feature = "reqwest")]
/// Authenticator specialized for the crate's default reqwest transport stack.
pub type ReqwestAuthenticator = Authenticator<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Creates [`TokenSession`]s for one HTTP transport.
///
/// The authenticator owns the transport, the transport error mapper, and the provider strategy
/// so every session it creates shares them.
#[derive(Clone)]
pub struct Authenticator<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for discovery and token requests.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Strategy that decorates token requests and classifies their failures.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Window before expiry in which sessions refresh pre-emptively.
	pub refresh_leeway: Duration,
}
impl<C, M> Authenticator<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates an authenticator that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(http_client: impl Into<Arc<C>>, mapper: impl Into<Arc<M>>) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			strategy: Arc::new(DefaultProviderStrategy),
			refresh_leeway: TokenSession::<C, M>::DEFAULT_REFRESH_LEEWAY,
		}
	}

	/// Replaces the provider strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Overrides the refresh leeway handed to new sessions; negative values clamp to zero.
	pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
		self.refresh_leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Resolves discovery for `config` and creates a session for `credential`.
	///
	/// Returns `Ok(None)` for [`Credential::None`] without touching the network.
	pub async fn create_session(
		&self,
		config: &OidcDiscoveryConfig,
		credential: Credential,
	) -> Result<Option<TokenSession<C, M>>> {
		if credential.is_anonymous() {
			return Ok(None);
		}

		let discovery =
			DiscoveryClient::<C, M>::new(self.http_client.clone(), self.transport_mapper.clone());
		let document = discovery.fetch_document(&config.href).await?;
		let descriptor = ProviderDescriptor::from_discovery(config, &document);

		self.create_session_with_descriptor(descriptor, credential).await
	}

	/// Creates a session against an already resolved provider descriptor.
	pub async fn create_session_with_descriptor(
		&self,
		descriptor: ProviderDescriptor,
		credential: Credential,
	) -> Result<Option<TokenSession<C, M>>> {
		validate_credential(&descriptor, &credential)?;

		let session = match credential {
			Credential::BearerToken { access_token, expires_in, refresh_token } =>
				self.bearer_session(descriptor, access_token, expires_in, refresh_token)?,
			Credential::ClientPassword { username, password, extra_scopes } =>
				self.password_session(descriptor, &username, &password, &extra_scopes).await?,
			Credential::ClientCredentials { client_secret, scope } =>
				self.client_credentials_session(descriptor, client_secret, scope.as_ref()).await?,
			Credential::None => return Ok(None),
		};

		Ok(Some(session))
	}

	fn bearer_session(
		&self,
		descriptor: ProviderDescriptor,
		access_token: Secret,
		expires_in: Option<Duration>,
		refresh_token: Option<Secret>,
	) -> Result<TokenSession<C, M>> {
		let mut builder = TokenRecord::builder().access_token(access_token);

		if let Some(lifetime) = expires_in {
			builder = builder.expires_in(lifetime);
		}
		if let Some(refresh) = refresh_token {
			builder = builder.refresh_token(refresh);
		}

		let record = builder.build().map_err(ConfigError::from)?;

		if record.refresh_token.is_none() {
			obs::warn_missing_refresh_token(expires_in);
		}

		let facade = self.facade(&descriptor, None)?;

		Ok(TokenSession::new(descriptor, facade, record, SessionGrant::BearerToken)
			.with_refresh_leeway(self.refresh_leeway))
	}

	pub(crate) fn facade(
		&self,
		descriptor: &ProviderDescriptor,
		client_secret: Option<&Secret>,
	) -> Result<BasicFacade<C, M>> {
		BasicFacade::from_descriptor(
			descriptor,
			client_secret,
			self.http_client.clone(),
			self.transport_mapper.clone(),
			self.strategy.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl Authenticator<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates an authenticator backed by a default reqwest transport.
	pub fn new() -> Self {
		Self::with_http_client(ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}

	/// Creates an authenticator whose reqwest transport honours `config` (proxy, timeout).
	pub fn from_http_config(config: &HttpClientConfig) -> Result<Self> {
		Ok(Self::with_http_client(
			ReqwestHttpClient::from_config(config)?,
			ReqwestTransportErrorMapper,
		))
	}
}
#[cfg(feature = "reqwest")]
impl Default for Authenticator<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	fn default() -> Self {
		Self::new()
	}
}
impl<C, M> Debug for Authenticator<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Authenticator").field("refresh_leeway", &self.refresh_leeway).finish()
	}
}

/// Rejects credentials the provider is known to refuse before any token request is made.
pub fn validate_credential(descriptor: &ProviderDescriptor, credential: &Credential) -> Result<()> {
	if !matches!(credential, Credential::ClientPassword { .. }) {
		return Ok(());
	}
	if descriptor.is_microsoft() {
		return Err(Error::AuthenticationFailed {
			reason: "username/password not supported by this provider".into(),
		});
	}
	if !descriptor.supports(GrantType::Password) {
		return Err(Error::AuthenticationFailed {
			reason: "password grant not supported by provider".into(),
		});
	}

	Ok(())
}

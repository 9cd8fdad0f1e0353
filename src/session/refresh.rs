//! Live token sessions that refresh themselves in place.
//!
//! A [`TokenSession`] keeps its [`TokenRecord`] behind one async mutex. Every call to
//! [`TokenSession::access_token`] takes the lock, so when the token falls inside the refresh
//! leeway the first caller performs the refresh and concurrent callers wait and then reuse the
//! refreshed token. Renewal uses the refresh token when one is held, re-runs the
//! client-credentials grant for client-credentials sessions, and otherwise reports
//! [`Error::TokenExpired`].

mod metrics;

pub use metrics::RefreshMetrics;

use metrics::Renewal;

// self
use crate::{
	_prelude::*,
	auth::{ScopeList, Secret, TokenRecord},
	http::IdpHttpClient,
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderDescriptor,
};

/// Grant a session was created from; decides how it renews itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionGrant {
	/// Caller-supplied bearer token.
	BearerToken,
	/// Resource-owner password grant.
	Password,
	/// Client credentials grant, re-run with `scope` when no refresh token is held.
	ClientCredentials {
		/// Scope sent with every client-credentials request.
		scope: ScopeList,
	},
}
impl SessionGrant {
	/// Returns a stable label for logs.
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::BearerToken => "bearer_token",
			Self::Password => "password",
			Self::ClientCredentials { .. } => "client_credentials",
		}
	}
}

/// Authenticated session owned by one connection.
pub struct TokenSession<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: ProviderDescriptor,
	facade: BasicFacade<C, M>,
	grant: SessionGrant,
	state: AsyncMutex<TokenRecord>,
	refresh_leeway: Duration,
	metrics: Arc<RefreshMetrics>,
}
impl<C, M> TokenSession<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Refresh window applied when none is configured.
	pub const DEFAULT_REFRESH_LEEWAY: Duration = Duration::seconds(60);

	pub(crate) fn new(
		descriptor: ProviderDescriptor,
		facade: BasicFacade<C, M>,
		record: TokenRecord,
		grant: SessionGrant,
	) -> Self {
		Self {
			descriptor,
			facade,
			grant,
			state: AsyncMutex::new(record),
			refresh_leeway: Self::DEFAULT_REFRESH_LEEWAY,
			metrics: Default::default(),
		}
	}

	/// Overrides the refresh leeway; negative values clamp to zero.
	pub fn with_refresh_leeway(mut self, leeway: Duration) -> Self {
		self.refresh_leeway = if leeway.is_negative() { Duration::ZERO } else { leeway };

		self
	}

	/// Returns the current access token, refreshing first when it is about to expire.
	pub async fn access_token(&self) -> Result<Secret> {
		let mut state = self.state.lock().await;
		let now = OffsetDateTime::now_utc();

		if state.needs_refresh_at(now, self.refresh_leeway) {
			// Without a renewal path the token stays usable until it actually expires.
			if !self.can_renew(&state) && !state.is_expired_at(now) {
				return Ok(state.access_token.clone());
			}

			self.renew(&mut state).await?;
		}

		Ok(state.access_token.clone())
	}

	/// Returns an `Authorization` header value (`Bearer <token>`).
	pub async fn bearer_header(&self) -> Result<String> {
		Ok(format!("Bearer {}", self.access_token().await?.expose()))
	}

	/// Refreshes regardless of the current expiry and returns the new access token.
	pub async fn force_refresh(&self) -> Result<Secret> {
		let mut state = self.state.lock().await;

		self.renew(&mut state).await?;

		Ok(state.access_token.clone())
	}

	/// Snapshot of the current token record.
	pub async fn record(&self) -> TokenRecord {
		self.state.lock().await.clone()
	}

	/// Provider the session authenticates against.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Grant the session was created from.
	pub fn grant(&self) -> &SessionGrant {
		&self.grant
	}

	/// Refresh counters for this session.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Configured refresh leeway.
	pub fn refresh_leeway(&self) -> Duration {
		self.refresh_leeway
	}

	fn can_renew(&self, state: &TokenRecord) -> bool {
		state.refresh_token.is_some()
			|| matches!(self.grant, SessionGrant::ClientCredentials { .. })
	}

	async fn renew(&self, state: &mut TokenRecord) -> Result<()> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "renew");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.metrics.record_attempt();

		match span.instrument(self.renew_inner(state)).await {
			Ok(renewal) => {
				self.metrics.record_renewal(renewal);
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Ok(())
			},
			Err(err) => {
				self.metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				Err(err)
			},
		}
	}

	async fn renew_inner(&self, state: &mut TokenRecord) -> Result<Renewal> {
		if let Some(refresh_token) = state.refresh_token.clone() {
			let (record, rotated) = self.facade.refresh_token(&refresh_token).await?;

			obs::log_session_refreshed(FlowKind::Refresh, rotated);

			*state = record;

			return Ok(Renewal::Refreshed);
		}
		if let SessionGrant::ClientCredentials { scope } = &self.grant {
			*state = self.facade.exchange_client_credentials(scope).await?;

			obs::log_session_refreshed(FlowKind::ClientCredentials, false);

			return Ok(Renewal::Reacquired);
		}

		Err(Error::TokenExpired)
	}
}
impl<C, M> Debug for TokenSession<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSession")
			.field("token_endpoint", &self.descriptor.token_endpoint.as_str())
			.field("grant", &self.grant.as_str())
			.field("refresh_leeway", &self.refresh_leeway)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::descriptor_fixture, auth::Credential, session::ReqwestAuthenticator};

	fn descriptor() -> ProviderDescriptor {
		descriptor_fixture("http://127.0.0.1:9/token", &[])
	}

	#[tokio::test]
	async fn bearer_without_refresh_serves_until_expiry() {
		let authenticator = ReqwestAuthenticator::new();
		let session = authenticator
			.create_session_with_descriptor(
				descriptor(),
				Credential::BearerToken {
					access_token: "at".into(),
					expires_in: Some(Duration::seconds(30)),
					refresh_token: None,
				},
			)
			.await
			.expect("Bearer session should build.")
			.expect("Bearer credentials should produce a session.");

		// Inside the leeway but not yet expired: the token is served without a renewal attempt.
		for _ in 0..3 {
			assert_eq!(
				session.access_token().await.expect("Token should be served.").expose(),
				"at"
			);
		}

		assert_eq!(session.metrics().attempts(), 0);
		assert!(matches!(session.force_refresh().await, Err(Error::TokenExpired)));
		assert_eq!(session.metrics().attempts(), 1);
		assert_eq!(session.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn expired_bearer_without_refresh_reports_token_expired() {
		let authenticator = ReqwestAuthenticator::new();
		let session = authenticator
			.create_session_with_descriptor(
				descriptor(),
				Credential::BearerToken {
					access_token: "at".into(),
					expires_in: Some(Duration::seconds(-5)),
					refresh_token: None,
				},
			)
			.await
			.expect("Bearer session should build.")
			.expect("Bearer credentials should produce a session.");

		assert!(matches!(session.access_token().await, Err(Error::TokenExpired)));
		assert!(matches!(session.bearer_header().await, Err(Error::TokenExpired)));
	}

	#[tokio::test]
	async fn tokens_without_expiry_never_refresh() {
		let authenticator = ReqwestAuthenticator::new();
		let session = authenticator
			.create_session_with_descriptor(descriptor(), Credential::bearer("static"))
			.await
			.expect("Bearer session should build.")
			.expect("Bearer credentials should produce a session.");

		assert_eq!(
			session.bearer_header().await.expect("Header should render."),
			"Bearer static"
		);
		assert_eq!(session.metrics().attempts(), 0);
		assert!(session.record().await.expires_at.is_none());
	}

	#[test]
	fn grant_labels_are_stable() {
		assert_eq!(SessionGrant::Password.as_str(), "password");
		assert_eq!(
			SessionGrant::ClientCredentials { scope: ScopeList::default() }.as_str(),
			"client_credentials"
		);
	}
}

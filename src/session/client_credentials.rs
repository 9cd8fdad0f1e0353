//! Client credentials grant for service principals.
//!
//! The secret travels in the request body (`client_secret_post`). Sessions created here keep
//! the resolved scope so they can re-run the grant when the provider issues no refresh token.

// self
use crate::{
	_prelude::*,
	auth::{ScopeList, Secret},
	http::IdpHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::ProviderDescriptor,
	session::{Authenticator, SessionGrant, TokenSession, common},
};

impl<C, M> Authenticator<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(super) async fn client_credentials_session(
		&self,
		descriptor: ProviderDescriptor,
		client_secret: Secret,
		credential_scope: Option<&ScopeList>,
	) -> Result<TokenSession<C, M>> {
		const KIND: FlowKind = FlowKind::ClientCredentials;

		let span = FlowSpan::new(KIND, "client_credentials_session");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let scope =
					common::resolve_client_credentials_scope(&descriptor, credential_scope)?;
				let facade = self.facade(&descriptor, Some(&client_secret))?;
				let record = facade.exchange_client_credentials(&scope).await?;

				Ok(TokenSession::new(
					descriptor,
					facade,
					record,
					SessionGrant::ClientCredentials { scope },
				)
				.with_refresh_leeway(self.refresh_leeway))
			})
			.await;

		obs::record_flow_result(KIND, &result);

		result
	}
}

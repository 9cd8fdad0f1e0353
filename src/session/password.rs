//! Resource-owner password grant, performed once while the session is created.

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
	pub(super) async fn password_session(
		&self,
		descriptor: ProviderDescriptor,
		username: &str,
		password: &Secret,
		extra_scopes: &ScopeList,
	) -> Result<TokenSession<C, M>> {
		const KIND: FlowKind = FlowKind::Password;

		let span = FlowSpan::new(KIND, "password_session");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let scope = common::resolve_password_scope(&descriptor, extra_scopes);
				let facade = self.facade(&descriptor, None)?;
				let record = facade.exchange_password(username, password, &scope).await?;

				if record.refresh_token.is_none() {
					obs::warn_missing_refresh_token(record.expires_in_at(record.issued_at));
				}

				Ok(TokenSession::new(descriptor, facade, record, SessionGrant::Password)
					.with_refresh_leeway(self.refresh_leeway))
			})
			.await;

		obs::record_flow_result(KIND, &result);

		result
	}
}

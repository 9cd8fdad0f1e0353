//! Token endpoint facade over the `oauth2` crate plus transport error mapping.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError, RefreshToken,
	RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{ScopeList, Secret, TokenRecord},
	error::{ConfigError, TransientError, TransportError},
	http::{IdpHttpClient, ResponseMetadata, ResponseMetadataSlot},
	obs::FlowKind,
	provider::{
		GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind, ProviderStrategy,
	},
};

type TokenEndpointClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type FacadeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted during `flow` into a crate error.
	fn map_transport_error(
		&self,
		flow: FlowKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		flow: FlowKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(flow, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(flow, meta, message),
			_ => map_generic_transport_error(flow, meta, "unrecognized transport failure"),
		}
	}
}

/// Grant exchanges a session performs against the token endpoint.
pub(crate) trait OAuth2Facade {
	fn exchange_password<'a>(
		&'a self,
		username: &'a str,
		password: &'a Secret,
		scopes: &'a ScopeList,
	) -> FacadeFuture<'a, TokenRecord>;

	fn exchange_client_credentials<'a>(
		&'a self,
		scopes: &'a ScopeList,
	) -> FacadeFuture<'a, TokenRecord>;

	/// Resolves to the new record plus whether the provider rotated the refresh token.
	fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a Secret,
	) -> FacadeFuture<'a, (TokenRecord, bool)>;
}

/// [`OAuth2Facade`] backed by an `oauth2` [`BasicClient`] that only knows the token endpoint.
pub(crate) struct BasicFacade<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	oauth_client: TokenEndpointClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
	strategy: Arc<dyn ProviderStrategy>,
}
impl<C, M> BasicFacade<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a facade for `descriptor`.
	///
	/// When `client_secret` is present it is sent in the request body (`client_secret_post`);
	/// otherwise only `client_id` identifies the client.
	pub(crate) fn from_descriptor(
		descriptor: &ProviderDescriptor,
		client_secret: Option<&Secret>,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
		strategy: Arc<dyn ProviderStrategy>,
	) -> Result<Self> {
		let token_url = TokenUrl::new(descriptor.token_endpoint.to_string())
			.map_err(|source| ConfigError::InvalidUrl { field: "token_endpoint", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(descriptor.client_id.clone()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		if let Some(secret) = client_secret {
			oauth_client =
				oauth_client.set_client_secret(ClientSecret::new(secret.expose().to_owned()));
		}

		Ok(Self { oauth_client, http_client, error_mapper, strategy })
	}

	fn extra_params(&self, grant: GrantType) -> Vec<(String, String)> {
		let mut form = BTreeMap::new();

		self.strategy.augment_token_request(grant, &mut form);

		form.into_iter().filter(|(key, _)| key != "grant_type" && key != "scope").collect()
	}

	fn map_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		map_request_error(self.strategy.as_ref(), grant, meta, err, self.error_mapper.as_ref())
	}
}
impl<C, M> OAuth2Facade for BasicFacade<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn exchange_password<'a>(
		&'a self,
		username: &'a str,
		password: &'a Secret,
		scopes: &'a ScopeList,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let username = ResourceOwnerUsername::new(username.to_owned());
			let password = ResourceOwnerPassword::new(password.expose().to_owned());
			let extra_params = self.extra_params(GrantType::Password);
			let mut request = self.oauth_client.exchange_password(&username, &password);

			for scope in scopes.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}
			for (key, value) in &extra_params {
				request = request.add_extra_param(key, value);
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::Password, meta.take(), err))?;

			map_token_response(&response, None).map(|(record, _)| record)
		})
	}

	fn exchange_client_credentials<'a>(
		&'a self,
		scopes: &'a ScopeList,
	) -> FacadeFuture<'a, TokenRecord> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let extra_params = self.extra_params(GrantType::ClientCredentials);
			let mut request = self.oauth_client.exchange_client_credentials();

			for scope in scopes.iter() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}
			for (key, value) in &extra_params {
				request = request.add_extra_param(key, value);
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::ClientCredentials, meta.take(), err))?;

			map_token_response(&response, None).map(|(record, _)| record)
		})
	}

	fn refresh_token<'a>(
		&'a self,
		refresh_token: &'a Secret,
	) -> FacadeFuture<'a, (TokenRecord, bool)> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let refresh_secret = RefreshToken::new(refresh_token.expose().to_owned());
			let extra_params = self.extra_params(GrantType::RefreshToken);
			let mut request = self.oauth_client.exchange_refresh_token(&refresh_secret);

			for (key, value) in &extra_params {
				request = request.add_extra_param(key, value);
			}

			let response = request
				.request_async(&instrumented)
				.await
				.map_err(|err| self.map_error(GrantType::RefreshToken, meta.take(), err))?;

			map_token_response(&response, Some(refresh_token))
		})
	}
}
#[cfg(all(test, feature = "reqwest"))]
impl BasicFacade<crate::http::ReqwestHttpClient, ReqwestTransportErrorMapper> {
	fn for_tests(descriptor: &ProviderDescriptor, client_secret: Option<&Secret>) -> Result<Self> {
		Self::from_descriptor(
			descriptor,
			client_secret,
			Arc::new(crate::http::ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
			Arc::new(crate::provider::DefaultProviderStrategy),
		)
	}
}

/// Converts a token response into a record, keeping `previous_refresh` when none is rotated in.
fn map_token_response(
	response: &BasicTokenResponse,
	previous_refresh: Option<&Secret>,
) -> Result<(TokenRecord, bool)> {
	let issued_at = OffsetDateTime::now_utc();
	let mut builder = TokenRecord::builder()
		.access_token(response.access_token().secret().as_str())
		.issued_at(issued_at);

	if let Some(lifetime) = response.expires_in() {
		let secs =
			i64::try_from(lifetime.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		if secs <= 0 {
			return Err(ConfigError::NonPositiveExpiresIn.into());
		}

		builder = builder.expires_in(Duration::seconds(secs));
	}

	let rotated = response.refresh_token().map(|token| token.secret().as_str());
	let rotated = rotated.filter(|value| !value.is_empty());

	match (rotated, previous_refresh) {
		(Some(value), _) => builder = builder.refresh_token(value),
		(None, Some(previous)) => builder = builder.refresh_token(previous.clone()),
		(None, None) => {},
	}

	let record = builder.build().map_err(ConfigError::from)?;

	Ok((record, rotated.is_some()))
}

fn map_request_error<E, M>(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<E>>,
	mapper: &M,
) -> Error
where
	E: 'static + Send + Sync + StdError,
	M: ?Sized + TransportErrorMapper<E>,
{
	let meta_ref = meta.as_ref();

	match err {
		RequestTokenError::ServerResponse(response) =>
			map_server_response_error(strategy, grant, response, meta_ref),
		RequestTokenError::Request(error) =>
			mapper.map_transport_error(grant_flow(grant), meta_ref, error),
		RequestTokenError::Parse(error, _body) =>
			TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
				.into(),
		RequestTokenError::Other(message) => TransientError::Upstream {
			message: format!("Token endpoint returned an unexpected response: {message}"),
			status: meta_status(meta_ref),
			retry_after: meta_retry_after(meta_ref),
		}
		.into(),
	}
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	let message = match response.error_description() {
		Some(description) => format!("{}: {description}", response.error().as_ref()),
		None => response.error().as_ref().to_string(),
	};

	match strategy.classify_token_error(&ctx) {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason: message },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason: message },
		ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason: message },
		ProviderErrorKind::Transient => TransientError::Upstream {
			message,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(flow: FlowKind, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::Upstream {
			message: format!("Request timed out while calling the {}", endpoint_label(flow)),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn map_generic_transport_error(
	flow: FlowKind,
	meta: Option<&ResponseMetadata>,
	message: impl Display,
) -> Error {
	TransientError::Upstream {
		message: format!("HTTP client error while calling the {}: {message}", endpoint_label(flow)),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn grant_flow(grant: GrantType) -> FlowKind {
	match grant {
		GrantType::Password => FlowKind::Password,
		GrantType::ClientCredentials => FlowKind::ClientCredentials,
		GrantType::RefreshToken => FlowKind::Refresh,
	}
}

fn endpoint_label(flow: FlowKind) -> &'static str {
	match flow {
		FlowKind::Discovery => "discovery endpoint",
		FlowKind::Provision => "binary download URL",
		_ => "token endpoint",
	}
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::{StandardErrorResponse, basic::BasicErrorResponseType};
	// self
	use super::*;
	use crate::{_preludet::descriptor_fixture, provider::DefaultProviderStrategy};

	fn descriptor(endpoint: &str) -> ProviderDescriptor {
		descriptor_fixture(endpoint, &[])
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn builds_public_and_confidential_facades() {
		let descriptor = descriptor("https://idp.example/oauth2/token");

		assert!(BasicFacade::for_tests(&descriptor, None).is_ok());
		assert!(BasicFacade::for_tests(&descriptor, Some(&Secret::new("s3cret"))).is_ok());
	}

	#[test]
	fn server_errors_follow_strategy_classification() {
		let response = StandardErrorResponse::new(
			BasicErrorResponseType::InvalidGrant,
			Some("Invalid user credentials".into()),
			None,
		);
		let meta = ResponseMetadata { status: Some(400), retry_after: None };
		let err = map_server_response_error(
			&DefaultProviderStrategy,
			GrantType::Password,
			response,
			Some(&meta),
		);

		assert!(
			matches!(err, Error::InvalidGrant { ref reason } if reason.contains("Invalid user credentials"))
		);

		let response =
			StandardErrorResponse::new(BasicErrorResponseType::InvalidClient, None, None);
		let err = map_server_response_error(
			&DefaultProviderStrategy,
			GrantType::ClientCredentials,
			response,
			None,
		);

		assert!(matches!(err, Error::InvalidClient { .. }));
	}

	#[test]
	fn generic_transport_errors_name_the_endpoint() {
		let meta = ResponseMetadata { status: Some(502), retry_after: Some(Duration::seconds(3)) };
		let err = map_generic_transport_error(FlowKind::Discovery, Some(&meta), "connection reset");

		match err {
			Error::Transient(TransientError::Upstream { message, status, retry_after }) => {
				assert!(message.contains("discovery endpoint"));
				assert_eq!(status, Some(502));
				assert_eq!(retry_after, Some(Duration::seconds(3)));
			},
			other => panic!("Unexpected error: {other:?}."),
		}
	}
}

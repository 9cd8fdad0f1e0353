//! OIDC discovery: the database server's client config and the provider document it points at.
//!
//! The database server publishes an [`OidcDiscoveryConfig`] naming the provider's well-known URL,
//! the client identifier, and default scopes. [`DiscoveryClient`] fetches the provider's
//! [`OidcDiscoveryDocument`] from that URL with a single GET, following up to
//! [`MAX_DISCOVERY_REDIRECTS`] redirects whatever the transport's own redirect policy is. A
//! document without a `token_endpoint` is a configuration error and is never retried.

// crates.io
use oauth2::http::header;
// self
use crate::{
	_prelude::*,
	auth::ScopeList,
	error::{ConfigError, TransientError},
	http::{IdpHttpClient, ResponseMetadataSlot},
	oauth::TransportErrorMapper,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Redirect hops the discovery GET follows before giving up.
pub const MAX_DISCOVERY_REDIRECTS: usize = 10;

/// Client-side OIDC settings published by the database server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OidcDiscoveryConfig {
	/// Well-known discovery URL of the identity provider.
	pub href: Url,
	/// OAuth 2.0 client identifier sessions authenticate as.
	pub client_id: String,
	/// Scopes every session requests by default.
	#[serde(default)]
	pub scopes: ScopeList,
	/// Grant types the server says the provider accepts, if it says so.
	#[serde(default, rename = "grant_types_supported", skip_serializing_if = "Option::is_none")]
	pub grant_types_supported: Option<Vec<String>>,
}
impl OidcDiscoveryConfig {
	/// Creates a config without declared grant types.
	pub fn new(href: Url, client_id: impl Into<String>, scopes: ScopeList) -> Self {
		Self { href, client_id: client_id.into(), scopes, grant_types_supported: None }
	}

	/// Declares the grant types the provider accepts.
	pub fn with_grant_types_supported<I, S>(mut self, grants: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.grant_types_supported = Some(grants.into_iter().map(Into::into).collect());

		self
	}
}

/// Subset of the provider's discovery document used by sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcDiscoveryDocument {
	/// Token endpoint used for every grant and refresh.
	pub token_endpoint: Url,
	/// Issuer identifier, when published.
	pub issuer: Option<String>,
	/// Optional list of grant types the provider supports.
	pub grant_types_supported: Option<Vec<String>>,
}
impl OidcDiscoveryDocument {
	/// Parses a discovery document, reporting a missing `token_endpoint` distinctly from
	/// malformed JSON.
	pub fn from_json(url: &Url, body: &[u8]) -> Result<Self, ConfigError> {
		#[derive(Deserialize)]
		struct RawDocument {
			token_endpoint: Option<String>,
			#[serde(default)]
			issuer: Option<String>,
			#[serde(default)]
			grant_types_supported: Option<Vec<String>>,
		}

		let mut de = serde_json::Deserializer::from_slice(body);
		let raw: RawDocument = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::MalformedDiscovery { url: url.to_string(), source })?;
		let token_endpoint = raw
			.token_endpoint
			.filter(|value| !value.trim().is_empty())
			.ok_or_else(|| ConfigError::MissingTokenEndpoint { url: url.to_string() })?;
		let token_endpoint = Url::parse(&token_endpoint)
			.map_err(|source| ConfigError::InvalidUrl { field: "token_endpoint", source })?;

		Ok(Self {
			token_endpoint,
			issuer: raw.issuer,
			grant_types_supported: raw.grant_types_supported,
		})
	}
}

/// Fetches provider discovery documents through an [`IdpHttpClient`].
pub struct DiscoveryClient<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> DiscoveryClient<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a discovery client sharing the caller's transport + mapper pair.
	pub fn new(http_client: impl Into<Arc<C>>, transport_mapper: impl Into<Arc<M>>) -> Self {
		Self { http_client: http_client.into(), transport_mapper: transport_mapper.into() }
	}

	/// Fetches and parses the discovery document at `url`.
	pub async fn fetch_document(&self, url: &Url) -> Result<OidcDiscoveryDocument> {
		const KIND: FlowKind = FlowKind::Discovery;

		let span = FlowSpan::new(KIND, "fetch_document");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.fetch_document_inner(url)).await;

		obs::record_flow_result(KIND, &result);

		result
	}

	/// Resolves only the token endpoint advertised at `url`.
	pub async fn resolve_token_endpoint(&self, url: &Url) -> Result<Url> {
		Ok(self.fetch_document(url).await?.token_endpoint)
	}

	async fn fetch_document_inner(&self, url: &Url) -> Result<OidcDiscoveryDocument> {
		let mut current = url.clone();

		for _ in 0..=MAX_DISCOVERY_REDIRECTS {
			let slot = ResponseMetadataSlot::default();
			let response = self.get(&current, &slot).await?;
			let status = response.status();

			if status.is_redirection()
				&& let Some(next) = redirect_target(&current, response.headers())
			{
				current = next;

				continue;
			}
			if status.is_server_error() || status.as_u16() == 429 {
				return Err(TransientError::Upstream {
					message: format!("Discovery endpoint answered with HTTP {}", status.as_u16()),
					status: Some(status.as_u16()),
					retry_after: slot.take().and_then(|meta| meta.retry_after),
				}
				.into());
			}
			if !status.is_success() {
				return Err(ConfigError::DiscoveryRejected {
					url: current.to_string(),
					status: status.as_u16(),
				}
				.into());
			}

			let document = OidcDiscoveryDocument::from_json(&current, response.body())?;

			obs::log_token_endpoint_resolved(&document.token_endpoint);

			return Ok(document);
		}

		Err(ConfigError::TooManyRedirects {
			url: url.to_string(),
			limit: MAX_DISCOVERY_REDIRECTS,
		}
		.into())
	}

	async fn get(
		&self,
		url: &Url,
		slot: &ResponseMetadataSlot,
	) -> Result<oauth2::HttpResponse> {
		let handle = self.http_client.with_metadata(slot.clone());
		let request = oauth2::http::Request::builder()
			.method(oauth2::http::Method::GET)
			.uri(url.as_str())
			.header(header::ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(ConfigError::from)?;

		oauth2::AsyncHttpClient::call(&handle, request).await.map_err(|err| {
			self.transport_mapper.map_transport_error(
				FlowKind::Discovery,
				slot.take().as_ref(),
				err,
			)
		})
	}
}
impl<C, M> Debug for DiscoveryClient<C, M>
where
	C: ?Sized + IdpHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("DiscoveryClient(..)")
	}
}

fn redirect_target(current: &Url, headers: &header::HeaderMap) -> Option<Url> {
	let location = headers.get(header::LOCATION)?.to_str().ok()?;

	current.join(location).ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url() -> Url {
		Url::parse("https://idp.example/.well-known/openid-configuration")
			.expect("Discovery URL fixture should parse.")
	}

	#[test]
	fn parses_token_endpoint_and_optional_fields() {
		let document = OidcDiscoveryDocument::from_json(
			&url(),
			br#"{"issuer":"https://idp.example","token_endpoint":"https://idp.example/token","grant_types_supported":["password"]}"#,
		)
		.expect("Discovery document should parse.");

		assert_eq!(document.token_endpoint.as_str(), "https://idp.example/token");
		assert_eq!(document.grant_types_supported, Some(vec!["password".to_string()]));

		let minimal = OidcDiscoveryDocument::from_json(
			&url(),
			br#"{"token_endpoint":"https://idp.example/token"}"#,
		)
		.expect("Optional fields may be absent.");

		assert!(minimal.grant_types_supported.is_none());
	}

	#[test]
	fn missing_token_endpoint_is_a_config_error() {
		let err = OidcDiscoveryDocument::from_json(&url(), br#"{"issuer":"https://idp.example"}"#)
			.expect_err("Documents without token_endpoint must be rejected.");

		assert!(matches!(err, ConfigError::MissingTokenEndpoint { .. }));

		let err = OidcDiscoveryDocument::from_json(&url(), b"<html>")
			.expect_err("Non-JSON bodies must be rejected.");

		assert!(matches!(err, ConfigError::MalformedDiscovery { .. }));
	}

	#[test]
	fn redirect_targets_resolve_against_the_current_url() {
		let mut headers = header::HeaderMap::new();

		headers.insert(
			header::LOCATION,
			header::HeaderValue::from_static("/realms/db/.well-known"),
		);

		assert_eq!(
			redirect_target(&url(), &headers).map(String::from),
			Some("https://idp.example/realms/db/.well-known".into())
		);
		assert!(redirect_target(&url(), &header::HeaderMap::new()).is_none());
	}

	#[test]
	fn server_config_uses_camel_case() {
		let config: OidcDiscoveryConfig = serde_json::from_str(
			r#"{"href":"https://idp.example/.well-known","clientId":"cid","scopes":["openid","email","offline_access"]}"#,
		)
		.expect("Server discovery config should deserialize.");

		assert_eq!(config.client_id, "cid");
		assert_eq!(config.scopes.len(), 3);
		assert!(config.grant_types_supported.is_none());
	}
}

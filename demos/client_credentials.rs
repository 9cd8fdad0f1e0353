//! Demonstrates a client-credentials session against a mock identity provider: discovery
//! resolves the token endpoint, the first token is fetched eagerly, and the session hands out
//! `Authorization` header values afterwards.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use weaviate_connect::{
	auth::{Credential, ScopeList},
	discovery::OidcDiscoveryConfig,
	session::ReqwestAuthenticator,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let discovery_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/.well-known/openid-configuration");
			then.status(200)
				.header("content-type", "application/json")
				.body(format!("{{\"token_endpoint\":\"{}\"}}", server.url("/token")));
		})
		.await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("grant_type=client_credentials");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let config = OidcDiscoveryConfig::new(
		Url::parse(&server.url("/.well-known/openid-configuration"))?,
		"demo-client",
		ScopeList::new(["openid", "email", "offline_access"])?,
	);
	let credential = Credential::ClientCredentials {
		client_secret: "super-secret".into(),
		scope: Some(ScopeList::new(["weaviate.read"])?),
	};
	let Some(session) = ReqwestAuthenticator::new().create_session(&config, credential).await?
	else {
		return Ok(());
	};

	println!("Grant: {}.", session.grant().as_str());
	println!("Authorization: {}.", session.bearer_header().await?);

	discovery_mock.assert_async().await;
	token_mock.assert_async().await;

	Ok(())
}

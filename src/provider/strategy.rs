//! Provider strategy hooks that customize token requests and classify their failures.

// std
use std::collections::BTreeMap;
// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Hooks use crate-owned data types only, so strategies never depend on the HTTP client in use.
pub trait ProviderStrategy: Send + Sync {
	/// Maps an OAuth error response into the crate taxonomy.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Adds custom form parameters (audience, resource, ...) before a token request is sent.
	fn augment_token_request(&self, _grant: GrantType, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the grant (bad password, stale refresh token).
	InvalidGrant,
	/// Client authentication failed.
	InvalidClient,
	/// Requested scopes exceed what the client may obtain.
	InsufficientScope,
	/// Failure is temporary and may succeed later.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
}
impl ProviderErrorContext {
	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self { grant_type, http_status: None, oauth_error: None, error_description: None }
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}
}

/// Default strategy: structured OAuth fields first, then description hints, then status.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(classify_code)
			.or_else(|| ctx.error_description.as_deref().and_then(classify_text))
			.unwrap_or_else(|| classify_status(ctx.http_status))
	}
}

fn classify_code(code: &str) -> Option<ProviderErrorKind> {
	match code.to_ascii_lowercase().as_str() {
		"invalid_grant" | "access_denied" => Some(ProviderErrorKind::InvalidGrant),
		"invalid_client" | "unauthorized_client" => Some(ProviderErrorKind::InvalidClient),
		"invalid_scope" | "insufficient_scope" => Some(ProviderErrorKind::InsufficientScope),
		"temporarily_unavailable" | "server_error" => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	[
		("invalid_grant", ProviderErrorKind::InvalidGrant),
		("invalid_client", ProviderErrorKind::InvalidClient),
		("scope", ProviderErrorKind::InsufficientScope),
		("temporarily_unavailable", ProviderErrorKind::Transient),
	]
	.into_iter()
	.find_map(|(needle, kind)| lowered.contains(needle).then_some(kind))
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 404 | 410) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn oauth_error_codes_take_precedence() {
		let strategy = DefaultProviderStrategy;
		let ctx = ProviderErrorContext::new(GrantType::Password)
			.with_http_status(401)
			.with_oauth_error("invalid_grant");

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);

		let ctx = ProviderErrorContext::new(GrantType::ClientCredentials)
			.with_http_status(400)
			.with_oauth_error("unauthorized_client");

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidClient);
	}

	#[test]
	fn falls_back_to_description_then_status() {
		let strategy = DefaultProviderStrategy;
		let ctx = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_oauth_error("custom_error")
			.with_error_description("invalid_grant: refresh token reused");

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InvalidGrant);

		let ctx = ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(503);

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::Transient);

		let ctx = ProviderErrorContext::new(GrantType::Password).with_http_status(403);

		assert_eq!(strategy.classify_token_error(&ctx), ProviderErrorKind::InsufficientScope);
	}

	#[test]
	fn custom_strategy_can_augment_token_requests() {
		struct AudienceStrategy;
		impl ProviderStrategy for AudienceStrategy {
			fn classify_token_error(&self, _ctx: &ProviderErrorContext) -> ProviderErrorKind {
				ProviderErrorKind::Transient
			}

			fn augment_token_request(&self, grant: GrantType, form: &mut BTreeMap<String, String>) {
				form.insert("audience".into(), format!("weaviate:{grant}"));
			}
		}

		let mut form = BTreeMap::new();

		AudienceStrategy.augment_token_request(GrantType::ClientCredentials, &mut form);

		assert_eq!(form.get("audience").map(String::as_str), Some("weaviate:client_credentials"));
	}
}

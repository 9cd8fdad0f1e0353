//! Crate-level error types shared by discovery, sessions, and embedded supervision.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local or discovery configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Embedded server could not be provisioned, started, or probed.
	#[cfg(feature = "embedded")]
	#[error(transparent)]
	Embedded(#[from] EmbeddedError),

	/// Provider policy rejects the chosen grant before any token request is made.
	#[error("Authentication failed: {reason}.")]
	AuthenticationFailed {
		/// Human-readable rejection reason.
		reason: String,
	},
	/// Client credentials resolved to an empty scope the provider cannot default.
	#[error(
		"No scope available for the client credentials grant; supply one with the credential."
	)]
	MissingScope,
	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Provider rejected the grant (e.g., bad password or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider-supplied reason string.
		reason: String,
	},
	/// Session token expired and the session holds nothing to refresh it with.
	#[error("Access token expired and the session cannot refresh it.")]
	TokenExpired,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// Discovery document or endpoint URL is not a valid URL.
	#[error("The {field} value is not a valid URL.")]
	InvalidUrl {
		/// Field that carried the URL.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Discovery document does not declare `token_endpoint`.
	#[error("Discovery document at {url} does not declare a token_endpoint.")]
	MissingTokenEndpoint {
		/// Discovery URL that was fetched.
		url: String,
	},
	/// Discovery URL answered with a non-success, non-retryable status.
	#[error("Discovery endpoint {url} answered with HTTP {status}.")]
	DiscoveryRejected {
		/// Discovery URL that was fetched.
		url: String,
		/// HTTP status code.
		status: u16,
	},
	/// Discovery URL kept redirecting past the hop limit.
	#[error("Discovery endpoint {url} redirected more than {limit} times.")]
	TooManyRedirects {
		/// Discovery URL the chain started from.
		url: String,
		/// Hops that were followed.
		limit: usize,
	},
	/// Discovery document is not valid JSON or has the wrong shape.
	#[error("Discovery document at {url} is malformed.")]
	MalformedDiscovery {
		/// Discovery URL that was fetched.
		url: String,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Scope strings cannot be validated.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Identity provider returned an unexpected response: {message}.")]
	Upstream {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Startup and supervision failures for the embedded server.
///
/// Launch failures ([`EmbeddedError::Launch`]) mean the OS refused to start the binary, while
/// [`EmbeddedError::ExitedDuringStartup`] and [`EmbeddedError::NotListening`] mean the process
/// started but never accepted connections.
#[cfg(feature = "embedded")]
#[derive(Debug, ThisError)]
pub enum EmbeddedError {
	/// Local process supervision is not available on this operating system.
	#[error("Embedded mode is not supported on {os}; only Linux hosts can run the server.")]
	UnsupportedPlatform {
		/// Value of `std::env::consts::OS`.
		os: &'static str,
	},
	/// Options failed validation.
	#[error("Embedded options are invalid: {reason}.")]
	InvalidOptions {
		/// Validation failure summary.
		reason: String,
	},
	/// Server binary could not be downloaded.
	#[error("Failed to download the server binary from {url}.")]
	Download {
		/// Download URL.
		url: String,
		/// HTTP status when the server answered with a non-success code.
		status: Option<u16>,
		/// Underlying transport failure, if any.
		#[source]
		source: Option<BoxError>,
	},
	/// Downloaded binary does not hash to the configured digest.
	#[error("Server binary digest mismatch: expected {expected}, got {actual}.")]
	IntegrityMismatch {
		/// Configured SHA-256 digest (lowercase hex).
		expected: String,
		/// Digest of the downloaded bytes (lowercase hex).
		actual: String,
	},
	/// No free local port could be obtained.
	#[error("Unable to allocate a local port.")]
	PortAllocation(#[source] std::io::Error),
	/// OS refused to spawn the server binary.
	#[error("Failed to launch {binary}.")]
	Launch {
		/// Binary path that was executed.
		binary: String,
		/// Spawn failure.
		#[source]
		source: std::io::Error,
	},
	/// Server process exited before it started listening.
	#[error("Server process exited during startup ({status}).")]
	ExitedDuringStartup {
		/// Exit status description.
		status: String,
	},
	/// Server process did not accept connections within the startup bound.
	#[error("Server did not start listening on port {port} within {waited_ms} ms.")]
	NotListening {
		/// Port that was probed.
		port: u16,
		/// Total time spent waiting.
		waited_ms: u128,
	},
	/// Filesystem or process-control failure.
	#[error("I/O error during embedded server supervision.")]
	Io(#[from] std::io::Error),
}

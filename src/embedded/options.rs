//! Embedded server options: where the binary and data live, which port to serve on, and the
//! bounds applied while provisioning and starting the process.

// std
use std::{env, path::PathBuf, time::Duration as StdDuration};
// self
use crate::{_prelude::*, error::EmbeddedError};

/// Release the binary is downloaded from when none is configured.
pub const DEFAULT_BINARY_URL: &str =
	"https://github.com/samos123/weaviate/releases/download/v1.17.3/weaviate-server";
/// Port the embedded server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 6666;

/// Immutable configuration of one embedded server.
///
/// Missing fields fall back to [`EmbeddedOptions::default`] when deserialized. Use
/// [`EmbeddedOptions::builder`] to construct validated options in code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddedOptions {
	/// Directory the server persists its data in; created when absent.
	pub persistence_data_path: PathBuf,
	/// Location of the server executable; downloaded when absent.
	pub binary_path: PathBuf,
	/// URL the executable is downloaded from.
	pub binary_download_url: String,
	/// Expected SHA-256 of the download (lowercase hex). `None` skips verification.
	pub binary_sha256: Option<String>,
	/// Port the server listens on.
	pub port: u16,
	/// Value for `CLUSTER_HOSTNAME`.
	pub cluster_hostname: String,
	/// Modules joined into `ENABLE_MODULES`; empty leaves the variable unset.
	pub modules: Vec<String>,
	/// Value for `QUERY_DEFAULTS_LIMIT`.
	pub query_default_limit: u32,
	/// Extra variables for the server process; they override every computed default.
	pub additional_env: BTreeMap<String, String>,
	/// Upper bound for the binary download.
	pub download_timeout: StdDuration,
	/// Upper bound for the server to start accepting connections.
	pub startup_timeout: StdDuration,
	/// Delay between readiness probes.
	pub probe_interval: StdDuration,
}
impl EmbeddedOptions {
	/// Returns a builder seeded with the defaults.
	pub fn builder() -> EmbeddedOptionsBuilder {
		EmbeddedOptionsBuilder::default()
	}

	/// Parses [`EmbeddedOptions::binary_download_url`].
	pub fn download_url(&self) -> Result<Url, EmbeddedError> {
		Url::parse(&self.binary_download_url).map_err(|err| EmbeddedError::InvalidOptions {
			reason: format!("binary_download_url is not a valid URL ({err})"),
		})
	}

	/// Checks the invariants the supervisor relies on.
	pub fn validate(&self) -> Result<(), EmbeddedError> {
		let invalid = |reason: &str| EmbeddedError::InvalidOptions { reason: reason.into() };

		if self.port == 0 {
			return Err(invalid("port must be non-zero"));
		}
		if self.cluster_hostname.trim().is_empty() {
			return Err(invalid("cluster_hostname cannot be empty"));
		}
		if self.binary_path.as_os_str().is_empty() {
			return Err(invalid("binary_path cannot be empty"));
		}
		if self.persistence_data_path.as_os_str().is_empty() {
			return Err(invalid("persistence_data_path cannot be empty"));
		}
		if !matches!(self.download_url()?.scheme(), "http" | "https") {
			return Err(invalid("binary_download_url must use http or https"));
		}
		if let Some(digest) = &self.binary_sha256
			&& (digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()))
		{
			return Err(invalid("binary_sha256 must be 64 hexadecimal characters"));
		}
		if self.download_timeout.is_zero()
			|| self.startup_timeout.is_zero()
			|| self.probe_interval.is_zero()
		{
			return Err(invalid("timeouts and the probe interval must be non-zero"));
		}

		Ok(())
	}
}
impl Default for EmbeddedOptions {
	fn default() -> Self {
		Self {
			persistence_data_path: xdg_dir("XDG_DATA_HOME", ".local/share").join("weaviate"),
			binary_path: xdg_dir("XDG_CACHE_HOME", ".cache")
				.join("weaviate-embedded")
				.join("weaviate-server"),
			binary_download_url: DEFAULT_BINARY_URL.into(),
			binary_sha256: None,
			port: DEFAULT_PORT,
			cluster_hostname: "embedded".into(),
			modules: Vec::new(),
			query_default_limit: 20,
			additional_env: BTreeMap::new(),
			download_timeout: StdDuration::from_secs(120),
			startup_timeout: StdDuration::from_secs(30),
			probe_interval: StdDuration::from_millis(100),
		}
	}
}

/// Builder for [`EmbeddedOptions`].
#[derive(Clone, Debug, Default)]
pub struct EmbeddedOptionsBuilder {
	options: EmbeddedOptions,
}
impl EmbeddedOptionsBuilder {
	/// Sets the data directory.
	pub fn persistence_data_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.options.persistence_data_path = path.into();

		self
	}

	/// Sets the binary location.
	pub fn binary_path(mut self, path: impl Into<PathBuf>) -> Self {
		self.options.binary_path = path.into();

		self
	}

	/// Sets the download URL.
	pub fn binary_download_url(mut self, url: impl Into<String>) -> Self {
		self.options.binary_download_url = url.into();

		self
	}

	/// Requires downloads to hash to `digest` (hex, any case).
	pub fn binary_sha256(mut self, digest: impl Into<String>) -> Self {
		self.options.binary_sha256 = Some(digest.into().to_ascii_lowercase());

		self
	}

	/// Sets the listening port.
	pub fn port(mut self, port: u16) -> Self {
		self.options.port = port;

		self
	}

	/// Sets `CLUSTER_HOSTNAME`.
	pub fn cluster_hostname(mut self, hostname: impl Into<String>) -> Self {
		self.options.cluster_hostname = hostname.into();

		self
	}

	/// Replaces the module list.
	pub fn modules<I, S>(mut self, modules: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.options.modules = modules.into_iter().map(Into::into).collect();

		self
	}

	/// Sets `QUERY_DEFAULTS_LIMIT`.
	pub fn query_default_limit(mut self, limit: u32) -> Self {
		self.options.query_default_limit = limit;

		self
	}

	/// Adds one variable to the server environment.
	pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.options.additional_env.insert(key.into(), value.into());

		self
	}

	/// Bounds the binary download.
	pub fn download_timeout(mut self, timeout: StdDuration) -> Self {
		self.options.download_timeout = timeout;

		self
	}

	/// Bounds the wait for the server to listen.
	pub fn startup_timeout(mut self, timeout: StdDuration) -> Self {
		self.options.startup_timeout = timeout;

		self
	}

	/// Sets the delay between readiness probes.
	pub fn probe_interval(mut self, interval: StdDuration) -> Self {
		self.options.probe_interval = interval;

		self
	}

	/// Validates and returns the options.
	pub fn build(self) -> Result<EmbeddedOptions, EmbeddedError> {
		self.options.validate()?;

		Ok(self.options)
	}
}

fn xdg_dir(var: &str, home_fallback: &str) -> PathBuf {
	if let Some(dir) = env::var_os(var).map(PathBuf::from).filter(|dir| dir.is_absolute()) {
		return dir;
	}

	match env::var_os("HOME").filter(|home| !home.is_empty()) {
		Some(home) => PathBuf::from(home).join(home_fallback),
		None => env::temp_dir(),
	}
}

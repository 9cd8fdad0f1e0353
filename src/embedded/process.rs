//! Supervision of the local server process.
//!
//! [`ProcessSupervisor`] owns at most one child process. It starts the server only when nothing
//! answers on the configured port, confirms readiness with TCP connects, and terminates the
//! child on [`ProcessSupervisor::stop`] or when it is dropped.
//!
//! Drop cannot await, so it sends SIGTERM, polls the child for [`DROP_GRACE_PERIOD`], and then
//! kills it. Prefer [`ProcessSupervisor::stop`] when the full grace period matters.

// std
use std::{
	net::{Ipv4Addr, SocketAddr},
	process::Stdio,
	time::{Duration as StdDuration, Instant},
};
// crates.io
use tokio::{
	net::TcpStream,
	process::{Child, Command},
};
// self
use crate::{
	_prelude::*,
	embedded::{
		options::EmbeddedOptions,
		port,
		provision::{BinaryProvisioner, ProvisionOutcome},
	},
	error::EmbeddedError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

const PROBE_CONNECT_TIMEOUT: StdDuration = StdDuration::from_millis(500);
const STOP_GRACE_PERIOD: StdDuration = StdDuration::from_secs(5);
const DROP_POLL_INTERVAL: StdDuration = StdDuration::from_millis(25);

/// How long a dropped supervisor waits for SIGTERM to take effect before killing the child.
pub const DROP_GRACE_PERIOD: StdDuration = StdDuration::from_secs(1);

/// Identity of a process started by a supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedProcessHandle {
	/// OS process id.
	pub pid: u32,
	/// Port the server listens on.
	pub bound_port: u16,
	/// Port passed as `CLUSTER_GOSSIP_BIND_PORT`.
	pub gossip_port: u16,
	/// Port passed as `CLUSTER_DATA_BIND_PORT`.
	pub data_bind_port: u16,
}

/// Result of [`ProcessSupervisor::start`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
	/// Something already answers on the port; nothing was provisioned or launched.
	AlreadyListening,
	/// A new process was launched and is listening.
	Started(EmbeddedProcessHandle),
}

/// Result of [`ProcessSupervisor::stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
	/// This supervisor holds no process.
	NotStarted,
	/// The process was signalled and has exited.
	Terminated,
	/// The process had already exited before it was signalled.
	AlreadyExited,
}

struct RunningProcess {
	child: Child,
	handle: EmbeddedProcessHandle,
}

/// Starts, probes, and stops one embedded server process.
pub struct ProcessSupervisor {
	options: EmbeddedOptions,
	provisioner: BinaryProvisioner,
	running: Option<RunningProcess>,
}
impl ProcessSupervisor {
	/// Creates a supervisor after checking the host platform and the options.
	pub fn new(options: EmbeddedOptions) -> Result<Self, EmbeddedError> {
		ensure_supported_platform()?;
		options.validate()?;

		let provisioner = BinaryProvisioner::new(options.download_timeout)?;

		Ok(Self { options, provisioner, running: None })
	}

	/// Replaces the provisioner, e.g. to route downloads through a proxy.
	pub fn with_provisioner(mut self, provisioner: BinaryProvisioner) -> Self {
		self.provisioner = provisioner;

		self
	}

	/// Options the supervisor was created with.
	pub fn options(&self) -> &EmbeddedOptions {
		&self.options
	}

	/// Handle of the process this supervisor started, if it holds one.
	pub fn handle(&self) -> Option<EmbeddedProcessHandle> {
		self.running.as_ref().map(|running| running.handle)
	}

	/// Returns true when a TCP connect to `127.0.0.1:<port>` succeeds.
	pub async fn is_listening(&self) -> bool {
		is_port_listening(self.options.port).await
	}

	/// Returns true while the owned child process has not exited.
	pub fn is_running(&mut self) -> bool {
		match self.running.as_mut() {
			Some(running) => matches!(running.child.try_wait(), Ok(None)),
			None => false,
		}
	}

	/// Starts the server unless something already listens on the configured port.
	pub async fn start(&mut self) -> Result<StartOutcome, EmbeddedError> {
		const KIND: FlowKind = FlowKind::EmbeddedStart;

		if self.is_listening().await {
			obs::log_embedded_event(
				"Embedded server already listening.",
				self.handle().map(|handle| handle.pid),
				self.options.port,
			);

			return Ok(StartOutcome::AlreadyListening);
		}

		let span = FlowSpan::new(KIND, "start");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.launch()).await;

		obs::record_flow_result(KIND, &result);

		result.map(StartOutcome::Started)
	}

	/// Terminates the owned process and clears the handle.
	///
	/// A process that already exited is not an error.
	pub async fn stop(&mut self) -> Result<StopOutcome, EmbeddedError> {
		const KIND: FlowKind = FlowKind::EmbeddedStop;

		let Some(mut running) = self.running.take() else {
			return Ok(StopOutcome::NotStarted);
		};
		let span = FlowSpan::new(KIND, "stop");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(terminate(&mut running)).await;

		obs::record_flow_result(KIND, &result);

		result
	}

	async fn launch(&mut self) -> Result<EmbeddedProcessHandle, EmbeddedError> {
		if let Some(mut stale) = self.running.take() {
			// The previous child no longer listens; reap it before starting over.
			terminate(&mut stale).await?;
		}

		let url = self.options.download_url()?;
		let outcome = self
			.provisioner
			.ensure_binary_exists(
				&self.options.binary_path,
				&url,
				self.options.binary_sha256.as_deref(),
			)
			.await?;

		if matches!(outcome, ProvisionOutcome::Downloaded { .. }) {
			obs::log_embedded_event("Server binary installed.", None, self.options.port);
		}

		tokio::fs::create_dir_all(&self.options.persistence_data_path).await?;

		let ports = port::allocate_ports_excluding(2, &[self.options.port])?;
		let (gossip_port, data_bind_port) = (ports[0], ports[1]);
		let env = compose_environment(&self.options, gossip_port, data_bind_port, |key| {
			std::env::var_os(key).is_some()
		});
		let port = self.options.port.to_string();
		let mut child = Command::new(&self.options.binary_path)
			.args(["--host", "127.0.0.1", "--port", port.as_str(), "--scheme", "http"])
			.envs(&env)
			.stdin(Stdio::null())
			.kill_on_drop(true)
			.spawn()
			.map_err(|source| EmbeddedError::Launch {
				binary: self.options.binary_path.display().to_string(),
				source,
			})?;
		let pid = child.id().unwrap_or_default();

		obs::log_embedded_event("Embedded server launched.", Some(pid), self.options.port);

		if let Err(err) = self.wait_until_listening(&mut child).await {
			let _ = child.start_kill();
			let _ = child.wait().await;

			return Err(err);
		}

		let handle = EmbeddedProcessHandle {
			pid,
			bound_port: self.options.port,
			gossip_port,
			data_bind_port,
		};

		self.running = Some(RunningProcess { child, handle });

		Ok(handle)
	}

	async fn wait_until_listening(&self, child: &mut Child) -> Result<(), EmbeddedError> {
		let started = Instant::now();

		loop {
			if self.is_listening().await {
				return Ok(());
			}
			if let Some(status) = child.try_wait()? {
				return Err(EmbeddedError::ExitedDuringStartup { status: status.to_string() });
			}
			if started.elapsed() >= self.options.startup_timeout {
				return Err(EmbeddedError::NotListening {
					port: self.options.port,
					waited_ms: started.elapsed().as_millis(),
				});
			}

			tokio::time::sleep(self.options.probe_interval).await;
		}
	}
}
impl Debug for ProcessSupervisor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ProcessSupervisor")
			.field("port", &self.options.port)
			.field("binary_path", &self.options.binary_path)
			.field("handle", &self.handle())
			.finish()
	}
}
impl Drop for ProcessSupervisor {
	fn drop(&mut self) {
		if let Some(mut running) = self.running.take() {
			obs::log_embedded_event(
				"Stopping embedded server on drop.",
				Some(running.handle.pid),
				running.handle.bound_port,
			);

			terminate_blocking(&mut running.child, DROP_GRACE_PERIOD);
		}
	}
}

/// Environment variables to set on the server process.
///
/// Defaults are only included when `is_set` reports the variable absent from the parent
/// environment and `additional_env` does not name it; every `additional_env` entry is included.
pub fn compose_environment<F>(
	options: &EmbeddedOptions,
	gossip_port: u16,
	data_bind_port: u16,
	is_set: F,
) -> BTreeMap<String, String>
where
	F: Fn(&str) -> bool,
{
	let mut defaults = vec![
		("AUTHENTICATION_ANONYMOUS_ACCESS_ENABLED", "true".to_string()),
		("QUERY_DEFAULTS_LIMIT", options.query_default_limit.to_string()),
		("PERSISTENCE_DATA_PATH", options.persistence_data_path.display().to_string()),
		("CLUSTER_HOSTNAME", options.cluster_hostname.clone()),
		("CLUSTER_GOSSIP_BIND_PORT", gossip_port.to_string()),
		("CLUSTER_DATA_BIND_PORT", data_bind_port.to_string()),
	];

	if !options.modules.is_empty() {
		defaults.push(("ENABLE_MODULES", options.modules.join(",")));
	}

	let mut env = defaults
		.into_iter()
		.filter(|(key, _)| !is_set(key) && !options.additional_env.contains_key(*key))
		.map(|(key, value)| (key.to_string(), value))
		.collect::<BTreeMap<_, _>>();

	env.extend(options.additional_env.iter().map(|(key, value)| (key.clone(), value.clone())));

	env
}

fn ensure_supported_platform() -> Result<(), EmbeddedError> {
	match std::env::consts::OS {
		"linux" => Ok(()),
		os => Err(EmbeddedError::UnsupportedPlatform { os }),
	}
}

/// Returns true when a TCP connect to `127.0.0.1:<port>` succeeds within a short timeout.
pub async fn is_port_listening(port: u16) -> bool {
	let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
	let attempt = tokio::time::timeout(PROBE_CONNECT_TIMEOUT, TcpStream::connect(addr)).await;

	matches!(attempt, Ok(Ok(_)))
}

async fn terminate(running: &mut RunningProcess) -> Result<StopOutcome, EmbeddedError> {
	let RunningProcess { child, handle } = running;

	if !signal_terminate(child)? {
		obs::log_embedded_event(
			"Embedded server had already exited.",
			Some(handle.pid),
			handle.bound_port,
		);

		return Ok(StopOutcome::AlreadyExited);
	}
	if tokio::time::timeout(STOP_GRACE_PERIOD, child.wait()).await.is_err() {
		child.start_kill()?;
		child.wait().await?;
	}

	obs::log_embedded_event("Embedded server stopped.", Some(handle.pid), handle.bound_port);

	Ok(StopOutcome::Terminated)
}

// Synchronous variant of `terminate` for `Drop`.
fn terminate_blocking(child: &mut Child, grace: StdDuration) {
	if !matches!(signal_terminate(child), Ok(true)) {
		return;
	}

	let deadline = Instant::now() + grace;

	while Instant::now() < deadline {
		if !matches!(child.try_wait(), Ok(None)) {
			return;
		}

		std::thread::sleep(DROP_POLL_INTERVAL);
	}

	let _ = child.start_kill();
}

/// Sends SIGTERM (Unix) or a kill request (elsewhere). Returns false when the process is gone.
fn signal_terminate(child: &mut Child) -> std::io::Result<bool> {
	if child.try_wait()?.is_some() {
		return Ok(false);
	}

	#[cfg(unix)]
	{
		let Some(pid) = child.id() else {
			return Ok(false);
		};
		// SAFETY: `pid` belongs to a child this process spawned and has not reaped yet.
		let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };

		if rc == 0 {
			return Ok(true);
		}

		let err = std::io::Error::last_os_error();

		if err.raw_os_error() == Some(libc::ESRCH) { Ok(false) } else { Err(err) }
	}
	#[cfg(not(unix))]
	{
		match child.start_kill() {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(false),
			Err(err) => Err(err),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn options() -> EmbeddedOptions {
		EmbeddedOptions::builder()
			.persistence_data_path("/var/lib/weaviate")
			.cluster_hostname("node-a")
			.modules(["text2vec-openai", "generative-openai"])
			.env("QUERY_DEFAULTS_LIMIT", "50")
			.build()
			.expect("Options fixture should be valid.")
	}

	#[test]
	fn environment_defaults_fill_only_unset_variables() {
		let env = compose_environment(&options(), 7101, 7102, |key| key == "CLUSTER_HOSTNAME");

		let var = |key: &str| env.get(key).map(String::as_str);

		assert_eq!(var("AUTHENTICATION_ANONYMOUS_ACCESS_ENABLED"), Some("true"));
		assert_eq!(var("PERSISTENCE_DATA_PATH"), Some("/var/lib/weaviate"));
		assert_eq!(var("CLUSTER_GOSSIP_BIND_PORT"), Some("7101"));
		assert_eq!(var("CLUSTER_DATA_BIND_PORT"), Some("7102"));
		assert_eq!(var("ENABLE_MODULES"), Some("text2vec-openai,generative-openai"));
		// Set by the parent environment, so left alone.
		assert!(!env.contains_key("CLUSTER_HOSTNAME"));
		// Caller overrides win over computed defaults.
		assert_eq!(var("QUERY_DEFAULTS_LIMIT"), Some("50"));
	}

	#[test]
	fn empty_module_list_leaves_enable_modules_unset() {
		let options = EmbeddedOptions::default();
		let env = compose_environment(&options, 1, 2, |_| false);

		assert!(!env.contains_key("ENABLE_MODULES"));
		assert_eq!(env.get("QUERY_DEFAULTS_LIMIT").map(String::as_str), Some("20"));
	}

	#[tokio::test]
	async fn stop_without_start_is_a_no_op() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let mut supervisor = ProcessSupervisor::new(
			EmbeddedOptions::builder()
				.binary_path(dir.path().join("missing-binary"))
				.persistence_data_path(dir.path().join("data"))
				.build()
				.expect("Options fixture should be valid."),
		)
		.expect("Linux hosts should be supported.");

		assert_eq!(supervisor.stop().await.expect("Stop should succeed."), StopOutcome::NotStarted);
		assert!(!supervisor.is_running());
		assert!(supervisor.handle().is_none());
	}
}

//! Embedded server mode: a locally supervised server process for connections without a remote
//! URL.
//!
//! [`EmbeddedController`] composes the [`port`] allocator, the [`provision`]er, and the
//! [`process`] supervisor. It is the only type connection setup needs:
//!
//! ```no_run
//! # async fn demo() -> weaviate_connect::error::Result<()> {
//! use weaviate_connect::embedded::{EmbeddedController, EmbeddedOptions};
//!
//! let controller = EmbeddedController::new(EmbeddedOptions::default())?;
//!
//! controller.ensure_running().await?;
//! println!("Server ready at {}.", controller.url());
//! controller.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod options;
pub mod port;
pub mod process;
pub mod provision;

pub use options::*;
pub use port::*;
pub use process::*;
pub use provision::*;

// self
use crate::_prelude::*;

/// Owns at most one embedded server process.
///
/// `ensure_running` and `stop` are serialized by an async mutex, so concurrent callers never
/// launch a second process. Dropping the controller terminates a process it started.
pub struct EmbeddedController {
	options: EmbeddedOptions,
	supervisor: AsyncMutex<ProcessSupervisor>,
}
impl EmbeddedController {
	/// Creates a controller; fails on unsupported platforms or invalid options.
	pub fn new(options: EmbeddedOptions) -> Result<Self> {
		let supervisor = ProcessSupervisor::new(options.clone())?;

		Ok(Self { options, supervisor: AsyncMutex::new(supervisor) })
	}

	/// Creates a controller around a preconfigured supervisor.
	pub fn with_supervisor(supervisor: ProcessSupervisor) -> Self {
		Self { options: supervisor.options().clone(), supervisor: AsyncMutex::new(supervisor) }
	}

	/// Makes sure a server answers on the configured port.
	///
	/// Returns the handle of the process this controller owns, or `None` when another process
	/// was already listening and nothing was provisioned or launched.
	pub async fn ensure_running(&self) -> Result<Option<EmbeddedProcessHandle>> {
		let mut supervisor = self.supervisor.lock().await;

		match supervisor.start().await? {
			StartOutcome::Started(handle) => Ok(Some(handle)),
			StartOutcome::AlreadyListening => Ok(supervisor.handle()),
		}
	}

	/// Stops the owned process, if any.
	pub async fn stop(&self) -> Result<StopOutcome> {
		self.supervisor.lock().await.stop().await.map_err(Error::from)
	}

	/// Returns true when a TCP connect to the configured port succeeds.
	pub async fn is_listening(&self) -> bool {
		is_port_listening(self.options.port).await
	}

	/// Returns true while the owned process has not exited.
	pub async fn is_running(&self) -> bool {
		self.supervisor.lock().await.is_running()
	}

	/// Handle of the owned process, if any.
	pub async fn handle(&self) -> Option<EmbeddedProcessHandle> {
		self.supervisor.lock().await.handle()
	}

	/// Configured server port.
	pub fn port(&self) -> u16 {
		self.options.port
	}

	/// Options the controller was created with.
	pub fn options(&self) -> &EmbeddedOptions {
		&self.options
	}

	/// Base URL of the embedded server.
	pub fn url(&self) -> String {
		format!("http://127.0.0.1:{}", self.options.port)
	}
}
impl Debug for EmbeddedController {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EmbeddedController").field("port", &self.options.port).finish()
	}
}

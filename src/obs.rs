//! Optional observability helpers for session and embedded-server flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit spans named `weaviate_connect.flow` with the `flow` and `stage`
//!   fields, plus events for advisory warnings and process lifecycle changes.
//! - Enable `metrics` to increment the `weaviate_connect_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Flow kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Discovery document fetch.
	Discovery,
	/// Resource-owner password grant.
	Password,
	/// Client Credentials grant.
	ClientCredentials,
	/// Session refresh.
	Refresh,
	/// Server binary download.
	Provision,
	/// Embedded server start.
	EmbeddedStart,
	/// Embedded server stop.
	EmbeddedStop,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Discovery => "discovery",
			FlowKind::Password => "password",
			FlowKind::ClientCredentials => "client_credentials",
			FlowKind::Refresh => "refresh",
			FlowKind::Provision => "provision",
			FlowKind::EmbeddedStart => "embedded_start",
			FlowKind::EmbeddedStop => "embedded_stop",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by session and embedded flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("weaviate_connect.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Advisory warning: the session has no refresh token and will lapse once `expires_in` passes.
pub fn warn_missing_refresh_token(expires_in: Option<Duration>) {
	#[cfg(feature = "tracing")]
	{
		match expires_in {
			Some(lifetime) => tracing::warn!(
				expires_in_secs = lifetime.whole_seconds(),
				"Session has no refresh token and cannot renew itself once the token expires."
			),
			None => tracing::warn!(
				"Session has no refresh token and cannot renew itself once the token expires."
			),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = expires_in;
	}
}

/// Debug event for the token endpoint resolved from discovery.
pub fn log_token_endpoint_resolved(token_endpoint: &Url) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(%token_endpoint, "Resolved token endpoint from discovery.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = token_endpoint;
	}
}

/// Debug event for a completed session refresh.
pub fn log_session_refreshed(kind: FlowKind, rotated_refresh_token: bool) {
	#[cfg(feature = "tracing")]
	{
		tracing::debug!(flow = kind.as_str(), rotated_refresh_token, "Session token refreshed.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, rotated_refresh_token);
	}
}

/// Info event for lifecycle changes of the embedded server.
pub fn log_embedded_event(message: &'static str, pid: Option<u32>, port: u16) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(pid, port, "{message}");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (message, pid, port);
	}
}

/// Info event for a server binary download.
pub fn log_binary_download(path: &std::path::Path, url: &Url) {
	#[cfg(feature = "tracing")]
	{
		tracing::info!(path = %path.display(), url = %url, "Server binary missing; downloading.");
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (path, url);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn helpers_run_without_subscriber() {
		warn_missing_refresh_token(Some(Duration::minutes(5)));
		warn_missing_refresh_token(None);
		log_embedded_event("Embedded server already listening.", None, 6666);
	}

	#[cfg(feature = "tracing")]
	#[test]
	fn helpers_emit_events_with_their_fields() {
		// std
		use std::{io::Write, sync::Arc};
		// crates.io
		use parking_lot::Mutex;

		#[derive(Clone, Default)]
		struct Captured(Arc<Mutex<Vec<u8>>>);
		impl Write for Captured {
			fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
				self.0.lock().extend_from_slice(buf);

				Ok(buf.len())
			}

			fn flush(&mut self) -> std::io::Result<()> {
				Ok(())
			}
		}

		let captured = Captured::default();
		let writer = captured.clone();
		let subscriber = tracing_subscriber::fmt()
			.with_ansi(false)
			.with_max_level(tracing::Level::DEBUG)
			.with_writer(move || writer.clone())
			.finish();

		tracing::subscriber::with_default(subscriber, || {
			warn_missing_refresh_token(Some(Duration::minutes(5)));
			log_embedded_event("Embedded server launched.", Some(42), 6666);
			log_session_refreshed(FlowKind::Refresh, true);
		});

		let output = String::from_utf8(captured.0.lock().clone()).expect("Output should be UTF-8.");
		let lines = output.lines().collect::<Vec<_>>();

		assert_eq!(lines.len(), 3, "Unexpected output: {output}");
		assert!(lines[0].contains("WARN"));
		assert!(lines[0].contains("Session has no refresh token"));
		assert!(lines[0].contains("expires_in_secs=300"));
		assert!(lines[1].contains("INFO"));
		assert!(lines[1].contains("Embedded server launched."));
		assert!(lines[1].contains("pid=42"));
		assert!(lines[1].contains("port=6666"));
		assert!(lines[2].contains("DEBUG"));
		assert!(lines[2].contains("flow=\"refresh\""));
		assert!(lines[2].contains("rotated_refresh_token=true"));
	}

	#[cfg(feature = "tracing")]
	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = FlowSpan::new(FlowKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}

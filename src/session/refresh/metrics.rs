// std
use std::sync::atomic::{AtomicU64, Ordering};

/// How a renewal left the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Renewal {
	/// Refresh-token grant returned a new token.
	Refreshed,
	/// Client credentials grant was re-run.
	Reacquired,
}

/// Per-session renewal counters.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	refreshed: AtomicU64,
	reacquired: AtomicU64,
	failures: AtomicU64,
}
impl RefreshMetrics {
	/// Renewals started, forced ones included. Reads served from a token that cannot be renewed
	/// but has not expired do not count.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Renewals served by the refresh-token grant.
	pub fn refreshed(&self) -> u64 {
		self.refreshed.load(Ordering::Relaxed)
	}

	/// Renewals served by re-running the client credentials grant.
	pub fn reacquired(&self) -> u64 {
		self.reacquired.load(Ordering::Relaxed)
	}

	/// Renewals that surfaced an error to the caller.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_renewal(&self, renewal: Renewal) {
		let counter = match renewal {
			Renewal::Refreshed => &self.refreshed,
			Renewal::Reacquired => &self.reacquired,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}

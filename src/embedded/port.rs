//! Free local TCP port allocation.
//!
//! Ports come from binding `127.0.0.1:0` and reading back what the OS assigned. The port is
//! released before it is returned, so another process may claim it first; callers pass it to
//! the server right away.
//!
//! The OS may hand a just-released port out again, so the allocator remembers the last
//! [`RECENT_PORT_WINDOW`] ports it issued and never issues one of them twice. Rejected
//! candidates stay bound until the call returns, which forces the OS to offer a new one.

// std
use std::{
	collections::VecDeque,
	io::{Error as IoError, ErrorKind},
	net::{Ipv4Addr, TcpListener},
};
// crates.io
use parking_lot::Mutex;
// self
use crate::error::EmbeddedError;

/// Number of recently issued ports that are never issued again.
pub const RECENT_PORT_WINDOW: usize = 4096;

const MAX_REJECTIONS: usize = 64;

static RECENT_PORTS: Mutex<VecDeque<u16>> = Mutex::new(VecDeque::new());

/// Returns one currently free port that differs from the recently issued ones.
pub fn allocate_ephemeral_port() -> Result<u16, EmbeddedError> {
	issue(1, &[]).map(|ports| ports[0])
}

/// Returns `count` pairwise distinct free ports.
///
/// Every listener stays bound until all ports are read, so the OS cannot hand out the same
/// port twice within one batch.
pub fn allocate_ephemeral_ports(count: usize) -> Result<Vec<u16>, EmbeddedError> {
	issue(count, &[])
}

/// Returns `count` pairwise distinct free ports, none of which appears in `excluded`.
pub fn allocate_ports_excluding(
	count: usize,
	excluded: &[u16],
) -> Result<Vec<u16>, EmbeddedError> {
	issue(count, excluded)
}

fn issue(count: usize, excluded: &[u16]) -> Result<Vec<u16>, EmbeddedError> {
	let mut held = Vec::with_capacity(count);
	let mut ports = Vec::with_capacity(count);
	let mut rejections = 0;

	while ports.len() < count {
		let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
			.map_err(EmbeddedError::PortAllocation)?;
		let port = listener.local_addr().map_err(EmbeddedError::PortAllocation)?.port();
		let rejected = excluded.contains(&port) || RECENT_PORTS.lock().contains(&port);

		held.push(listener);

		if !rejected {
			ports.push(port);

			continue;
		}

		rejections += 1;

		if rejections > MAX_REJECTIONS {
			return Err(EmbeddedError::PortAllocation(IoError::new(
				ErrorKind::AddrInUse,
				format!("no fresh ports outside {excluded:?} after {MAX_REJECTIONS} rejections"),
			)));
		}
	}

	let mut recent = RECENT_PORTS.lock();

	for &port in &ports {
		if recent.len() == RECENT_PORT_WINDOW {
			recent.pop_front();
		}

		recent.push_back(port);
	}

	Ok(ports)
}

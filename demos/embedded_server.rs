//! Demonstrates starting an embedded server with the default options, printing its address,
//! and stopping it again.
//!
//! The first run downloads the server binary into the user cache directory.

// crates.io
use color_eyre::Result;
// self
use weaviate_connect::embedded::{EmbeddedController, EmbeddedOptions};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let controller = EmbeddedController::new(EmbeddedOptions::default())?;

	match controller.ensure_running().await? {
		Some(handle) =>
			println!("Started embedded server (pid {}) at {}.", handle.pid, controller.url()),
		None => println!("A server already listens at {}; reusing it.", controller.url()),
	}

	println!("Stopped: {:?}.", controller.stop().await?);

	Ok(())
}

#![cfg(all(feature = "embedded", target_os = "linux"))]

// std
use std::{
	fs,
	os::unix::fs::PermissionsExt,
	path::{Path, PathBuf},
	time::Duration,
};
// crates.io
use httpmock::prelude::*;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::net::TcpListener;
use url::Url;
// self
use weaviate_connect::{
	embedded::{
		BinaryProvisioner, EmbeddedController, EmbeddedOptions, ProvisionOutcome, StopOutcome,
		allocate_ephemeral_port,
	},
	error::{EmbeddedError, Error},
};

const FAKE_BINARY: &[u8] = b"#!/bin/sh\nexit 0\n";

fn write_script(dir: &Path, body: &str, mode: u32) -> PathBuf {
	let path = dir.join("weaviate-server");

	fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Script should be written.");
	fs::set_permissions(&path, fs::Permissions::from_mode(mode))
		.expect("Script permissions should be set.");

	path
}

fn options(dir: &TempDir, binary: &Path, port: u16, startup: Duration) -> EmbeddedOptions {
	EmbeddedOptions::builder()
		.persistence_data_path(dir.path().join("data"))
		.binary_path(binary)
		.binary_download_url("http://127.0.0.1:9/never-fetched")
		.port(port)
		.startup_timeout(startup)
		.probe_interval(Duration::from_millis(50))
		.build()
		.expect("Options fixture should be valid.")
}

fn free_port() -> u16 {
	allocate_ephemeral_port().expect("Ephemeral port should be available.")
}

// The mock server also accepts plain HTTP, which avoids its self-signed certificate.
fn http_url(server: &MockServer, path: &str) -> String {
	format!("http://127.0.0.1:{}{path}", server.port())
}

fn release_url(server: &MockServer) -> Url {
	Url::parse(&http_url(server, "/releases/weaviate-server")).expect("URL should parse.")
}

fn sha256_hex(bytes: &[u8]) -> String {
	format!("{:x}", Sha256::digest(bytes))
}

// Binds the server port on behalf of the fake binary once its launch marker appears.
async fn listen_after_launch(marker: PathBuf, port: u16) -> TcpListener {
	for _ in 0..200 {
		if marker.exists() {
			return TcpListener::bind(("127.0.0.1", port))
				.await
				.expect("Server port should be bindable.");
		}

		tokio::time::sleep(Duration::from_millis(20)).await;
	}

	panic!("Fake binary never wrote its launch marker.");
}

#[tokio::test]
async fn ensure_running_launches_once_and_stop_terminates() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let marker = dir.path().join("launches");
	let binary = write_script(
		dir.path(),
		&format!(
			"echo \"$CLUSTER_GOSSIP_BIND_PORT $CLUSTER_DATA_BIND_PORT\" >> {}\nexec sleep 30",
			marker.display()
		),
		0o755,
	);
	let port = free_port();
	let controller =
		EmbeddedController::new(options(&dir, &binary, port, Duration::from_secs(10)))
			.expect("Controller should build.");
	let listener = tokio::spawn(listen_after_launch(marker.clone(), port));
	let handle = controller
		.ensure_running()
		.await
		.expect("Fake server should start.")
		.expect("A launched server should report its handle.");
	let _listener = listener.await.expect("Listener task should not panic.");

	assert_eq!(handle.bound_port, port);
	assert_ne!(handle.gossip_port, port);
	assert_ne!(handle.data_bind_port, port);
	assert_ne!(handle.gossip_port, handle.data_bind_port);
	assert!(dir.path().join("data").is_dir());

	let again = controller.ensure_running().await.expect("Second call should succeed.");

	assert_eq!(again, Some(handle));

	let launches = fs::read_to_string(&marker).expect("Marker should be readable.");

	assert_eq!(launches.lines().count(), 1);
	assert_eq!(
		launches.trim(),
		format!("{} {}", handle.gossip_port, handle.data_bind_port)
	);
	assert!(controller.is_running().await);
	assert_eq!(controller.stop().await.expect("Stop should succeed."), StopOutcome::Terminated);
	assert!(!controller.is_running().await);
	assert_eq!(controller.stop().await.expect("Second stop is a no-op."), StopOutcome::NotStarted);
}

// A reaped child disappears from /proc; an unreaped one is left as a zombie.
fn process_is_gone(pid: u32) -> bool {
	match fs::read_to_string(format!("/proc/{pid}/stat")) {
		Ok(stat) => stat.rsplit_once(") ").is_some_and(|(_, rest)| rest.starts_with('Z')),
		Err(_) => true,
	}
}

#[tokio::test]
async fn dropping_the_controller_kills_a_server_that_ignores_sigterm() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let marker = dir.path().join("launches");
	let binary = write_script(
		dir.path(),
		&format!("trap '' TERM\necho up >> {}\nexec sleep 30", marker.display()),
		0o755,
	);
	let port = free_port();
	let controller =
		EmbeddedController::new(options(&dir, &binary, port, Duration::from_secs(10)))
			.expect("Controller should build.");
	let listener = tokio::spawn(listen_after_launch(marker, port));
	let handle = controller
		.ensure_running()
		.await
		.expect("Fake server should start.")
		.expect("A launched server should report its handle.");
	let _listener = listener.await.expect("Listener task should not panic.");

	assert!(!process_is_gone(handle.pid));

	drop(controller);

	let mut gone = false;

	for _ in 0..100 {
		if process_is_gone(handle.pid) {
			gone = true;

			break;
		}

		tokio::time::sleep(Duration::from_millis(50)).await;
	}

	assert!(gone, "Server process {} outlived its controller.", handle.pid);
}

#[tokio::test]
async fn occupied_port_skips_provisioning_and_launch() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let listener =
		TcpListener::bind(("127.0.0.1", 0)).await.expect("Occupying listener should bind.");
	let port = listener.local_addr().expect("Listener should report its address.").port();
	let binary = dir.path().join("missing").join("weaviate-server");
	let controller = EmbeddedController::new(options(&dir, &binary, port, Duration::from_secs(1)))
		.expect("Controller should build.");

	assert!(controller.is_listening().await);
	assert_eq!(controller.ensure_running().await.expect("Occupied port is not an error."), None);
	assert!(!binary.exists());
	assert!(!dir.path().join("data").exists());
	assert_eq!(controller.stop().await.expect("Nothing to stop."), StopOutcome::NotStarted);
}

#[tokio::test]
async fn silent_binary_hits_the_startup_bound() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let binary = write_script(dir.path(), "exec sleep 30", 0o755);
	let port = free_port();
	let controller =
		EmbeddedController::new(options(&dir, &binary, port, Duration::from_millis(300)))
			.expect("Controller should build.");
	let err = controller.ensure_running().await.expect_err("Startup must time out.");

	assert!(
		matches!(err, Error::Embedded(EmbeddedError::NotListening { port: p, .. }) if p == port)
	);
	assert!(controller.handle().await.is_none());
}

#[tokio::test]
async fn early_exit_is_reported() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let binary = write_script(dir.path(), "exit 3", 0o755);
	let controller =
		EmbeddedController::new(options(&dir, &binary, free_port(), Duration::from_secs(10)))
			.expect("Controller should build.");
	let err = controller.ensure_running().await.expect_err("Exiting binaries must fail startup.");

	assert!(matches!(err, Error::Embedded(EmbeddedError::ExitedDuringStartup { .. })));
}

#[tokio::test]
async fn non_executable_binary_fails_to_launch() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let binary = write_script(dir.path(), "exit 0", 0o644);
	let controller =
		EmbeddedController::new(options(&dir, &binary, free_port(), Duration::from_secs(1)))
			.expect("Controller should build.");
	let err = controller.ensure_running().await.expect_err("Spawn must be refused.");

	assert!(matches!(err, Error::Embedded(EmbeddedError::Launch { .. })));
}

#[tokio::test]
async fn provisioner_downloads_verifies_and_installs_once() {
	let server = MockServer::start_async().await;
	let release = server
		.mock_async(|when, then| {
			when.method(GET).path("/releases/weaviate-server");
			then.status(200).body(FAKE_BINARY);
		})
		.await;
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let path = dir.path().join("bin").join("weaviate-server");
	let url = release_url(&server);
	let digest = sha256_hex(FAKE_BINARY);
	let provisioner =
		BinaryProvisioner::new(Duration::from_secs(5)).expect("Provisioner should build.");
	let outcome = provisioner
		.ensure_binary_exists(&path, &url, Some(&digest))
		.await
		.expect("Verified download should install.");

	assert_eq!(outcome, ProvisionOutcome::Downloaded { bytes: FAKE_BINARY.len() as u64 });
	assert_eq!(fs::read(&path).expect("Installed binary should be readable."), FAKE_BINARY);

	let mode = fs::metadata(&path).expect("Installed binary should exist.").permissions().mode();

	assert_eq!(mode & 0o777, 0o755);
	assert_eq!(
		provisioner
			.ensure_binary_exists(&path, &url, Some(&digest))
			.await
			.expect("Second call should succeed."),
		ProvisionOutcome::AlreadyPresent
	);

	release.assert_calls_async(1).await;
}

#[tokio::test]
async fn digest_mismatch_leaves_nothing_behind() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/releases/weaviate-server");
			then.status(200).body(FAKE_BINARY);
		})
		.await;

	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let path = dir.path().join("weaviate-server");
	let url = release_url(&server);
	let expected = sha256_hex(b"something else");
	let provisioner =
		BinaryProvisioner::new(Duration::from_secs(5)).expect("Provisioner should build.");
	let err = provisioner
		.ensure_binary_exists(&path, &url, Some(&expected))
		.await
		.expect_err("Tampered downloads must be rejected.");

	match err {
		EmbeddedError::IntegrityMismatch { expected: reported, actual } => {
			assert_eq!(reported, expected);
			assert_eq!(actual, sha256_hex(FAKE_BINARY));
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert_eq!(fs::read_dir(dir.path()).expect("Temp dir should be readable.").count(), 0);
}

#[tokio::test]
async fn missing_release_reports_the_status() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(GET).path("/releases/weaviate-server");
			then.status(404);
		})
		.await;

	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let path = dir.path().join("weaviate-server");
	let url = release_url(&server);
	let provisioner =
		BinaryProvisioner::new(Duration::from_secs(5)).expect("Provisioner should build.");
	let err = provisioner
		.ensure_binary_exists(&path, &url, None)
		.await
		.expect_err("A 404 must fail the download.");

	assert!(matches!(err, EmbeddedError::Download { status: Some(404), .. }));
	assert!(!path.exists());
}

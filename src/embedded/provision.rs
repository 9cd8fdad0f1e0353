//! Server binary provisioning.
//!
//! A missing binary is downloaded into a hidden sibling file, checked against the configured
//! SHA-256 when one is set, marked executable, and renamed into place, so the target path
//! never holds a partial or unverified download. Without a configured digest the download is
//! trusted as served.

// std
use std::{
	path::{Path, PathBuf},
	time::Duration as StdDuration,
};
// crates.io
use reqwest::redirect::Policy;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::EmbeddedError,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Result of [`BinaryProvisioner::ensure_binary_exists`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
	/// The binary was already present; nothing was downloaded.
	AlreadyPresent,
	/// The binary was downloaded and installed.
	Downloaded {
		/// Size of the installed binary.
		bytes: u64,
	},
}

/// Downloads server binaries over HTTP.
#[derive(Clone, Debug)]
pub struct BinaryProvisioner {
	client: ReqwestClient,
}
impl BinaryProvisioner {
	/// Builds a provisioner whose downloads are bounded by `timeout`. Redirects are followed,
	/// as release hosts answer with them.
	pub fn new(timeout: StdDuration) -> Result<Self, EmbeddedError> {
		let client = ReqwestClient::builder()
			.timeout(timeout)
			.redirect(Policy::limited(10))
			.build()
			.map_err(|err| EmbeddedError::InvalidOptions {
				reason: format!("download client could not be built ({err})"),
			})?;

		Ok(Self { client })
	}

	/// Uses a caller-configured reqwest client.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self { client }
	}

	/// Ensures an executable binary exists at `path`, downloading it from `url` when absent.
	pub async fn ensure_binary_exists(
		&self,
		path: &Path,
		url: &Url,
		expected_sha256: Option<&str>,
	) -> Result<ProvisionOutcome, EmbeddedError> {
		const KIND: FlowKind = FlowKind::Provision;

		if tokio::fs::try_exists(path).await? {
			return Ok(ProvisionOutcome::AlreadyPresent);
		}

		let span = FlowSpan::new(KIND, "ensure_binary_exists");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.download(path, url, expected_sha256)).await;

		obs::record_flow_result(KIND, &result);

		result
	}

	async fn download(
		&self,
		path: &Path,
		url: &Url,
		expected_sha256: Option<&str>,
	) -> Result<ProvisionOutcome, EmbeddedError> {
		obs::log_binary_download(path, url);

		let download_error = |status: Option<u16>, source: Option<ReqwestError>| {
			EmbeddedError::Download {
				url: url.to_string(),
				status,
				source: source.map(|err| Box::new(err) as Box<dyn StdError + Send + Sync>),
			}
		};
		let response = self
			.client
			.get(url.clone())
			.send()
			.await
			.map_err(|err| download_error(None, Some(err)))?;
		let status = response.status();

		if !status.is_success() {
			return Err(download_error(Some(status.as_u16()), None));
		}

		let body = response.bytes().await.map_err(|err| download_error(None, Some(err)))?;

		if let Some(expected) = expected_sha256 {
			let actual = format!("{:x}", Sha256::digest(&body));

			if !actual.eq_ignore_ascii_case(expected) {
				return Err(EmbeddedError::IntegrityMismatch {
					expected: expected.to_ascii_lowercase(),
					actual,
				});
			}
		}
		if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
			tokio::fs::create_dir_all(parent).await?;
		}

		let staging = staging_path(path);

		if let Err(err) = install(&staging, path, &body).await {
			let _ = tokio::fs::remove_file(&staging).await;

			return Err(err.into());
		}

		Ok(ProvisionOutcome::Downloaded { bytes: body.len() as u64 })
	}
}

async fn install(staging: &Path, path: &Path, body: &[u8]) -> std::io::Result<()> {
	tokio::fs::write(staging, body).await?;

	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;

		tokio::fs::set_permissions(staging, std::fs::Permissions::from_mode(0o755)).await?;
	}

	tokio::fs::rename(staging, path).await
}

fn staging_path(path: &Path) -> PathBuf {
	let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();

	path.with_file_name(format!(".{name}.download-{}", std::process::id()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn staging_file_is_a_hidden_sibling() {
		let staging = staging_path(Path::new("/opt/weaviate/weaviate-server"));

		assert_eq!(staging.parent(), Some(Path::new("/opt/weaviate")));
		assert!(
			staging
				.file_name()
				.and_then(|name| name.to_str())
				.is_some_and(|name| name.starts_with(".weaviate-server.download-"))
		);
	}

	#[tokio::test]
	async fn present_binary_is_left_alone() {
		let dir = tempfile::tempdir().expect("Temp dir should be created.");
		let path = dir.path().join("weaviate-server");

		tokio::fs::write(&path, b"#!/bin/sh\n").await.expect("Fixture binary should be written.");

		let provisioner = BinaryProvisioner::new(StdDuration::from_secs(1))
			.expect("Provisioner should build.");
		let outcome = provisioner
			.ensure_binary_exists(
				&path,
				&Url::parse("http://127.0.0.1:9/never-fetched").expect("URL fixture should parse."),
				None,
			)
			.await
			.expect("Present binaries need no download.");

		assert_eq!(outcome, ProvisionOutcome::AlreadyPresent);
	}
}

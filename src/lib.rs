//! Connection plumbing for the Weaviate client: OIDC token sessions that acquire tokens eagerly
//! and refresh themselves single-flight, plus a supervised embedded server process with binary
//! provisioning, readiness probing, and scoped shutdown.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod discovery;
#[cfg(feature = "embedded")] pub mod embedded;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Shared imports and fixtures for tests; enabled via `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{auth::ScopeList, provider::ProviderDescriptor};

	/// Generic (non-Microsoft) provider whose token endpoint is `endpoint`.
	pub fn descriptor_fixture(endpoint: &str, scopes: &[&str]) -> ProviderDescriptor {
		ProviderDescriptor::new(
			Url::parse(endpoint).expect("Token endpoint fixture should parse."),
			"cid",
			ScopeList::new(scopes.iter().copied()).expect("Scope fixture should be valid."),
		)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _, tempfile as _};
#[cfg(all(test, not(feature = "embedded")))] use tokio as _;
#[cfg(all(test, not(feature = "tracing")))] use tracing_subscriber as _;

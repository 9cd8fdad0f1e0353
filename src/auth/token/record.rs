//! Token records, lifecycle helpers, and builders.

// self
use crate::{_prelude::*, auth::token::secret::Secret};

/// Current lifecycle status for a token record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is currently valid.
	Active,
	/// Token is still valid but inside the refresh leeway.
	Expiring,
	/// Token exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`TokenRecordBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenRecordBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the access token value is the empty string.
	#[error("Access token cannot be empty.")]
	EmptyAccessToken,
}

/// Token triple held by a session: access token, optional refresh token, optional expiry.
#[derive(Serialize, Deserialize, Clone)]
pub struct TokenRecord {
	/// Access token secret; callers must avoid logging it.
	pub access_token: Secret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<Secret>,
	/// Instant the token was obtained or supplied.
	pub issued_at: OffsetDateTime,
	/// Expiry instant; `None` when the provider did not report a lifetime.
	pub expires_at: Option<OffsetDateTime>,
}
impl TokenRecord {
	/// Returns a builder for constructing records.
	pub fn builder() -> TokenRecordBuilder {
		TokenRecordBuilder::default()
	}

	/// Computes the lifecycle status at `instant`, treating the final `leeway` as expiring.
	pub fn status_at(&self, instant: OffsetDateTime, leeway: Duration) -> TokenStatus {
		let Some(expires_at) = self.expires_at else {
			return TokenStatus::Active;
		};

		if instant >= expires_at {
			TokenStatus::Expired
		} else if instant >= expires_at - leeway {
			TokenStatus::Expiring
		} else {
			TokenStatus::Active
		}
	}

	/// Returns `true` if the token should be refreshed before use at `instant`.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, leeway: Duration) -> bool {
		!matches!(self.status_at(instant, leeway), TokenStatus::Active)
	}

	/// Returns `true` if the record has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant, Duration::ZERO), TokenStatus::Expired)
	}

	/// Remaining lifetime at `instant`, if an expiry is known.
	pub fn expires_in_at(&self, instant: OffsetDateTime) -> Option<Duration> {
		self.expires_at.map(|expires_at| expires_at - instant)
	}
}
impl Debug for TokenRecord {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenRecord")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`TokenRecord`].
#[derive(Clone, Debug, Default)]
pub struct TokenRecordBuilder {
	access_token: Option<Secret>,
	refresh_token: Option<Secret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenRecordBuilder {
	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<Secret>) -> Self {
		self.access_token = Some(token.into());

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<Secret>) -> Self {
		self.refresh_token = Some(token.into());

		self
	}

	/// Consumes the builder and produces a [`TokenRecord`].
	pub fn build(self) -> Result<TokenRecord, TokenRecordBuilderError> {
		let access_token = self.access_token.ok_or(TokenRecordBuilderError::MissingAccessToken)?;

		if access_token.is_empty() {
			return Err(TokenRecordBuilderError::EmptyAccessToken);
		}

		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) => Some(issued_at + delta),
			(None, None) => None,
		};

		Ok(TokenRecord {
			access_token,
			refresh_token: self.refresh_token.filter(|secret| !secret.is_empty()),
			issued_at,
			expires_at,
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn status_respects_leeway() {
		let record = TokenRecord::builder()
			.access_token("access")
			.issued_at(macros::datetime!(2025-01-01 00:00 UTC))
			.expires_in(Duration::hours(1))
			.build()
			.expect("Token record builder should succeed.");
		let leeway = Duration::minutes(1);

		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:30 UTC), leeway),
			TokenStatus::Active
		);
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 00:59:30 UTC), leeway),
			TokenStatus::Expiring
		);
		assert_eq!(
			record.status_at(macros::datetime!(2025-01-01 01:00 UTC), leeway),
			TokenStatus::Expired
		);
		assert!(record.needs_refresh_at(macros::datetime!(2025-01-01 00:59:30 UTC), leeway));
	}

	#[test]
	fn records_without_expiry_stay_active() {
		let record = TokenRecord::builder()
			.access_token("forever")
			.build()
			.expect("Records without expiry should build.");

		assert!(!record.is_expired_at(OffsetDateTime::now_utc() + Duration::days(365)));
		assert_eq!(record.expires_in_at(OffsetDateTime::now_utc()), None);
	}

	#[test]
	fn empty_tokens_are_rejected() {
		assert_eq!(
			TokenRecord::builder().build().expect_err("Missing token must fail."),
			TokenRecordBuilderError::MissingAccessToken
		);
		assert_eq!(
			TokenRecord::builder().access_token("").build().expect_err("Empty token must fail."),
			TokenRecordBuilderError::EmptyAccessToken
		);

		let record = TokenRecord::builder()
			.access_token("access")
			.refresh_token("")
			.build()
			.expect("Empty refresh tokens are dropped, not rejected.");

		assert!(record.refresh_token.is_none());
	}
}

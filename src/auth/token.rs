//! Token secrets and the records sessions keep between refreshes.

pub mod record;
pub mod secret;

//! `replication://` transport DSNs.
//!
//! A DSN names an already constructed replication transport:
//! `replication://orders`, or `replication://default?service=orders` where the
//! `service` option overrides the host part.

use std::collections::BTreeMap;
use url::Url;

/// DSN scheme handled by replication transports.
pub const SCHEME: &str = "replication";

/// Whether `dsn` uses the replication scheme.
#[must_use]
pub fn supports(dsn: &str) -> bool {
    dsn.starts_with("replication://")
}

/// A parsed replication DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationDsn {
    name: String,
    options: BTreeMap<String, String>,
}

impl ReplicationDsn {
    /// Parse a DSN.
    ///
    /// # Errors
    ///
    /// Returns error if the DSN is not a valid `replication://` URL or names
    /// no transport.
    pub fn parse(input: &str) -> Result<Self, DsnError> {
        let url = Url::parse(input).map_err(|e| DsnError::Invalid(format!("{input}: {e}")))?;

        if url.scheme() != SCHEME {
            return Err(DsnError::UnsupportedScheme(url.scheme().to_string()));
        }

        let options: BTreeMap<String, String> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let name = options
            .get("service")
            .map(String::as_str)
            .filter(|name| !name.is_empty())
            .or_else(|| url.host_str().filter(|host| !host.is_empty()))
            .ok_or_else(|| DsnError::MissingName(input.to_string()))?
            .to_string();

        Ok(Self { name, options })
    }

    /// Transport name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A query option.
    #[must_use]
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// Errors parsing a replication DSN.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DsnError {
    /// Not a URL
    #[error("invalid DSN: {0}")]
    Invalid(String),
    /// Scheme other than `replication`
    #[error("unsupported DSN scheme '{0}'")]
    UnsupportedScheme(String),
    /// No transport name
    #[error("DSN names no transport: {0}")]
    MissingName(String),
}

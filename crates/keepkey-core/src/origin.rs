//! Web application origins and the allowlist record

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, Result};

/// Normalized web origin: `scheme://host[:port]`
///
/// Built from either an `Origin` header or a full `Referer` URL. Path, query,
/// fragment and credentials are dropped and default ports are elided, so two
/// requests from the same application always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(String);

impl Origin {
    /// Parse and normalize an origin or referer value
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() || value == "null" {
            return Err(Error::InvalidOrigin(format!("{:?}", value)));
        }

        let url = Url::parse(value).map_err(|e| Error::InvalidOrigin(format!("{value}: {e}")))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidOrigin(format!("{value}: missing host")))?;

        let normalized = match url.port() {
            Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
            None => format!("{}://{}", url.scheme(), host),
        };

        Ok(Self(normalized))
    }

    /// The normalized origin string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Origin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Origin {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

/// An origin the user approved for pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedOrigin {
    /// The approved origin
    pub origin: Origin,

    /// Approval time, Unix milliseconds
    #[serde(alias = "added")]
    pub added_at: i64,

    /// Whether the origin has been verified out of band
    #[serde(default)]
    pub is_verified: bool,
}

impl ApprovedOrigin {
    /// Record a fresh, unverified approval at the current time
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            added_at: Utc::now().timestamp_millis(),
            is_verified: false,
        }
    }
}

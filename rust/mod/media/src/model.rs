use std::fmt;
use std::str::FromStr;

use audiorelay_core::{ServiceError, Timestamp};
use serde::{Deserialize, Serialize};

const MAX_ASSET_ID_LEN: usize = 256;

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Opaque identifier of a file in the blob store.
///
/// Accepted characters are ASCII alphanumerics plus `-`, `_` and `.`,
/// which keeps the id safe to splice into backend URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetId(String);

impl AssetId {
    pub fn parse(raw: &str) -> Result<Self, ServiceError> {
        if raw.is_empty() {
            return Err(ServiceError::BadRequest("asset id is empty".into()));
        }
        if raw.len() > MAX_ASSET_ID_LEN {
            return Err(ServiceError::BadRequest(format!(
                "asset id exceeds {} characters",
                MAX_ASSET_ID_LEN
            )));
        }
        if raw == "." || raw == ".." {
            return Err(ServiceError::BadRequest("asset id is malformed".into()));
        }
        let valid = raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'));
        if !valid {
            return Err(ServiceError::BadRequest(
                "asset id contains unsupported characters".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Bearer credential forwarded to the backend. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Extract `Authorization: Bearer <token>` from a raw header value.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let (scheme, token) = value.trim_start().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        if token.is_empty() {
            None
        } else {
            Some(Self(token.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

// ---------------------------------------------------------------------------
// AssetMetadata
// ---------------------------------------------------------------------------

/// Metadata of one asset, fetched fresh on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMetadata {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

// ---------------------------------------------------------------------------
// BackendMode
// ---------------------------------------------------------------------------

/// Which of the two interchangeable backends serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    Local,
    Web,
}

impl BackendMode {
    pub const ALL: [BackendMode; 2] = [BackendMode::Local, BackendMode::Web];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Local => "local",
            BackendMode::Web => "web",
        }
    }
}

impl Default for BackendMode {
    fn default() -> Self {
        BackendMode::Local
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendMode {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(BackendMode::Local),
            "web" => Ok(BackendMode::Web),
            other => Err(ServiceError::BadRequest(format!(
                "unknown backend mode {:?}, expected \"local\" or \"web\"",
                other
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// BackendDescriptor
// ---------------------------------------------------------------------------

/// Static address plus advisory health of one backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDescriptor {
    pub mode: BackendMode,
    pub base_url: String,
    pub healthy: bool,
    pub last_checked_at: Option<Timestamp>,
}

impl BackendDescriptor {
    /// A descriptor that has never been probed.
    pub fn new(mode: BackendMode, base_url: impl Into<String>) -> Self {
        Self {
            mode,
            base_url: base_url.into(),
            healthy: false,
            last_checked_at: None,
        }
    }
}

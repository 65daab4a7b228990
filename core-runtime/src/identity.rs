//! Repository identity
//!
//! The fixed byte identifier of a synchronized repository. Its lowercase hex
//! form is the notification channel key shared by all replicas.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Immutable repository identifier
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity(Arc<[u8]>);

impl RepositoryIdentity {
    /// Wrap raw identifier bytes
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is empty.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let bytes = bytes.as_ref();
        if bytes.is_empty() {
            return Err(Error::InvalidIdentity(
                "repository id cannot be empty".to_string(),
            ));
        }
        Ok(Self(Arc::from(bytes)))
    }

    /// Parse a hex-encoded identifier (either case)
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| Error::InvalidIdentity(format!("{}: {}", hex_str, e)))?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex encoding, used as the notification channel key
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl FromStr for RepositoryIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for RepositoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RepositoryIdentity")
            .field(&self.to_hex())
            .finish()
    }
}

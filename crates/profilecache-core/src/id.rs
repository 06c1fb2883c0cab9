use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Opaque identifier of an upstream entity.
///
/// Upstream ids are 64-bit integers carried as decimal strings. The key is
/// kept as the original string so that lookups for ids this decoder cannot
/// parse still reach the upstream service unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Parses the key as an unsigned 64-bit snowflake.
    pub fn as_u64(&self) -> Result<u64> {
        self.0
            .parse::<u64>()
            .map_err(|_| CoreError::malformed_identifier(self.0.clone()))
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for EntityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_key_parses() {
        let key = EntityKey::from("100000000000000000");
        assert_eq!(key.as_u64().unwrap(), 100_000_000_000_000_000);
        assert_eq!(key.to_string(), "100000000000000000");
    }

    #[test]
    fn non_numeric_key_is_malformed() {
        let key = EntityKey::from("not-a-snowflake");
        let err = key.as_u64().unwrap_err();
        assert!(matches!(err, CoreError::MalformedIdentifier(ref s) if s == "not-a-snowflake"));
    }

    #[test]
    fn key_serializes_as_plain_string() {
        let key = EntityKey::from("42");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"42\"");
    }
}

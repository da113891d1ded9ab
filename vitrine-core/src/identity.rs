//! Identity types for catalog entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a product document.
    ProductId
);

string_id!(
    /// Identifier of an authenticated user.
    UserId
);

string_id!(
    /// Opaque marker of a global catalog revision.
    ///
    /// Tokens are produced by the administrative tooling and are compared for
    /// equality only. No ordering semantics are implied even though the type
    /// derives `Ord` for use in sorted collections.
    VersionToken
);

impl VersionToken {
    /// The token assumed when no revision has been applied or published yet.
    pub fn initial() -> Self {
        Self(crate::constants::INITIAL_VERSION_TOKEN.to_string())
    }

    /// Returns true if this is the initial (never applied) token.
    pub fn is_initial(&self) -> bool {
        self.0 == crate::constants::INITIAL_VERSION_TOKEN
    }
}

impl Default for VersionToken {
    fn default() -> Self {
        Self::initial()
    }
}

/// The version token most recently applied to the local snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVersionRecord {
    pub token: VersionToken,
    pub applied_at: Timestamp,
}

impl LocalVersionRecord {
    pub fn new(token: VersionToken, applied_at: Timestamp) -> Self {
        Self { token, applied_at }
    }
}

impl Default for LocalVersionRecord {
    fn default() -> Self {
        Self {
            token: VersionToken::initial(),
            applied_at: DateTime::UNIX_EPOCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_record_is_initial_at_epoch() {
        let record = LocalVersionRecord::default();
        assert!(record.token.is_initial());
        assert_eq!(record.token.as_str(), "0");
        assert_eq!(record.applied_at.timestamp(), 0);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = ProductId::new("ring-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"ring-42\"");

        let back: ProductId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_token_equality_only() {
        assert_eq!(VersionToken::from("4"), VersionToken::new("4".to_string()));
        assert_ne!(VersionToken::from("4"), VersionToken::from("04"));
    }
}

//! TrustStore - registry of known signing keys
//!
//! Keys are addressed by `(key_id, algorithm)`. The store is an ordinary value;
//! sharing it between verifiers is the caller's choice.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Trust tier of a registered key, ordered `untrusted < signed-known < verified-internal`
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum TrustLevel {
    Untrusted,
    #[default]
    SignedKnown,
    VerifiedInternal,
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrustLevel::Untrusted => "untrusted",
            TrustLevel::SignedKnown => "signed-known",
            TrustLevel::VerifiedInternal => "verified-internal",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for TrustLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "untrusted" => Ok(TrustLevel::Untrusted),
            "signed-known" => Ok(TrustLevel::SignedKnown),
            "verified-internal" => Ok(TrustLevel::VerifiedInternal),
            other => Err(format!(
                "unknown trust level '{other}' (expected untrusted, signed-known or verified-internal)"
            )),
        }
    }
}

/// A registered signing key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedKey {
    pub key_id: String,
    pub algorithm: String,
    pub public_key: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub trust_level: TrustLevel,
}

impl TrustedKey {
    pub fn new(
        key_id: impl Into<String>,
        algorithm: impl Into<String>,
        public_key: impl Into<String>,
        trust_level: TrustLevel,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm: algorithm.into(),
            public_key: public_key.into(),
            owner: String::new(),
            trust_level,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    keys: HashMap<(String, String), TrustedKey>,
}

impl TrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key, replacing any existing entry with the same id and algorithm
    pub fn register(&mut self, key: TrustedKey) -> Option<TrustedKey> {
        debug!(
            "Registering trusted key '{}' ({}) at level {}",
            key.key_id, key.algorithm, key.trust_level
        );
        self.keys
            .insert((key.key_id.clone(), key.algorithm.clone()), key)
    }

    pub fn remove(&mut self, key_id: &str, algorithm: &str) -> Option<TrustedKey> {
        self.keys
            .remove(&(key_id.to_string(), algorithm.to_string()))
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    pub fn get(&self, key_id: &str, algorithm: &str) -> Option<&TrustedKey> {
        self.keys.get(&(key_id.to_string(), algorithm.to_string()))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TrustedKey> {
        self.keys.values()
    }
}

impl FromIterator<TrustedKey> for TrustStore {
    fn from_iter<I: IntoIterator<Item = TrustedKey>>(iter: I) -> Self {
        let mut store = TrustStore::new();
        for key in iter {
            store.register(key);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_level_ordering() {
        assert!(TrustLevel::Untrusted < TrustLevel::SignedKnown);
        assert!(TrustLevel::SignedKnown < TrustLevel::VerifiedInternal);
        assert_eq!(TrustLevel::default(), TrustLevel::SignedKnown);
    }

    #[test]
    fn test_trust_level_names() {
        for level in [
            TrustLevel::Untrusted,
            TrustLevel::SignedKnown,
            TrustLevel::VerifiedInternal,
        ] {
            assert_eq!(level.to_string().parse::<TrustLevel>(), Ok(level));
        }
        assert_eq!(
            serde_json::to_string(&TrustLevel::VerifiedInternal).unwrap(),
            "\"verified-internal\""
        );
        assert!("trusted".parse::<TrustLevel>().is_err());
    }

    #[test]
    fn test_keys_are_scoped_by_algorithm() {
        let mut store = TrustStore::new();
        store.register(TrustedKey::new("k1", "ed25519", "pk", TrustLevel::SignedKnown));

        assert!(store.get("k1", "ed25519").is_some());
        assert!(store.get("k1", "rsa-pss").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_register_replaces_and_remove_clear() {
        let mut store = TrustStore::new();
        store.register(TrustedKey::new("k1", "ed25519", "old", TrustLevel::Untrusted));
        let previous = store.register(TrustedKey::new(
            "k1",
            "ed25519",
            "new",
            TrustLevel::VerifiedInternal,
        ));

        assert_eq!(previous.map(|k| k.public_key), Some("old".to_string()));
        assert_eq!(
            store.get("k1", "ed25519").map(|k| k.trust_level),
            Some(TrustLevel::VerifiedInternal)
        );

        store.register(TrustedKey::new("k2", "ed25519", "pk", TrustLevel::SignedKnown));
        assert!(store.remove("k1", "ed25519").is_some());
        assert_eq!(store.len(), 1);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_trusted_key_from_yaml() {
        let yaml = r#"
- keyId: platform
  algorithm: ed25519
  publicKey: MCowBQYDK2VwAyEA
  owner: platform-team
  trustLevel: verified-internal
- keyId: community
  algorithm: ed25519
  publicKey: MCowBQYDK2VwAyEB
"#;
        let store: TrustStore = serde_yaml_ng::from_str::<Vec<TrustedKey>>(yaml)
            .unwrap()
            .into_iter()
            .collect();

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.get("community", "ed25519").map(|k| k.trust_level),
            Some(TrustLevel::SignedKnown)
        );
        assert_eq!(
            store.get("platform", "ed25519").map(|k| k.owner.as_str()),
            Some("platform-team")
        );
    }
}

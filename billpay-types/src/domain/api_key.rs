//! Wallet credentials.
//!
//! Registration issues one bearer secret per account. Only its SHA-256 hex
//! digest is stored; the raw secret is shown to the caller once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(Uuid);

impl ApiKeyId {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Credential that resolves a bearer token to the wallet it may spend from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    /// Label recorded at registration, usually the account holder's email.
    pub name: String,
    /// Hex SHA-256 of the raw secret. Never leaves the service.
    #[serde(skip_serializing, default)]
    pub key_hash: String,
    pub account_id: AccountId,
    /// Revoked keys stay on record but no longer authenticate.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    /// Set on every request the key authenticates.
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Issues an active, never-used credential for `account_id`.
    pub fn new(name: String, key_hash: String, account_id: AccountId) -> Self {
        Self {
            id: ApiKeyId(Uuid::new_v4()),
            name,
            key_hash,
            account_id,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_key_is_active_and_unused() {
        let account_id = AccountId::new();
        let key = ApiKey::new("ada@example.com".into(), "ab12".into(), account_id);

        assert!(key.is_active);
        assert!(key.last_used_at.is_none());
        assert_eq!(key.account_id, account_id);
    }

    #[test]
    fn test_hash_is_not_serialized() {
        let key = ApiKey::new("ada@example.com".into(), "ab12".into(), AccountId::new());
        let json = serde_json::to_value(&key).unwrap();

        assert!(json.get("key_hash").is_none());
        assert_eq!(json["id"], key.id.to_string());
        assert_eq!(json["name"], "ada@example.com");
    }
}

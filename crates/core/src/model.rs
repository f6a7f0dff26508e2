//! The decrypted vault body: the credential map and the per-credential usage
//! tracking metadata that goes with it. This structure is uniquely
//! owned by whichever `VaultService` currently holds it unlocked; `get`
//! returns a freshly cloned, independently zeroizable copy rather than a
//! shared reference into the live map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use zeroize::Zeroize;

/// A secret's password field: plain bytes that zeroize on drop. Kept
/// separate from `String` so accidental `Display`/logging can't leak it.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretBytes(pub Vec<u8>);

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBytes(..)")
    }
}

impl Drop for SecretBytes {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl SecretBytes {
    #[must_use]
    pub fn as_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct FieldAccessCounts {
    pub password: u64,
    pub username: u64,
    pub notes: u64,
    pub totp: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct UsageRecord {
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub git_repo: Option<String>,
    pub count: u64,
    pub field_access_counts: FieldAccessCounts,
}

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct TotpConfig {
    pub secret: String,
    pub digits: u32,
    pub period_secs: u64,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Credential {
    pub service: String,
    pub username: String,
    pub password: SecretBytes,
    pub category: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub modified_count: u64,
    pub usage_records: BTreeMap<String, UsageRecord>,
    pub totp: Option<TotpConfig>,
}

/// Input for creating a new credential.
#[derive(Clone, Debug)]
pub struct NewCredential {
    pub service: String,
    pub username: String,
    pub password: Vec<u8>,
    pub category: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

/// Distinguishes "leave field unchanged" from "clear it" from "set a new
/// value", which a plain `Option<T>` cannot express for optional fields.
#[derive(Clone, Debug, Default)]
pub enum FieldUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T: Clone> FieldUpdate<T> {
    pub fn apply(&self, existing: &mut Option<T>) {
        match self {
            FieldUpdate::Keep => {}
            FieldUpdate::Clear => *existing = None,
            FieldUpdate::Set(v) => *existing = Some(v.clone()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CredentialUpdate {
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub category: FieldUpdate<String>,
    pub url: FieldUpdate<String>,
    pub notes: FieldUpdate<String>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct VaultBody {
    pub schema_version: u32,
    pub vault_id: String,
    pub audit_enabled: bool,
    pub audit_log_path: Option<String>,
    pub credentials: BTreeMap<String, Credential>,
}

impl VaultBody {
    #[must_use]
    pub fn new(vault_id: String) -> Self {
        Self {
            schema_version: 1,
            vault_id,
            audit_enabled: false,
            audit_log_path: None,
            credentials: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_update_keep_leaves_existing() {
        let mut existing = Some("old".to_string());
        FieldUpdate::Keep.apply(&mut existing);
        assert_eq!(existing, Some("old".to_string()));
    }

    #[test]
    fn field_update_clear_empties() {
        let mut existing = Some("old".to_string());
        FieldUpdate::<String>::Clear.apply(&mut existing);
        assert_eq!(existing, None);
    }

    #[test]
    fn field_update_set_overwrites() {
        let mut existing: Option<String> = None;
        FieldUpdate::Set("new".to_string()).apply(&mut existing);
        assert_eq!(existing, Some("new".to_string()));
    }
}

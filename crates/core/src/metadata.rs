//! Metadata store (C5): the plaintext sidecar file describing audit,
//! keychain, and recovery configuration. Absent or corrupt sidecars are
//! treated as defaults rather than hard errors, since older V1 vaults predate
//! the sidecar's introduction.

use crate::crypto::RecoveryKdfParams;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::OffsetDateTime;

const SIDECAR_VERSION: u32 = 1;

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RecoveryMetadata {
    pub enabled: bool,
    pub version: u32,
    pub passphrase_required: bool,
    pub challenge_positions: Vec<usize>,
    pub kdf_params: RecoveryKdfParams,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct VaultMetadata {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_modified: OffsetDateTime,
    pub keychain_enabled: bool,
    pub audit_enabled: bool,
    /// Present only in "portable" audit-key mode, where the audit HMAC key is
    /// derived from the master password rather than fetched from a keychain.
    pub audit_key_salt: Option<Vec<u8>>,
    pub recovery: Option<RecoveryMetadata>,
}

impl Default for VaultMetadata {
    fn default() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            version: SIDECAR_VERSION,
            created_at: now,
            last_modified: now,
            keychain_enabled: false,
            audit_enabled: false,
            audit_key_salt: None,
            recovery: None,
        }
    }
}

impl VaultMetadata {
    /// Loads the sidecar at `path`, returning a fresh default if it is
    /// absent. Corrupt JSON is treated as absent (a warning is emitted by the
    /// caller) so one damaged sidecar never blocks unlocking the vault it
    /// describes.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                tracing::warn!(path = %path.display(), "sidecar metadata is corrupt, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Atomically rewrites the sidecar: write to a temp file in the same
    /// directory, then rename over the canonical path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut to_save = self.clone();
        to_save.last_modified = OffsetDateTime::now_utc();
        let bytes = serde_json::to_vec_pretty(&to_save)?;

        let tmp_path = {
            let mut p = path.as_os_str().to_owned();
            p.push(".tmp");
            std::path::PathBuf::from(p)
        };
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            use std::io::Write;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_or_default_on_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.enc.meta.json");
        let meta = VaultMetadata::load_or_default(&path);
        assert!(!meta.audit_enabled);
        assert!(!meta.keychain_enabled);
        assert!(meta.recovery.is_none());
    }

    #[test]
    fn save_and_reload_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.enc.meta.json");
        let mut meta = VaultMetadata::default();
        meta.audit_enabled = true;
        meta.keychain_enabled = true;
        meta.save(&path).unwrap();

        let reloaded = VaultMetadata::load_or_default(&path);
        assert!(reloaded.audit_enabled);
        assert!(reloaded.keychain_enabled);
    }

    #[test]
    fn corrupt_json_treated_as_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.enc.meta.json");
        std::fs::write(&path, b"{not valid json").unwrap();
        let meta = VaultMetadata::load_or_default(&path);
        assert!(!meta.audit_enabled);
    }

    #[test]
    fn save_leaves_no_temp_file_behind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.enc.meta.json");
        VaultMetadata::default().save(&path).unwrap();
        let tmp_path = dir.path().join("vault.enc.meta.json.tmp");
        assert!(!tmp_path.exists());
        assert!(path.exists());
    }
}

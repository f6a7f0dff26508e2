//! Storage engine (C4): the on-disk vault envelope
//! format (V1 direct-key, V2 dual-wrapped DEK), the atomic temp/backup/rename
//! save protocol, startup crash rollback, and V1→V2 migration.

use crate::config::StorageConfig;
use crate::crypto::{aead_open, aead_seal, derive_password_key, KeyMaterial, NONCE_LEN};
use crate::error::{Result, WardError};
use crate::keywrap::{unwrap_key, wrap_key, WrappedKey};
use crate::model::VaultBody;
use crate::progress::{NoopProgressSink, ProgressSink};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> std::result::Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Vec<u8>>, D::Error> {
        let opt = Option::<String>::deserialize(d)?;
        opt.map(|s| STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct EnvelopeHeader {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    pub iterations: u32,
    #[serde(with = "b64_opt", default, skip_serializing_if = "Option::is_none")]
    pub wrapped_dek: Option<Vec<u8>>,
    #[serde(with = "b64_opt", default, skip_serializing_if = "Option::is_none")]
    pub wrapped_dek_nonce: Option<Vec<u8>>,
    #[serde(with = "b64_opt", default, skip_serializing_if = "Option::is_none")]
    pub recovery_wrapped_dek: Option<Vec<u8>>,
    #[serde(with = "b64_opt", default, skip_serializing_if = "Option::is_none")]
    pub recovery_wrapped_dek_nonce: Option<Vec<u8>>,
    #[serde(with = "b64_opt", default, skip_serializing_if = "Option::is_none")]
    pub recovery_salt: Option<Vec<u8>>,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Envelope {
    pub metadata: EnvelopeHeader,
    #[serde(with = "b64")]
    pub data: Vec<u8>,
}

/// Stable, non-secret header fields bound as AEAD associated data, so a
/// tampered header (e.g. a downgraded version or swapped salt) is detected
/// even though the header itself is plaintext.
fn header_aad(header: &EnvelopeHeader) -> Vec<u8> {
    let mut aad = Vec::new();
    aad.extend_from_slice(&header.version.to_le_bytes());
    aad.extend_from_slice(&header.salt);
    aad.extend_from_slice(&header.iterations.to_le_bytes());
    aad
}

pub struct LoadedVault {
    pub header: EnvelopeHeader,
    pub body: VaultBody,
    pub data_key: KeyMaterial,
}

/// A vault location opened for business: startup rollback has already run,
/// so every subsequent call observes only the steady-state invariants.
pub struct StorageHandle {
    config: StorageConfig,
}

impl StorageHandle {
    /// Opens the vault location, performing startup rollback first. This is
    /// the single entry point callers should use: they never see the
    /// transient on-disk states directly.
    pub fn open(config: StorageConfig) -> Result<Self> {
        Self::rollback_if_needed(&config)?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.config.vault_path.exists()
    }

    fn temp_path(&self) -> PathBuf {
        let rand_suffix: u32 = {
            let mut b = [0u8; 4];
            let _ = crate::crypto::random_bytes(&mut b);
            u32::from_le_bytes(b)
        };
        let ts = OffsetDateTime::now_utc().unix_timestamp();
        let mut p = self.config.vault_path.as_os_str().to_owned();
        p.push(format!(".tmp.{ts}.{rand_suffix:08x}"));
        PathBuf::from(p)
    }

    /// Scans the directory for leftover `vault.enc.tmp.*` files from an
    /// interrupted save and restores the backup if one exists, per the
    /// startup rollback design in the storage engine's write-path contract.
    fn rollback_if_needed(config: &StorageConfig) -> Result<()> {
        let Some(dir) = config.vault_path.parent() else { return Ok(()) };
        let stem = config.vault_path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let tmp_prefix = format!("{stem}.tmp.");

        let mut leftover_temps = Vec::new();
        if dir.exists() {
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                if let Some(name) = entry.file_name().to_str() {
                    if name.starts_with(&tmp_prefix) {
                        leftover_temps.push(entry.path());
                    }
                }
            }
        }

        if leftover_temps.is_empty() {
            return Ok(());
        }

        let backup_path = config.backup_path();
        if backup_path.exists() {
            tracing::warn!(
                backup = %backup_path.display(),
                "interrupted save detected, restoring vault from backup"
            );
            std::fs::rename(&backup_path, &config.vault_path)?;
        } else {
            tracing::warn!("interrupted save detected with no backup present, discarding temp file");
        }

        for tmp in leftover_temps {
            let _ = std::fs::remove_file(tmp);
        }
        Ok(())
    }

    /// Removes the transient backup file, called after a successful unlock
    /// confirms the canonical file is readable.
    pub fn clear_backup(&self) -> Result<()> {
        let backup_path = self.config.backup_path();
        if backup_path.exists() {
            std::fs::remove_file(backup_path)?;
        }
        Ok(())
    }

    fn read_envelope(&self) -> Result<Envelope> {
        self.check_permissions()?;
        let bytes = std::fs::read(&self.config.vault_path)?;
        serde_json::from_slice(&bytes).map_err(|e| WardError::CorruptEnvelope(e.to_string()))
    }

    #[cfg(unix)]
    fn check_permissions(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(&self.config.vault_path) {
            let mode = meta.permissions().mode() & 0o777;
            if mode & 0o077 != 0 {
                tracing::warn!(mode = format!("{mode:o}"), "vault file permissions are broader than owner-only");
            }
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(&self) -> Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn restrict_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn restrict_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// Decrypts the vault using a password, transparently handling both the
    /// direct-key V1 format and the dual-wrapped-DEK V2 format.
    pub fn load(&self, password: &[u8]) -> Result<LoadedVault> {
        let envelope = self.read_envelope()?;
        let header = envelope.metadata.clone();
        let password_key = derive_password_key(password, &header.salt, header.iterations)?;
        let aad = header_aad(&header);

        let (plaintext, data_key) = match header.version {
            1 => {
                let pt = aead_open(&password_key, &envelope_nonce(&envelope)?, &envelope_ciphertext(&envelope), &aad)?;
                (pt, password_key)
            }
            2 => {
                let wrapped = WrappedKey {
                    ciphertext: header.wrapped_dek.clone().ok_or_else(|| WardError::CorruptEnvelope("missing wrapped_dek".into()))?,
                    nonce: header
                        .wrapped_dek_nonce
                        .clone()
                        .ok_or_else(|| WardError::CorruptEnvelope("missing wrapped_dek_nonce".into()))?,
                };
                let dek = unwrap_key(&password_key, &wrapped, &aad)?;
                let pt = aead_open(&dek, &envelope_nonce(&envelope)?, &envelope_ciphertext(&envelope), &aad)?;
                (pt, dek)
            }
            v => return Err(WardError::UnsupportedVersion(v)),
        };

        let body: VaultBody = serde_json::from_slice(&plaintext)?;
        Ok(LoadedVault { header, body, data_key })
    }

    /// Decrypts a V2 vault directly with an already-unwrapped DEK, bypassing
    /// password derivation. Used by the recovery unlock path.
    pub fn load_with_key(&self, data_key: &KeyMaterial) -> Result<LoadedVault> {
        let envelope = self.read_envelope()?;
        let header = envelope.metadata.clone();
        if header.version != 2 {
            return Err(WardError::UnsupportedVersion(header.version));
        }
        let aad = header_aad(&header);
        let plaintext = aead_open(data_key, &envelope_nonce(&envelope)?, &envelope_ciphertext(&envelope), &aad)?;
        let body: VaultBody = serde_json::from_slice(&plaintext)?;
        Ok(LoadedVault {
            header,
            body,
            data_key: data_key.clone(),
        })
    }

    /// Runs the atomic save protocol: write temp, fsync, round-trip-verify,
    /// rename current to backup, rename temp to current. On any failure
    /// after the first rename, rolls back from the backup.
    pub fn save(&self, header: &EnvelopeHeader, body: &VaultBody, data_key: &KeyMaterial, sink: &dyn ProgressSink) -> Result<()> {
        sink.on_event("atomic_save_started", &[]);

        let mut header = header.clone();
        header.updated_at = OffsetDateTime::now_utc();
        let aad = header_aad(&header);
        let plaintext = serde_json::to_vec(body)?;
        let (nonce, ciphertext) = aead_seal(data_key, &plaintext, &aad)?;
        let data = [nonce, ciphertext].concat();

        let envelope = Envelope { metadata: header.clone(), data };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let temp_path = self.temp_path();
        {
            let mut file = std::fs::File::create(&temp_path)?;
            use std::io::Write;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        Self::restrict_permissions(&temp_path)?;
        sink.on_event("temp_file_created", &[("path", &temp_path.display().to_string())]);

        sink.on_event("verification_started", &[]);
        if let Err(e) = Self::verify_roundtrip(&temp_path, &header, data_key) {
            let _ = std::fs::remove_file(&temp_path);
            sink.on_event("verification_failed", &[]);
            return Err(WardError::VerificationFailed(e.to_string()));
        }
        sink.on_event("verification_passed", &[]);

        let backup_path = self.config.backup_path();
        if self.config.vault_path.exists() {
            sink.on_event(
                "atomic_rename_started",
                &[("old", &self.config.vault_path.display().to_string()), ("new", &backup_path.display().to_string())],
            );
            if let Err(e) = std::fs::rename(&self.config.vault_path, &backup_path) {
                let _ = std::fs::remove_file(&temp_path);
                return Err(WardError::Io(e));
            }
        }

        sink.on_event(
            "atomic_rename_started",
            &[("old", &temp_path.display().to_string()), ("new", &self.config.vault_path.display().to_string())],
        );
        if let Err(e) = std::fs::rename(&temp_path, &self.config.vault_path) {
            sink.on_event("rollback_started", &[]);
            if backup_path.exists() {
                let _ = std::fs::rename(&backup_path, &self.config.vault_path);
            }
            sink.on_event("rollback_completed", &[]);
            return Err(WardError::Io(e));
        }

        sink.on_event("atomic_save_completed", &[]);
        Ok(())
    }

    fn verify_roundtrip(temp_path: &Path, header: &EnvelopeHeader, data_key: &KeyMaterial) -> Result<()> {
        let bytes = std::fs::read(temp_path)?;
        let envelope: Envelope = serde_json::from_slice(&bytes).map_err(|e| WardError::CorruptEnvelope(e.to_string()))?;
        let aad = header_aad(header);
        let _ = aead_open(data_key, &envelope_nonce(&envelope)?, &envelope_ciphertext(&envelope), &aad)?;
        Ok(())
    }

    /// Creates a brand-new V2 envelope with an empty credential map.
    pub fn initialize(&self, header: EnvelopeHeader, body: &VaultBody, data_key: &KeyMaterial) -> Result<()> {
        if self.exists() {
            return Err(WardError::VaultAlreadyExists);
        }
        self.save(&header, body, data_key, &NoopProgressSink)
    }
}

fn envelope_nonce(envelope: &Envelope) -> Result<Vec<u8>> {
    envelope
        .data
        .get(..NONCE_LEN)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| WardError::CorruptEnvelope("ciphertext shorter than nonce".into()))
}

fn envelope_ciphertext(envelope: &Envelope) -> Vec<u8> {
    envelope.data.get(NONCE_LEN..).map(<[u8]>::to_vec).unwrap_or_default()
}

/// Re-derives the current header's associated data for external callers
/// (the service layer) that need to wrap/unwrap a DEK with the same binding
/// used during save.
#[must_use]
pub fn aad_for(header: &EnvelopeHeader) -> Vec<u8> {
    header_aad(header)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::crypto::{derive_password_key, KEY_LEN};
    use crate::keywrap::generate_and_wrap_dek;
    use tempfile::tempdir;

    fn v1_header(salt: &[u8]) -> EnvelopeHeader {
        let now = OffsetDateTime::now_utc();
        EnvelopeHeader {
            version: 1,
            created_at: now,
            updated_at: now,
            salt: salt.to_vec(),
            iterations: crate::crypto::MIN_ITERATIONS,
            wrapped_dek: None,
            wrapped_dek_nonce: None,
            recovery_wrapped_dek: None,
            recovery_wrapped_dek_nonce: None,
            recovery_salt: None,
        }
    }

    #[test]
    fn v1_roundtrip_save_and_load() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("vault.enc"));
        let handle = StorageHandle::open(config).unwrap();

        let salt = vec![7u8; 32];
        let header = v1_header(&salt);
        let password_key = derive_password_key(b"CorrectHorse42!", &salt, header.iterations).unwrap();
        let body = VaultBody::new("vault-1".into());

        handle.initialize(header.clone(), &body, &password_key).unwrap();

        let loaded = handle.load(b"CorrectHorse42!").unwrap();
        assert_eq!(loaded.header.version, 1);
        assert_eq!(loaded.body.vault_id, "vault-1");
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("vault.enc"));
        let handle = StorageHandle::open(config).unwrap();

        let salt = vec![3u8; 32];
        let header = v1_header(&salt);
        let password_key = derive_password_key(b"CorrectHorse42!", &salt, header.iterations).unwrap();
        let body = VaultBody::new("vault-1".into());
        handle.initialize(header, &body, &password_key).unwrap();

        let err = handle.load(b"WrongPassword!").unwrap_err();
        assert!(matches!(err, WardError::AuthenticationFailure));
    }

    #[test]
    fn v2_dual_wrap_roundtrip_both_paths() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::new(dir.path().join("vault.enc"));
        let handle = StorageHandle::open(config).unwrap();

        let salt = vec![1u8; 32];
        let recovery_salt = vec![2u8; 32];
        let mut header = v1_header(&salt);
        header.version = 2;
        header.recovery_salt = Some(recovery_salt);

        let password_key = derive_password_key(b"CorrectHorse42!", &salt, header.iterations).unwrap();
        let recovery_kek = KeyMaterial::random();
        let aad = aad_for(&header);
        let dual = generate_and_wrap_dek(&password_key, &recovery_kek, &aad).unwrap();
        header.wrapped_dek = Some(dual.password_wrap.ciphertext.clone());
        header.wrapped_dek_nonce = Some(dual.password_wrap.nonce.clone());
        header.recovery_wrapped_dek = Some(dual.recovery_wrap.ciphertext.clone());
        header.recovery_wrapped_dek_nonce = Some(dual.recovery_wrap.nonce.clone());

        let body = VaultBody::new("vault-2".into());
        handle.initialize(header, &body, &dual.dek).unwrap();

        let via_password = handle.load(b"CorrectHorse42!").unwrap();
        assert_eq!(via_password.body.vault_id, "vault-2");

        let unwrapped_recovery_dek = {
            let loaded_header = handle.read_envelope().unwrap().metadata;
            let aad = aad_for(&loaded_header);
            let wrapped = WrappedKey {
                ciphertext: loaded_header.recovery_wrapped_dek.unwrap(),
                nonce: loaded_header.recovery_wrapped_dek_nonce.unwrap(),
            };
            unwrap_key(&recovery_kek, &wrapped, &aad).unwrap()
        };
        let via_recovery = handle.load_with_key(&unwrapped_recovery_dek).unwrap();
        assert_eq!(via_recovery.body.vault_id, "vault-2");
    }

    #[test]
    fn tampering_ciphertext_is_detected() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        let config = StorageConfig::new(&vault_path);
        let handle = StorageHandle::open(config).unwrap();

        let salt = vec![9u8; 32];
        let header = v1_header(&salt);
        let password_key = derive_password_key(b"CorrectHorse42!", &salt, header.iterations).unwrap();
        let body = VaultBody::new("vault-1".into());
        handle.initialize(header, &body, &password_key).unwrap();

        let raw = std::fs::read_to_string(&vault_path).unwrap();
        let mut envelope: Envelope = serde_json::from_str(&raw).unwrap();
        envelope.data[NONCE_LEN] ^= 0x01;
        std::fs::write(&vault_path, serde_json::to_vec_pretty(&envelope).unwrap()).unwrap();

        let err = handle.load(b"CorrectHorse42!").unwrap_err();
        assert!(matches!(err, WardError::AuthenticationFailure));
    }

    #[test]
    fn rollback_restores_backup_when_temp_left_behind() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        let config = StorageConfig::new(&vault_path);
        let handle = StorageHandle::open(config.clone()).unwrap();

        let salt = vec![5u8; KEY_LEN];
        let header = v1_header(&salt);
        let password_key = derive_password_key(b"CorrectHorse42!", &salt, header.iterations).unwrap();
        let body = VaultBody::new("vault-1".into());
        handle.initialize(header, &body, &password_key).unwrap();

        // Simulate a crash between the two renames: leave a backup and a
        // stray temp file, remove the canonical file (as if its rename to
        // backup had happened but the temp-to-canonical rename had not).
        std::fs::copy(&vault_path, config.backup_path()).unwrap();
        let fake_temp = {
            let mut p = vault_path.as_os_str().to_owned();
            p.push(".tmp.1.deadbeef");
            std::path::PathBuf::from(p)
        };
        std::fs::write(&fake_temp, b"partial").unwrap();
        std::fs::remove_file(&vault_path).unwrap();

        let reopened = StorageHandle::open(config.clone()).unwrap();
        assert!(reopened.exists());
        assert!(!fake_temp.exists());
        let loaded = reopened.load(b"CorrectHorse42!").unwrap();
        assert_eq!(loaded.body.vault_id, "vault-1");
    }
}

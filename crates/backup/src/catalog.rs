//! Backup catalog (C12): enumerates the vault's automatic and manual
//! on-disk backups, previews their contents without disturbing the
//! canonical vault, and restores one back into place through the same
//! atomic-save protocol that produced it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::OffsetDateTime;
use ward_core::progress::NoopProgressSink;
use ward_core::storage::StorageHandle;
use ward_core::{Result, StorageConfig, WardError};

const MANUAL_SUFFIX: &str = "manual.backup";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupKind {
    /// The single rolling `vault.enc.backup` the atomic-save protocol keeps
    /// around until the next successful unlock.
    Automatic,
    /// A `vault.enc.<timestamp>.manual.backup` taken on explicit request.
    Manual,
}

#[derive(Clone, Debug)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub kind: BackupKind,
    pub modified_at: OffsetDateTime,
}

fn manual_backup_path(vault_path: &Path, timestamp: i64) -> PathBuf {
    let mut name = vault_path.as_os_str().to_owned();
    name.push(format!(".{timestamp}.{MANUAL_SUFFIX}"));
    PathBuf::from(name)
}

fn is_manual_backup(vault_path: &Path, candidate: &Path) -> bool {
    let Some(stem) = vault_path.file_name().and_then(|n| n.to_str()) else { return false };
    let Some(name) = candidate.file_name().and_then(|n| n.to_str()) else { return false };
    let prefix = format!("{stem}.");
    let suffix = format!(".{MANUAL_SUFFIX}");
    name.starts_with(&prefix) && name.ends_with(&suffix) && name.len() > prefix.len() + suffix.len()
}

fn modified_at(path: &Path) -> OffsetDateTime {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(OffsetDateTime::from)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

/// Lists the automatic backup (if one exists) and every manual backup next
/// to `vault_path`, newest first.
///
/// # Errors
/// Returns an error if the enclosing directory cannot be read.
pub fn list_backups(vault_path: &Path) -> Result<Vec<BackupEntry>> {
    let mut entries = Vec::new();

    let config = StorageConfig::new(vault_path.to_path_buf());
    let automatic_path = config.backup_path();
    if automatic_path.exists() {
        entries.push(BackupEntry {
            modified_at: modified_at(&automatic_path),
            kind: BackupKind::Automatic,
            path: automatic_path,
        });
    }

    let Some(dir) = vault_path.parent() else {
        return Ok(entries);
    };
    if dir.exists() {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_manual_backup(vault_path, &path) {
                entries.push(BackupEntry {
                    modified_at: modified_at(&path),
                    kind: BackupKind::Manual,
                    path,
                });
            }
        }
    }

    entries.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
    Ok(entries)
}

/// Copies the current vault file to a new manual backup. The copy is a
/// byte-identical snapshot of the still-encrypted envelope; no password is
/// needed to take one.
///
/// # Errors
/// Returns an error if the vault file does not exist or cannot be copied.
pub fn create_manual_backup(vault_path: &Path) -> Result<PathBuf> {
    if !vault_path.exists() {
        return Err(WardError::CorruptEnvelope(format!("no vault at {}", vault_path.display())));
    }
    #[allow(clippy::cast_possible_wrap)]
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let dest = manual_backup_path(vault_path, timestamp);
    fs::copy(vault_path, &dest)?;
    Ok(dest)
}

/// Decrypts a backup file in memory and returns its credential names,
/// without touching the canonical vault path.
///
/// # Errors
/// Returns an error if the backup is missing, corrupt, or the password is
/// wrong.
pub fn preview_backup(path: &Path, password: &str) -> Result<Vec<String>> {
    let config = StorageConfig::new(path.to_path_buf());
    let handle = StorageHandle::open(config)?;
    let loaded = handle.load(password.as_bytes())?;
    Ok(loaded.body.credentials.keys().cloned().collect())
}

/// Restores a backup into the canonical vault position.
///
/// The backup is decrypted and re-verified first; it is then written back
/// through the normal atomic-save protocol (temp file, fsync, round-trip
/// verify, rename-with-backup) rather than copied byte-for-byte, so a
/// corrupt or truncated backup can never clobber a working vault.
///
/// # Errors
/// Returns an error if the backup cannot be decrypted with `password`, or if
/// the atomic save into `vault_path` fails.
pub fn restore_backup(path: &Path, vault_path: &Path, password: &str) -> Result<()> {
    let source_config = StorageConfig::new(path.to_path_buf());
    let source = StorageHandle::open(source_config)?;
    let loaded = source.load(password.as_bytes())?;

    let dest_config = StorageConfig::new(vault_path.to_path_buf());
    let dest = StorageHandle::open(dest_config)?;
    dest.save(&loaded.header, &loaded.body, &loaded.data_key, &NoopProgressSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use ward_core::model::VaultBody;
    use ward_core::storage::EnvelopeHeader;

    fn init_vault(vault_path: &Path, password: &str) -> ward_core::crypto::KeyMaterial {
        let salt = ward_core::crypto::random_vec(32).unwrap();
        let iterations = ward_core::crypto::DEFAULT_ITERATIONS;
        let key = ward_core::crypto::derive_password_key(password.as_bytes(), &salt, iterations).unwrap();
        let now = time::OffsetDateTime::now_utc();
        let header = EnvelopeHeader {
            version: 1,
            created_at: now,
            updated_at: now,
            salt,
            iterations,
            wrapped_dek: None,
            wrapped_dek_nonce: None,
            recovery_wrapped_dek: None,
            recovery_wrapped_dek_nonce: None,
            recovery_salt: None,
        };
        let body = VaultBody::new("test-vault".into());
        let config = StorageConfig::new(vault_path.to_path_buf());
        let handle = StorageHandle::open(config).unwrap();
        handle.initialize(header, &body, &key).unwrap();
        key
    }

    #[test]
    fn list_backups_finds_manual_and_automatic() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        init_vault(&vault_path, "correct horse battery staple 42!");

        let manual = create_manual_backup(&vault_path).unwrap();
        assert!(manual.exists());

        let config = StorageConfig::new(vault_path.clone());
        fs::copy(&vault_path, config.backup_path()).unwrap();

        let entries = list_backups(&vault_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.kind == BackupKind::Automatic));
        assert!(entries.iter().any(|e| e.kind == BackupKind::Manual));
    }

    #[test]
    fn list_backups_empty_when_none_exist() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        init_vault(&vault_path, "correct horse battery staple 42!");

        let entries = list_backups(&vault_path).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn preview_and_restore_roundtrip() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        init_vault(&vault_path, "correct horse battery staple 42!");

        let manual = create_manual_backup(&vault_path).unwrap();
        let names = preview_backup(&manual, "correct horse battery staple 42!").unwrap();
        assert!(names.is_empty());

        fs::remove_file(&vault_path).unwrap();
        restore_backup(&manual, &vault_path, "correct horse battery staple 42!").unwrap();
        assert!(vault_path.exists());
    }

    #[test]
    fn preview_wrong_password_fails() {
        let dir = tempdir().unwrap();
        let vault_path = dir.path().join("vault.enc");
        init_vault(&vault_path, "correct horse battery staple 42!");
        let manual = create_manual_backup(&vault_path).unwrap();

        let result = preview_backup(&manual, "wrong password");
        assert!(result.is_err());
    }
}

//! Explicit runtime configuration (C14). There is no process-wide mutable
//! configuration state: a `StorageConfig` is built once by the consuming
//! front end and threaded into `VaultService::open`.

use crate::crypto::{DEFAULT_ITERATIONS, MIN_ITERATIONS};
use crate::error::{Result, WardError};
use std::path::PathBuf;

/// Runtime configuration for the storage engine and the vault service that
/// wraps it.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Target PBKDF2 iteration count for new or re-wrapped password keys.
    /// Must be `>= MIN_ITERATIONS`.
    pub target_iterations: u32,

    /// Canonical vault file path.
    pub vault_path: PathBuf,

    /// Audit log file path (sibling of the vault by default).
    pub audit_log_path: PathBuf,
}

impl StorageConfig {
    /// Builds a config from an explicit vault path, defaulting the audit log
    /// path to `audit.log` alongside it and the iteration target to
    /// [`DEFAULT_ITERATIONS`].
    pub fn new(vault_path: impl Into<PathBuf>) -> Self {
        let vault_path = vault_path.into();
        let audit_log_path = vault_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("audit.log");
        Self {
            target_iterations: DEFAULT_ITERATIONS,
            vault_path,
            audit_log_path,
        }
    }

    /// Overrides the iteration target, rejecting values below the floor so
    /// misconfiguration surfaces immediately rather than silently clamping.
    pub fn with_iterations(mut self, iterations: u32) -> Result<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(WardError::CorruptEnvelope(format!(
                "requested iteration target {iterations} is below the minimum {MIN_ITERATIONS}"
            )));
        }
        self.target_iterations = iterations;
        Ok(self)
    }

    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = path.into();
        self
    }

    /// Builds a `StorageConfig` from environment overrides
    /// (`WARD_ITERATIONS`, `WARD_VAULT_PATH`, `WARD_AUDIT_LOG_PATH`), falling
    /// back to `default_vault_path` / its defaults when unset. Read once by
    /// the CLI front end at startup; never consulted again afterward.
    pub fn from_env(default_vault_path: impl Into<PathBuf>) -> Result<Self> {
        let vault_path = std::env::var("WARD_VAULT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_vault_path.into());
        let mut config = Self::new(vault_path);

        if let Ok(audit_path) = std::env::var("WARD_AUDIT_LOG_PATH") {
            config = config.with_audit_log_path(PathBuf::from(audit_path));
        }

        if let Ok(raw) = std::env::var("WARD_ITERATIONS") {
            let iterations: u32 = raw
                .parse()
                .map_err(|_| WardError::CorruptEnvelope(format!("WARD_ITERATIONS is not a valid integer: {raw}")))?;
            config = config.with_iterations(iterations)?;
        }

        Ok(config)
    }

    #[must_use]
    pub fn sidecar_path(&self) -> PathBuf {
        let mut path = self.vault_path.clone().into_os_string();
        path.push(".meta.json");
        PathBuf::from(path)
    }

    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        let mut path = self.vault_path.clone().into_os_string();
        path.push(".backup");
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn new_derives_sidecar_and_backup_and_default_audit_path() {
        let cfg = StorageConfig::new("/tmp/example/vault.enc");
        assert_eq!(cfg.sidecar_path(), PathBuf::from("/tmp/example/vault.enc.meta.json"));
        assert_eq!(cfg.backup_path(), PathBuf::from("/tmp/example/vault.enc.backup"));
        assert_eq!(cfg.audit_log_path, PathBuf::from("/tmp/example/audit.log"));
        assert_eq!(cfg.target_iterations, DEFAULT_ITERATIONS);
    }

    #[test]
    fn with_iterations_rejects_below_floor() {
        let cfg = StorageConfig::new("/tmp/v.enc");
        assert!(cfg.with_iterations(10).is_err());
    }

    #[test]
    fn with_iterations_accepts_floor_and_above() {
        let cfg = StorageConfig::new("/tmp/v.enc").with_iterations(MIN_ITERATIONS).unwrap();
        assert_eq!(cfg.target_iterations, MIN_ITERATIONS);
    }
}

//! Vault service (C7): orchestrates crypto, key-wrap, recovery, storage,
//! metadata, and audit into the public operations a front end calls.

use crate::audit::{AuditKeySource, AuditLogger};
use crate::config::StorageConfig;
use crate::crypto::{derive_password_key, KeyMaterial, RecoveryKdfParams, DEFAULT_ITERATIONS};
use crate::error::{Result, WardError};
use crate::keywrap::{generate_and_wrap_dek, unwrap_key, wrap_key, WrappedKey};
use crate::metadata::{RecoveryMetadata, VaultMetadata};
use crate::model::{Credential, CredentialUpdate, FieldAccessCounts, NewCredential, UsageRecord, VaultBody};
use crate::pathutil::current_location;
use crate::policy::PasswordPolicy;
use crate::rate_limit::RateLimiter;
use crate::recovery::{self};
use crate::secret_store::SecretStore;
use crate::storage::{aad_for, EnvelopeHeader, StorageHandle};
use bip39::Mnemonic;
use std::sync::Arc;
use time::OffsetDateTime;

/// How an audit key should be sourced, decided once at vault creation and
/// recorded in the sidecar, never re-decided on later unlocks.
#[derive(Clone, Copy, Debug)]
pub struct AuditOptions {
    pub enabled: bool,
    /// When true, the audit key is derived from the master password with a
    /// dedicated salt (portable across machines). When false, it is stored
    /// in the OS secret store keyed by vault id.
    pub portable: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self { enabled: false, portable: true }
    }
}

pub struct RemovalReport {
    pub vault_removed: bool,
    pub sidecar_removed: bool,
    pub audit_log_removed: bool,
    pub keychain_entry_removed: bool,
    pub directory_removed: bool,
}

struct UnlockedState {
    header: EnvelopeHeader,
    body: VaultBody,
    data_key: KeyMaterial,
    unlocked_via_recovery: bool,
    audit: Option<AuditLogger>,
}

pub struct VaultService {
    config: StorageConfig,
    handle: StorageHandle,
    secret_store: Option<Arc<dyn SecretStore>>,
    policy: PasswordPolicy,
    rate_limiter: RateLimiter,
    state: Option<UnlockedState>,
}

impl VaultService {
    /// Opens the vault location (running startup rollback) without
    /// unlocking it.
    pub fn open(config: StorageConfig, secret_store: Option<Arc<dyn SecretStore>>) -> Result<Self> {
        let handle = StorageHandle::open(config.clone())?;
        Ok(Self {
            config,
            handle,
            secret_store,
            policy: PasswordPolicy::default(),
            rate_limiter: RateLimiter::default(),
            state: None,
        })
    }

    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.state.is_some()
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.handle.exists()
    }

    fn vault_id_hint(&self) -> String {
        self.config.vault_path.display().to_string()
    }

    fn sidecar(&self) -> VaultMetadata {
        VaultMetadata::load_or_default(&self.config.sidecar_path())
    }

    fn check_policy(&mut self, password: &str) -> Result<()> {
        if let Some(wait) = self.rate_limiter.check() {
            return Err(WardError::RateLimited { retry_after_secs: wait.as_secs() });
        }
        match self.policy.validate(password) {
            Ok(()) => {
                self.rate_limiter.reset();
                Ok(())
            }
            Err(e) => {
                self.rate_limiter.record_failure();
                Err(e)
            }
        }
    }

    /// Resolves the audit key source for a brand-new vault and opens the
    /// logger. Returns the salt actually used (so the caller can persist the
    /// exact value needed to re-derive the same key on a later unlock) along
    /// with the logger itself.
    fn resolve_audit_logger(
        &self,
        options: AuditOptions,
        password: &[u8],
    ) -> (Option<AuditLogger>, Option<Vec<u8>>) {
        if !options.enabled {
            return (None, None);
        }
        let key_source = if options.portable {
            let salt = match crate::crypto::random_vec(32) {
                Ok(s) => s,
                Err(_) => return (None, None),
            };
            AuditKeySource::from_password(password, &salt).ok().map(|s| (s, Some(salt)))
        } else if let Some(store) = &self.secret_store {
            AuditKeySource::from_keychain(store.as_ref(), &self.vault_id_hint()).ok().map(|s| (s, None))
        } else {
            tracing::warn!("keychain-backed audit requested but no secret store is configured, disabling audit");
            None
        };

        match key_source {
            Some((source, salt)) => {
                let logger = AuditLogger::open(self.config.audit_log_path.clone(), source.key().clone()).ok();
                (logger, salt)
            }
            None => (None, None),
        }
    }

    fn reopen_audit_logger(&self, sidecar: &VaultMetadata, password: &[u8]) -> Option<AuditLogger> {
        if !sidecar.audit_enabled {
            return None;
        }
        let key_source = if let Some(salt) = &sidecar.audit_key_salt {
            AuditKeySource::from_password(password, salt).ok()
        } else if let Some(store) = &self.secret_store {
            AuditKeySource::from_keychain(store.as_ref(), &self.vault_id_hint()).ok()
        } else {
            None
        };
        key_source.and_then(|source| AuditLogger::open(self.config.audit_log_path.clone(), source.key().clone()).ok())
    }

    /// Creates a brand-new V2 vault with no recovery configured.
    pub fn initialize(&mut self, password: &str, enable_keychain: bool, audit: AuditOptions) -> Result<()> {
        self.initialize_internal(password, enable_keychain, audit, None).map(|_| ())
    }

    /// Creates a brand-new V2 vault with recovery provisioned, returning the
    /// 24-word mnemonic exactly once.
    pub fn initialize_with_recovery(
        &mut self,
        password: &str,
        enable_keychain: bool,
        audit: AuditOptions,
        passphrase: Option<&str>,
    ) -> Result<String> {
        let mnemonic = self.initialize_internal(password, enable_keychain, audit, passphrase)?;
        mnemonic.ok_or_else(|| WardError::InvalidCredential("recovery provisioning failed".into()))
    }

    fn initialize_internal(
        &mut self,
        password: &str,
        enable_keychain: bool,
        audit: AuditOptions,
        recovery_passphrase: Option<&str>,
    ) -> Result<Option<String>> {
        if self.handle.exists() {
            return Err(WardError::VaultAlreadyExists);
        }
        self.policy.validate(password)?;

        let salt = crate::crypto::random_vec(32)?;
        let now = OffsetDateTime::now_utc();
        let mut header = EnvelopeHeader {
            version: 2,
            created_at: now,
            updated_at: now,
            salt: salt.clone(),
            iterations: DEFAULT_ITERATIONS,
            wrapped_dek: None,
            wrapped_dek_nonce: None,
            recovery_wrapped_dek: None,
            recovery_wrapped_dek_nonce: None,
            recovery_salt: None,
        };

        let password_key = derive_password_key(password.as_bytes(), &salt, header.iterations)?;

        // Every vault is created on the V2 dual-KEK format; `initialize`
        // simply discards the returned phrase while
        // `initialize_with_recovery` surfaces it, rather than maintaining
        // two separate on-disk V2 variants.
        let mnemonic = recovery::generate_mnemonic()?;
        let recovery_salt = crate::crypto::random_vec(32)?;
        let kdf_params = RecoveryKdfParams {
            salt: recovery_salt.clone(),
            ..RecoveryKdfParams::generate()
        };
        let recovery_kek = recovery::derive_recovery_kek(&mnemonic, recovery_passphrase, &kdf_params)?;
        header.recovery_salt = Some(recovery_salt);

        let aad = aad_for(&header);
        let dual = generate_and_wrap_dek(&password_key, &recovery_kek, &aad)?;
        header.wrapped_dek = Some(dual.password_wrap.ciphertext);
        header.wrapped_dek_nonce = Some(dual.password_wrap.nonce);
        header.recovery_wrapped_dek = Some(dual.recovery_wrap.ciphertext);
        header.recovery_wrapped_dek_nonce = Some(dual.recovery_wrap.nonce);

        let positions = recovery::select_challenge_positions()?;
        let recovery_meta = RecoveryMetadata {
            enabled: true,
            version: 1,
            passphrase_required: recovery_passphrase.is_some(),
            challenge_positions: positions,
            kdf_params,
        };
        let data_key = dual.dek;

        let vault_id = uuid::Uuid::new_v4().to_string();
        let mut body = VaultBody::new(vault_id);
        body.audit_enabled = audit.enabled;

        self.handle.initialize(header.clone(), &body, &data_key)?;

        let (logger, audit_key_salt) = self.resolve_audit_logger(audit, password.as_bytes());
        if let Some(logger) = &logger {
            logger.log_or_warn("vault_unlock", "success", None);
        }

        let mut sidecar = VaultMetadata::default();
        sidecar.keychain_enabled = enable_keychain;
        sidecar.audit_enabled = audit.enabled;
        sidecar.recovery = Some(recovery_meta);
        sidecar.audit_key_salt = audit_key_salt;
        sidecar.save(&self.config.sidecar_path())?;

        if enable_keychain {
            if let Some(store) = &self.secret_store {
                let _ = store.store(&self.vault_id_hint(), password.as_bytes());
            }
        }

        self.state = Some(UnlockedState {
            header,
            body,
            data_key,
            unlocked_via_recovery: false,
            audit: logger,
        });

        Ok(Some(mnemonic.to_string()))
    }

    /// Unlocks with the master password, running sidecar convergence and
    /// backup cleanup as described in the storage engine's startup contract.
    pub fn unlock(&mut self, password: &str) -> Result<()> {
        let loaded = self.handle.load(password.as_bytes())?;
        self.handle.clear_backup()?;

        let mut sidecar = self.sidecar();
        if sidecar.audit_enabled != loaded.body.audit_enabled {
            sidecar.audit_enabled = loaded.body.audit_enabled;
            let _ = sidecar.save(&self.config.sidecar_path());
        }

        let audit = self.reopen_audit_logger(&sidecar, password.as_bytes());
        if let Some(logger) = &audit {
            logger.log_or_warn("vault_unlock", "success", None);
        }

        self.state = Some(UnlockedState {
            header: loaded.header,
            body: loaded.body,
            data_key: loaded.data_key,
            unlocked_via_recovery: false,
            audit,
        });
        Ok(())
    }

    /// Unlocks using the OS secret store instead of a typed password.
    pub fn unlock_with_keychain(&mut self) -> Result<()> {
        let sidecar = self.sidecar();
        if !sidecar.keychain_enabled {
            return Err(WardError::SecretStoreUnavailable("keychain is not enabled for this vault".into()));
        }
        let store = self
            .secret_store
            .clone()
            .ok_or_else(|| WardError::SecretStoreUnavailable("no secret store configured".into()))?;
        let password = store
            .retrieve(&self.vault_id_hint())?
            .ok_or_else(|| WardError::SecretStoreUnavailable("no password stored in keychain".into()))?;
        let password = String::from_utf8(password).map_err(|_| WardError::AuthenticationFailure)?;
        self.unlock(&password)
    }

    /// Unlocks via a recovery mnemonic, retaining the DEK so a subsequent
    /// `set_password_after_recovery` call can re-wrap the password side.
    pub fn recover_with_mnemonic(&mut self, phrase: &str, passphrase: Option<&str>) -> Result<()> {
        let mnemonic: Mnemonic = recovery::parse_mnemonic(phrase)?;
        let sidecar = self.sidecar();
        let recovery_meta = sidecar.recovery.clone().ok_or(WardError::RecoveryNotConfigured)?;

        // Header fields are plaintext, so they can be read before the DEK is
        // known; this gives us the AAD and wrapped-DEK fields needed to
        // unwrap with the recovery KEK.
        let envelope_header = self.peek_header()?;

        let recovery_kek = recovery::derive_recovery_kek(&mnemonic, passphrase, &recovery_meta.kdf_params)?;
        let aad = aad_for(&envelope_header);
        let wrapped = WrappedKey {
            ciphertext: envelope_header.recovery_wrapped_dek.clone().ok_or(WardError::RecoveryNotConfigured)?,
            nonce: envelope_header.recovery_wrapped_dek_nonce.clone().ok_or(WardError::RecoveryNotConfigured)?,
        };
        let dek = unwrap_key(&recovery_kek, &wrapped, &aad)?;
        let loaded = self.handle.load_with_key(&dek)?;
        self.handle.clear_backup()?;

        self.state = Some(UnlockedState {
            header: loaded.header,
            body: loaded.body,
            data_key: loaded.data_key,
            unlocked_via_recovery: true,
            audit: None,
        });
        Ok(())
    }

    fn peek_header(&self) -> Result<EnvelopeHeader> {
        // The storage handle only exposes full decrypt paths; a header-only
        // peek reads and parses the envelope file directly here since header
        // fields are plaintext.
        let bytes = std::fs::read(&self.config.vault_path)?;
        #[derive(serde::Deserialize)]
        struct Peek {
            metadata: EnvelopeHeader,
        }
        let peek: Peek = serde_json::from_slice(&bytes).map_err(|e| WardError::CorruptEnvelope(e.to_string()))?;
        Ok(peek.metadata)
    }

    /// Locks the vault, zeroizing the in-memory DEK and credential map.
    pub fn lock(&mut self) -> Result<()> {
        if let Some(state) = self.state.take() {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("vault_lock", "success", None);
            }
        }
        Ok(())
    }

    fn require_unlocked(&mut self) -> Result<&mut UnlockedState> {
        self.state.as_mut().ok_or(WardError::VaultLocked)
    }

    fn save_state(&mut self) -> Result<()> {
        let state = self.state.as_ref().ok_or(WardError::VaultLocked)?;
        let sink: &dyn crate::progress::ProgressSink = state
            .audit
            .as_ref()
            .map(|a| a as &dyn crate::progress::ProgressSink)
            .unwrap_or(&crate::progress::NoopProgressSink);
        self.handle.save(&state.header, &state.body, &state.data_key, sink)
    }

    /// Changes the master password. For V2 vaults only the password-side
    /// DEK wrapping is re-done; the recovery wrapping, and therefore any
    /// existing mnemonic, remains valid.
    pub fn change_password(&mut self, new_password: &str) -> Result<()> {
        self.policy.validate(new_password)?;
        let state = self.require_unlocked()?;

        let salt = crate::crypto::random_vec(32)?;
        let mut header = state.header.clone();
        header.salt = salt.clone();
        header.iterations = DEFAULT_ITERATIONS;
        let new_password_key = derive_password_key(new_password.as_bytes(), &salt, header.iterations)?;
        let aad = aad_for(&header);
        let wrapped = wrap_key(&new_password_key, &state.data_key, &aad)?;
        header.wrapped_dek = Some(wrapped.ciphertext);
        header.wrapped_dek_nonce = Some(wrapped.nonce);
        state.header = header;

        self.save_state()?;
        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("vault_password_change", "success", None);
            }
        }
        Ok(())
    }

    /// Only valid immediately after a recovery unlock: wraps the retained
    /// DEK under a freshly derived password KEK.
    pub fn set_password_after_recovery(&mut self, new_password: &str) -> Result<()> {
        self.policy.validate(new_password)?;
        {
            let state = self.state.as_ref().ok_or(WardError::VaultLocked)?;
            if !state.unlocked_via_recovery {
                return Err(WardError::NotUnlockedViaRecovery);
            }
        }
        self.change_password(new_password)?;
        if let Some(state) = &mut self.state {
            state.unlocked_via_recovery = false;
        }
        Ok(())
    }

    /// Upgrades a V1 vault to the V2 dual-wrapped-DEK format, provisioning
    /// recovery. The whole operation is a single atomic save: on crash,
    /// startup rollback restores the original V1 file untouched.
    ///
    /// No password re-entry is needed: a V1 vault's "data key" already *is*
    /// the password-derived key for the stored salt and iteration count, so
    /// it doubles as the password KEK used to wrap the freshly generated
    /// V2 DEK under the same salt.
    pub fn migrate_to_v2(&mut self, passphrase: Option<&str>) -> Result<String> {
        {
            let state = self.state.as_ref().ok_or(WardError::VaultLocked)?;
            if state.header.version != 1 {
                return Err(WardError::InvalidCredential("vault is not in V1 format".into()));
            }
        }

        let mnemonic = recovery::generate_mnemonic()?;
        let recovery_salt = crate::crypto::random_vec(32)?;
        let kdf_params = RecoveryKdfParams {
            salt: recovery_salt.clone(),
            ..RecoveryKdfParams::generate()
        };
        let recovery_kek = recovery::derive_recovery_kek(&mnemonic, passphrase, &kdf_params)?;
        let positions = recovery::select_challenge_positions()?;

        let state = self.state.as_mut().ok_or(WardError::VaultLocked)?;
        let password_kek = state.data_key.clone();
        let mut new_header = state.header.clone();
        new_header.version = 2;
        new_header.recovery_salt = Some(recovery_salt);

        let aad = aad_for(&new_header);
        let dual = generate_and_wrap_dek(&password_kek, &recovery_kek, &aad)?;
        new_header.wrapped_dek = Some(dual.password_wrap.ciphertext);
        new_header.wrapped_dek_nonce = Some(dual.password_wrap.nonce);
        new_header.recovery_wrapped_dek = Some(dual.recovery_wrap.ciphertext);
        new_header.recovery_wrapped_dek_nonce = Some(dual.recovery_wrap.nonce);

        state.header = new_header;
        state.data_key = dual.dek;
        self.save_state()?;

        let mut sidecar = self.sidecar();
        sidecar.recovery = Some(RecoveryMetadata {
            enabled: true,
            version: 1,
            passphrase_required: passphrase.is_some(),
            challenge_positions: positions,
            kdf_params,
        });
        sidecar.save(&self.config.sidecar_path())?;

        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("vault_migrate", "success", None);
            }
        }

        Ok(mnemonic.to_string())
    }

    pub fn list_credentials(&self) -> Result<Vec<String>> {
        let state = self.state.as_ref().ok_or(WardError::VaultLocked)?;
        Ok(state.body.credentials.keys().cloned().collect())
    }

    pub fn add_credential(&mut self, new: NewCredential) -> Result<()> {
        let state = self.require_unlocked()?;
        if state.body.credentials.contains_key(&new.service) {
            return Err(WardError::DuplicateCredential(new.service));
        }
        let now = OffsetDateTime::now_utc();
        let credential = Credential {
            service: new.service.clone(),
            username: new.username,
            password: crate::model::SecretBytes(new.password),
            category: new.category,
            url: new.url,
            notes: new.notes,
            created_at: now,
            updated_at: now,
            modified_count: 0,
            usage_records: Default::default(),
            totp: None,
        };
        state.body.credentials.insert(new.service.clone(), credential);
        self.save_state()?;
        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("credential_add", "success", Some(&new.service));
            }
        }
        Ok(())
    }

    /// Returns an owned copy of the credential and records a usage access
    /// against the current working directory.
    pub fn get_credential(&mut self, service: &str) -> Result<Credential> {
        let location = current_location().map(|p| p.display().to_string()).unwrap_or_default();
        let state = self.require_unlocked()?;
        let credential = state
            .body
            .credentials
            .get(service)
            .cloned()
            .ok_or_else(|| WardError::CredentialNotFound(service.to_string()))?;

        if let Some(cred) = state.body.credentials.get_mut(service) {
            let record = cred.usage_records.entry(location.clone()).or_insert_with(|| UsageRecord {
                location: location.clone(),
                timestamp: OffsetDateTime::now_utc(),
                git_repo: None,
                count: 0,
                field_access_counts: FieldAccessCounts::default(),
            });
            record.count += 1;
            record.field_access_counts.password += 1;
            record.timestamp = OffsetDateTime::now_utc();
        }

        self.save_state()?;
        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("credential_access", "success", Some(service));
            }
        }
        Ok(credential)
    }

    pub fn update_credential(&mut self, service: &str, update: CredentialUpdate) -> Result<()> {
        let state = self.require_unlocked()?;
        let credential = state
            .body
            .credentials
            .get_mut(service)
            .ok_or_else(|| WardError::CredentialNotFound(service.to_string()))?;

        if let Some(username) = update.username {
            credential.username = username;
        }
        if let Some(password) = update.password {
            credential.password = crate::model::SecretBytes(password);
        }
        update.category.apply(&mut credential.category);
        update.url.apply(&mut credential.url);
        update.notes.apply(&mut credential.notes);
        credential.updated_at = OffsetDateTime::now_utc();
        credential.modified_count += 1;

        self.save_state()?;
        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("credential_update", "success", Some(service));
            }
        }
        Ok(())
    }

    pub fn delete_credential(&mut self, service: &str) -> Result<()> {
        let state = self.require_unlocked()?;
        if state.body.credentials.remove(service).is_none() {
            return Err(WardError::CredentialNotFound(service.to_string()));
        }
        self.save_state()?;
        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("credential_delete", "success", Some(service));
            }
        }
        Ok(())
    }

    /// Deletes the vault file, sidecar, audit log, and keychain entry.
    /// `remove_all` additionally removes the enclosing directory.
    pub fn remove_vault(&mut self, force: bool, remove_all: bool) -> Result<RemovalReport> {
        if let Some(state) = &self.state {
            if let Some(logger) = &state.audit {
                logger.log_or_warn("vault_remove", "attempt", None);
            }
        }

        let mut report = RemovalReport {
            vault_removed: false,
            sidecar_removed: false,
            audit_log_removed: false,
            keychain_entry_removed: false,
            directory_removed: false,
        };

        match std::fs::remove_file(&self.config.vault_path) {
            Ok(()) => report.vault_removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) if force => {
                tracing::warn!(error = %e, "ignoring vault removal error because force=true");
            }
            Err(e) => return Err(WardError::Io(e)),
        }

        let sidecar_path = self.config.sidecar_path();
        if sidecar_path.exists() {
            std::fs::remove_file(&sidecar_path)?;
            report.sidecar_removed = true;
        }

        if self.config.audit_log_path.exists() {
            std::fs::remove_file(&self.config.audit_log_path)?;
            report.audit_log_removed = true;
        }

        if let Some(store) = &self.secret_store {
            if store.delete(&self.vault_id_hint()).is_ok() {
                report.keychain_entry_removed = true;
            }
        }

        if remove_all {
            if let Some(dir) = self.config.vault_path.parent() {
                if std::fs::remove_dir_all(dir).is_ok() {
                    report.directory_removed = true;
                }
            }
        }

        self.state = None;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::secret_store::MemorySecretStore;
    use tempfile::tempdir;

    fn service(dir: &std::path::Path) -> VaultService {
        let config = StorageConfig::new(dir.join("vault.enc"));
        VaultService::open(config, Some(Arc::new(MemorySecretStore::default()))).unwrap()
    }

    #[test]
    fn initialize_then_unlock_roundtrip() {
        let dir = tempdir().unwrap();
        let mut svc = service(dir.path());
        svc.initialize("CorrectHorse42!", false, AuditOptions::default()).unwrap();
        assert!(svc.is_unlocked());
        svc.lock().unwrap();
        assert!(!svc.is_unlocked());
        svc.unlock("CorrectHorse42!").unwrap();
        assert!(svc.is_unlocked());
    }

    #[test]
    fn add_and_get_credential() {
        let dir = tempdir().unwrap();
        let mut svc = service(dir.path());
        svc.initialize("CorrectHorse42!", false, AuditOptions::default()).unwrap();
        svc.add_credential(NewCredential {
            service: "github".into(),
            username: "u@x".into(),
            password: b"p@ss1234AB!".to_vec(),
            category: None,
            url: None,
            notes: None,
        })
        .unwrap();

        let cred = svc.get_credential("github").unwrap();
        assert_eq!(cred.password.as_str(), "p@ss1234AB!");
        assert_eq!(cred.created_at, cred.updated_at);
    }

    #[test]
    fn duplicate_credential_rejected() {
        let dir = tempdir().unwrap();
        let mut svc = service(dir.path());
        svc.initialize("CorrectHorse42!", false, AuditOptions::default()).unwrap();
        let new = NewCredential {
            service: "github".into(),
            username: "u".into(),
            password: b"pw".to_vec(),
            category: None,
            url: None,
            notes: None,
        };
        svc.add_credential(new.clone()).unwrap();
        assert!(matches!(svc.add_credential(new), Err(WardError::DuplicateCredential(_))));
    }

    #[test]
    fn recovery_unlock_and_password_reset() {
        let dir = tempdir().unwrap();
        let mut svc = service(dir.path());
        let mnemonic = svc
            .initialize_with_recovery("CorrectHorse42!", false, AuditOptions::default(), None)
            .unwrap();
        svc.lock().unwrap();

        svc.recover_with_mnemonic(&mnemonic, None).unwrap();
        assert!(svc.is_unlocked());
        svc.set_password_after_recovery("NewStr0ng!Pass").unwrap();
        svc.lock().unwrap();

        assert!(svc.unlock("NewStr0ng!Pass").is_ok());
        svc.lock().unwrap();
        assert!(svc.unlock("CorrectHorse42!").is_err());
    }

    #[test]
    fn operations_require_unlock() {
        let dir = tempdir().unwrap();
        let mut svc = service(dir.path());
        svc.initialize("CorrectHorse42!", false, AuditOptions::default()).unwrap();
        svc.lock().unwrap();
        assert!(matches!(svc.list_credentials(), Err(WardError::VaultLocked)));
    }
}

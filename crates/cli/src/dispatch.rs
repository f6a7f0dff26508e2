use crate::{BackupCommand, Cli, Commands, VaultCommand};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use ward_core::secret_store::NullSecretStore;
use ward_core::{
    AuditOptions, CredentialUpdate, FieldUpdate, NewCredential, PasswordPolicy, Result, StorageConfig, VaultService,
    WardError,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn default_vault_path() -> PathBuf {
    ward_core::pathutil::expand_home("~/.ward/vault.enc")
}

fn resolve_config(cli: &Cli) -> Result<StorageConfig> {
    let fallback = cli.vault_path.clone().unwrap_or_else(default_vault_path);
    StorageConfig::from_env(fallback)
}

fn prompt_password(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).map_err(WardError::Io)
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush().map_err(WardError::Io)?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line).map_err(WardError::Io)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Maps a [`WardError`] to the exit code families of the CLI surface:
/// 1 user/validation error, 2 I/O/environment error, 3 missing
/// keychain/audit-key material.
fn exit_code_for(err: &WardError) -> u8 {
    match err {
        WardError::AuthenticationFailure
        | WardError::PolicyViolation(_)
        | WardError::RateLimited { .. }
        | WardError::DuplicateCredential(_)
        | WardError::CredentialNotFound(_)
        | WardError::InvalidCredential(_)
        | WardError::VaultLocked
        | WardError::VaultAlreadyExists
        | WardError::InvalidMnemonic
        | WardError::ChallengeMismatch
        | WardError::RecoveryNotConfigured
        | WardError::NotUnlockedViaRecovery => 1,
        WardError::SecretStoreUnavailable(_) | WardError::AuditLogFailure(_) => 3,
        WardError::Io(_)
        | WardError::CorruptEnvelope(_)
        | WardError::UnsupportedVersion(_)
        | WardError::VerificationFailed(_)
        | WardError::MigrationInterrupted(_)
        | WardError::PermissionsTooOpen
        | WardError::Serialization(_) => 2,
    }
}

/// Parses and dispatches a [`Cli`] invocation, returning the process exit
/// code (0 on success).
#[must_use]
pub fn run(cli: Cli) -> u8 {
    init_tracing();
    tracing::debug!(command = ?cli.command, "dispatching command");
    match dispatch(&cli) {
        Ok(()) => 0,
        Err(e) => {
            tracing::warn!(error = %e, "command failed");
            eprintln!("error: {e}");
            exit_code_for(&e)
        }
    }
}

fn open_service(config: StorageConfig) -> Result<VaultService> {
    VaultService::open(config, Some(Arc::new(NullSecretStore)))
}

fn dispatch(cli: &Cli) -> Result<()> {
    let config = resolve_config(cli)?;

    match &cli.command {
        Commands::Init { keychain, audit, keychain_audit, recovery_passphrase } => {
            cmd_init(config, *keychain, *audit, *keychain_audit, *recovery_passphrase)
        }
        Commands::Unlock => cmd_unlock(config),
        Commands::Add { service, username, category, url, notes } => {
            cmd_add(config, service, username, category.clone(), url.clone(), notes.clone())
        }
        Commands::Get { service } => cmd_get(config, service),
        Commands::List => cmd_list(config),
        Commands::Update { service, username, set_password, category, clear_category, url, clear_url, notes, clear_notes } => {
            cmd_update(
                config,
                service,
                username.clone(),
                *set_password,
                field_update(category.clone(), *clear_category),
                field_update(url.clone(), *clear_url),
                field_update(notes.clone(), *clear_notes),
            )
        }
        Commands::Delete { service } => cmd_delete(config, service),
        Commands::ChangePassword { recover } => cmd_change_password(config, *recover),
        Commands::VerifyAudit => cmd_verify_audit(&config),
        Commands::Vault(VaultCommand::Migrate { recovery_passphrase }) => cmd_migrate(config, *recovery_passphrase),
        Commands::Vault(VaultCommand::Backup { command }) => cmd_backup(&config, command),
        Commands::Vault(VaultCommand::Remove { force, remove_all, yes }) => cmd_remove(config, *force, *remove_all, *yes),
    }
}

fn field_update(value: Option<String>, clear: bool) -> FieldUpdate<String> {
    match (value, clear) {
        (_, true) => FieldUpdate::Clear,
        (Some(v), false) => FieldUpdate::Set(v),
        (None, false) => FieldUpdate::Keep,
    }
}

fn cmd_init(config: StorageConfig, keychain: bool, audit: bool, keychain_audit: bool, recovery_passphrase: bool) -> Result<()> {
    let mut service = open_service(config)?;
    if service.exists() {
        return Err(WardError::VaultAlreadyExists);
    }

    let password = prompt_password("master password: ")?;
    let confirm_pw = prompt_password("confirm master password: ")?;
    if password != confirm_pw {
        return Err(WardError::PolicyViolation("passwords did not match".into()));
    }

    match PasswordPolicy::default().strength(&password) {
        ward_core::Strength::Weak => println!("password strength: weak"),
        ward_core::Strength::Medium => println!("password strength: medium"),
        ward_core::Strength::Strong => println!("password strength: strong"),
    }

    let passphrase = if recovery_passphrase { Some(prompt_password("recovery passphrase: ")?) } else { None };
    let audit_options = AuditOptions { enabled: audit, portable: !keychain_audit };

    let mnemonic = service.initialize_with_recovery(&password, keychain, audit_options, passphrase.as_deref())?;
    println!("vault created.");
    println!();
    println!("recovery phrase (write this down, it will not be shown again):");
    println!("  {mnemonic}");
    Ok(())
}

fn cmd_unlock(config: StorageConfig) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    println!("unlocked.");
    Ok(())
}

fn cmd_add(
    config: StorageConfig,
    service_name: &str,
    username: &str,
    category: Option<String>,
    url: Option<String>,
    notes: Option<String>,
) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    let secret = prompt_password("credential value: ")?;
    service.add_credential(NewCredential {
        service: service_name.to_string(),
        username: username.to_string(),
        password: secret.into_bytes(),
        category,
        url,
        notes,
    })?;
    println!("'{service_name}' added.");
    Ok(())
}

fn cmd_get(config: StorageConfig, service_name: &str) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    let credential = service.get_credential(service_name)?;
    println!("service:  {}", credential.service);
    println!("username: {}", credential.username);
    println!("password: {}", credential.password.as_str());
    if let Some(category) = &credential.category {
        println!("category: {category}");
    }
    if let Some(url) = &credential.url {
        println!("url:      {url}");
    }
    if let Some(notes) = &credential.notes {
        println!("notes:    {notes}");
    }
    Ok(())
}

fn cmd_list(config: StorageConfig) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    let names = service.list_credentials()?;
    if names.is_empty() {
        println!("no credentials stored.");
        return Ok(());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_update(
    config: StorageConfig,
    service_name: &str,
    username: Option<String>,
    set_password: bool,
    category: FieldUpdate<String>,
    url: FieldUpdate<String>,
    notes: FieldUpdate<String>,
) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    let new_secret = if set_password { Some(prompt_password("new credential value: ")?.into_bytes()) } else { None };
    service.update_credential(
        service_name,
        CredentialUpdate { username, password: new_secret, category, url, notes },
    )?;
    println!("'{service_name}' updated.");
    Ok(())
}

fn cmd_delete(config: StorageConfig, service_name: &str) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    service.delete_credential(service_name)?;
    println!("'{service_name}' deleted.");
    Ok(())
}

fn cmd_change_password(config: StorageConfig, recover: bool) -> Result<()> {
    let mut service = open_service(config)?;
    if recover {
        let phrase = prompt_password("recovery phrase (24 words): ")?;
        let passphrase = if confirm("use a recovery passphrase?")? { Some(prompt_password("recovery passphrase: ")?) } else { None };
        service.recover_with_mnemonic(&phrase, passphrase.as_deref())?;
        let new_password = prompt_password("new master password: ")?;
        service.set_password_after_recovery(&new_password)?;
    } else {
        let current = prompt_password("current master password: ")?;
        service.unlock(&current)?;
        let new_password = prompt_password("new master password: ")?;
        service.change_password(&new_password)?;
    }
    println!("master password changed.");
    Ok(())
}

fn cmd_verify_audit(config: &StorageConfig) -> Result<()> {
    if !config.audit_log_path.exists() {
        println!("no audit log at {}", config.audit_log_path.display());
        return Ok(());
    }
    let sidecar = ward_core::metadata::VaultMetadata::load_or_default(&config.sidecar_path());
    let key_source = if let Some(salt) = &sidecar.audit_key_salt {
        let password = prompt_password("master password (to derive the audit key): ")?;
        ward_core::audit::AuditKeySource::from_password(password.as_bytes(), salt)?
    } else {
        let vault_id = config.vault_path.display().to_string();
        ward_core::audit::AuditKeySource::from_keychain(&NullSecretStore, &vault_id)?
    };
    let logger = ward_core::audit::AuditLogger::open(config.audit_log_path.clone(), key_source.key().clone())?;
    let report = logger.verify()?;
    println!("{} entries, {} valid", report.total, report.valid);
    if !report.tampered.is_empty() {
        println!("tampered entries at lines: {:?}", report.tampered);
    }
    if !report.invalid.is_empty() {
        println!("invalid entries at lines: {:?}", report.invalid);
    }
    Ok(())
}

fn cmd_migrate(config: StorageConfig, recovery_passphrase: bool) -> Result<()> {
    let mut service = open_service(config)?;
    let password = prompt_password("master password: ")?;
    service.unlock(&password)?;
    let passphrase = if recovery_passphrase { Some(prompt_password("recovery passphrase: ")?) } else { None };
    let mnemonic = service.migrate_to_v2(passphrase.as_deref())?;
    println!("vault migrated to the V2 format.");
    println!();
    println!("recovery phrase (write this down, it will not be shown again):");
    println!("  {mnemonic}");
    Ok(())
}

fn cmd_backup(config: &StorageConfig, command: &BackupCommand) -> Result<()> {
    match command {
        BackupCommand::Create => {
            let path = ward_backup::create_manual_backup(&config.vault_path)?;
            println!("backup written to {}", path.display());
        }
        BackupCommand::Info => {
            let entries = ward_backup::list_backups(&config.vault_path)?;
            if entries.is_empty() {
                println!("no backups found.");
                return Ok(());
            }
            for entry in entries {
                let kind = match entry.kind {
                    ward_backup::BackupKind::Automatic => "automatic",
                    ward_backup::BackupKind::Manual => "manual",
                };
                println!("{}  {}  {}", entry.modified_at.unix_timestamp(), kind, entry.path.display());
            }
        }
        BackupCommand::Preview { path } => {
            let password = prompt_password("backup password: ")?;
            let names = ward_backup::preview_backup(path, &password)?;
            if names.is_empty() {
                println!("backup contains no credentials.");
            }
            for name in names {
                println!("{name}");
            }
        }
        BackupCommand::Restore { path, yes } => {
            if !*yes && !confirm(&format!("restore {} over the current vault?", path.display()))? {
                println!("aborted.");
                return Ok(());
            }
            let password = prompt_password("backup password: ")?;
            ward_backup::restore_backup(path, &config.vault_path, &password)?;
            println!("restored {} to {}", path.display(), config.vault_path.display());
        }
    }
    Ok(())
}

fn cmd_remove(config: StorageConfig, force: bool, remove_all: bool, yes: bool) -> Result<()> {
    if !yes && !confirm(&format!("permanently delete the vault at {}?", config.vault_path.display()))? {
        println!("aborted.");
        return Ok(());
    }
    let mut service = open_service(config)?;
    let report = service.remove_vault(force, remove_all)?;
    println!(
        "removed: vault={} sidecar={} audit_log={} keychain={} directory={}",
        report.vault_removed, report.sidecar_removed, report.audit_log_removed, report.keychain_entry_removed, report.directory_removed
    );
    Ok(())
}

//! Thin `clap`-based dispatcher over [`ward_core::VaultService`]. This crate
//! owns password prompting and human-readable rendering; it performs no
//! cryptographic or persistence logic of its own.

mod backup;
mod dispatch;

pub use backup::BackupCommand;
pub use dispatch::run;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ward",
    about = "An offline, single-user encrypted credential vault",
    long_about = "ward stores service credentials in a single encrypted file on disk, \
                  protected by a master password and, optionally, a 24-word recovery phrase.\n\n\
                  Quick start:\n\
                  1. ward init                 # create a new vault\n\
                  2. ward add -s github -u me  # add a credential\n\
                  3. ward get -s github        # retrieve it\n\
                  4. ward list                 # see what's stored"
)]
pub struct Cli {
    /// Vault file path. Falls back to WARD_VAULT_PATH, then ~/.ward/vault.enc.
    #[arg(long, global = true)]
    pub vault_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new vault at the configured path
    Init {
        /// Store the master password in the OS secret store
        #[arg(long)]
        keychain: bool,
        /// Enable the tamper-evident audit log
        #[arg(long)]
        audit: bool,
        /// Source the audit key from the OS keychain instead of the password
        #[arg(long)]
        keychain_audit: bool,
        /// Protect the recovery phrase with an additional passphrase
        #[arg(long)]
        recovery_passphrase: bool,
    },

    /// Unlock the vault and exit, reporting whether the password is correct
    Unlock,

    /// Add a new credential
    Add {
        /// Service/site identifier, e.g. "github"
        #[arg(short, long)]
        service: String,
        #[arg(short, long)]
        username: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Retrieve a credential by service name
    Get {
        #[arg(short, long)]
        service: String,
    },

    /// List all stored service names
    List,

    /// Update fields on an existing credential
    Update {
        #[arg(short, long)]
        service: String,
        #[arg(long)]
        username: Option<String>,
        /// Prompt for a new password value
        #[arg(long)]
        set_password: bool,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        clear_category: bool,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        clear_url: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        clear_notes: bool,
    },

    /// Delete a credential
    Delete {
        #[arg(short, long)]
        service: String,
    },

    /// Change the master password
    ChangePassword {
        /// Unlock via the recovery mnemonic instead of the current password
        #[arg(long)]
        recover: bool,
    },

    /// Verify the audit log's HMAC chain and report any tampering
    VerifyAudit,

    #[command(subcommand)]
    Vault(VaultCommand),
}

#[derive(Subcommand, Debug)]
pub enum VaultCommand {
    /// Upgrade a V1 vault to the V2 dual-key-wrap format, provisioning recovery
    Migrate {
        #[arg(long)]
        recovery_passphrase: bool,
    },
    /// Enumerate, preview, and restore on-disk backups
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },
    /// Permanently delete the vault, sidecar, audit log, and keychain entry
    Remove {
        /// Ignore errors removing individual files
        #[arg(long)]
        force: bool,
        /// Also remove the enclosing directory
        #[arg(long)]
        remove_all: bool,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

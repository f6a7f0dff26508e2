use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// Take a manual backup of the current vault file
    Create,
    /// List automatic and manual backups, newest first
    Info,
    /// Decrypt a backup in memory and list its credential names
    Preview {
        /// Path to the backup file
        path: PathBuf,
    },
    /// Restore a backup into the canonical vault position
    Restore {
        /// Path to the backup file
        path: PathBuf,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

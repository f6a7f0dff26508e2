mod catalog;

pub use catalog::{BackupEntry, BackupKind};
pub use catalog::{create_manual_backup, list_backups, preview_backup, restore_backup};

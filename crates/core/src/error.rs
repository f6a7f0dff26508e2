use thiserror::Error;

/// The full error taxonomy surfaced by the vault engine.
///
/// Variants that carry `#[source]` wrap the underlying cause for diagnostics;
/// callers should match on the variant itself rather than parse the message.
#[derive(Debug, Error)]
pub enum WardError {
    #[error("incorrect password or tampered vault")]
    AuthenticationFailure,

    #[error("password does not meet policy requirements: {0}")]
    PolicyViolation(String),

    #[error("too many failed attempts, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("vault envelope is corrupt: {0}")]
    CorruptEnvelope(String),

    #[error("unsupported vault format version {0}")]
    UnsupportedVersion(u32),

    #[error("vault save could not be verified, aborted before touching the canonical file: {0}")]
    VerificationFailed(String),

    #[error("a prior save was interrupted and has been rolled back: {0}")]
    MigrationInterrupted(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vault file permissions are broader than owner-only")]
    PermissionsTooOpen,

    #[error("secret store unavailable: {0}")]
    SecretStoreUnavailable(String),

    #[error("audit log operation failed: {0}")]
    AuditLogFailure(String),

    #[error("a credential named '{0}' already exists")]
    DuplicateCredential(String),

    #[error("no credential named '{0}'")]
    CredentialNotFound(String),

    #[error("invalid credential data: {0}")]
    InvalidCredential(String),

    #[error("vault is locked")]
    VaultLocked,

    #[error("vault already exists at this location")]
    VaultAlreadyExists,

    #[error("recovery phrase is invalid")]
    InvalidMnemonic,

    #[error("recovery challenge answers did not match")]
    ChallengeMismatch,

    #[error("recovery is not configured for this vault")]
    RecoveryNotConfigured,

    #[error("operation is only valid while unlocked via recovery")]
    NotUnlockedViaRecovery,

    #[error("{0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WardError>;

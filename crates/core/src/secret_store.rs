//! Secret-store adapter (C8): an opaque capability for storing the master
//! password or audit key in an OS-backed secret store. The core never
//! assumes one is available; every caller treats failure here as a
//! non-fatal degradation to password-prompt-every-time.

use crate::error::Result;

/// Capability set a platform secret store must offer. Implementations talk
/// to whatever OS keychain is available; the core only depends on this
/// trait.
pub trait SecretStore: Send + Sync {
    fn is_available(&self) -> bool;
    fn store(&self, vault_id: &str, secret: &[u8]) -> Result<()>;
    fn retrieve(&self, vault_id: &str) -> Result<Option<Vec<u8>>>;
    fn delete(&self, vault_id: &str) -> Result<()>;
    fn ping(&self) -> bool {
        self.is_available()
    }
}

/// Always-unavailable store, used on platforms without a keychain or
/// whenever the caller has opted out of keychain integration.
#[derive(Default, Debug, Clone, Copy)]
pub struct NullSecretStore;

impl SecretStore for NullSecretStore {
    fn is_available(&self) -> bool {
        false
    }

    fn store(&self, _vault_id: &str, _secret: &[u8]) -> Result<()> {
        Err(crate::error::WardError::SecretStoreUnavailable(
            "no secret store configured".into(),
        ))
    }

    fn retrieve(&self, _vault_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn delete(&self, _vault_id: &str) -> Result<()> {
        Ok(())
    }
}

/// In-process secret store backed by a mutex-guarded map, used for
/// integration tests exercising the keychain code paths without touching a
/// real OS keychain.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl SecretStore for MemorySecretStore {
    fn is_available(&self) -> bool {
        true
    }

    fn store(&self, vault_id: &str, secret: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().expect("secret store mutex poisoned");
        entries.insert(vault_id.to_string(), secret.to_vec());
        Ok(())
    }

    fn retrieve(&self, vault_id: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().expect("secret store mutex poisoned");
        Ok(entries.get(vault_id).cloned())
    }

    fn delete(&self, vault_id: &str) -> Result<()> {
        let mut entries = self.entries.lock().expect("secret store mutex poisoned");
        entries.remove(vault_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn null_store_is_unavailable_and_returns_none() {
        let store = NullSecretStore;
        assert!(!store.is_available());
        assert!(store.store("vault-a", b"secret").is_err());
        assert_eq!(store.retrieve("vault-a").unwrap(), None);
    }

    #[test]
    fn memory_store_roundtrips() {
        let store = MemorySecretStore::default();
        store.store("vault-a", b"hunter2").unwrap();
        assert_eq!(store.retrieve("vault-a").unwrap(), Some(b"hunter2".to_vec()));
        store.delete("vault-a").unwrap();
        assert_eq!(store.retrieve("vault-a").unwrap(), None);
    }
}

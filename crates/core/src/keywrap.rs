//! Key-wrap engine (C2): wraps and unwraps a data-encryption key under a
//! key-encryption key using the same AEAD construction as the vault body.

use crate::crypto::{aead_open, aead_seal, KeyMaterial};
use crate::error::Result;

/// A DEK sealed under some KEK: ciphertext-with-tag plus the nonce used.
#[derive(Clone, Debug)]
pub struct WrappedKey {
    pub ciphertext: Vec<u8>,
    pub nonce: Vec<u8>,
}

/// Wraps `data_key` under `kek`, binding `aad` (typically the envelope's
/// stable header fields) into the authentication tag.
pub fn wrap_key(kek: &KeyMaterial, data_key: &KeyMaterial, aad: &[u8]) -> Result<WrappedKey> {
    let (nonce, ciphertext) = aead_seal(kek, data_key.as_bytes(), aad)?;
    Ok(WrappedKey { ciphertext, nonce })
}

/// Unwraps a [`WrappedKey`], failing with `AuthenticationFailure` on any
/// tamper, wrong key, or AAD mismatch.
pub fn unwrap_key(kek: &KeyMaterial, wrapped: &WrappedKey, aad: &[u8]) -> Result<KeyMaterial> {
    let pt = aead_open(kek, &wrapped.nonce, &wrapped.ciphertext, aad)?;
    let mut bytes = [0u8; 32];
    if pt.len() != bytes.len() {
        return Err(crate::error::WardError::AuthenticationFailure);
    }
    bytes.copy_from_slice(&pt);
    Ok(KeyMaterial::from_bytes(bytes))
}

/// The result of provisioning a fresh data key wrapped under two independent
/// key-encryption keys (password-derived and recovery-derived).
pub struct DualWrappedDek {
    pub dek: KeyMaterial,
    pub password_wrap: WrappedKey,
    pub recovery_wrap: WrappedKey,
}

/// Generates a fresh DEK and wraps it under both KEKs with independent
/// nonces. Used at `initialize_with_recovery` and at V1→V2 migration.
pub fn generate_and_wrap_dek(password_kek: &KeyMaterial, recovery_kek: &KeyMaterial, aad: &[u8]) -> Result<DualWrappedDek> {
    let dek = KeyMaterial::random();
    let password_wrap = wrap_key(password_kek, &dek, aad)?;
    let recovery_wrap = wrap_key(recovery_kek, &dek, aad)?;
    Ok(DualWrappedDek {
        dek,
        password_wrap,
        recovery_wrap,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn wrap_unwrap_roundtrip() {
        let kek = KeyMaterial::random();
        let dek = KeyMaterial::random();
        let wrapped = wrap_key(&kek, &dek, b"aad").unwrap();
        let unwrapped = unwrap_key(&kek, &wrapped, b"aad").unwrap();
        assert_eq!(dek.0, unwrapped.0);
    }

    #[test]
    fn unwrap_with_wrong_kek_fails() {
        let kek1 = KeyMaterial::random();
        let kek2 = KeyMaterial::random();
        let dek = KeyMaterial::random();
        let wrapped = wrap_key(&kek1, &dek, b"aad").unwrap();
        assert!(unwrap_key(&kek2, &wrapped, b"aad").is_err());
    }

    #[test]
    fn dual_wrap_independent_and_recoverable() {
        let password_kek = KeyMaterial::random();
        let recovery_kek = KeyMaterial::random();
        let dual = generate_and_wrap_dek(&password_kek, &recovery_kek, b"aad").unwrap();

        let via_password = unwrap_key(&password_kek, &dual.password_wrap, b"aad").unwrap();
        let via_recovery = unwrap_key(&recovery_kek, &dual.recovery_wrap, b"aad").unwrap();
        assert_eq!(via_password.0, dual.dek.0);
        assert_eq!(via_recovery.0, dual.dek.0);
        assert_ne!(dual.password_wrap.nonce, dual.recovery_wrap.nonce);
    }
}

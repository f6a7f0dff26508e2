use crate::error::{Result, WardError};
use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

pub const NONCE_LEN: usize = 12;
pub const KEY_LEN: usize = 32;
pub const SALT_LEN: usize = 32;

/// Default password-KDF iteration target. Vaults below this are upgraded on
/// the next password change; `StorageConfig` can raise it but never lower it
/// below the floor enforced in `derive_password_key`.
pub const DEFAULT_ITERATIONS: u32 = 600_000;
pub const MIN_ITERATIONS: u32 = 100_000;

/// 256-bit secret key material, zeroized on drop.
///
/// Never clone this into a container that could outlive the owning scope;
/// `KeyMaterial` is intentionally not `Copy` and only shallow-`Clone` for the
/// narrow cases (e.g. retaining a DEK across a recovery unlock) where the
/// caller is responsible for dropping the original promptly.
#[derive(Clone)]
pub struct KeyMaterial(pub [u8; KEY_LEN]);

impl KeyMaterial {
    #[must_use]
    pub fn random() -> Self {
        let mut k = [0u8; KEY_LEN];
        getrandom::fill(&mut k).expect("OS RNG unavailable");
        Self(k)
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// Parameters for the memory-hard recovery KDF (Argon2id).
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct RecoveryKdfParams {
    pub salt: Vec<u8>,
    pub memory_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl RecoveryKdfParams {
    #[must_use]
    pub fn generate() -> Self {
        let mut salt = vec![0u8; SALT_LEN];
        getrandom::fill(&mut salt).expect("OS RNG unavailable");
        Self {
            salt,
            memory_kib: 65_536,
            time_cost: 1,
            parallelism: 4,
        }
    }
}

/// Fills `buf` with cryptographically secure random bytes.
pub fn random_bytes(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| WardError::CorruptEnvelope(format!("random source failure: {e}")))
}

/// Returns a fresh random vector of `len` bytes.
pub fn random_vec(len: usize) -> Result<Vec<u8>> {
    let mut v = vec![0u8; len];
    random_bytes(&mut v)?;
    Ok(v)
}

/// Derives a 32-byte password key-encryption-key via PBKDF2-HMAC-SHA256.
///
/// `iterations` must be at least [`MIN_ITERATIONS`]; callers that read a
/// stored value from an envelope should clamp it up rather than trust a file
/// on disk to demand less work than the floor.
pub fn derive_password_key(password: &[u8], salt: &[u8], iterations: u32) -> Result<KeyMaterial> {
    if iterations < MIN_ITERATIONS {
        return Err(WardError::CorruptEnvelope(format!(
            "stored iteration count {iterations} is below the minimum {MIN_ITERATIONS}"
        )));
    }
    let mut out = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    Ok(KeyMaterial(out))
}

/// Derives a 32-byte recovery key-encryption-key from a BIP39 seed via
/// memory-hard Argon2id.
pub fn derive_recovery_key(seed: &[u8], params: &RecoveryKdfParams) -> Result<KeyMaterial> {
    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(params.memory_kib, params.time_cost, params.parallelism, Some(KEY_LEN))
            .map_err(|e| WardError::CorruptEnvelope(format!("invalid recovery kdf params: {e}")))?,
    );
    let mut out = [0u8; KEY_LEN];
    argon2
        .hash_password_into(seed, &params.salt, &mut out)
        .map_err(|e| WardError::CorruptEnvelope(format!("recovery kdf failed: {e}")))?;
    Ok(KeyMaterial(out))
}

/// Seals `plaintext` under `key` with a freshly sampled 96-bit nonce,
/// authenticating `aad`. Returns `(nonce, ciphertext_with_tag)`.
pub fn aead_seal(key: &KeyMaterial, plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let mut nonce_bytes = [0u8; NONCE_LEN];
    random_bytes(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ct = cipher
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .map_err(|_| WardError::AuthenticationFailure)?;
    Ok((nonce_bytes.to_vec(), ct))
}

/// Opens a ciphertext sealed by [`aead_seal`]. Fails with
/// [`WardError::AuthenticationFailure`] exactly when the tag does not
/// validate: wrong key, wrong nonce, wrong aad, or tampered ciphertext are
/// indistinguishable by design.
pub fn aead_open(key: &KeyMaterial, nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(WardError::AuthenticationFailure);
    }
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, Payload { msg: ciphertext, aad })
        .map_err(|_| WardError::AuthenticationFailure)
}

/// Constant-time equality check for secret-derived byte strings (verifier
/// tags, HMAC outputs, challenge words). Never use `==` on secret bytes.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn hex(data: &[u8]) -> String {
        data.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn keymaterial_random_is_32_bytes_and_varies() {
        let a = KeyMaterial::random();
        let b = KeyMaterial::random();
        assert_eq!(a.0.len(), KEY_LEN);
        assert_ne!(hex(&a.0), hex(&b.0));
    }

    #[test]
    fn password_key_is_deterministic_and_salt_sensitive() {
        let salt1 = b"0123456789abcdef0123456789abcdef";
        let salt2 = b"fedcba9876543210fedcba9876543210";
        let a = derive_password_key(b"hunter2", salt1, MIN_ITERATIONS).unwrap();
        let b = derive_password_key(b"hunter2", salt1, MIN_ITERATIONS).unwrap();
        let c = derive_password_key(b"hunter2", salt2, MIN_ITERATIONS).unwrap();
        assert_eq!(hex(&a.0), hex(&b.0));
        assert_ne!(hex(&a.0), hex(&c.0));
    }

    #[test]
    fn password_key_rejects_low_iteration_floor() {
        let err = derive_password_key(b"pw", b"salt", 10).unwrap_err();
        assert!(matches!(err, WardError::CorruptEnvelope(_)));
    }

    #[test]
    fn recovery_key_roundtrips_with_small_params() {
        let mut params = RecoveryKdfParams::generate();
        params.memory_kib = 8;
        params.time_cost = 1;
        params.parallelism = 1;
        let a = derive_recovery_key(b"seed material", &params).unwrap();
        let b = derive_recovery_key(b"seed material", &params).unwrap();
        assert_eq!(hex(&a.0), hex(&b.0));
    }

    #[test]
    fn aead_roundtrip_with_aad() {
        let key = KeyMaterial::random();
        let (nonce, ct) = aead_seal(&key, b"hello vault", b"header-aad").unwrap();
        assert_eq!(nonce.len(), NONCE_LEN);
        let pt = aead_open(&key, &nonce, &ct, b"header-aad").unwrap();
        assert_eq!(pt, b"hello vault");
    }

    #[test]
    fn aead_wrong_key_fails() {
        let key1 = KeyMaterial::random();
        let key2 = KeyMaterial::random();
        let (nonce, ct) = aead_seal(&key1, b"data", b"ad").unwrap();
        assert!(matches!(aead_open(&key2, &nonce, &ct, b"ad"), Err(WardError::AuthenticationFailure)));
    }

    #[test]
    fn aead_wrong_aad_fails() {
        let key = KeyMaterial::random();
        let (nonce, ct) = aead_seal(&key, b"data", b"ad-ok").unwrap();
        assert!(matches!(aead_open(&key, &nonce, &ct, b"ad-bad"), Err(WardError::AuthenticationFailure)));
    }

    #[test]
    fn aead_tamper_detected() {
        let key = KeyMaterial::random();
        let (nonce, mut ct) = aead_seal(&key, b"payload", b"ad").unwrap();
        if let Some(b) = ct.get_mut(0) {
            *b ^= 0x01;
        }
        assert!(matches!(aead_open(&key, &nonce, &ct, b"ad"), Err(WardError::AuthenticationFailure)));
    }

    #[test]
    fn constant_time_eq_matches_and_differs() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}

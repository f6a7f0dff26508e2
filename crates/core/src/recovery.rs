//! Recovery module (C3): BIP39 mnemonic generation/validation, challenge
//! position selection, and recovery-key derivation.

use crate::crypto::{constant_time_eq, derive_recovery_key, random_bytes, KeyMaterial, RecoveryKdfParams};
use crate::error::{Result, WardError};
use bip39::Mnemonic;

/// Number of words in the entropy-backed recovery phrase (256 bits of
/// entropy, BIP39 checksum included).
pub const WORD_COUNT: usize = 24;

/// Number of positions fixed at vault-creation time for the at-rest recovery
/// challenge (see design note on the 6-vs-3-word question).
pub const CHALLENGE_POSITION_COUNT: usize = 6;

/// Generates a fresh 24-word BIP39 mnemonic from OS-backed entropy.
///
/// Entropy is sourced through [`crate::crypto::random_bytes`] rather than the
/// `bip39` crate's own RNG hook so every random draw in the vault goes
/// through one audited path.
pub fn generate_mnemonic() -> Result<Mnemonic> {
    let mut entropy = [0u8; 32];
    random_bytes(&mut entropy)?;
    let mnemonic =
        Mnemonic::from_entropy(&entropy).map_err(|e| WardError::CorruptEnvelope(format!("mnemonic generation failed: {e}")))?;
    Ok(mnemonic)
}

/// Validates a user-supplied phrase against the BIP39 wordlist and checksum.
pub fn validate_mnemonic(phrase: &str) -> bool {
    phrase.parse::<Mnemonic>().is_ok()
}

/// Parses a phrase, returning the structured mnemonic on success.
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic> {
    phrase.parse::<Mnemonic>().map_err(|_| WardError::InvalidMnemonic)
}

/// Derives the recovery key-encryption key from a mnemonic, an optional
/// passphrase (BIP39's 25th word), and the stored Argon2id salt/params.
pub fn derive_recovery_kek(mnemonic: &Mnemonic, passphrase: Option<&str>, params: &RecoveryKdfParams) -> Result<KeyMaterial> {
    let seed = mnemonic.to_seed(passphrase.unwrap_or(""));
    derive_recovery_key(&seed, params)
}

/// Picks `CHALLENGE_POSITION_COUNT` distinct word indices in `[0, WORD_COUNT)`
/// to be fixed, at vault-creation time, as the at-rest recovery challenge.
pub fn select_challenge_positions() -> Result<Vec<usize>> {
    select_distinct_positions(CHALLENGE_POSITION_COUNT)
}

/// Picks `k` distinct indices, used by a front end that wants an ad-hoc
/// "confirm you wrote this down" prompt separate from the stored challenge.
pub fn select_verify_positions(k: usize) -> Result<Vec<usize>> {
    select_distinct_positions(k)
}

fn select_distinct_positions(k: usize) -> Result<Vec<usize>> {
    if k > WORD_COUNT {
        return Err(WardError::InvalidCredential(format!(
            "cannot select {k} distinct positions out of {WORD_COUNT} words"
        )));
    }
    let mut pool: Vec<usize> = (0..WORD_COUNT).collect();
    let mut chosen = Vec::with_capacity(k);
    for _ in 0..k {
        let mut idx_bytes = [0u8; 4];
        random_bytes(&mut idx_bytes)?;
        let idx = (u32::from_le_bytes(idx_bytes) as usize) % pool.len();
        chosen.push(pool.remove(idx));
    }
    chosen.sort_unstable();
    Ok(chosen)
}

/// Verifies user-supplied answers to the stored challenge positions in
/// constant time with respect to the comparison itself (word lengths still
/// leak via the join, which is acceptable: positions and lengths are not
/// secret, only which words are correct).
pub fn verify_challenge(mnemonic: &Mnemonic, positions: &[usize], answers: &[(usize, String)]) -> Result<()> {
    let words: Vec<String> = mnemonic.words().map(str::to_owned).collect();
    if answers.len() != positions.len() {
        return Err(WardError::ChallengeMismatch);
    }
    let mut all_ok = true;
    for (pos, answer) in answers {
        if !positions.contains(pos) {
            all_ok = false;
            continue;
        }
        let expected = words.get(*pos).map(String::as_str).unwrap_or_default();
        if !constant_time_eq(expected.as_bytes(), answer.as_bytes()) {
            all_ok = false;
        }
    }
    if all_ok {
        Ok(())
    } else {
        Err(WardError::ChallengeMismatch)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn small_params() -> RecoveryKdfParams {
        let mut p = RecoveryKdfParams::generate();
        p.memory_kib = 8;
        p.time_cost = 1;
        p.parallelism = 1;
        p
    }

    #[test]
    fn generated_mnemonic_has_24_words_and_validates() {
        let m = generate_mnemonic().unwrap();
        assert_eq!(m.word_count(), WORD_COUNT);
        assert!(validate_mnemonic(&m.to_string()));
    }

    #[test]
    fn invalid_phrase_rejected() {
        assert!(!validate_mnemonic("not a real bip39 phrase at all"));
    }

    #[test]
    fn recovery_kek_deterministic_for_same_mnemonic_and_salt() {
        let m = generate_mnemonic().unwrap();
        let params = small_params();
        let a = derive_recovery_kek(&m, None, &params).unwrap();
        let b = derive_recovery_kek(&m, None, &params).unwrap();
        assert_eq!(a.0, b.0);
    }

    #[test]
    fn recovery_kek_differs_with_passphrase() {
        let m = generate_mnemonic().unwrap();
        let params = small_params();
        let a = derive_recovery_kek(&m, None, &params).unwrap();
        let b = derive_recovery_kek(&m, Some("extra words"), &params).unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn challenge_positions_are_distinct_and_in_range() {
        let positions = select_challenge_positions().unwrap();
        assert_eq!(positions.len(), CHALLENGE_POSITION_COUNT);
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), positions.len());
        assert!(positions.iter().all(|&p| p < WORD_COUNT));
    }

    #[test]
    fn challenge_verification_roundtrip() {
        let m = generate_mnemonic().unwrap();
        let positions = select_challenge_positions().unwrap();
        let words: Vec<String> = m.words().map(str::to_owned).collect();
        let answers: Vec<(usize, String)> = positions.iter().map(|&p| (p, words[p].clone())).collect();
        assert!(verify_challenge(&m, &positions, &answers).is_ok());
    }

    #[test]
    fn challenge_verification_rejects_wrong_word() {
        let m = generate_mnemonic().unwrap();
        let positions = select_challenge_positions().unwrap();
        let answers: Vec<(usize, String)> = positions.iter().map(|&p| (p, "wrongword".to_string())).collect();
        assert!(verify_challenge(&m, &positions, &answers).is_err());
    }
}

//! Per-team envelope encryption for stored API keys.
//!
//! The symmetric key is derived deterministically from the team id: SHA-256 of
//! the id's string form, stretched with PBKDF2-HMAC-SHA256 (100k iterations,
//! the hash's first 16 bytes as salt). Ciphertexts are AES-256-GCM with a
//! random nonce, encoded as base64url `nonce || ciphertext+tag`.
//!
//! There is no server-side master secret mixed into the derivation, so anyone
//! who knows a team id and these parameters can derive that team's key. See
//! DESIGN.md for the tradeoff.

use aes_gcm::{
    aead::{Aead, AeadCore, OsRng},
    Aes256Gcm, KeyInit, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Derive the team's AES-256 key. Deterministic; recomputed on demand.
fn derive_key(team_id: Uuid) -> [u8; KEY_SIZE] {
    let hash = Sha256::digest(team_id.to_string().as_bytes());
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(&hash, &hash[..SALT_SIZE], PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypt a plaintext API key under the team's derived key.
pub fn encrypt_api_key(plaintext: &str, team_id: Uuid) -> Result<String, ApiError> {
    let key = derive_key(team_id);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| {
        warn!(error = %e, "cipher construction failed");
        ApiError::Encryption
    })?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| ApiError::Encryption)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Decrypt a stored ciphertext token. Fails with `DecryptionError` if the
/// token was produced under a different team's key or is corrupted.
pub fn decrypt_api_key(token: &str, team_id: Uuid) -> Result<String, ApiError> {
    let raw = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| ApiError::Decryption)?;
    if raw.len() <= NONCE_SIZE {
        return Err(ApiError::Decryption);
    }

    let key = derive_key(team_id);
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| ApiError::Decryption)?;
    let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ApiError::Decryption)?;
    String::from_utf8(plaintext).map_err(|_| ApiError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let team = Uuid::new_v4();
        assert_eq!(derive_key(team), derive_key(team));
        assert_ne!(derive_key(team), derive_key(Uuid::new_v4()));
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let team = Uuid::new_v4();
        let token = encrypt_api_key("sk-test-12345", team).expect("encrypt");
        let plain = decrypt_api_key(&token, team).expect("decrypt");
        assert_eq!(plain, "sk-test-12345");
    }

    #[test]
    fn ciphertexts_differ_per_call() {
        // random nonce: same plaintext must not produce the same token
        let team = Uuid::new_v4();
        let a = encrypt_api_key("sk-same", team).unwrap();
        let b = encrypt_api_key("sk-same", team).unwrap();
        assert_ne!(a, b);
        assert_eq!(decrypt_api_key(&a, team).unwrap(), "sk-same");
        assert_eq!(decrypt_api_key(&b, team).unwrap(), "sk-same");
    }

    #[test]
    fn wrong_team_fails_to_decrypt() {
        let token = encrypt_api_key("sk-secret", Uuid::new_v4()).unwrap();
        let err = decrypt_api_key(&token, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::Decryption));
    }

    #[test]
    fn corrupted_token_fails_to_decrypt() {
        let team = Uuid::new_v4();
        let token = encrypt_api_key("sk-secret", team).unwrap();
        let mut corrupted = token.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'A' { b'B' } else { b'A' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(matches!(
            decrypt_api_key(&corrupted, team).unwrap_err(),
            ApiError::Decryption
        ));
    }

    #[test]
    fn garbage_inputs_fail_cleanly() {
        let team = Uuid::new_v4();
        assert!(decrypt_api_key("not base64 !!", team).is_err());
        assert!(decrypt_api_key("", team).is_err());
        assert!(decrypt_api_key("QUJD", team).is_err()); // shorter than a nonce
    }
}

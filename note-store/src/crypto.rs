//! Cryptography module for note field encryption
//!
//! Provides AES-256-GCM encryption with Argon2id key derivation.
//! Title and content are encrypted independently, each with its own
//! random 16-byte IV, and stored base64-encoded next to that IV.

use crate::config::{IV_SIZE, KEY_SIZE};
use crate::error::{AppError, Result};
use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;

/// AES-256-GCM with a 16-byte IV
type FieldCipher = AesGcm<Aes256, U16>;

/// Cost parameters for key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParams {
    /// Argon2 passes over memory
    pub cost: u32,
    pub memory_kib: u32,
}

/// 256-bit key derived from the store passphrase
#[derive(Clone)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// One encrypted field as persisted: base64 ciphertext and base64 IV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    pub cipher_text: String,
    pub iv: String,
}

/// Derive a 256-bit key from passphrase and salt using Argon2id.
///
/// Deterministic and deliberately slow; derive once per batch of fields.
pub fn derive_key(passphrase: &str, salt: &str, params: KeyParams) -> Result<DerivedKey> {
    let argon_params = Params::new(params.memory_kib, params.cost, 1, Some(KEY_SIZE))
        .map_err(|e| AppError::KeyDerivation(format!("Invalid parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt.as_bytes(), &mut key)
        .map_err(|e| AppError::KeyDerivation(e.to_string()))?;

    Ok(DerivedKey(key))
}

/// Passphrase, salt and cost, loaded once from configuration
#[derive(Clone)]
pub struct KeySource {
    passphrase: String,
    salt: String,
    params: KeyParams,
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySource")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl KeySource {
    pub fn new(passphrase: impl Into<String>, salt: impl Into<String>, params: KeyParams) -> Self {
        Self {
            passphrase: passphrase.into(),
            salt: salt.into(),
            params,
        }
    }

    /// Derive the key on the blocking pool
    pub async fn derive(&self) -> Result<DerivedKey> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || {
            derive_key(&source.passphrase, &source.salt, source.params)
        })
        .await
        .map_err(|e| AppError::KeyDerivation(format!("Derivation task failed: {}", e)))?
    }
}

/// Encrypt a UTF-8 string with a fresh random IV
pub fn encrypt(plaintext: &str, key: &DerivedKey) -> Result<EncryptedField> {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let cipher = FieldCipher::new_from_slice(&key.0)
        .map_err(|e| AppError::Encryption(format!("Cipher initialization failed: {}", e)))?;

    let ciphertext = cipher
        .encrypt(Nonce::<U16>::from_slice(&iv), plaintext.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;

    Ok(EncryptedField {
        cipher_text: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
    })
}

/// Decrypt a field produced by [`encrypt`]
pub fn decrypt(field: &EncryptedField, key: &DerivedKey) -> Result<String> {
    let iv = STANDARD
        .decode(&field.iv)
        .map_err(|e| AppError::Decryption(format!("Malformed IV: {}", e)))?;
    if iv.len() != IV_SIZE {
        return Err(AppError::Decryption(format!(
            "IV must be {} bytes, got {}",
            IV_SIZE,
            iv.len()
        )));
    }

    let ciphertext = STANDARD
        .decode(&field.cipher_text)
        .map_err(|e| AppError::Decryption(format!("Malformed ciphertext: {}", e)))?;

    let cipher = FieldCipher::new_from_slice(&key.0)
        .map_err(|e| AppError::Decryption(format!("Cipher initialization failed: {}", e)))?;

    let plaintext = cipher
        .decrypt(Nonce::<U16>::from_slice(&iv), ciphertext.as_ref())
        .map_err(|_| AppError::Decryption("Wrong key or corrupted data".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|e| AppError::Decryption(format!("Invalid UTF-8: {}", e)))
}

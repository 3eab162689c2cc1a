//! Argon2id + AES-256-GCM encryption of VRF secret keys.
//!
//! 1. Argon2id derives a 32-byte encryption key from the passphrase and a random salt
//! 2. AES-256-GCM encrypts the 32-byte secret scalar with a random nonce
//! 3. The result is stored as JSON with every parameter needed to decrypt,
//!    alongside the public key so keys can be listed without a passphrase

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sortes_crypto::{PublicKey, SecretKey};
use zeroize::Zeroize;

use crate::KeystoreError;

const ARGON2_OUTPUT_LEN: usize = 32;
/// Salt length in bytes.
const SALT_LEN: usize = 32;
/// AES-GCM nonce length in bytes (96 bits).
const NONCE_LEN: usize = 12;

const VERSION: u32 = 1;

/// An encrypted VRF key, serializable to/from JSON.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedKey {
    pub version: u32,
    pub public_key: PublicKey,
    pub crypto: KeyCrypto,
}

/// The crypto section, containing all encryption parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCrypto {
    pub cipher: String,
    pub kdf: String,
    pub kdf_params: KdfParams,
    /// Hex-encoded salt.
    pub salt: String,
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext.
    pub ciphertext: String,
}

/// KDF parameters for Argon2id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 64 MiB, 3 iterations, 1 lane.
    fn default() -> Self {
        Self {
            memory: 65536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Minimal-cost parameters for development chains and tests. Offers no
    /// meaningful resistance to brute force.
    pub fn light() -> Self {
        Self {
            memory: 64,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl EncryptedKey {
    pub fn to_json(&self) -> Result<Vec<u8>, KeystoreError> {
        serde_json::to_vec_pretty(self).map_err(|e| KeystoreError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, KeystoreError> {
        serde_json::from_slice(bytes).map_err(|e| KeystoreError::Serialization(e.to_string()))
    }
}

/// Encrypt a secret key with a passphrase.
pub fn encrypt_key(
    secret_key: &SecretKey,
    passphrase: &str,
    kdf_params: &KdfParams,
) -> Result<EncryptedKey, KeystoreError> {
    let mut rng = rand::thread_rng();

    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);

    let mut derived_key = derive_key(passphrase, &salt, kdf_params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived_key)
        .map_err(|e| KeystoreError::Encryption(format!("AES key init failed: {e}")));
    derived_key.zeroize();
    let ciphertext = cipher?
        .encrypt(Nonce::from_slice(&nonce_bytes), secret_key.as_bytes().as_ref())
        .map_err(|e| KeystoreError::Encryption(format!("encryption failed: {e}")))?;

    Ok(EncryptedKey {
        version: VERSION,
        public_key: secret_key.public_key(),
        crypto: KeyCrypto {
            cipher: "aes-256-gcm".to_string(),
            kdf: "argon2id".to_string(),
            kdf_params: *kdf_params,
            salt: hex::encode(salt),
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
        },
    })
}

/// Decrypt a key with its passphrase. The decrypted scalar must match the
/// stored public key.
pub fn decrypt_key(key: &EncryptedKey, passphrase: &str) -> Result<SecretKey, KeystoreError> {
    if key.version != VERSION {
        return Err(KeystoreError::Serialization(format!(
            "unsupported key file version: {}",
            key.version
        )));
    }

    let salt = decode_field(&key.crypto.salt, "salt")?;
    let nonce_bytes = decode_field(&key.crypto.nonce, "nonce")?;
    let ciphertext = decode_field(&key.crypto.ciphertext, "ciphertext")?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(KeystoreError::Serialization(format!(
            "invalid nonce length: expected {}, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }

    let mut derived_key = derive_key(passphrase, &salt, &key.crypto.kdf_params)?;
    let cipher = Aes256Gcm::new_from_slice(&derived_key)
        .map_err(|e| KeystoreError::Encryption(format!("AES key init failed: {e}")));
    derived_key.zeroize();
    let mut plaintext = cipher?
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| KeystoreError::Decrypt)?;

    let secret = <[u8; 32]>::try_from(plaintext.as_slice())
        .map_err(|_| KeystoreError::Decrypt)
        .and_then(|bytes| SecretKey::from_bytes(&bytes).map_err(|_| KeystoreError::Decrypt));
    plaintext.zeroize();
    let secret = secret?;

    if secret.public_key() != key.public_key {
        return Err(KeystoreError::Decrypt);
    }
    Ok(secret)
}

fn decode_field(value: &str, what: &str) -> Result<Vec<u8>, KeystoreError> {
    hex::decode(value).map_err(|e| KeystoreError::Serialization(format!("invalid {what} hex: {e}")))
}

fn derive_key(
    passphrase: &str,
    salt: &[u8],
    kdf_params: &KdfParams,
) -> Result<[u8; 32], KeystoreError> {
    let params = Params::new(
        kdf_params.memory,
        kdf_params.iterations,
        kdf_params.parallelism,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(|e| KeystoreError::Encryption(format!("Argon2 params error: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut output)
        .map_err(|e| KeystoreError::Encryption(format!("Argon2 hashing failed: {e}")))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sk = SecretKey::random();
        let encrypted = encrypt_key(&sk, "test-password-123", &KdfParams::light()).unwrap();
        let decrypted = decrypt_key(&encrypted, "test-password-123").unwrap();
        assert_eq!(decrypted.as_bytes(), sk.as_bytes());
    }

    #[test]
    fn wrong_password_fails() {
        let encrypted = encrypt_key(&SecretKey::random(), "correct", &KdfParams::light()).unwrap();
        assert!(matches!(
            decrypt_key(&encrypted, "wrong"),
            Err(KeystoreError::Decrypt)
        ));
    }

    #[test]
    fn stores_public_key_in_clear() {
        let sk = SecretKey::random();
        let encrypted = encrypt_key(&sk, "pass", &KdfParams::light()).unwrap();
        assert_eq!(encrypted.public_key, sk.public_key());
    }

    #[test]
    fn swapped_public_key_is_rejected() {
        let mut encrypted = encrypt_key(&SecretKey::random(), "pass", &KdfParams::light()).unwrap();
        encrypted.public_key = SecretKey::random().public_key();
        assert!(matches!(
            decrypt_key(&encrypted, "pass"),
            Err(KeystoreError::Decrypt)
        ));
    }

    #[test]
    fn default_kdf_params() {
        let params = KdfParams::default();
        assert_eq!(params.memory, 65536);
        assert_eq!(params.iterations, 3);
        assert_eq!(params.parallelism, 1);
    }

    #[test]
    fn json_roundtrip() {
        let encrypted = encrypt_key(&SecretKey::random(), "pass", &KdfParams::light()).unwrap();
        let json = encrypted.to_json().unwrap();
        let text = String::from_utf8(json.clone()).unwrap();
        assert!(text.contains("\"cipher\": \"aes-256-gcm\""));
        assert!(text.contains("\"kdf\": \"argon2id\""));
        assert_eq!(EncryptedKey::from_json(&json).unwrap(), encrypted);
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut encrypted = encrypt_key(&SecretKey::random(), "pass", &KdfParams::light()).unwrap();
        encrypted.version = 99;
        assert!(decrypt_key(&encrypted, "pass").is_err());
    }

    #[test]
    fn fresh_salt_per_encryption() {
        let sk = SecretKey::random();
        let a = encrypt_key(&sk, "pass", &KdfParams::light()).unwrap();
        let b = encrypt_key(&sk, "pass", &KdfParams::light()).unwrap();
        assert_ne!(a.crypto.salt, b.crypto.salt);
        assert_ne!(a.crypto.ciphertext, b.crypto.ciphertext);
    }
}

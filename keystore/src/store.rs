//! The in-memory set of unlocked VRF keys.

use parking_lot::RwLock;
use sortes_crypto::{PublicKey, SecretKey, U256};
use sortes_vrf::{
    generate_proof, generate_proof_response, generate_proof_response_v2, MarshaledOnChainResponse,
    MarshaledProof, PreSeedData, Proof,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{decrypt_key, encrypt_key, EncryptedKey, KdfParams, KeyBackend, KeystoreError};

/// Result of [`VrfKeyStore::unlock`]: keys that decrypted, and the failure
/// for each key that did not.
#[derive(Debug, Default)]
pub struct UnlockOutcome {
    pub unlocked: Vec<PublicKey>,
    pub failures: Vec<(PublicKey, KeystoreError)>,
}

impl UnlockOutcome {
    /// The unlocked keys, or the aggregated failures if any key failed.
    pub fn into_result(self) -> Result<Vec<PublicKey>, KeystoreError> {
        if self.failures.is_empty() {
            Ok(self.unlocked)
        } else {
            Err(KeystoreError::Unlock(
                self.failures.into_iter().map(|(_, e)| e).collect(),
            ))
        }
    }
}

/// Unlocked VRF keys, keyed by public key, backed by encrypted storage.
///
/// Proof generation copies the secret out under a read lock and runs without
/// holding it.
pub struct VrfKeyStore {
    backend: Arc<dyn KeyBackend>,
    keys: RwLock<HashMap<PublicKey, SecretKey>>,
    kdf_params: KdfParams,
}

impl VrfKeyStore {
    pub fn new(backend: Arc<dyn KeyBackend>, kdf_params: KdfParams) -> Self {
        Self {
            backend,
            keys: RwLock::new(HashMap::new()),
            kdf_params,
        }
    }

    /// Generate a new key, persist it encrypted with `passphrase`, and keep
    /// it unlocked.
    pub fn create(&self, passphrase: &str) -> Result<PublicKey, KeystoreError> {
        let secret = SecretKey::random();
        let public_key = secret.public_key();
        let encrypted = encrypt_key(&secret, passphrase, &self.kdf_params)?;
        self.backend.put(&encrypted)?;
        self.keys.write().insert(public_key, secret);
        info!(%public_key, "created VRF key");
        Ok(public_key)
    }

    /// Try to decrypt every stored key with `passphrase`. Keys that decrypt
    /// are added to the unlocked set.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockOutcome, KeystoreError> {
        let stored = self.backend.list()?;
        let mut outcome = UnlockOutcome::default();
        let mut decrypted = Vec::with_capacity(stored.len());
        for key in &stored {
            match decrypt_key(key, passphrase) {
                Ok(secret) => decrypted.push(secret),
                Err(e) => {
                    warn!(public_key = %key.public_key, error = %e, "failed to unlock VRF key");
                    outcome.failures.push((key.public_key, e));
                }
            }
        }

        let mut keys = self.keys.write();
        for secret in decrypted {
            let public_key = secret.public_key();
            keys.insert(public_key, secret);
            outcome.unlocked.push(public_key);
        }
        debug!(
            unlocked = outcome.unlocked.len(),
            failed = outcome.failures.len(),
            "unlock complete"
        );
        Ok(outcome)
    }

    /// Drop the in-memory copy of a key.
    pub fn forget(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        self.keys
            .write()
            .remove(public_key)
            .map(|_| ())
            .ok_or(KeystoreError::KeyNotFound(*public_key))
    }

    /// Forget a key and move its encrypted form to the archive.
    pub fn archive(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        if public_key.is_zero() {
            return Err(KeystoreError::InvalidKey);
        }
        self.keys.write().remove(public_key);
        self.backend.archive(public_key)?;
        info!(%public_key, "archived VRF key");
        Ok(())
    }

    /// Forget a key and remove its encrypted form permanently.
    pub fn delete(&self, public_key: &PublicKey) -> Result<(), KeystoreError> {
        if public_key.is_zero() {
            return Err(KeystoreError::InvalidKey);
        }
        self.keys.write().remove(public_key);
        self.backend.delete(public_key)?;
        info!(%public_key, "deleted VRF key");
        Ok(())
    }

    /// Import an encrypted key file, persisting it and unlocking it.
    pub fn import(&self, key_json: &[u8], passphrase: &str) -> Result<PublicKey, KeystoreError> {
        let encrypted = EncryptedKey::from_json(key_json)?;
        if self.backend.get(&encrypted.public_key)?.is_some() {
            return Err(KeystoreError::AlreadyExists(encrypted.public_key));
        }
        let secret = decrypt_key(&encrypted, passphrase)?;
        self.backend.put(&encrypted)?;
        self.keys.write().insert(encrypted.public_key, secret);
        info!(public_key = %encrypted.public_key, "imported VRF key");
        Ok(encrypted.public_key)
    }

    /// Export an unlocked key, re-encrypted under `passphrase`.
    pub fn export(&self, public_key: &PublicKey, passphrase: &str) -> Result<Vec<u8>, KeystoreError> {
        let secret = self.secret(public_key)?;
        encrypt_key(&secret, passphrase, &self.kdf_params)?.to_json()
    }

    /// Public keys of every stored key, unlocked or not.
    pub fn list(&self) -> Result<Vec<PublicKey>, KeystoreError> {
        Ok(self.backend.list()?.into_iter().map(|k| k.public_key).collect())
    }

    pub fn list_unlocked(&self) -> Vec<PublicKey> {
        let mut keys: Vec<PublicKey> = self.keys.read().keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn is_unlocked(&self, public_key: &PublicKey) -> bool {
        self.keys.read().contains_key(public_key)
    }

    fn secret(&self, public_key: &PublicKey) -> Result<SecretKey, KeystoreError> {
        self.keys
            .read()
            .get(public_key)
            .cloned()
            .ok_or(KeystoreError::KeyNotUnlocked(*public_key))
    }

    /// Prove `seed` directly under an unlocked key.
    pub fn prove(&self, public_key: &PublicKey, seed: U256) -> Result<Proof, KeystoreError> {
        let secret = self.secret(public_key)?;
        Ok(generate_proof(&secret, seed)?)
    }

    /// The v1 coordinator response for a request.
    pub fn generate_proof(
        &self,
        public_key: &PublicKey,
        s: &PreSeedData,
    ) -> Result<MarshaledOnChainResponse, KeystoreError> {
        let secret = self.secret(public_key)?;
        Ok(generate_proof_response(&secret, s)?)
    }

    /// The v2 coordinator proof struct for a request.
    pub fn generate_proof_v2(
        &self,
        public_key: &PublicKey,
        s: &PreSeedData,
    ) -> Result<MarshaledProof, KeystoreError> {
        let secret = self.secret(public_key)?;
        Ok(generate_proof_response_v2(&secret, s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use sortes_types::BlockHash;
    use sortes_vrf::{unmarshal_proof_response, verify_solidity_proof, Seed};

    fn store() -> VrfKeyStore {
        VrfKeyStore::new(Arc::new(MemoryBackend::new()), KdfParams::light())
    }

    fn pre_seed() -> PreSeedData {
        PreSeedData {
            pre_seed: Seed::new([3; 32]),
            block_hash: BlockHash::new([4; 32]),
            block_num: 77,
        }
    }

    #[test]
    fn created_key_is_unlocked() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        assert!(ks.is_unlocked(&pk));
        assert_eq!(ks.list().unwrap(), vec![pk]);
    }

    #[test]
    fn proof_requires_unlocked_key() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        ks.forget(&pk).unwrap();
        assert!(matches!(
            ks.generate_proof(&pk, &pre_seed()),
            Err(KeystoreError::KeyNotUnlocked(k)) if k == pk
        ));
    }

    #[test]
    fn unlock_restores_forgotten_key() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        ks.forget(&pk).unwrap();
        let outcome = ks.unlock("pass").unwrap();
        assert_eq!(outcome.unlocked, vec![pk]);
        assert!(outcome.failures.is_empty());
        assert!(ks.is_unlocked(&pk));
    }

    #[test]
    fn unlock_aggregates_failures() {
        let ks = store();
        let good = ks.create("one").unwrap();
        let bad = ks.create("two").unwrap();
        ks.forget(&good).unwrap();
        ks.forget(&bad).unwrap();

        let outcome = ks.unlock("one").unwrap();
        assert_eq!(outcome.unlocked, vec![good]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, bad);
        assert!(matches!(
            outcome.into_result(),
            Err(KeystoreError::Unlock(errs)) if errs.len() == 1
        ));
    }

    #[test]
    fn generated_response_decodes() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        let s = pre_seed();
        let bytes = ks.generate_proof(&pk, &s).unwrap();
        let response = unmarshal_proof_response(&bytes).unwrap();
        assert_eq!(response.block_num, 77);
        let proof = response.crypto_proof(&s).unwrap();
        assert_eq!(sortes_crypto::PublicKey::from_point(&proof.public_key), pk);
    }

    #[test]
    fn v2_proof_encodes_pre_seed() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        let bytes = ks.generate_proof_v2(&pk, &pre_seed()).unwrap();
        // The encoded seed is the pre-seed, so the witnesses do not match it.
        assert!(verify_solidity_proof(&bytes).is_err());
    }

    #[test]
    fn zero_key_cannot_be_deleted_or_archived() {
        let ks = store();
        assert!(matches!(
            ks.delete(&PublicKey::ZERO),
            Err(KeystoreError::InvalidKey)
        ));
        assert!(matches!(
            ks.archive(&PublicKey::ZERO),
            Err(KeystoreError::InvalidKey)
        ));
    }

    #[test]
    fn archived_key_is_not_unlocked_again() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        ks.archive(&pk).unwrap();
        assert!(!ks.is_unlocked(&pk));
        assert!(ks.unlock("pass").unwrap().unlocked.is_empty());
    }

    #[test]
    fn delete_forgets_and_removes() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        ks.delete(&pk).unwrap();
        assert!(!ks.is_unlocked(&pk));
        assert!(ks.list().unwrap().is_empty());
    }

    #[test]
    fn export_then_import_elsewhere() {
        let source = store();
        let pk = source.create("pass").unwrap();
        let json = source.export(&pk, "transfer").unwrap();

        let target = store();
        assert_eq!(target.import(&json, "transfer").unwrap(), pk);
        assert!(target.is_unlocked(&pk));
        assert!(matches!(
            target.import(&json, "transfer"),
            Err(KeystoreError::AlreadyExists(k)) if k == pk
        ));
    }

    #[test]
    fn import_with_wrong_passphrase_fails() {
        let source = store();
        let pk = source.create("pass").unwrap();
        let json = source.export(&pk, "transfer").unwrap();
        assert!(matches!(
            store().import(&json, "nope"),
            Err(KeystoreError::Decrypt)
        ));
    }

    #[test]
    fn prove_verifies() {
        let ks = store();
        let pk = ks.create("pass").unwrap();
        let proof = ks.prove(&pk, U256::from(5u64)).unwrap();
        assert!(proof.verify().unwrap());
    }
}

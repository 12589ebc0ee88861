//! Seed custody.
//!
//! [`SeedVault`] is the one component allowed to touch seed plaintext: it
//! encrypts mnemonics with AES-256-GCM under a process-wide master key and
//! authenticates them on the way back out. [`SeedCustodian`] pairs the vault
//! with the storage collaborator so the rest of the engine only ever sees
//! ciphertext or short-lived decrypted phrases.

use crate::{
    config::SecretsConfig,
    constants::SEED_PHRASE_WORDS,
    error::{EngineError, VaultError},
    storage::{EngineStorage, StorageApi},
};
use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, AeadCore, OsRng},
};
use alloy::{
    primitives::Bytes,
    signers::local::coins_bip39::{English, Mnemonic},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use zeroize::{Zeroize, Zeroizing};

/// Length of the GCM authentication tag in bytes.
const TAG_LEN: usize = 16;

/// An encrypted seed record.
///
/// The three fields form one authenticated-encryption unit; they are always
/// produced and consumed together and never stored or transmitted separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSeed {
    /// AES-256-GCM ciphertext, without the tag.
    pub ciphertext: Bytes,
    /// The 96-bit nonce drawn for this encryption.
    pub iv: Bytes,
    /// The 128-bit GCM authentication tag.
    pub auth_tag: Bytes,
}

/// Encrypts and decrypts seed phrases at rest.
#[derive(Clone)]
pub struct SeedVault {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SeedVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedVault").finish_non_exhaustive()
    }
}

impl SeedVault {
    /// Creates a vault from 32 raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != 32 {
            return Err(VaultError::InvalidKeyLength { got: key.len() });
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|_| VaultError::InvalidKeyLength { got: key.len() })?;
        Ok(Self { cipher })
    }

    /// Creates a vault from the configured base64-encoded master key.
    ///
    /// Fails fast when the key is absent or does not decode to exactly 32
    /// bytes; the process must refuse to serve in that state.
    pub fn from_config(secrets: &SecretsConfig) -> Result<Self, VaultError> {
        let encoded = secrets.seed_master_key.as_deref().ok_or(VaultError::MissingKey)?;
        let mut raw = BASE64.decode(encoded)?;
        let vault = Self::new(&raw);
        raw.zeroize();
        vault
    }

    /// Encrypts a seed phrase, drawing a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSeed, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed =
            self.cipher.encrypt(&nonce, plaintext.as_bytes()).map_err(|_| VaultError::Cipher)?;
        // The aead API appends the tag; the stored record keeps it separate.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);
        Ok(EncryptedSeed {
            ciphertext: sealed.into(),
            iv: nonce.to_vec().into(),
            auth_tag: tag.into(),
        })
    }

    /// Decrypts a seed record, authenticating all three fields.
    ///
    /// Any altered byte of ciphertext, IV or tag yields
    /// [`VaultError::Tampered`].
    pub fn decrypt(&self, seed: &EncryptedSeed) -> Result<Zeroizing<String>, VaultError> {
        if seed.iv.len() != 12 {
            return Err(VaultError::Tampered);
        }
        let mut sealed = Vec::with_capacity(seed.ciphertext.len() + seed.auth_tag.len());
        sealed.extend_from_slice(&seed.ciphertext);
        sealed.extend_from_slice(&seed.auth_tag);
        let mut plain = self
            .cipher
            .decrypt(Nonce::from_slice(&seed.iv), sealed.as_slice())
            .map_err(|_| VaultError::Tampered)?;
        let phrase = String::from_utf8(plain.clone()).map_err(|_| VaultError::Tampered)?;
        plain.zeroize();
        Ok(Zeroizing::new(phrase))
    }
}

/// Seed custody over a storage backend.
///
/// All secrets pass through the vault before and after the storage boundary;
/// the backend only ever holds [`EncryptedSeed`] records.
#[derive(Debug, Clone)]
pub struct SeedCustodian {
    vault: SeedVault,
    storage: EngineStorage,
}

impl SeedCustodian {
    /// Creates a custodian over the given vault and storage.
    pub fn new(vault: SeedVault, storage: EngineStorage) -> Self {
        Self { vault, storage }
    }

    /// Whether the owner has seed material on record.
    pub async fn has_seed(&self, owner: &str) -> Result<bool, EngineError> {
        Ok(self.storage.has_seed(owner).await?)
    }

    /// Decrypts and returns the owner's seed phrase, if any.
    pub async fn seed_phrase(&self, owner: &str) -> Result<Option<Zeroizing<String>>, EngineError> {
        match self.storage.read_seed(owner).await? {
            Some(record) => Ok(Some(self.vault.decrypt(&record)?)),
            None => Ok(None),
        }
    }

    /// Returns the owner's seed phrase, provisioning a fresh random one on
    /// first use.
    #[instrument(skip(self))]
    pub async fn ensure_seed(&self, owner: &str) -> Result<Zeroizing<String>, EngineError> {
        if let Some(phrase) = self.seed_phrase(owner).await? {
            return Ok(phrase);
        }
        let mnemonic = Mnemonic::<English>::new_with_count(&mut rand::thread_rng(), SEED_PHRASE_WORDS)
            .map_err(|err| eyre::eyre!("mnemonic generation failed: {err}"))?;
        let phrase = Zeroizing::new(mnemonic.to_phrase());
        let record = self.vault.encrypt(&phrase)?;
        self.storage.write_seed(owner, &record).await?;
        info!(owner, "provisioned new seed");
        Ok(phrase)
    }

    /// Replaces the owner's seed with an imported phrase.
    ///
    /// The record is overwritten as a whole; archival of the previous seed is
    /// the history collaborator's job.
    pub async fn import_seed(&self, owner: &str, phrase: &str) -> Result<(), EngineError> {
        Mnemonic::<English>::new_from_phrase(phrase)
            .map_err(|err| eyre::eyre!("invalid mnemonic: {err}"))?;
        let record = self.vault.encrypt(phrase)?;
        self.storage.write_seed(owner, &record).await?;
        info!(owner, "imported seed");
        Ok(())
    }
}

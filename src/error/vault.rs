use thiserror::Error;

/// Errors raised by the seed vault.
#[derive(Debug, Error)]
pub enum VaultError {
    /// No master key was configured.
    ///
    /// The vault refuses to construct without one; serving would make every
    /// seed record unreadable or, worse, silently store plaintext.
    #[error("seed vault master key is not configured")]
    MissingKey,
    /// The configured master key does not decode to exactly 32 raw bytes.
    #[error("seed vault master key must be 32 bytes, got {got}")]
    InvalidKeyLength {
        /// Decoded key length.
        got: usize,
    },
    /// The configured master key is not valid base64.
    #[error("seed vault master key is not valid base64: {0}")]
    KeyEncoding(#[from] base64::DecodeError),
    /// Authentication failed while decrypting a seed record.
    ///
    /// Any altered byte of ciphertext, IV or auth tag lands here. Callers use
    /// this variant to treat the record as unrecoverable; it must never be
    /// reported as "not found".
    #[error("seed record failed authentication; ciphertext, iv or auth tag is corrupt")]
    Tampered,
    /// The cipher rejected an encryption input.
    #[error("seed encryption failed")]
    Cipher,
}

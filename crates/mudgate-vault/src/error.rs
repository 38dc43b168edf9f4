//! Vault error types.

/// Errors from credential encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("No encryption keys configured")]
    NoKeys,

    #[error("Unknown key version: {0}")]
    InvalidKeyVersion(u32),

    #[error("Ciphertext too short")]
    CiphertextTooShort,

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Authentication failed during decryption")]
    AuthFailed,
}

//! Versioned key ring with AES-256-GCM encryption.
//!
//! Blob layout on the wire and in storage: `nonce ∥ ciphertext_with_tag`.
//! The key version is never embedded in the blob; it travels in a sibling
//! column so decryption always uses the version the blob was written with.

use std::collections::BTreeMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::VaultError;

/// Nonce size for AES-256-GCM.
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size.
const TAG_SIZE: usize = 16;

/// A ring of versioned AES-256-GCM ciphers.
///
/// Keys are add-only: the highest version is "current" and used for all new
/// encryptions, while older versions remain available for blobs recorded
/// under them.
pub struct KeyRing {
    ciphers: BTreeMap<u32, Aes256Gcm>,
    current: u32,
}

impl KeyRing {
    /// Build a ring from raw 32-byte keys indexed by version.
    ///
    /// The input key material is zeroized before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::NoKeys`] when the map is empty — the gateway
    /// must refuse to start without at least one key.
    pub fn new(mut keys: BTreeMap<u32, [u8; 32]>) -> Result<Self, VaultError> {
        let mut ciphers = BTreeMap::new();
        let mut current = 0;

        for (version, key_bytes) in &mut keys {
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key_bytes));
            key_bytes.zeroize();
            ciphers.insert(*version, cipher);
            current = current.max(*version);
        }

        if ciphers.is_empty() {
            return Err(VaultError::NoKeys);
        }

        Ok(Self { ciphers, current })
    }

    /// The version used for all new encryptions (highest in the ring).
    pub fn current_version(&self) -> u32 {
        self.current
    }

    /// Whether a given version exists in the ring.
    pub fn has_version(&self, version: u32) -> bool {
        self.ciphers.contains_key(&version)
    }

    /// Encrypt plaintext with the current key.
    ///
    /// Returns the blob (`nonce ∥ ciphertext_with_tag`) and the key version
    /// it was written with. A fresh random nonce is drawn per call.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, u32), VaultError> {
        let cipher = self
            .ciphers
            .get(&self.current)
            .ok_or(VaultError::InvalidKeyVersion(self.current))?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok((blob, self.current))
    }

    /// Decrypt a blob with a specific key version.
    ///
    /// # Errors
    ///
    /// * [`VaultError::InvalidKeyVersion`] when the version is not in the
    ///   ring.
    /// * [`VaultError::AuthFailed`] when the authentication tag does not
    ///   verify (wrong key or tampered blob).
    pub fn decrypt(&self, blob: &[u8], version: u32) -> Result<Vec<u8>, VaultError> {
        let cipher = self
            .ciphers
            .get(&version)
            .ok_or(VaultError::InvalidKeyVersion(version))?;

        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::CiphertextTooShort);
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| VaultError::AuthFailed)
    }

    /// Decrypt a blob whose recorded key version was lost.
    ///
    /// Tries the current version first, then the remaining versions. Only
    /// for legacy rows; new rows always carry their version and use
    /// [`KeyRing::decrypt`].
    pub fn decrypt_any(&self, blob: &[u8]) -> Result<Vec<u8>, VaultError> {
        if let Ok(plaintext) = self.decrypt(blob, self.current) {
            return Ok(plaintext);
        }

        for version in self.ciphers.keys() {
            if *version == self.current {
                continue;
            }
            if let Ok(plaintext) = self.decrypt(blob, *version) {
                return Ok(plaintext);
            }
        }

        Err(VaultError::AuthFailed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn ring_with_versions(versions: &[u32]) -> KeyRing {
        let mut keys = BTreeMap::new();
        for &v in versions {
            let mut key = [0u8; 32];
            key[0] = v as u8;
            key[31] = !(v as u8);
            keys.insert(v, key);
        }
        KeyRing::new(keys).unwrap()
    }

    #[test]
    fn empty_ring_is_rejected() {
        let result = KeyRing::new(BTreeMap::new());
        assert!(matches!(result, Err(VaultError::NoKeys)));
    }

    #[test]
    fn current_version_is_max() {
        let ring = ring_with_versions(&[1, 3, 2]);
        assert_eq!(ring.current_version(), 3);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let ring = ring_with_versions(&[1]);
        let (blob, version) = ring.encrypt(b"p@ss").unwrap();

        assert_eq!(version, 1);
        let plaintext = ring.decrypt(&blob, version).unwrap();
        assert_eq!(plaintext, b"p@ss");
    }

    #[test]
    fn roundtrip_empty_plaintext() {
        let ring = ring_with_versions(&[1]);
        let (blob, version) = ring.encrypt(b"").unwrap();
        assert!(ring.decrypt(&blob, version).unwrap().is_empty());
    }

    #[test]
    fn roundtrip_one_mebibyte() {
        let ring = ring_with_versions(&[1]);
        let plaintext = vec![0xA5u8; 1024 * 1024];

        let (blob, version) = ring.encrypt(&plaintext).unwrap();
        assert_eq!(ring.decrypt(&blob, version).unwrap(), plaintext);
    }

    #[test]
    fn blob_layout_is_nonce_then_tagged_ciphertext() {
        let ring = ring_with_versions(&[1]);
        let (blob, _) = ring.encrypt(b"secret").unwrap();
        assert_eq!(blob.len(), NONCE_SIZE + b"secret".len() + TAG_SIZE);
    }

    #[test]
    fn unknown_version_fails_closed() {
        let ring = ring_with_versions(&[1]);
        let (blob, _) = ring.encrypt(b"secret").unwrap();

        let result = ring.decrypt(&blob, 9);
        assert!(matches!(result, Err(VaultError::InvalidKeyVersion(9))));
    }

    #[test]
    fn wrong_version_fails_auth_never_garbage() {
        let ring = ring_with_versions(&[1, 2]);
        let (blob, version) = ring.encrypt(b"secret").unwrap();
        assert_eq!(version, 2);

        let result = ring.decrypt(&blob, 1);
        assert!(matches!(result, Err(VaultError::AuthFailed)));
    }

    #[test]
    fn tampered_blob_fails_auth() {
        let ring = ring_with_versions(&[1]);
        let (mut blob, version) = ring.encrypt(b"secret").unwrap();
        *blob.last_mut().unwrap() ^= 0xFF;

        assert!(matches!(
            ring.decrypt(&blob, version),
            Err(VaultError::AuthFailed)
        ));
    }

    #[test]
    fn short_blob_is_rejected() {
        let ring = ring_with_versions(&[1]);
        assert!(matches!(
            ring.decrypt(&[0u8; 5], 1),
            Err(VaultError::CiphertextTooShort)
        ));
    }

    #[test]
    fn old_blobs_decrypt_after_ring_grows() {
        let mut keys = BTreeMap::new();
        keys.insert(1, [11u8; 32]);
        let old_ring = KeyRing::new(keys).unwrap();
        let (blob, version) = old_ring.encrypt(b"legacy").unwrap();
        assert_eq!(version, 1);

        let mut keys = BTreeMap::new();
        keys.insert(1, [11u8; 32]);
        keys.insert(2, [22u8; 32]);
        let new_ring = KeyRing::new(keys).unwrap();

        // Stored version still decrypts; new encryptions use the new key.
        assert_eq!(new_ring.decrypt(&blob, 1).unwrap(), b"legacy");
        assert_eq!(new_ring.encrypt(b"fresh").unwrap().1, 2);
    }

    #[test]
    fn decrypt_any_falls_back_to_older_versions() {
        let mut keys = BTreeMap::new();
        keys.insert(1, [11u8; 32]);
        let old_ring = KeyRing::new(keys).unwrap();
        let (blob, _) = old_ring.encrypt(b"legacy").unwrap();

        let mut keys = BTreeMap::new();
        keys.insert(1, [11u8; 32]);
        keys.insert(2, [22u8; 32]);
        let new_ring = KeyRing::new(keys).unwrap();

        assert_eq!(new_ring.decrypt_any(&blob).unwrap(), b"legacy");
    }

    #[test]
    fn decrypt_any_with_no_matching_key_fails_auth() {
        let ring_a = ring_with_versions(&[1]);
        let (blob, _) = ring_a.encrypt(b"secret").unwrap();

        let mut keys = BTreeMap::new();
        keys.insert(1, [99u8; 32]);
        let ring_b = KeyRing::new(keys).unwrap();

        assert!(matches!(ring_b.decrypt_any(&blob), Err(VaultError::AuthFailed)));
    }

    #[test]
    fn nonces_never_repeat() {
        let ring = ring_with_versions(&[1]);
        let mut seen = std::collections::HashSet::new();

        for _ in 0..1000 {
            let (blob, _) = ring.encrypt(b"x").unwrap();
            let nonce: [u8; NONCE_SIZE] = blob[..NONCE_SIZE].try_into().unwrap();
            assert!(seen.insert(nonce), "nonce collision detected");
        }
    }
}

//! Credential vault for the mudgate gateway.
//!
//! Authenticated encryption of saved upstream passwords using AES-256-GCM
//! with a versioned key ring. New encryptions always use the highest key
//! version; stored blobs decrypt with the version recorded next to them.

pub mod error;
pub mod keyring;

pub use error::VaultError;
pub use keyring::{KeyRing, NONCE_SIZE};

//! Node identity — the signing key a session's network capability is bound to.
//!
//! Key material crosses the host boundary as opaque bytes. Two encodings are
//! accepted on import:
//!   1. the 32-byte Ed25519 secret
//!   2. the 64-byte secret ‖ public keypair form
//!
//! Export always produces the 32-byte secret. An empty byte sequence means
//! "generate a fresh key" (see [`Identity::from_material`]).
//!
//! Key material is wiped from memory when the identity is dropped.

use std::path::{Path, PathBuf};

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::event::PeerId;

const SECRET_LEN: usize = 32;
const KEYPAIR_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("key material must be 32 or 64 bytes, got {0}")]
    InvalidLength(usize),
    #[error("malformed key material: {0}")]
    Malformed(String),
    #[error("failed to read key file {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write key file {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("key file {0} is not valid hex")]
    DecodeFailed(PathBuf),
}

/// A session's long-term signing identity.
#[derive(Clone)]
pub struct Identity {
    signing: SigningKey,
}

impl Identity {
    /// Generate a new random identity.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Import key bytes, or generate when `bytes` is empty.
    pub fn from_material(bytes: &[u8]) -> Result<Self, IdentityError> {
        if bytes.is_empty() {
            return Ok(Self::generate());
        }
        Self::from_bytes(bytes)
    }

    /// Import a 32-byte secret or a 64-byte keypair.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let signing = match bytes.len() {
            SECRET_LEN => {
                let mut secret = Zeroizing::new([0u8; SECRET_LEN]);
                secret.copy_from_slice(bytes);
                SigningKey::from_bytes(&secret)
            }
            KEYPAIR_LEN => {
                let mut pair = Zeroizing::new([0u8; KEYPAIR_LEN]);
                pair.copy_from_slice(bytes);
                SigningKey::from_keypair_bytes(&pair)
                    .map_err(|e| IdentityError::Malformed(e.to_string()))?
            }
            other => return Err(IdentityError::InvalidLength(other)),
        };
        Ok(Self { signing })
    }

    /// Export the secret for storage or hand-off to a network capability.
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.signing.to_bytes().to_vec())
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// Hex of the public key. Capabilities with their own addressing scheme
    /// (libp2p) derive a different id from the same key.
    pub fn peer_id(&self) -> PeerId {
        PeerId::new(hex::encode(self.public_key()))
    }

    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing.sign(data).to_bytes()
    }

    /// Check a signature produced by [`Identity::sign`].
    pub fn verify(public_key: &[u8; 32], data: &[u8], signature: &[u8]) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(data, &signature).is_ok()
    }

    // ── Key files ─────────────────────────────────────────────────────────────

    /// Load a hex-encoded key file, or generate one and write it.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            return Self::load(path);
        }
        let identity = Self::generate();
        identity.save(path)?;
        Ok(identity)
    }

    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let text = Zeroizing::new(
            std::fs::read_to_string(path)
                .map_err(|e| IdentityError::ReadFailed(path.to_path_buf(), e))?,
        );
        let bytes = Zeroizing::new(
            hex::decode(text.trim()).map_err(|_| IdentityError::DecodeFailed(path.to_path_buf()))?,
        );
        Self::from_bytes(&bytes)
    }

    /// Write the secret as hex. On unix the file is created mode 0600.
    pub fn save(&self, path: &Path) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
        }
        let text = Zeroizing::new(hex::encode(self.to_bytes().as_slice()));
        std::fs::write(path, text.as_bytes())
            .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Generate fresh key material suitable for [`Identity::from_material`].
pub fn generate_key() -> Vec<u8> {
    Identity::generate().to_bytes().to_vec()
}

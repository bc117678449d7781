use chacha20poly1305::{
    Key, XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};

use crate::error::{Result, VaultError};

pub const KEY_LEN: usize = 32;
/// XChaCha requires a 24-byte nonce; large enough to draw at random per chunk.
pub const IV_LEN: usize = 24;
pub const TAG_LEN: usize = 16;
pub const ALGORITHM: &str = "xchacha20poly1305";

/// Raw 32-byte key.
#[derive(Clone)]
pub struct AeadKey(pub [u8; KEY_LEN]);

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AeadKey(..)")
    }
}

/// Output of one `encrypt` call.
#[derive(Clone, Debug)]
pub struct Sealed {
    pub ciphertext: Vec<u8>,
    pub algorithm: &'static str,
    pub iv: Vec<u8>,
}

/// Stateless per-chunk codec. Cheap to clone; share behind an `Arc` across workers.
#[derive(Clone)]
pub struct ChunkCipher {
    aead: XChaCha20Poly1305,
}

impl ChunkCipher {
    pub fn new(key: &AeadKey) -> Self {
        Self {
            aead: XChaCha20Poly1305::new(Key::from_slice(&key.0)),
        }
    }

    /// Seal one chunk under a fresh random IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed> {
        let mut iv = [0u8; IV_LEN];
        getrandom::getrandom(&mut iv)
            .map_err(|e| VaultError::Encryption(format!("failed to generate IV: {e}")))?;
        let ciphertext = self
            .aead
            .encrypt(XNonce::from_slice(&iv), plaintext)
            .map_err(|_| VaultError::Encryption("seal failed".into()))?;
        Ok(Sealed {
            ciphertext,
            algorithm: ALGORITHM,
            iv: iv.to_vec(),
        })
    }

    /// Open one chunk. Any tampering, or the wrong key or IV, is an error.
    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>> {
        if iv.len() != IV_LEN {
            return Err(VaultError::Decryption(format!(
                "expected {IV_LEN}-byte IV, got {}",
                iv.len()
            )));
        }
        self.aead
            .decrypt(XNonce::from_slice(iv), ciphertext)
            .map_err(|_| VaultError::Decryption("authentication failed".into()))
    }
}

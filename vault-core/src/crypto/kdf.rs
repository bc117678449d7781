use argon2::Argon2;

use super::aead::{AeadKey, KEY_LEN};
use crate::error::{Result, VaultError};

pub const MIN_SALT_LEN: usize = 8;

/// Argon2id (default params) passphrase stretch into a chunk key.
pub fn derive_key(passphrase: &[u8], salt: &[u8]) -> Result<AeadKey> {
    if salt.len() < MIN_SALT_LEN {
        return Err(VaultError::Config(format!(
            "key salt must be at least {MIN_SALT_LEN} bytes"
        )));
    }
    let mut out = [0u8; KEY_LEN];
    Argon2::default()
        .hash_password_into(passphrase, salt, &mut out)
        .map_err(|e| VaultError::Config(format!("key derivation failed: {e}")))?;
    Ok(AeadKey(out))
}

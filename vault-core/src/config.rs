use crate::crypto::aead::AeadKey;
use crate::error::{Result, VaultError};

pub const DEFAULT_WORKERS: usize = 4;

/// Per-service transfer settings, passed explicitly at construction.
#[derive(Clone, Debug)]
pub struct TransferConfig {
    pub workers_count: usize,
    pub key: AeadKey,
}

impl TransferConfig {
    pub fn new(workers_count: usize, key: AeadKey) -> Result<Self> {
        if workers_count == 0 {
            return Err(VaultError::Config("workers_count must be at least 1".into()));
        }
        Ok(Self { workers_count, key })
    }
}

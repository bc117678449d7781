#![forbid(unsafe_code)]

pub mod config;
pub mod error;

pub mod util {
    pub mod sanitize;
}

pub mod chunking;
pub mod partition;

pub mod crypto {
    pub mod aead;
    pub mod hex;
    pub mod kdf;
}

pub mod domain;
pub mod list;

// Re-exports: stable API surface
pub use chunking::{ChunkPlan, DEFAULT_CHUNK_SIZE, chunk_offset, total_chunks};
pub use config::TransferConfig;
pub use crypto::aead::{AeadKey, ChunkCipher, Sealed};
pub use domain::{ChunkRecord, FileId, FileRecord, MetaEntry, NewFile, UserId};
pub use error::{Result, VaultError};
pub use list::ListQuery;
pub use partition::partition_ranges;

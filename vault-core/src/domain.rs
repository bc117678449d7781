// vault_core/src/domain.rs
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub type FileId = i64;

/// Authenticated caller identity, as issued by the auth gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetaEntry {
    pub id: i64,
    pub name: String,
    pub value: String,
}

/// What the first upload frame declares about a file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NewFile {
    pub filename: String,
    pub mime_type: String,
    pub original_size: u64,
    pub description: String,
    pub chunk_size: u32,
    pub total_chunks: u32,
    /// (name, value) pairs
    pub meta: Vec<(String, String)>,
}

#[derive(Clone, Debug)]
pub struct FileRecord {
    pub id: FileId,
    pub owner_id: UserId,
    pub filename: String,
    pub mime_type: String,
    /// Declared size until the upload completes, then the byte total received.
    pub original_size: u64,
    pub chunk_size: u32,
    pub total_chunks: u32,
    pub description: String,
    pub is_complete: bool,
    pub is_deleted: bool,
    pub created_at: OffsetDateTime,
    pub meta: Vec<MetaEntry>,
}

impl FileRecord {
    /// Visible to its owner through download, info and list.
    pub fn is_available(&self) -> bool {
        self.is_complete && !self.is_deleted
    }

    pub fn created_at_display(&self) -> String {
        self.created_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.created_at.unix_timestamp().to_string())
    }
}

#[derive(Clone, Debug)]
pub struct ChunkRecord {
    pub file_id: FileId,
    pub chunk_index: u32,
    pub encrypted: Vec<u8>,
    pub algorithm: String,
    pub iv: Vec<u8>,
    pub created_at: OffsetDateTime,
}

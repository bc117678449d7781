//! Durable chunk store seam.
//!
//! The upload and download pipelines only ever talk to a [`ChunkStore`];
//! implementations must be safe to share across every worker task.

use std::future::Future;
use std::ops::Range;

use vault_core::{ChunkRecord, FileId, FileRecord, ListQuery, NewFile, Result, Sealed, UserId};

pub mod libsql;
pub mod memory;

pub use self::libsql::LibsqlStore;
pub use self::memory::MemoryStore;

pub trait ChunkStore: Send + Sync + 'static {
    /// New incomplete file record owned by `owner`.
    fn create_file_record(
        &self,
        owner: UserId,
        file: &NewFile,
    ) -> impl Future<Output = Result<FileId>> + Send;

    /// Fails with `DuplicateChunk` when `(file_id, chunk_index)` already exists.
    fn save_chunk(
        &self,
        file_id: FileId,
        chunk_index: u32,
        sealed: Sealed,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fails with `Validation` unless exactly `total_chunks` distinct chunks are stored.
    fn mark_file_complete(
        &self,
        file_id: FileId,
        total_bytes: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Owned, non-deleted record (complete or not); `NotFound` otherwise.
    fn get_file_info(
        &self,
        file_id: FileId,
        owner: UserId,
    ) -> impl Future<Output = Result<FileRecord>> + Send;

    /// Chunks with `range.start <= index < range.end`, ascending by index.
    fn get_chunks_in_range(
        &self,
        file_id: FileId,
        range: Range<u32>,
    ) -> impl Future<Output = Result<Vec<ChunkRecord>>> + Send;

    /// Soft delete; chunk rows stay in place.
    fn delete_file(&self, owner: UserId, file_id: FileId) -> impl Future<Output = Result<()>> + Send;

    /// One page of complete, non-deleted files and the total match count.
    fn list_files(
        &self,
        owner: UserId,
        query: &ListQuery,
    ) -> impl Future<Output = Result<(Vec<FileRecord>, u64)>> + Send;

    /// Hard delete a record and all of its chunks.
    fn purge_file(&self, file_id: FileId) -> impl Future<Output = Result<()>> + Send;
}

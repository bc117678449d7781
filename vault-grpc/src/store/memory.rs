use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;
use vault_core::{
    ChunkRecord, FileId, FileRecord, ListQuery, MetaEntry, NewFile, Result, Sealed, UserId,
    VaultError,
};

use super::ChunkStore;

#[derive(Clone, Debug)]
struct StoredFile {
    record: FileRecord,
    chunks: BTreeMap<u32, ChunkRecord>,
}

/// Process-local store; also the fixture for pipeline tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: DashMap<FileId, StoredFile>,
    next_id: AtomicI64,
    next_meta_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored chunk count for a file, deleted or not.
    pub fn chunk_count(&self, file_id: FileId) -> usize {
        self.files.get(&file_id).map(|f| f.chunks.len()).unwrap_or(0)
    }

    /// Raw record lookup that bypasses ownership and visibility checks.
    pub fn record(&self, file_id: FileId) -> Option<FileRecord> {
        self.files.get(&file_id).map(|f| f.record.clone())
    }
}

impl ChunkStore for MemoryStore {
    async fn create_file_record(&self, owner: UserId, file: &NewFile) -> Result<FileId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let meta = file
            .meta
            .iter()
            .map(|(name, value)| MetaEntry {
                id: self.next_meta_id.fetch_add(1, Ordering::Relaxed) + 1,
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        let record = FileRecord {
            id,
            owner_id: owner,
            filename: file.filename.clone(),
            mime_type: file.mime_type.clone(),
            original_size: file.original_size,
            chunk_size: file.chunk_size,
            total_chunks: file.total_chunks,
            description: file.description.clone(),
            is_complete: false,
            is_deleted: false,
            created_at: OffsetDateTime::now_utc(),
            meta,
        };
        self.files.insert(
            id,
            StoredFile {
                record,
                chunks: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn save_chunk(&self, file_id: FileId, chunk_index: u32, sealed: Sealed) -> Result<()> {
        let mut file = self
            .files
            .get_mut(&file_id)
            .filter(|f| !f.record.is_deleted)
            .ok_or(VaultError::NotFound)?;
        match file.chunks.entry(chunk_index) {
            std::collections::btree_map::Entry::Occupied(_) => Err(VaultError::DuplicateChunk {
                file_id,
                chunk_index,
            }),
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(ChunkRecord {
                    file_id,
                    chunk_index,
                    encrypted: sealed.ciphertext,
                    algorithm: sealed.algorithm.to_string(),
                    iv: sealed.iv,
                    created_at: OffsetDateTime::now_utc(),
                });
                Ok(())
            }
        }
    }

    async fn mark_file_complete(&self, file_id: FileId, total_bytes: u64) -> Result<()> {
        let mut file = self
            .files
            .get_mut(&file_id)
            .filter(|f| !f.record.is_deleted)
            .ok_or(VaultError::NotFound)?;
        let total = file.record.total_chunks;
        let stored = file.chunks.keys().filter(|i| **i < total).count();
        if stored != total as usize || file.chunks.len() != total as usize {
            return Err(VaultError::Validation(format!(
                "file {file_id} has {} of {total} chunks",
                file.chunks.len()
            )));
        }
        file.record.is_complete = true;
        file.record.original_size = total_bytes;
        Ok(())
    }

    async fn get_file_info(&self, file_id: FileId, owner: UserId) -> Result<FileRecord> {
        self.files
            .get(&file_id)
            .filter(|f| f.record.owner_id == owner && !f.record.is_deleted)
            .map(|f| f.record.clone())
            .ok_or(VaultError::NotFound)
    }

    async fn get_chunks_in_range(&self, file_id: FileId, range: Range<u32>) -> Result<Vec<ChunkRecord>> {
        let file = self.files.get(&file_id).ok_or(VaultError::NotFound)?;
        Ok(file.chunks.range(range).map(|(_, c)| c.clone()).collect())
    }

    async fn delete_file(&self, owner: UserId, file_id: FileId) -> Result<()> {
        match self.files.get_mut(&file_id) {
            Some(mut f) if f.record.owner_id == owner && !f.record.is_deleted => {
                f.record.is_deleted = true;
                Ok(())
            }
            _ => Err(VaultError::NotFound),
        }
    }

    async fn list_files(&self, owner: UserId, query: &ListQuery) -> Result<(Vec<FileRecord>, u64)> {
        let mut hits: Vec<FileRecord> = self
            .files
            .iter()
            .map(|f| f.record.clone())
            .filter(|r| r.owner_id == owner && r.is_available())
            .filter(|r| {
                let fields = [r.filename.as_str(), r.description.as_str(), r.mime_type.as_str()];
                let meta = r.meta.iter().flat_map(|m| [m.name.as_str(), m.value.as_str()]);
                query.matches(fields.into_iter().chain(meta))
            })
            .collect();
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = hits.len() as u64;
        let page = hits
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .collect();
        Ok((page, total))
    }

    async fn purge_file(&self, file_id: FileId) -> Result<()> {
        match self.files.entry(file_id) {
            Entry::Occupied(e) => {
                e.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(VaultError::NotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::{AeadKey, ChunkCipher};

    fn new_file(total_chunks: u32) -> NewFile {
        NewFile {
            filename: "a.bin".into(),
            mime_type: "application/octet-stream".into(),
            original_size: 10,
            description: "test".into(),
            chunk_size: 4,
            total_chunks,
            meta: vec![("project".into(), "apollo".into())],
        }
    }

    fn sealed(data: &[u8]) -> Sealed {
        ChunkCipher::new(&AeadKey([9; 32])).encrypt(data).unwrap()
    }

    #[tokio::test]
    async fn second_write_to_same_index_is_rejected() {
        let store = MemoryStore::new();
        let id = store.create_file_record(UserId(1), &new_file(2)).await.unwrap();
        store.save_chunk(id, 0, sealed(b"abcd")).await.unwrap();
        let err = store.save_chunk(id, 0, sealed(b"zzzz")).await.unwrap_err();
        assert!(matches!(err, VaultError::DuplicateChunk { chunk_index: 0, .. }));
        assert_eq!(store.chunk_count(id), 1);
    }

    #[tokio::test]
    async fn completion_requires_every_chunk() {
        let store = MemoryStore::new();
        let id = store.create_file_record(UserId(1), &new_file(3)).await.unwrap();
        store.save_chunk(id, 0, sealed(b"abcd")).await.unwrap();
        store.save_chunk(id, 2, sealed(b"ef")).await.unwrap();
        assert!(matches!(
            store.mark_file_complete(id, 6).await,
            Err(VaultError::Validation(_))
        ));
        assert!(!store.record(id).unwrap().is_complete);

        store.save_chunk(id, 1, sealed(b"ghij")).await.unwrap();
        store.mark_file_complete(id, 10).await.unwrap();
        let rec = store.record(id).unwrap();
        assert!(rec.is_complete);
        assert_eq!(rec.original_size, 10);
    }

    #[tokio::test]
    async fn other_owners_and_deleted_files_are_not_found() {
        let store = MemoryStore::new();
        let id = store.create_file_record(UserId(1), &new_file(0)).await.unwrap();
        store.mark_file_complete(id, 0).await.unwrap();

        assert!(matches!(store.get_file_info(id, UserId(2)).await, Err(VaultError::NotFound)));
        assert!(matches!(store.delete_file(UserId(2), id).await, Err(VaultError::NotFound)));

        store.delete_file(UserId(1), id).await.unwrap();
        assert!(matches!(store.get_file_info(id, UserId(1)).await, Err(VaultError::NotFound)));
        assert!(matches!(store.delete_file(UserId(1), id).await, Err(VaultError::NotFound)));
    }

    #[tokio::test]
    async fn range_fetch_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        let id = store.create_file_record(UserId(1), &new_file(5)).await.unwrap();
        for i in [4u32, 1, 3, 0, 2] {
            store.save_chunk(id, i, sealed(&[i as u8])).await.unwrap();
        }
        let got: Vec<u32> = store
            .get_chunks_in_range(id, 1..4)
            .await
            .unwrap()
            .iter()
            .map(|c| c.chunk_index)
            .collect();
        assert_eq!(got, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn list_pages_and_filters_complete_files() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut f = new_file(0);
            f.filename = format!("doc-{i}.txt");
            let id = store.create_file_record(UserId(1), &f).await.unwrap();
            if i != 4 {
                store.mark_file_complete(id, 0).await.unwrap();
            }
        }
        store.create_file_record(UserId(2), &new_file(0)).await.unwrap();

        let (page, total) = store.list_files(UserId(1), &ListQuery::new(1, 3, "")).await.unwrap();
        assert_eq!(total, 4);
        assert_eq!(page.len(), 3);

        let (page, total) = store
            .list_files(UserId(1), &ListQuery::new(1, 10, "DOC-2"))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].filename, "doc-2.txt");

        let (_, total) = store
            .list_files(UserId(1), &ListQuery::new(1, 10, "apollo"))
            .await
            .unwrap();
        assert_eq!(total, 4);
    }

    #[tokio::test]
    async fn purge_removes_record_and_chunks() {
        let store = MemoryStore::new();
        let id = store.create_file_record(UserId(1), &new_file(2)).await.unwrap();
        store.save_chunk(id, 0, sealed(b"abcd")).await.unwrap();
        store.purge_file(id).await.unwrap();
        assert!(store.record(id).is_none());
        assert_eq!(store.chunk_count(id), 0);
    }
}

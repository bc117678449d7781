//! Download distributor: the chunk index space is cut into one contiguous
//! range per worker; each worker fetches its range in one store call,
//! opens every chunk and pushes it onto a shared bounded output queue.
//! Frames leave in arrival order, so the client must place them by index.

use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tonic::Status;
use vault_core::crypto::aead::ALGORITHM;
use vault_core::{ChunkCipher, FileId, FileRecord, Result, UserId, VaultError, partition_ranges};

use super::to_status;
use crate::proto::{DownloadResponse, FileChunk, FileMetadata, MetaData};
use crate::store::ChunkStore;

pub const OUTPUT_QUEUE_DEPTH: usize = 10;

pub type Outbound = mpsc::Receiver<std::result::Result<DownloadResponse, Status>>;

pub struct DownloadDistributor<S> {
    store: Arc<S>,
    cipher: Arc<ChunkCipher>,
    workers: usize,
}

impl<S: ChunkStore> DownloadDistributor<S> {
    pub fn new(store: Arc<S>, cipher: Arc<ChunkCipher>, workers: usize) -> Self {
        Self {
            store,
            cipher,
            workers: workers.max(1),
        }
    }

    /// Resolve the file, queue its metadata frame and start the range workers.
    ///
    /// Lookup failures surface here as `NotFound`; worker failures arrive
    /// as the final `Err` item of the returned queue.
    pub async fn open(&self, owner: UserId, file_id: FileId) -> Result<Outbound> {
        let record = self.store.get_file_info(file_id, owner).await?;
        if !record.is_available() {
            return Err(VaultError::NotFound);
        }

        let (tx, rx) = mpsc::channel(OUTPUT_QUEUE_DEPTH);
        // metadata always precedes the first chunk
        tx.send(Ok(DownloadResponse::metadata(metadata_frame(&record))))
            .await
            .map_err(|_| VaultError::Protocol("download receiver closed".into()))?;

        let ranges = partition_ranges(record.total_chunks, self.workers);
        tracing::info!(
            file_id,
            user_id = owner.0,
            total_chunks = record.total_chunks,
            workers = ranges.len(),
            "download started"
        );
        tokio::spawn(distribute(
            Arc::clone(&self.store),
            Arc::clone(&self.cipher),
            record,
            ranges,
            tx,
        ));
        Ok(rx)
    }
}

pub(crate) fn metadata_frame(record: &FileRecord) -> FileMetadata {
    FileMetadata {
        filename: record.filename.clone(),
        mime_type: record.mime_type.clone(),
        original_size: record.original_size as i64,
        description: record.description.clone(),
        chunk_size: record.chunk_size as i32,
        total_chunks: record.total_chunks as i32,
        meta_data: record
            .meta
            .iter()
            .map(|m| MetaData {
                id: m.id,
                name: m.name.clone(),
                value: m.value.clone(),
            })
            .collect(),
    }
}

async fn distribute<S: ChunkStore>(
    store: Arc<S>,
    cipher: Arc<ChunkCipher>,
    record: FileRecord,
    ranges: Vec<Range<u32>>,
    out: mpsc::Sender<std::result::Result<DownloadResponse, Status>>,
) {
    // one slot per worker: every failure is kept, none dropped
    let (err_tx, mut err_rx) = mpsc::channel::<VaultError>(ranges.len() + 1);
    let aborted = Arc::new(AtomicBool::new(false));
    let last_index = record.total_chunks.checked_sub(1);

    let mut pool = JoinSet::new();
    for (worker, range) in ranges.into_iter().enumerate() {
        if range.is_empty() {
            continue;
        }
        pool.spawn(range_worker(
            worker,
            Arc::clone(&store),
            Arc::clone(&cipher),
            record.id,
            range,
            last_index,
            out.clone(),
            err_tx.clone(),
            Arc::clone(&aborted),
        ));
    }
    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            let _ = err_tx.try_send(VaultError::Persistence(format!("range worker panicked: {e}")));
        }
    }
    drop(err_tx);

    let mut errors = Vec::new();
    while let Some(e) = err_rx.recv().await {
        errors.push(e);
    }
    match VaultError::from_many(errors) {
        Some(err) => {
            tracing::warn!(file_id = record.id, error = %err, "download failed");
            let _ = out.send(Err(to_status(err))).await;
        }
        None => tracing::info!(file_id = record.id, "download served"),
    }
    // dropping `out` ends the response stream
}

#[allow(clippy::too_many_arguments)]
async fn range_worker<S: ChunkStore>(
    worker: usize,
    store: Arc<S>,
    cipher: Arc<ChunkCipher>,
    file_id: FileId,
    range: Range<u32>,
    last_index: Option<u32>,
    out: mpsc::Sender<std::result::Result<DownloadResponse, Status>>,
    errors: mpsc::Sender<VaultError>,
    aborted: Arc<AtomicBool>,
) {
    let result: Result<()> = async {
        let chunks = store.get_chunks_in_range(file_id, range.clone()).await?;
        if chunks.len() != range.len() {
            return Err(VaultError::Persistence(format!(
                "chunks {}..{}: found {} of {}",
                range.start,
                range.end,
                chunks.len(),
                range.len()
            )));
        }
        tracing::debug!(worker, start = range.start, end = range.end, "range fetched");
        for c in chunks {
            if aborted.load(Ordering::SeqCst) {
                return Ok(());
            }
            if c.algorithm != ALGORITHM {
                return Err(VaultError::Decryption(format!(
                    "chunk {} sealed with unsupported algorithm {:?}",
                    c.chunk_index, c.algorithm
                )));
            }
            let data = cipher.decrypt(&c.encrypted, &c.iv).map_err(|_| {
                VaultError::Decryption(format!("chunk {} failed authentication", c.chunk_index))
            })?;
            let frame = DownloadResponse::chunk(FileChunk {
                data,
                chunk_index: c.chunk_index as i32,
                is_last: Some(c.chunk_index) == last_index,
            });
            if out.send(Ok(frame)).await.is_err() {
                // client went away; nothing left to deliver to
                aborted.store(true, Ordering::SeqCst);
                return Ok(());
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        aborted.store(true, Ordering::SeqCst);
        let _ = errors.try_send(e);
    }
}

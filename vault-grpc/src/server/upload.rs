//! Upload coordinator: one client stream in, a pool of seal-and-persist
//! workers behind a bounded queue, one accumulator tallying results.
//!
//! ```text
//!   stream ──► [task queue] ──► worker × N ──► [results] ──► accumulator
//!                                                              │
//!                                first error ◄─────────────────┘
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_core::Stream;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tonic::Status;
use vault_core::{ChunkCipher, ChunkPlan, FileId, NewFile, Result, UserId, VaultError};

use crate::proto::{FileChunk, FileMetadata, UploadRequest, upload_request};
use crate::store::ChunkStore;

pub const TASK_QUEUE_DEPTH: usize = 100;
pub const RESULT_QUEUE_DEPTH: usize = 100;

/// Where the coordinator is in a single upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    AwaitingMetadata,
    ReceivingChunks,
    Finalizing,
    Complete,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSummary {
    pub file_id: FileId,
    pub bytes_received: u64,
}

struct ChunkTask {
    file_id: FileId,
    chunk: FileChunk,
}

struct ChunkOutcome {
    chunk_index: u32,
    bytes: Result<u64>,
}

pub struct UploadCoordinator<S> {
    store: Arc<S>,
    cipher: Arc<ChunkCipher>,
    workers: usize,
    state: UploadState,
}

impl<S: ChunkStore> UploadCoordinator<S> {
    pub fn new(store: Arc<S>, cipher: Arc<ChunkCipher>, workers: usize) -> Self {
        Self {
            store,
            cipher,
            workers: workers.max(1),
            state: UploadState::AwaitingMetadata,
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    fn transition(&mut self, next: UploadState) {
        tracing::debug!(from = ?self.state, to = ?next, "upload state");
        self.state = next;
    }

    /// Drive one upload to completion. On any failure after the file record
    /// exists, the record and every chunk already written are purged.
    pub async fn run<I>(&mut self, owner: UserId, mut inbound: I) -> Result<UploadSummary>
    where
        I: Stream<Item = std::result::Result<UploadRequest, Status>> + Unpin,
    {
        let meta = match self.await_metadata(&mut inbound).await {
            Ok(meta) => meta,
            Err(e) => {
                self.transition(UploadState::Failed);
                return Err(e);
            }
        };
        let file_id = match self.store.create_file_record(owner, &meta).await {
            Ok(id) => id,
            Err(e) => {
                self.transition(UploadState::Failed);
                return Err(e);
            }
        };
        tracing::info!(
            file_id,
            user_id = owner.0,
            filename = %meta.filename,
            total_chunks = meta.total_chunks,
            "upload started"
        );
        self.transition(UploadState::ReceivingChunks);

        match self.receive_and_finalize(file_id, &meta, &mut inbound).await {
            Ok(summary) => {
                self.transition(UploadState::Complete);
                Ok(summary)
            }
            Err(e) => {
                self.transition(UploadState::Failed);
                tracing::warn!(file_id, error = %e, "upload failed, purging partial file");
                if let Err(purge) = self.store.purge_file(file_id).await {
                    tracing::warn!(file_id, error = %purge, "purge after failed upload did not complete");
                }
                Err(e)
            }
        }
    }

    async fn await_metadata<I>(&mut self, inbound: &mut I) -> Result<NewFile>
    where
        I: Stream<Item = std::result::Result<UploadRequest, Status>> + Unpin,
    {
        let first = inbound
            .next()
            .await
            .ok_or_else(|| VaultError::Protocol("empty upload stream".into()))?
            .map_err(|s| VaultError::Protocol(format!("failed to receive data: {}", s.message())))?;
        match first.data {
            Some(upload_request::Data::Metadata(meta)) => new_file(meta),
            _ => Err(VaultError::Protocol("metadata must be sent first".into())),
        }
    }

    async fn receive_and_finalize<I>(
        &mut self,
        file_id: FileId,
        meta: &NewFile,
        inbound: &mut I,
    ) -> Result<UploadSummary>
    where
        I: Stream<Item = std::result::Result<UploadRequest, Status>> + Unpin,
    {
        let plan = ChunkPlan {
            size: meta.original_size,
            chunk_size: meta.chunk_size,
            total_chunks: meta.total_chunks,
        };
        let (task_tx, task_rx) = mpsc::channel::<ChunkTask>(TASK_QUEUE_DEPTH);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, result_rx) = mpsc::channel::<ChunkOutcome>(RESULT_QUEUE_DEPTH);
        let (error_tx, mut error_rx) = mpsc::channel::<VaultError>(1);
        let aborted = Arc::new(AtomicBool::new(false));

        let mut pool = JoinSet::new();
        for worker in 0..self.workers {
            pool.spawn(chunk_worker(
                worker,
                Arc::clone(&self.store),
                Arc::clone(&self.cipher),
                Arc::clone(&task_rx),
                result_tx.clone(),
                Arc::clone(&aborted),
            ));
        }
        // workers hold the only senders now; results closes when they all exit
        drop(result_tx);
        let accumulator = tokio::spawn(accumulate(result_rx, error_tx, Arc::clone(&aborted)));

        let mut received: u32 = 0;
        let mut failure: Option<VaultError> = None;
        loop {
            let frame = tokio::select! {
                biased;
                Some(err) = error_rx.recv() => {
                    failure = Some(err);
                    break;
                }
                frame = inbound.next() => frame,
            };
            let request = match frame {
                None => break,
                Some(Ok(req)) => req,
                Some(Err(status)) => {
                    failure = Some(VaultError::Protocol(format!(
                        "failed to receive data: {}",
                        status.message()
                    )));
                    break;
                }
            };
            let chunk = match request.data {
                Some(upload_request::Data::Chunk(chunk)) => chunk,
                Some(upload_request::Data::Metadata(_)) => {
                    failure = Some(VaultError::Protocol("metadata sent twice".into()));
                    break;
                }
                None => {
                    failure = Some(VaultError::Protocol("empty upload frame".into()));
                    break;
                }
            };
            let checked = match u32::try_from(chunk.chunk_index) {
                Ok(index) => plan.check_chunk(index, chunk.data.len()),
                Err(_) => Err(VaultError::Validation(format!(
                    "chunk index {} outside 0..{}",
                    chunk.chunk_index, meta.total_chunks
                ))),
            };
            if let Err(e) = checked {
                failure = Some(e);
                break;
            }
            received += 1;
            if task_tx.send(ChunkTask { file_id, chunk }).await.is_err() {
                break;
            }
        }

        if failure.is_some() {
            aborted.store(true, Ordering::SeqCst);
        }
        // close the queue, then wait for every worker (barrier)
        drop(task_tx);
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                failure.get_or_insert(VaultError::Persistence(format!("chunk worker panicked: {e}")));
            }
        }
        let tally = accumulator
            .await
            .map_err(|e| VaultError::Persistence(format!("accumulator panicked: {e}")))?;
        if failure.is_none() {
            failure = error_rx.try_recv().ok();
        }

        self.transition(UploadState::Finalizing);
        if let Some(err) = failure {
            return Err(err);
        }
        if received != meta.total_chunks {
            return Err(VaultError::Validation(format!(
                "missing chunks: received {received}, expected {}",
                meta.total_chunks
            )));
        }

        self.store.mark_file_complete(file_id, tally).await?;
        tracing::info!(file_id, bytes = tally, chunks = received, "upload complete");
        Ok(UploadSummary {
            file_id,
            bytes_received: tally,
        })
    }
}

fn new_file(meta: FileMetadata) -> Result<NewFile> {
    if meta.chunk_size <= 0 {
        return Err(VaultError::Protocol("chunk size must be positive".into()));
    }
    if meta.total_chunks < 0 || meta.original_size < 0 {
        return Err(VaultError::Protocol("negative size in metadata".into()));
    }
    ChunkPlan::declared(
        meta.original_size as u64,
        meta.chunk_size as u32,
        meta.total_chunks as u32,
    )?;
    Ok(NewFile {
        filename: meta.filename,
        mime_type: meta.mime_type,
        original_size: meta.original_size as u64,
        description: meta.description,
        chunk_size: meta.chunk_size as u32,
        total_chunks: meta.total_chunks as u32,
        meta: meta.meta_data.into_iter().map(|m| (m.name, m.value)).collect(),
    })
}

async fn chunk_worker<S: ChunkStore>(
    worker: usize,
    store: Arc<S>,
    cipher: Arc<ChunkCipher>,
    tasks: Arc<Mutex<mpsc::Receiver<ChunkTask>>>,
    results: mpsc::Sender<ChunkOutcome>,
    aborted: Arc<AtomicBool>,
) {
    loop {
        let task = { tasks.lock().await.recv().await };
        let Some(task) = task else { break };
        if aborted.load(Ordering::SeqCst) {
            // keep draining so the producer never blocks on a full queue
            continue;
        }
        let chunk_index = task.chunk.chunk_index as u32;
        let len = task.chunk.data.len() as u64;
        let bytes = async {
            let sealed = cipher.encrypt(&task.chunk.data).map_err(|e| {
                VaultError::Encryption(format!("chunk {chunk_index} encryption failed: {e}"))
            })?;
            store.save_chunk(task.file_id, chunk_index, sealed).await?;
            Ok(len)
        }
        .await;
        tracing::debug!(worker, chunk_index, ok = bytes.is_ok(), "chunk processed");
        if results.send(ChunkOutcome { chunk_index, bytes }).await.is_err() {
            break;
        }
    }
}

/// Sum bytes until the first error; forward that error and keep draining.
async fn accumulate(
    mut results: mpsc::Receiver<ChunkOutcome>,
    errors: mpsc::Sender<VaultError>,
    aborted: Arc<AtomicBool>,
) -> u64 {
    let mut total = 0u64;
    let mut failed = false;
    while let Some(outcome) = results.recv().await {
        match outcome.bytes {
            Ok(n) if !failed => total += n,
            Ok(_) => {}
            Err(e) if !failed => {
                failed = true;
                aborted.store(true, Ordering::SeqCst);
                tracing::debug!(chunk_index = outcome.chunk_index, error = %e, "first chunk failure");
                // single first-error slot; `failed` keeps this the only send
                let _ = errors.try_send(e);
            }
            Err(e) => {
                tracing::debug!(chunk_index = outcome.chunk_index, error = %e, "further chunk failure");
            }
        }
    }
    total
}

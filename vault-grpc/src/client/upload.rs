//! Upload Sender: metadata frame first, then every chunk frame prepared by
//! a bounded pool of sender tasks. All frames funnel through one outbound
//! queue, which is the single writer of the RPC stream.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;
use vault_core::{ChunkPlan, Result, VaultError};

use super::{VaultClient, from_status};
use crate::proto::{FileChunk, FileMetadata, MetaData, UploadRequest, UploadResponse};

pub const TASK_QUEUE_DEPTH: usize = 100;
pub const FRAME_QUEUE_DEPTH: usize = 16;

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    pub description: String,
    /// Guessed from the extension when absent.
    pub mime_type: Option<String>,
    pub meta: Vec<(String, String)>,
}

impl VaultClient {
    /// Read `path` into memory and upload it under its base name.
    pub async fn upload_path(&mut self, path: &Path, opts: &UploadOptions) -> Result<UploadResponse> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VaultError::Validation(format!("{} has no file name", path.display())))?
            .to_string();
        let mime_type = match &opts.mime_type {
            Some(m) => m.clone(),
            None => mime_guess::from_path(path)
                .first_or_octet_stream()
                .essence_str()
                .to_string(),
        };
        let data = tokio::fs::read(path).await?;
        self.upload_bytes(&filename, &mime_type, data, opts).await
    }

    #[tracing::instrument(skip(self, data, opts), fields(transfer = %Uuid::new_v4(), size = data.len()))]
    pub async fn upload_bytes(
        &mut self,
        filename: &str,
        mime_type: &str,
        data: Vec<u8>,
        opts: &UploadOptions,
    ) -> Result<UploadResponse> {
        let plan = ChunkPlan::new(data.len() as u64, self.options.chunk_size)?;
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        frames_tx
            .send(UploadRequest::metadata(FileMetadata {
                filename: filename.to_string(),
                mime_type: mime_type.to_string(),
                original_size: plan.size as i64,
                description: opts.description.clone(),
                chunk_size: plan.chunk_size as i32,
                total_chunks: plan.total_chunks as i32,
                meta_data: opts
                    .meta
                    .iter()
                    .map(|(name, value)| MetaData {
                        id: 0,
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            }))
            .await
            .map_err(|_| VaultError::Transport("upload stream closed".into()))?;

        let mut rpc = self.inner.clone();
        let call = tokio::spawn(async move { rpc.upload_file(ReceiverStream::new(frames_rx)).await });

        let local = send_chunks(Arc::new(data), plan, self.options.pool_size, frames_tx).await;
        let remote = call
            .await
            .map_err(|e| VaultError::Transport(format!("upload call panicked: {e}")))?;

        // the server's verdict explains a closed stream better than our send error
        let resp = remote.map_err(from_status)?.into_inner();
        local?;
        tracing::info!(file_id = resp.file_id, bytes = resp.bytes_received, "upload complete");
        Ok(resp)
    }
}

/// Fan chunk indices out to `pool_size` sender tasks and wait for the pool
/// to drain. Dropping `frames` here closes the outbound stream once the
/// last task finishes.
pub(crate) async fn send_chunks(
    data: Arc<Vec<u8>>,
    plan: ChunkPlan,
    pool_size: usize,
    frames: mpsc::Sender<UploadRequest>,
) -> Result<()> {
    let pool_size = pool_size.max(1);
    let (task_tx, task_rx) = mpsc::channel::<u32>(TASK_QUEUE_DEPTH);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (err_tx, mut err_rx) = mpsc::channel::<VaultError>(pool_size + 1);
    let aborted = Arc::new(AtomicBool::new(false));

    let mut pool = JoinSet::new();
    for worker in 0..pool_size {
        pool.spawn(sender_worker(
            worker,
            Arc::clone(&data),
            plan,
            Arc::clone(&task_rx),
            frames.clone(),
            err_tx.clone(),
            Arc::clone(&aborted),
        ));
    }
    drop(frames);

    for index in 0..plan.total_chunks {
        if aborted.load(Ordering::SeqCst) || task_tx.send(index).await.is_err() {
            break;
        }
    }
    drop(task_tx);

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            let _ = err_tx.try_send(VaultError::Transport(format!("sender task panicked: {e}")));
        }
    }
    drop(err_tx);

    match err_rx.recv().await {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

async fn sender_worker(
    worker: usize,
    data: Arc<Vec<u8>>,
    plan: ChunkPlan,
    tasks: Arc<Mutex<mpsc::Receiver<u32>>>,
    frames: mpsc::Sender<UploadRequest>,
    errors: mpsc::Sender<VaultError>,
    aborted: Arc<AtomicBool>,
) {
    loop {
        let next = tasks.lock().await.recv().await;
        let Some(index) = next else { break };
        if aborted.load(Ordering::SeqCst) {
            break;
        }
        let Some(span) = plan.span(index) else {
            aborted.store(true, Ordering::SeqCst);
            let _ = errors.try_send(VaultError::Validation(format!("chunk {index} out of range")));
            break;
        };
        let frame = UploadRequest::chunk(FileChunk {
            data: data[span.start as usize..span.end as usize].to_vec(),
            chunk_index: index as i32,
            is_last: plan.is_last(index),
        });
        if frames.send(frame).await.is_err() {
            aborted.store(true, Ordering::SeqCst);
            let _ = errors.try_send(VaultError::Transport(format!(
                "upload stream closed before chunk {index} was sent"
            )));
            break;
        }
        tracing::debug!(worker, chunk_index = index, "chunk sent");
    }
}

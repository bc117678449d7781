//! Download Receiver. Chunks arrive in any order; a pool of writer tasks
//! places each one at `chunk_index * chunk_size` in the sink file. The file
//! handle is shared, so every seek+write pair runs under one lock.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_core::Stream;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_stream::StreamExt;
use tonic::Status;
use vault_core::util::sanitize::safe_file_name;
use vault_core::{ChunkPlan, FileId, Result, VaultError, chunk_offset};

use super::{VaultClient, from_status};
use crate::proto::{DownloadRequest, DownloadResponse, FileChunk, FileMetadata, download_response};

pub const WRITE_QUEUE_DEPTH: usize = 100;

#[derive(Clone, Debug)]
pub struct DownloadOutcome {
    pub path: PathBuf,
    pub metadata: FileMetadata,
    pub bytes_written: u64,
}

impl VaultClient {
    /// Fetch `file_id` into `dest_dir`, named after the stored filename.
    pub async fn download(&mut self, file_id: FileId, dest_dir: &Path) -> Result<DownloadOutcome> {
        let stream = self
            .inner
            .download_file(DownloadRequest { file_id })
            .await
            .map_err(from_status)?
            .into_inner();
        let outcome = receive_file(stream, dest_dir, self.options.pool_size).await?;
        tracing::info!(file_id, path = %outcome.path.display(), bytes = outcome.bytes_written, "download complete");
        Ok(outcome)
    }
}

/// Consume a download stream into a file under `dest_dir`. Chunks land in a
/// temporary file beside the target, which replaces the target only once
/// every chunk is written; on failure the temporary file is removed and an
/// existing file of the same name is left alone.
pub async fn receive_file<I>(mut inbound: I, dest_dir: &Path, pool_size: usize) -> Result<DownloadOutcome>
where
    I: Stream<Item = std::result::Result<DownloadResponse, Status>> + Unpin,
{
    let meta = match inbound.next().await {
        Some(Ok(DownloadResponse {
            data: Some(download_response::Data::Metadata(m)),
        })) => m,
        Some(Ok(_)) => return Err(VaultError::Protocol("metadata must be sent first".into())),
        Some(Err(status)) => return Err(from_status(status)),
        None => return Err(VaultError::Protocol("empty download stream".into())),
    };
    let size = u64::try_from(meta.original_size)
        .map_err(|_| VaultError::Validation(format!("invalid size {}", meta.original_size)))?;
    let total = u32::try_from(meta.total_chunks)
        .map_err(|_| VaultError::Validation(format!("invalid total chunks {}", meta.total_chunks)))?;
    let chunk_size = u32::try_from(meta.chunk_size)
        .map_err(|_| VaultError::Validation(format!("invalid chunk size {}", meta.chunk_size)))?;
    let plan = ChunkPlan::declared(size, chunk_size, total)?;

    let name = safe_file_name(&meta.filename)?;
    let path = dest_dir.join(name);
    let (std_file, partial) = tempfile::Builder::new()
        .prefix(".vault-")
        .suffix(".part")
        .tempfile_in(dest_dir)?
        .into_parts();

    // `partial` deletes the temporary file when dropped on any error path
    let bytes_written = write_chunks(&mut inbound, File::from_std(std_file), plan, pool_size).await?;
    if bytes_written != size {
        return Err(VaultError::Validation(format!(
            "wrote {bytes_written} bytes, expected {size}"
        )));
    }
    partial.persist(&path).map_err(|e| VaultError::Io(e.error))?;
    Ok(DownloadOutcome {
        path,
        metadata: meta,
        bytes_written,
    })
}

async fn write_chunks<I>(
    inbound: &mut I,
    file: File,
    plan: ChunkPlan,
    pool_size: usize,
) -> Result<u64>
where
    I: Stream<Item = std::result::Result<DownloadResponse, Status>> + Unpin,
{
    let pool_size = pool_size.max(1);
    let sink = Arc::new(Mutex::new(file));
    let written = Arc::new(AtomicU64::new(0));
    let aborted = Arc::new(AtomicBool::new(false));
    let (task_tx, task_rx) = mpsc::channel::<FileChunk>(WRITE_QUEUE_DEPTH);
    let task_rx = Arc::new(Mutex::new(task_rx));
    let (err_tx, mut err_rx) = mpsc::channel::<VaultError>(pool_size + 1);

    let mut pool = JoinSet::new();
    for _ in 0..pool_size {
        pool.spawn(writer(
            Arc::clone(&sink),
            plan.chunk_size,
            Arc::clone(&task_rx),
            Arc::clone(&written),
            err_tx.clone(),
            Arc::clone(&aborted),
        ));
    }

    let mut seen = HashSet::new();
    let mut stream_error = None;
    while let Some(item) = inbound.next().await {
        if aborted.load(Ordering::SeqCst) {
            break;
        }
        let chunk = match item {
            Ok(DownloadResponse {
                data: Some(download_response::Data::Chunk(c)),
            }) => c,
            Ok(_) => {
                stream_error = Some(VaultError::Protocol("unexpected non-chunk frame".into()));
                break;
            }
            Err(status) => {
                stream_error = Some(from_status(status));
                break;
            }
        };
        let checked = u32::try_from(chunk.chunk_index)
            .map_err(|_| {
                VaultError::Validation(format!(
                    "chunk index {} outside 0..{}",
                    chunk.chunk_index, plan.total_chunks
                ))
            })
            .and_then(|index| plan.check_chunk(index, chunk.data.len()).map(|()| index));
        let index = match checked {
            Ok(index) => index,
            Err(e) => {
                stream_error = Some(e);
                break;
            }
        };
        if !seen.insert(index) {
            stream_error = Some(VaultError::Validation(format!("chunk {index} received twice")));
            break;
        }
        if task_tx.send(chunk).await.is_err() {
            break;
        }
    }
    drop(task_tx);

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            let _ = err_tx.try_send(VaultError::Persistence(format!("writer task panicked: {e}")));
        }
    }
    drop(err_tx);

    if let Some(e) = stream_error {
        return Err(e);
    }
    if let Some(e) = err_rx.recv().await {
        return Err(e);
    }
    if seen.len() as u32 != plan.total_chunks {
        return Err(VaultError::Validation(format!(
            "received {} chunks, expected {}",
            seen.len(),
            plan.total_chunks
        )));
    }

    let mut file = sink.lock().await;
    file.flush().await?;
    file.sync_all().await?;
    Ok(written.load(Ordering::SeqCst))
}

async fn writer(
    sink: Arc<Mutex<File>>,
    chunk_size: u32,
    tasks: Arc<Mutex<mpsc::Receiver<FileChunk>>>,
    written: Arc<AtomicU64>,
    errors: mpsc::Sender<VaultError>,
    aborted: Arc<AtomicBool>,
) {
    loop {
        let next = tasks.lock().await.recv().await;
        let Some(chunk) = next else { break };
        if aborted.load(Ordering::SeqCst) {
            continue;
        }
        let offset = chunk_offset(chunk.chunk_index as u32, chunk_size);
        let result: Result<()> = async {
            let mut file = sink.lock().await;
            file.seek(SeekFrom::Start(offset)).await?;
            file.write_all(&chunk.data).await?;
            Ok(())
        }
        .await;
        match result {
            Ok(()) => {
                written.fetch_add(chunk.data.len() as u64, Ordering::SeqCst);
            }
            Err(e) => {
                aborted.store(true, Ordering::SeqCst);
                let _ = errors.try_send(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(meta: FileMetadata, chunks: Vec<FileChunk>) -> Vec<std::result::Result<DownloadResponse, Status>> {
        std::iter::once(Ok(DownloadResponse::metadata(meta)))
            .chain(chunks.into_iter().map(|c| Ok(DownloadResponse::chunk(c))))
            .collect()
    }

    fn meta(filename: &str, size: usize, chunk_size: i32, total: i32) -> FileMetadata {
        FileMetadata {
            filename: filename.into(),
            mime_type: "application/octet-stream".into(),
            original_size: size as i64,
            chunk_size,
            total_chunks: total,
            ..Default::default()
        }
    }

    fn chunk(data: &[u8], index: i32, last: bool) -> FileChunk {
        FileChunk {
            data: data.to_vec(),
            chunk_index: index,
            is_last: last,
        }
    }

    #[tokio::test]
    async fn out_of_order_chunks_reassemble_by_index() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..70u8).collect();
        let parts: Vec<&[u8]> = data.chunks(10).collect();
        // ranges [0,3) [3,5) [5,7) interleaved as three workers would
        let order = [5, 0, 3, 6, 1, 4, 2];
        let chunks = order
            .iter()
            .map(|&i| chunk(parts[i], i as i32, i == 6))
            .collect();
        let stream = tokio_stream::iter(frames(meta("seven.bin", 70, 10, 7), chunks));

        let out = receive_file(stream, dir.path(), 3).await.unwrap();
        assert_eq!(out.bytes_written, 70);
        assert_eq!(out.path, dir.path().join("seven.bin"));
        assert_eq!(std::fs::read(out.path).unwrap(), data);
    }

    #[tokio::test]
    async fn empty_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let stream = tokio_stream::iter(frames(meta("empty.txt", 0, 1024, 0), vec![]));
        let out = receive_file(stream, dir.path(), 2).await.unwrap();
        assert_eq!(std::fs::metadata(out.path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn server_path_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let stream = tokio_stream::iter(frames(meta("../../etc/passwd", 2, 4, 1), vec![chunk(b"ok", 0, true)]));
        let out = receive_file(stream, dir.path(), 1).await.unwrap();
        assert_eq!(out.path, dir.path().join("passwd"));
    }

    #[tokio::test]
    async fn chunk_before_metadata_is_a_protocol_error() {
        let dir = tempfile::tempdir().unwrap();
        let stream = tokio_stream::iter(vec![Ok(DownloadResponse::chunk(chunk(b"x", 0, true)))]);
        let err = receive_file(stream, dir.path(), 1).await.unwrap_err();
        assert!(matches!(err, VaultError::Protocol(_)));
    }

    #[tokio::test]
    async fn missing_chunks_fail_and_remove_the_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let stream = tokio_stream::iter(frames(meta("gap.bin", 20, 10, 2), vec![chunk(&[1; 10], 0, false)]));
        let err = receive_file(stream, dir.path(), 2).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(_)));
        assert!(!dir.path().join("gap.bin").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_download_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("taxes.pdf");
        std::fs::write(&target, b"last year's return").unwrap();

        let mut items = frames(meta("taxes.pdf", 20, 10, 2), vec![chunk(&[7; 10], 1, true)]);
        items.push(Err(Status::internal("store unavailable")));
        let err = receive_file(tokio_stream::iter(items), dir.path(), 2).await.unwrap_err();
        assert!(matches!(err, VaultError::Transport(_)));

        assert_eq!(std::fs::read(&target).unwrap(), b"last year's return");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn successful_download_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("notes.txt");
        std::fs::write(&target, b"old contents that are longer").unwrap();

        let stream = tokio_stream::iter(frames(meta("notes.txt", 3, 10, 1), vec![chunk(b"new", 0, true)]));
        let out = receive_file(stream, dir.path(), 1).await.unwrap();
        assert_eq!(out.path, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn chunk_lengths_must_match_declared_layout() {
        let dir = tempfile::tempdir().unwrap();
        // 15 + 5 bytes add up to the declared size but chunk 0 spills into chunk 1
        let stream = tokio_stream::iter(frames(
            meta("overlap.bin", 20, 10, 2),
            vec![chunk(&[1; 15], 0, false), chunk(&[2; 5], 1, true)],
        ));
        let err = receive_file(stream, dir.path(), 2).await.unwrap_err();
        assert!(matches!(err, VaultError::Validation(m) if m.contains("expected 10")));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn out_of_range_and_duplicate_indices_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let stream = tokio_stream::iter(frames(meta("a.bin", 10, 10, 1), vec![chunk(&[0; 10], 1, true)]));
        assert!(matches!(
            receive_file(stream, dir.path(), 1).await,
            Err(VaultError::Validation(_))
        ));

        let stream = tokio_stream::iter(frames(
            meta("b.bin", 20, 10, 2),
            vec![chunk(&[0; 10], 0, false), chunk(&[0; 10], 0, false)],
        ));
        assert!(matches!(
            receive_file(stream, dir.path(), 1).await,
            Err(VaultError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn trailing_error_status_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let mut items = frames(meta("c.bin", 20, 10, 2), vec![chunk(&[0; 10], 0, false)]);
        items.push(Err(Status::internal("decryption failed: chunk 1 failed authentication")));
        let err = receive_file(tokio_stream::iter(items), dir.path(), 2).await.unwrap_err();
        assert!(matches!(err, VaultError::Transport(m) if m.contains("chunk 1")));
    }

    #[tokio::test]
    async fn declared_chunk_count_must_fit_the_size() {
        let dir = tempfile::tempdir().unwrap();
        let stream = tokio_stream::iter(frames(meta("d.bin", 25, 10, 1), vec![chunk(&[0; 10], 0, true)]));
        assert!(matches!(
            receive_file(stream, dir.path(), 1).await,
            Err(VaultError::Validation(_))
        ));
    }
}

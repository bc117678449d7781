use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;
use tonic::service::interceptor::InterceptedService;
use tonic::{Code, Request, Response, Status, Streaming};
use vault_core::{ChunkCipher, ListQuery, TransferConfig, VaultError};

use crate::auth::{JwtAuthenticator, caller};
use crate::proto::{
    DeleteFileRequest, DeleteFileResponse, DownloadRequest, DownloadResponse, FileInfoItem,
    FileListItem, FileService, FileServiceServer, GetFileInfoRequest, ListFilesRequest,
    ListFilesResponse, MetaData, UploadRequest, UploadResponse,
};
use crate::store::ChunkStore;

pub mod download;
pub mod upload;

pub use download::DownloadDistributor;
pub use upload::{UploadCoordinator, UploadState, UploadSummary};

/// Map the error taxonomy onto gRPC status codes.
pub fn to_status(err: VaultError) -> Status {
    let code = code_for(&err);
    Status::new(code, err.to_string())
}

fn code_for(err: &VaultError) -> Code {
    match err {
        VaultError::Protocol(_) | VaultError::Validation(_) => Code::InvalidArgument,
        VaultError::DuplicateChunk { .. } => Code::AlreadyExists,
        VaultError::NotFound => Code::NotFound,
        VaultError::Unauthenticated(_) => Code::Unauthenticated,
        VaultError::Transport(_) => Code::Unavailable,
        VaultError::Aggregate(all) => all.first().map(code_for).unwrap_or(Code::Internal),
        VaultError::Io(_)
        | VaultError::Encryption(_)
        | VaultError::Decryption(_)
        | VaultError::Persistence(_)
        | VaultError::Config(_) => Code::Internal,
    }
}

/// The `vault.files.FileService` implementation over any [`ChunkStore`].
pub struct FileServer<S> {
    store: Arc<S>,
    cipher: Arc<ChunkCipher>,
    workers: usize,
}

impl<S: ChunkStore> FileServer<S> {
    pub fn new(store: Arc<S>, config: &TransferConfig) -> Self {
        Self {
            store,
            cipher: Arc::new(ChunkCipher::new(&config.key)),
            workers: config.workers_count,
        }
    }

    /// Wrap in the generated tonic server behind the bearer-token gate.
    pub fn into_service(
        self,
        auth: JwtAuthenticator,
    ) -> InterceptedService<FileServiceServer<Self>, JwtAuthenticator> {
        FileServiceServer::with_interceptor(self, auth)
    }
}

#[tonic::async_trait]
impl<S: ChunkStore> FileService for FileServer<S> {
    #[tracing::instrument(skip_all, fields(user_id))]
    async fn upload_file(
        &self,
        request: Request<Streaming<UploadRequest>>,
    ) -> Result<Response<UploadResponse>, Status> {
        let owner = caller(&request)?;
        tracing::Span::current().record("user_id", owner.0);
        let mut coordinator =
            UploadCoordinator::new(Arc::clone(&self.store), Arc::clone(&self.cipher), self.workers);
        let summary = coordinator
            .run(owner, request.into_inner())
            .await
            .map_err(to_status)?;
        Ok(Response::new(UploadResponse {
            file_id: summary.file_id,
            bytes_received: summary.bytes_received as i64,
            status: "success".into(),
        }))
    }

    type DownloadFileStream = ReceiverStream<Result<DownloadResponse, Status>>;

    #[tracing::instrument(skip_all, fields(user_id, file_id = request.get_ref().file_id))]
    async fn download_file(
        &self,
        request: Request<DownloadRequest>,
    ) -> Result<Response<Self::DownloadFileStream>, Status> {
        let owner = caller(&request)?;
        tracing::Span::current().record("user_id", owner.0);
        let distributor =
            DownloadDistributor::new(Arc::clone(&self.store), Arc::clone(&self.cipher), self.workers);
        let rx = distributor
            .open(owner, request.get_ref().file_id)
            .await
            .map_err(to_status)?;
        Ok(Response::new(ReceiverStream::new(rx)))
    }

    #[tracing::instrument(skip_all, fields(file_id = request.get_ref().file_id))]
    async fn delete_file(
        &self,
        request: Request<DeleteFileRequest>,
    ) -> Result<Response<DeleteFileResponse>, Status> {
        let owner = caller(&request)?;
        let file_id = request.get_ref().file_id;
        self.store
            .delete_file(owner, file_id)
            .await
            .map_err(to_status)?;
        tracing::info!(file_id, user_id = owner.0, "file deleted");
        Ok(Response::new(DeleteFileResponse { success: true }))
    }

    #[tracing::instrument(skip_all)]
    async fn list_files(
        &self,
        request: Request<ListFilesRequest>,
    ) -> Result<Response<ListFilesResponse>, Status> {
        let owner = caller(&request)?;
        let req = request.into_inner();
        let query = ListQuery::new(req.page, req.per_page, &req.filter);
        let (files, total) = self
            .store
            .list_files(owner, &query)
            .await
            .map_err(to_status)?;

        let files = files
            .iter()
            .map(|f| FileListItem {
                id: f.id,
                filename: f.filename.clone(),
                mime_type: f.mime_type.clone(),
                size: f.original_size as i64,
                description: f.description.clone(),
                created_at: f.created_at_display(),
            })
            .collect();
        Ok(Response::new(ListFilesResponse {
            files,
            total_count: total.min(i32::MAX as u64) as i32,
            total_pages: query.total_pages(total).min(i32::MAX as u64) as i32,
            current_page: query.page as i32,
        }))
    }

    #[tracing::instrument(skip_all, fields(file_id = request.get_ref().file_id))]
    async fn get_file_info(
        &self,
        request: Request<GetFileInfoRequest>,
    ) -> Result<Response<FileInfoItem>, Status> {
        let owner = caller(&request)?;
        let record = self
            .store
            .get_file_info(request.get_ref().file_id, owner)
            .await
            .map_err(to_status)?;
        if !record.is_available() {
            return Err(to_status(VaultError::NotFound));
        }
        Ok(Response::new(FileInfoItem {
            id: record.id,
            filename: record.filename.clone(),
            mime_type: record.mime_type.clone(),
            size: record.original_size as i64,
            description: record.description.clone(),
            created_at: record.created_at_display(),
            meta_data: record
                .meta
                .iter()
                .map(|m| MetaData {
                    id: m.id,
                    name: m.name.clone(),
                    value: m.value.clone(),
                })
                .collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (VaultError::Protocol("x".into()), Code::InvalidArgument),
            (VaultError::Validation("x".into()), Code::InvalidArgument),
            (VaultError::DuplicateChunk { file_id: 1, chunk_index: 0 }, Code::AlreadyExists),
            (VaultError::NotFound, Code::NotFound),
            (VaultError::Unauthenticated("x".into()), Code::Unauthenticated),
            (VaultError::Decryption("x".into()), Code::Internal),
            (VaultError::Persistence("x".into()), Code::Internal),
        ];
        for (err, code) in cases {
            assert_eq!(to_status(err).code(), code);
        }
    }

    #[test]
    fn aggregate_takes_first_code_and_all_messages() {
        let status = to_status(VaultError::Aggregate(vec![
            VaultError::NotFound,
            VaultError::Decryption("chunk 9".into()),
        ]));
        assert_eq!(status.code(), Code::NotFound);
        assert!(status.message().contains("chunk 9"));
    }
}

//! Client side of the file service: connection setup, the Upload Sender
//! and the Download Receiver.

use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Status};
use vault_core::config::DEFAULT_WORKERS;
use vault_core::{DEFAULT_CHUNK_SIZE, FileId, Result, VaultError};

use crate::auth::BearerToken;
use crate::proto::{
    DeleteFileRequest, FileInfoItem, FileServiceClient, GetFileInfoRequest, ListFilesRequest,
    ListFilesResponse,
};

pub mod download;
pub mod upload;

pub use download::{DownloadOutcome, receive_file};
pub use upload::UploadOptions;

pub type AuthedChannel = InterceptedService<Channel, BearerToken>;

#[derive(Clone, Debug)]
pub struct ClientOptions {
    pub endpoint: String,
    pub token: String,
    pub chunk_size: u32,
    /// Sender tasks on upload, writer tasks on download.
    pub pool_size: usize,
}

impl ClientOptions {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            pool_size: DEFAULT_WORKERS,
        }
    }
}

/// Authenticated handle to a running file service.
#[derive(Clone)]
pub struct VaultClient {
    inner: FileServiceClient<AuthedChannel>,
    options: ClientOptions,
}

impl VaultClient {
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(VaultError::Config("chunk size must be positive".into()));
        }
        if options.pool_size == 0 {
            return Err(VaultError::Config("pool size must be at least 1".into()));
        }
        let bearer = BearerToken::new(&options.token)?;
        let channel = Endpoint::from_shared(options.endpoint.clone())
            .map_err(|e| VaultError::Config(format!("endpoint {:?}: {e}", options.endpoint)))?
            .connect()
            .await
            .map_err(|e| VaultError::Transport(format!("connect {}: {e}", options.endpoint)))?;
        Ok(Self {
            inner: FileServiceClient::with_interceptor(channel, bearer),
            options,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub async fn list(&mut self, page: i32, per_page: i32, filter: &str) -> Result<ListFilesResponse> {
        let resp = self
            .inner
            .list_files(ListFilesRequest {
                page,
                per_page,
                filter: filter.to_string(),
            })
            .await
            .map_err(from_status)?;
        Ok(resp.into_inner())
    }

    pub async fn info(&mut self, file_id: FileId) -> Result<FileInfoItem> {
        let resp = self
            .inner
            .get_file_info(GetFileInfoRequest { file_id })
            .await
            .map_err(from_status)?;
        Ok(resp.into_inner())
    }

    pub async fn delete(&mut self, file_id: FileId) -> Result<bool> {
        let resp = self
            .inner
            .delete_file(DeleteFileRequest { file_id })
            .await
            .map_err(from_status)?;
        Ok(resp.into_inner().success)
    }
}

/// Turn a remote status back into the local taxonomy.
pub fn from_status(status: Status) -> VaultError {
    let msg = status.message().to_string();
    match status.code() {
        Code::NotFound => VaultError::NotFound,
        Code::Unauthenticated => VaultError::Unauthenticated(msg),
        Code::InvalidArgument => VaultError::Validation(msg),
        Code::AlreadyExists => VaultError::Persistence(msg),
        code => VaultError::Transport(format!("{code:?}: {msg}")),
    }
}

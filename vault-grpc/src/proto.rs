//! Wire messages for the `vault.files.FileService` RPC surface.
//!
//! Declared directly with prost derives; the service stubs generated by
//! `build.rs` refer to these types.

#[derive(Clone, PartialEq, prost::Message)]
pub struct MetaData {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub value: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileMetadata {
    #[prost(string, tag = "1")]
    pub filename: String,
    #[prost(string, tag = "2")]
    pub mime_type: String,
    #[prost(int64, tag = "3")]
    pub original_size: i64,
    #[prost(string, tag = "4")]
    pub description: String,
    #[prost(int32, tag = "5")]
    pub chunk_size: i32,
    #[prost(int32, tag = "6")]
    pub total_chunks: i32,
    #[prost(message, repeated, tag = "7")]
    pub meta_data: Vec<MetaData>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileChunk {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(int32, tag = "2")]
    pub chunk_index: i32,
    #[prost(bool, tag = "3")]
    pub is_last: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadRequest {
    #[prost(oneof = "upload_request::Data", tags = "1, 2")]
    pub data: Option<upload_request::Data>,
}

pub mod upload_request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Metadata(super::FileMetadata),
        #[prost(message, tag = "2")]
        Chunk(super::FileChunk),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UploadResponse {
    #[prost(int64, tag = "1")]
    pub file_id: i64,
    #[prost(int64, tag = "2")]
    pub bytes_received: i64,
    #[prost(string, tag = "3")]
    pub status: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DownloadRequest {
    #[prost(int64, tag = "1")]
    pub file_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DownloadResponse {
    #[prost(oneof = "download_response::Data", tags = "1, 2")]
    pub data: Option<download_response::Data>,
}

pub mod download_response {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        Metadata(super::FileMetadata),
        #[prost(message, tag = "2")]
        Chunk(super::FileChunk),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteFileRequest {
    #[prost(int64, tag = "1")]
    pub file_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeleteFileResponse {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListFilesRequest {
    #[prost(int32, tag = "1")]
    pub page: i32,
    #[prost(int32, tag = "2")]
    pub per_page: i32,
    #[prost(string, tag = "3")]
    pub filter: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileListItem {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub filename: String,
    #[prost(string, tag = "3")]
    pub mime_type: String,
    #[prost(int64, tag = "4")]
    pub size: i64,
    #[prost(string, tag = "5")]
    pub description: String,
    #[prost(string, tag = "6")]
    pub created_at: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListFilesResponse {
    #[prost(message, repeated, tag = "1")]
    pub files: Vec<FileListItem>,
    #[prost(int32, tag = "2")]
    pub total_count: i32,
    #[prost(int32, tag = "3")]
    pub total_pages: i32,
    #[prost(int32, tag = "4")]
    pub current_page: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetFileInfoRequest {
    #[prost(int64, tag = "1")]
    pub file_id: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct FileInfoItem {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub filename: String,
    #[prost(string, tag = "3")]
    pub mime_type: String,
    #[prost(int64, tag = "4")]
    pub size: i64,
    #[prost(string, tag = "5")]
    pub description: String,
    #[prost(string, tag = "6")]
    pub created_at: String,
    #[prost(message, repeated, tag = "7")]
    pub meta_data: Vec<MetaData>,
}

pub mod file_service {
    include!(concat!(env!("OUT_DIR"), "/vault.files.FileService.rs"));
}

pub use file_service::file_service_client::FileServiceClient;
pub use file_service::file_service_server::{FileService, FileServiceServer};

impl UploadRequest {
    pub fn metadata(meta: FileMetadata) -> Self {
        Self {
            data: Some(upload_request::Data::Metadata(meta)),
        }
    }

    pub fn chunk(chunk: FileChunk) -> Self {
        Self {
            data: Some(upload_request::Data::Chunk(chunk)),
        }
    }
}

impl DownloadResponse {
    pub fn metadata(meta: FileMetadata) -> Self {
        Self {
            data: Some(download_response::Data::Metadata(meta)),
        }
    }

    pub fn chunk(chunk: FileChunk) -> Self {
        Self {
            data: Some(download_response::Data::Chunk(chunk)),
        }
    }
}

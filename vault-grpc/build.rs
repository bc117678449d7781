// Messages are hand-declared prost structs in `src/proto.rs`, so only the
// service plumbing is generated here; no protoc needed.
fn main() {
    let method = |name: &str, route: &str, input: &str, output: &str| {
        tonic_build::manual::Method::builder()
            .name(name)
            .route_name(route)
            .input_type(format!("crate::proto::{input}"))
            .output_type(format!("crate::proto::{output}"))
            .codec_path("tonic_prost::ProstCodec")
    };

    let service = tonic_build::manual::Service::builder()
        .name("FileService")
        .package("vault.files")
        .method(
            method("upload_file", "UploadFile", "UploadRequest", "UploadResponse")
                .client_streaming()
                .build(),
        )
        .method(
            method("download_file", "DownloadFile", "DownloadRequest", "DownloadResponse")
                .server_streaming()
                .build(),
        )
        .method(method("delete_file", "DeleteFile", "DeleteFileRequest", "DeleteFileResponse").build())
        .method(method("list_files", "ListFiles", "ListFilesRequest", "ListFilesResponse").build())
        .method(method("get_file_info", "GetFileInfo", "GetFileInfoRequest", "FileInfoItem").build())
        .build();

    tonic_build::manual::Builder::new().compile(&[service]);
}

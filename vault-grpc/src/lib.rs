//! Encrypted chunked file transfer over gRPC: the upload and download
//! engines on the server, their counterparts on the client, the store
//! they persist through and the token gate in front of them.

pub mod auth;
pub mod client;
pub mod config;
pub mod proto;
pub mod server;
pub mod store;

pub use client::{ClientOptions, VaultClient};
pub use config::ServerConfig;
pub use server::FileServer;

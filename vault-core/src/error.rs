use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frames arrived out of protocol order (e.g. chunk before metadata).
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Wrong key, wrong IV or tampered ciphertext.
    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("chunk {chunk_index} of file {file_id} already stored")]
    DuplicateChunk { file_id: i64, chunk_index: u32 },

    #[error("validation error: {0}")]
    Validation(String),

    /// Missing, owned by someone else, deleted or incomplete: never distinguished.
    #[error("file not found")]
    NotFound,

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Connection failure or a remote status with no closer local meaning.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("{} worker(s) failed: {}", .0.len(), join_messages(.0))]
    Aggregate(Vec<VaultError>),
}

fn join_messages(errors: &[VaultError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl VaultError {
    /// Collapse a list of worker failures: none, one, or an aggregate.
    pub fn from_many(mut errors: Vec<VaultError>) -> Option<VaultError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(VaultError::Aggregate(errors)),
        }
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_many_collapses_single_error() {
        assert!(VaultError::from_many(vec![]).is_none());
        let one = VaultError::from_many(vec![VaultError::NotFound]).unwrap();
        assert!(matches!(one, VaultError::NotFound));
    }

    #[test]
    fn aggregate_lists_every_failure() {
        let agg = VaultError::from_many(vec![
            VaultError::Decryption("chunk 3".into()),
            VaultError::Persistence("range 5..7".into()),
        ])
        .unwrap();
        let msg = agg.to_string();
        assert!(msg.starts_with("2 worker(s) failed"));
        assert!(msg.contains("chunk 3"));
        assert!(msg.contains("range 5..7"));
    }
}

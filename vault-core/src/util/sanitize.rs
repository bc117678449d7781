use std::path::{Component, Path};

use crate::error::{Result, VaultError};

/// Reduce a remote-supplied filename to a bare, non-empty file name so it
/// cannot escape the destination directory.
pub fn safe_file_name(name: &str) -> Result<String> {
    let normalized = name.replace('\\', "/");
    let last = Path::new(&normalized)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s),
            _ => None,
        })
        .last()
        .and_then(|s| s.to_str())
        .map(str::trim)
        .unwrap_or("");
    if last.is_empty() || last == "." || last == ".." {
        return Err(VaultError::Validation(format!("unusable file name {name:?}")));
    }
    Ok(last.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_directories() {
        assert_eq!(safe_file_name("report.pdf").unwrap(), "report.pdf");
        assert_eq!(safe_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(safe_file_name("/abs/path/a.bin").unwrap(), "a.bin");
        assert_eq!(safe_file_name("C:\\Users\\x\\b.txt").unwrap(), "b.txt");
    }

    #[test]
    fn rejects_empty_names() {
        assert!(safe_file_name("").is_err());
        assert!(safe_file_name("..").is_err());
        assert!(safe_file_name("/").is_err());
    }
}

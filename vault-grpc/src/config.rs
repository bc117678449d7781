//! Server configuration: JSON file first, environment second.

use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vault_core::config::DEFAULT_WORKERS;
use vault_core::crypto::aead::KEY_LEN;
use vault_core::crypto::hex::parse_hex_array;
use vault_core::crypto::kdf::derive_key;
use vault_core::{AeadKey, Result, TransferConfig, VaultError};

pub const CONFIG_PATH_VAR: &str = "VAULT_CONFIG_PATH";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub workers_count: usize,
    /// 64 hex chars; takes precedence over the passphrase.
    pub encryption_key: Option<String>,
    pub encryption_passphrase: Option<String>,
    pub key_salt: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:50051".into(),
            database_path: PathBuf::from("vault.db"),
            jwt_secret: String::new(),
            workers_count: DEFAULT_WORKERS,
            encryption_key: None,
            encryption_passphrase: None,
            key_salt: None,
        }
    }
}

impl ServerConfig {
    /// Read `VAULT_CONFIG_PATH` (if set), apply env overrides, validate.
    pub fn load() -> Result<Self> {
        let mut cfg = match env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        cfg.apply_overrides(|name| env::var(name).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| VaultError::Config(format!("{}: {e}", path.display())))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("VAULT_ADDRESS") {
            self.address = v;
        }
        if let Some(v) = lookup("VAULT_DATABASE_PATH") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("VAULT_JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Some(v) = lookup("VAULT_WORKERS") {
            self.workers_count = v
                .trim()
                .parse()
                .map_err(|_| VaultError::Config(format!("VAULT_WORKERS: not a number: {v:?}")))?;
        }
        if let Some(v) = lookup("VAULT_ENCRYPTION_KEY") {
            self.encryption_key = Some(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;
        if self.jwt_secret.is_empty() {
            return Err(VaultError::Config("jwt_secret is required".into()));
        }
        if self.workers_count == 0 {
            return Err(VaultError::Config("workers_count must be at least 1".into()));
        }
        if self.encryption_key.is_none() && self.encryption_passphrase.is_none() {
            return Err(VaultError::Config(
                "one of encryption_key or encryption_passphrase is required".into(),
            ));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .parse()
            .map_err(|e| VaultError::Config(format!("address {:?}: {e}", self.address)))
    }

    pub fn encryption_key(&self) -> Result<AeadKey> {
        if let Some(hex) = &self.encryption_key {
            return parse_hex_array::<KEY_LEN>(hex).map(AeadKey);
        }
        match (&self.encryption_passphrase, &self.key_salt) {
            (Some(pass), Some(salt)) => derive_key(pass.as_bytes(), salt.as_bytes()),
            (Some(_), None) => Err(VaultError::Config(
                "key_salt is required with encryption_passphrase".into(),
            )),
            _ => Err(VaultError::Config("no encryption key configured".into())),
        }
    }

    pub fn transfer_config(&self) -> Result<TransferConfig> {
        TransferConfig::new(self.workers_count, self.encryption_key()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const HEX_KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn configured() -> ServerConfig {
        ServerConfig {
            jwt_secret: "s3cret".into(),
            encryption_key: Some(HEX_KEY.into()),
            ..Default::default()
        }
    }

    #[test]
    fn file_values_fill_missing_fields_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, r#"{"jwt_secret":"x","workers_count":8,"encryption_key":"ab"}"#)
            .unwrap();
        let cfg = ServerConfig::from_file(&path).unwrap();
        assert_eq!(cfg.workers_count, 8);
        assert_eq!(cfg.address, "127.0.0.1:50051");
        assert!(cfg.encryption_passphrase.is_none());
    }

    #[test]
    fn environment_overrides_file() {
        let vars: HashMap<&str, &str> = [
            ("VAULT_ADDRESS", "0.0.0.0:9000"),
            ("VAULT_WORKERS", "2"),
            ("VAULT_JWT_SECRET", "from-env"),
        ]
        .into();
        let mut cfg = configured();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.address, "0.0.0.0:9000");
        assert_eq!(cfg.workers_count, 2);
        assert_eq!(cfg.jwt_secret, "from-env");
        cfg.validate().unwrap();
    }

    #[test]
    fn bad_worker_override_is_a_config_error() {
        let mut cfg = configured();
        let err = cfg
            .apply_overrides(|k| (k == "VAULT_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, VaultError::Config(_)));
    }

    #[test]
    fn validation_rejects_incomplete_settings() {
        assert!(ServerConfig::default().validate().is_err());
        let mut cfg = configured();
        cfg.workers_count = 0;
        assert!(cfg.validate().is_err());
        let mut cfg = configured();
        cfg.encryption_key = None;
        assert!(cfg.validate().is_err());
        let mut cfg = configured();
        cfg.address = "nowhere".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn key_from_hex_or_passphrase() {
        let cfg = configured();
        assert_eq!(cfg.encryption_key().unwrap().0[31], 0x1f);

        let mut derived = ServerConfig {
            encryption_key: None,
            encryption_passphrase: Some("correct horse".into()),
            key_salt: Some("pepper-salt".into()),
            ..configured()
        };
        let a = derived.encryption_key().unwrap();
        let b = derived.encryption_key().unwrap();
        assert_eq!(a.0, b.0);

        derived.key_salt = None;
        assert!(derived.encryption_key().is_err());
    }

    #[test]
    fn transfer_config_carries_workers() {
        let mut cfg = configured();
        cfg.workers_count = 6;
        assert_eq!(cfg.transfer_config().unwrap().workers_count, 6);
    }
}

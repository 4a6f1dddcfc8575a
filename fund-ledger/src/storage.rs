//! Persisted store
//!
//! The whole [`AppData`] aggregate is serialized as one JSON blob under a
//! single fixed key and rewritten in full after every mutation.
//!
//! # Backends
//!
//! - [`FileStorage`] - `<data_dir>/<store_key>.json`, replaced atomically
//! - [`MemoryStorage`] - in-process blob, for tests and embedding

use crate::{
    error::{Error, Result},
    seed,
    types::AppData,
    Config,
};
use parking_lot::Mutex;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Where the serialized aggregate lives
pub trait Storage {
    /// Read the stored blob, `None` if nothing has been saved yet
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored blob
    fn save(&self, blob: &str) -> Result<()>;
}

/// File-backed storage
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage at the configured data dir and key
    pub fn open(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.store_path();
        tracing::info!(path = ?path, "Opened file store");
        Ok(Self { path })
    }

    /// Path of the blob
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, blob: &str) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Storage(format!("no parent directory for {:?}", self.path)))?;
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(blob.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&self.path)?;

        tracing::debug!(path = ?self.path, bytes = blob.len(), "Store written");
        Ok(())
    }
}

/// In-memory storage. Clones share the same blob.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    blob: Arc<Mutex<Option<String>>>,
}

impl MemoryStorage {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a blob
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Arc::new(Mutex::new(Some(blob.into()))),
        }
    }

    /// Current blob
    pub fn snapshot(&self) -> Option<String> {
        self.blob.lock().clone()
    }
}

impl Storage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.blob.lock().clone())
    }

    fn save(&self, blob: &str) -> Result<()> {
        *self.blob.lock() = Some(blob.to_string());
        Ok(())
    }
}

/// Serialize the aggregate
pub fn encode(data: &AppData) -> Result<String> {
    Ok(serde_json::to_string(data)?)
}

/// Deserialize the aggregate
pub fn decode(blob: &str) -> Result<AppData> {
    Ok(serde_json::from_str(blob)?)
}

/// Load the aggregate, falling back to the seeded dataset.
///
/// A missing or unparsable blob yields the seed; a blob that parses but breaks
/// the ledger invariants is an error.
pub fn load_or_seed(storage: &impl Storage) -> Result<AppData> {
    let Some(blob) = storage.load()? else {
        tracing::info!("No stored ledger, starting from seed data");
        return Ok(seed::initial_data());
    };

    let data = match decode(&blob) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "Stored ledger is unparsable, starting from seed data");
            return Ok(seed::initial_data());
        }
    };
    data.validate()?;

    tracing::info!(
        members = data.members.len(),
        deposits = data.deposits.len(),
        loans = data.loans.len(),
        transactions = data.transactions.len(),
        "Loaded stored ledger"
    );
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberId;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().join("nested");
        (config, temp_dir)
    }

    #[test]
    fn test_file_storage_save_and_load() {
        let (config, _dir) = test_config();
        let storage = FileStorage::open(&config).unwrap();
        assert!(storage.load().unwrap().is_none());

        let data = seed::initial_data();
        storage.save(&encode(&data).unwrap()).unwrap();
        assert!(storage.path().ends_with("appsheet_db.json"));

        let reopened = FileStorage::open(&config).unwrap();
        assert_eq!(load_or_seed(&reopened).unwrap(), data);
    }

    #[test]
    fn test_save_replaces_blob() {
        let (config, _dir) = test_config();
        let storage = FileStorage::open(&config).unwrap();
        storage.save("first").unwrap();
        storage.save("second").unwrap();
        assert_eq!(storage.load().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_missing_blob_seeds() {
        let data = load_or_seed(&MemoryStorage::new()).unwrap();
        assert_eq!(data, seed::initial_data());
    }

    #[test]
    fn test_unparsable_blob_seeds() {
        let data = load_or_seed(&MemoryStorage::with_blob("{not json")).unwrap();
        assert_eq!(data, seed::initial_data());
    }

    #[test]
    fn test_invalid_blob_rejected() {
        let mut data = seed::initial_data();
        data.members[1].mobile = data.members[0].mobile.clone();
        let storage = MemoryStorage::with_blob(encode(&data).unwrap());
        assert!(matches!(
            load_or_seed(&storage),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_decode_wire_shape() {
        let blob = r#"{
            "members": [{"member_id": "M9", "name": "A", "email": "a@x", "mobile": "1",
                         "role": "admin", "status": "active"}],
            "deposits": [{"deposit_id": "D9", "member_id": "M9", "opening_balance": 10.5,
                          "membership_amount": "2", "dividend": 0, "current_balance": "12.5",
                          "year": 2025}],
            "loans": [],
            "transactions": [{"transaction_id": "T9", "member_id": "M9",
                              "transaction_type": "deposit", "amount": 2,
                              "transaction_month": "2025-02-01",
                              "notes": "Yearly Membership [2025]: x", "created_by": "system",
                              "created_at": "2025-02-01T00:00:00Z"}]
        }"#;
        let data = decode(blob).unwrap();
        assert_eq!(data.members[0].member_id, MemberId::new("M9"));
        assert!(data.balance_drift().is_empty());
        assert_eq!(data.transactions[0].year, None);
        assert_eq!(data.transactions[0].deposit_year(), 2025);
    }
}

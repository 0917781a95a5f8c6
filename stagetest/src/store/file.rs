//! File-backed keyed store.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use super::codec::{Codec, JsonCodec};
use crate::errors::StoreError;
use crate::provision::ProvisionOptions;

/// Directory under the working directory that holds persisted values.
pub const DEFAULT_DATA_DIR: &str = ".test-data";

/// Key under which the orchestrator persists provisioning options.
pub const PROVISION_OPTIONS_KEY: &str = "ProvisionOptions";

/// Persists values as one file per key under a working directory.
#[derive(Debug, Clone)]
pub struct FileStore<C: Codec = JsonCodec> {
    codec: C,
    data_dir: String,
}

impl Default for FileStore<JsonCodec> {
    fn default() -> Self {
        Self::with_codec(JsonCodec::default())
    }
}

impl FileStore<JsonCodec> {
    /// Creates a JSON-backed store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: Codec> FileStore<C> {
    /// Creates a store using the given codec.
    #[must_use]
    pub fn with_codec(codec: C) -> Self {
        Self {
            codec,
            data_dir: DEFAULT_DATA_DIR.to_string(),
        }
    }

    /// Sets the data directory name used under each working directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Returns the codec.
    #[must_use]
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Returns the directory holding every value of a working directory.
    #[must_use]
    pub fn data_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.data_dir)
    }

    /// Returns the file a key is stored in.
    pub fn path_for(&self, working_dir: &Path, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self
            .data_path(working_dir)
            .join(format!("{key}.{}", self.codec.extension())))
    }

    /// Writes `value` under `(working_dir, key)`, replacing any previous value.
    ///
    /// The file is written next to its destination and renamed into place, so
    /// a crash never leaves a half-written value behind.
    #[instrument(skip_all, fields(key = %key, working_dir = %working_dir.display()))]
    pub fn save<T: Serialize + ?Sized>(
        &self,
        working_dir: &Path,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let path = self.path_for(working_dir, key)?;
        let bytes = self.codec.encode(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;

        let dir = self.data_path(working_dir);
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;

        let tmp = path.with_extension(format!(
            "{}.tmp-{}",
            self.codec.extension(),
            std::process::id()
        ));
        write_synced(&tmp, &bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        info!(key = %key, path = %path.display(), bytes = bytes.len(), "Stored value");
        Ok(())
    }

    /// Reads the value stored under `(working_dir, key)`.
    ///
    /// Fails with [`StoreError::MissingKey`] if the key was never written.
    #[instrument(skip_all, fields(key = %key, working_dir = %working_dir.display()))]
    pub fn load<T: DeserializeOwned>(&self, working_dir: &Path, key: &str) -> Result<T, StoreError> {
        let path = self.path_for(working_dir, key)?;
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::MissingKey {
                    working_dir: working_dir.to_path_buf(),
                    key: key.to_string(),
                });
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        let value = self.codec.decode(&bytes).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            path: path.clone(),
            source,
        })?;
        debug!(key = %key, path = %path.display(), "Loaded value");
        Ok(value)
    }

    /// Returns true if a non-blank value is stored under the key.
    #[must_use]
    pub fn is_present(&self, working_dir: &Path, key: &str) -> bool {
        let Ok(path) = self.path_for(working_dir, key) else {
            return false;
        };
        match fs::read(&path) {
            Ok(bytes) => !self.codec.is_blank(&bytes),
            Err(_) => false,
        }
    }

    /// Deletes the value stored under the key. Deleting a missing key is fine.
    pub fn cleanup(&self, working_dir: &Path, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(working_dir, key)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(key = %key, path = %path.display(), "Removed stored value");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Deletes every value stored for a working directory.
    pub fn cleanup_all(&self, working_dir: &Path) -> Result<(), StoreError> {
        let dir = self.data_path(working_dir);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(path = %dir.display(), "Removed stored data directory");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path: dir, source }),
        }
    }

    /// Stores a string value.
    pub fn save_string(&self, working_dir: &Path, key: &str, value: &str) -> Result<(), StoreError> {
        self.save(working_dir, key, value)
    }

    /// Loads a string value.
    pub fn load_string(&self, working_dir: &Path, key: &str) -> Result<String, StoreError> {
        self.load(working_dir, key)
    }

    /// Stores an integer value.
    pub fn save_int(&self, working_dir: &Path, key: &str, value: i64) -> Result<(), StoreError> {
        self.save(working_dir, key, &value)
    }

    /// Loads an integer value.
    pub fn load_int(&self, working_dir: &Path, key: &str) -> Result<i64, StoreError> {
        self.load(working_dir, key)
    }

    /// Stores the provisioning options the destroy stage will need.
    pub fn save_provision_options(
        &self,
        working_dir: &Path,
        options: &ProvisionOptions,
    ) -> Result<(), StoreError> {
        self.save(working_dir, PROVISION_OPTIONS_KEY, options)
    }

    /// Loads provisioning options saved by an earlier init_apply stage.
    pub fn load_provision_options(&self, working_dir: &Path) -> Result<ProvisionOptions, StoreError> {
        self.load(working_dir, PROVISION_OPTIONS_KEY)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let reason = if key.is_empty() {
        Some("key is empty")
    } else if key == "." || key == ".." {
        Some("key is a relative path component")
    } else if key.contains(['/', '\\', '\0']) {
        Some("key contains a path separator or NUL")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ClusterData {
        cluster_name: String,
        node_count: u32,
        tags: BTreeMap<String, String>,
    }

    fn cluster() -> ClusterData {
        ClusterData {
            cluster_name: "ci-abc123".into(),
            node_count: 3,
            tags: BTreeMap::from([("env".to_string(), "test".to_string())]),
        }
    }

    #[test]
    fn test_save_then_load_struct() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        store.save(dir.path(), "cluster", &cluster()).unwrap();
        let loaded: ClusterData = store.load(dir.path(), "cluster").unwrap();
        assert_eq!(loaded, cluster());
    }

    #[test]
    fn test_latest_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        store.save_string(dir.path(), "ami_id", "ami-111").unwrap();
        store.save_string(dir.path(), "ami_id", "ami-222").unwrap();
        assert_eq!(store.load_string(dir.path(), "ami_id").unwrap(), "ami-222");
    }

    #[test]
    fn test_load_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        let err = store.load::<String>(dir.path(), "never_written").unwrap_err();
        assert!(err.is_missing_key());

        store.save_string(dir.path(), "other", "x").unwrap();
        let err = store.load::<String>(dir.path(), "never_written").unwrap_err();
        assert!(err.is_missing_key());
    }

    #[test]
    fn test_namespaces_are_separate() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let store = FileStore::new();

        store.save_int(first.path(), "port", 8080).unwrap();
        assert!(store.load_int(second.path(), "port").unwrap_err().is_missing_key());
        assert_eq!(store.load_int(first.path(), "port").unwrap(), 8080);
    }

    #[test]
    fn test_file_layout() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        store.save_string(dir.path(), "name", "value").unwrap();

        let expected = dir.path().join(".test-data").join("name.json");
        assert_eq!(store.path_for(dir.path(), "name").unwrap(), expected);
        assert!(expected.is_file());

        let leftovers: Vec<_> = fs::read_dir(dir.path().join(".test-data"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_custom_data_dir() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new().with_data_dir("state");
        store.save_int(dir.path(), "count", 1).unwrap();
        assert!(dir.path().join("state").join("count.json").is_file());
    }

    #[test]
    fn test_independent_store_instances_share_disk() {
        let dir = TempDir::new().unwrap();
        FileStore::new().save_string(dir.path(), "key", "persisted").unwrap();
        assert_eq!(FileStore::new().load_string(dir.path(), "key").unwrap(), "persisted");
    }

    #[test]
    fn test_is_present() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        assert!(!store.is_present(dir.path(), "opt"));
        store.save(dir.path(), "opt", &Option::<String>::None).unwrap();
        assert!(!store.is_present(dir.path(), "opt"));
        store.save(dir.path(), "opt", &Some("x")).unwrap();
        assert!(store.is_present(dir.path(), "opt"));
        assert!(!store.is_present(dir.path(), "../escape"));
    }

    #[test]
    fn test_cleanup_single_key() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        store.save_string(dir.path(), "a", "1").unwrap();
        store.save_string(dir.path(), "b", "2").unwrap();
        store.cleanup(dir.path(), "a").unwrap();
        store.cleanup(dir.path(), "a").unwrap();

        assert!(store.load_string(dir.path(), "a").unwrap_err().is_missing_key());
        assert_eq!(store.load_string(dir.path(), "b").unwrap(), "2");
    }

    #[test]
    fn test_cleanup_all() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        store.cleanup_all(dir.path()).unwrap();
        store.save_string(dir.path(), "a", "1").unwrap();
        store.cleanup_all(dir.path()).unwrap();

        assert!(!dir.path().join(".test-data").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_invalid_keys() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        for key in ["", ".", "..", "a/b", "a\\b"] {
            let err = store.save_string(dir.path(), key, "x").unwrap_err();
            assert!(matches!(err, StoreError::InvalidKey { .. }), "{key:?}");
        }
    }

    #[test]
    fn test_decode_type_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();

        store.save_string(dir.path(), "count", "not a number").unwrap();
        let err = store.load_int(dir.path(), "count").unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    #[test]
    fn test_provision_options_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let options = ProvisionOptions::new("../modules/hello-world")
            .with_var("table_name", serde_json::json!("ci-table"))
            .with_env_var("AWS_DEFAULT_REGION", "eu-west-1");

        store.save_provision_options(dir.path(), &options).unwrap();
        assert_eq!(store.load_provision_options(dir.path()).unwrap(), options);
        assert!(store.is_present(dir.path(), PROVISION_OPTIONS_KEY));
    }

    #[test]
    fn test_module_outputs_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new();
        let outputs: crate::provision::ModuleOutputs = BTreeMap::from([
            ("hello_world".to_string(), serde_json::json!("Hello, World!")),
            ("ids".to_string(), serde_json::json!(["i-1", "i-2"])),
            ("nested".to_string(), serde_json::json!({"a": {"b": 1.5}})),
        ]);

        store.save(dir.path(), "outputs", &outputs).unwrap();
        let loaded: crate::provision::ModuleOutputs = store.load(dir.path(), "outputs").unwrap();
        assert_eq!(loaded, outputs);
    }
}

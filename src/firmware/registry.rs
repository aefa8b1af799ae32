//! Current-firmware record and binary storage.
//!
//! Layout below the registry root:
//!
//! ```text
//! firmware/
//!   latest.json                    current FirmwareRecord
//!   battery_monitor_v1.2.0.bin     one binary per uploaded version
//! ```
//!
//! Binaries of superseded versions stay on disk and remain downloadable.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

pub const RECORD_FILE: &str = "latest.json";
pub const BINARY_EXTENSION: &str = "bin";
pub const MAX_VERSION_LEN: usize = 64;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("{0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt firmware record: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareRecord {
    pub version: String,
    pub build: i64,
    pub download_url: String,
    pub file_size: u64,
    pub release_notes: String,
    /// Lowercase hex SHA-256 of the binary.
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
    pub filename: String,
}

/// A validated upload, ready to be published.
#[derive(Debug, Clone)]
pub struct FirmwareUpload {
    pub version: String,
    pub build: i64,
    pub release_notes: String,
    pub bytes: Vec<u8>,
}

impl FirmwareUpload {
    /// Checks everything that can be checked before touching the disk.
    pub fn new(
        original_filename: &str,
        version: String,
        build: i64,
        release_notes: String,
        bytes: Vec<u8>,
    ) -> Result<Self, RegistryError> {
        if !has_binary_extension(original_filename) {
            return Err(RegistryError::InvalidUpload(format!(
                "Only .{BINARY_EXTENSION} files are allowed"
            )));
        }
        if !is_valid_version(&version) {
            return Err(RegistryError::InvalidUpload(format!(
                "invalid version '{version}'"
            )));
        }
        if build < 0 {
            return Err(RegistryError::InvalidUpload(
                "build cannot be negative".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(RegistryError::InvalidUpload(
                "firmware file required".to_string(),
            ));
        }
        Ok(FirmwareUpload {
            version,
            build,
            release_notes,
            bytes,
        })
    }
}

pub fn has_binary_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case(BINARY_EXTENSION))
        .unwrap_or(false)
}

/// Versions end up in file names, so only a conservative character set is accepted.
pub fn is_valid_version(version: &str) -> bool {
    !version.is_empty()
        && version.len() <= MAX_VERSION_LEN
        && !version.contains("..")
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

pub fn binary_filename(version: &str) -> String {
    format!("battery_monitor_v{version}.{BINARY_EXTENSION}")
}

pub fn download_url(version: &str) -> String {
    format!("/api/firmware/download/{version}")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub struct FirmwareRegistry {
    root: PathBuf,
}

impl FirmwareRegistry {
    pub fn new(root: PathBuf) -> Self {
        FirmwareRegistry { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self) -> PathBuf {
        self.root.join(RECORD_FILE)
    }

    /// Where the binary for `version` lives, or `None` for versions that
    /// could never have been uploaded.
    pub fn binary_path(&self, version: &str) -> Option<PathBuf> {
        is_valid_version(version).then(|| self.root.join(binary_filename(version)))
    }

    pub async fn current(&self) -> Result<Option<FirmwareRecord>, RegistryError> {
        match fs::read(self.record_path()).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stores the binary and replaces the current record.
    ///
    /// An existing binary of the same version is replaced, never rewritten in
    /// place. Concurrent publishes are not serialized; the last one to rename
    /// its record wins.
    pub async fn publish(&self, upload: FirmwareUpload) -> Result<FirmwareRecord, RegistryError> {
        fs::create_dir_all(&self.root).await?;

        let filename = binary_filename(&upload.version);
        replace_file(&self.root, &filename, &upload.bytes).await?;

        let record = FirmwareRecord {
            download_url: download_url(&upload.version),
            file_size: upload.bytes.len() as u64,
            checksum: sha256_hex(&upload.bytes),
            version: upload.version,
            build: upload.build,
            release_notes: upload.release_notes,
            uploaded_at: Utc::now(),
            filename,
        };

        let json = serde_json::to_vec_pretty(&record)?;
        replace_file(&self.root, RECORD_FILE, &json).await?;

        info!(
            "Published firmware v{} build {} ({} bytes, sha256 {})",
            record.version, record.build, record.file_size, record.checksum
        );
        Ok(record)
    }
}

/// Write-then-rename so readers see either the old file or the new one,
/// never a partial write.
async fn replace_file(dir: &Path, name: &str, contents: &[u8]) -> Result<(), RegistryError> {
    let tmp_path = dir.join(format!(".{name}.{}.tmp", Uuid::new_v4()));
    if let Err(e) = fs::write(&tmp_path, contents).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&tmp_path, dir.join(name)).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn upload(version: &str, build: i64, bytes: &[u8]) -> FirmwareUpload {
        FirmwareUpload::new(
            "firmware.bin",
            version.to_string(),
            build,
            "notes".to_string(),
            bytes.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn extension_check() {
        assert!(has_binary_extension("fw.bin"));
        assert!(has_binary_extension("FW.BIN"));
        assert!(!has_binary_extension("fw.hex"));
        assert!(!has_binary_extension("bin"));
        assert!(!has_binary_extension("fw.bin.txt"));
    }

    #[test]
    fn version_charset() {
        assert!(is_valid_version("1.2.0"));
        assert!(is_valid_version("1.2.0-rc_1"));
        assert!(!is_valid_version(""));
        assert!(!is_valid_version("../../etc/passwd"));
        assert!(!is_valid_version("1..2"));
        assert!(!is_valid_version("1/2"));
        assert!(!is_valid_version(&"1".repeat(MAX_VERSION_LEN + 1)));
    }

    #[test]
    fn invalid_uploads_are_rejected() {
        let bad_ext = FirmwareUpload::new("fw.exe", "1.0.0".into(), 1, String::new(), vec![1]);
        assert!(matches!(bad_ext, Err(RegistryError::InvalidUpload(_))));
        let empty = FirmwareUpload::new("fw.bin", "1.0.0".into(), 1, String::new(), vec![]);
        assert!(matches!(empty, Err(RegistryError::InvalidUpload(_))));
        let negative = FirmwareUpload::new("fw.bin", "1.0.0".into(), -1, String::new(), vec![1]);
        assert!(matches!(negative, Err(RegistryError::InvalidUpload(_))));
        let traversal = FirmwareUpload::new("fw.bin", "../x".into(), 1, String::new(), vec![1]);
        assert!(matches!(traversal, Err(RegistryError::InvalidUpload(_))));
    }

    #[tokio::test]
    async fn empty_registry_has_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FirmwareRegistry::new(dir.path().join("firmware"));
        assert_eq!(registry.current().await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_replaces_record_and_keeps_old_binary() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FirmwareRegistry::new(dir.path().join("firmware"));

        let first = registry.publish(upload("1.0.0", 1, b"first")).await.unwrap();
        assert_eq!(first.filename, "battery_monitor_v1.0.0.bin");
        assert_eq!(first.download_url, "/api/firmware/download/1.0.0");
        assert_eq!(first.file_size, 5);
        assert_eq!(first.checksum, sha256_hex(b"first"));

        let second = registry.publish(upload("1.1.0", 2, b"second")).await.unwrap();
        assert_eq!(registry.current().await.unwrap(), Some(second));

        let old = registry.binary_path("1.0.0").unwrap();
        assert_eq!(fs::read(old).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn same_version_overwrites_binary() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FirmwareRegistry::new(dir.path().join("firmware"));

        registry.publish(upload("1.0.0", 1, b"first")).await.unwrap();
        let record = registry.publish(upload("1.0.0", 2, b"patched")).await.unwrap();

        let path = registry.binary_path("1.0.0").unwrap();
        assert_eq!(fs::read(path).await.unwrap(), b"patched");
        assert_eq!(record.build, 2);
        assert_eq!(record.checksum, sha256_hex(b"patched"));
    }

    #[tokio::test]
    async fn no_temp_files_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FirmwareRegistry::new(dir.path().join("firmware"));
        registry.publish(upload("1.0.0", 1, b"abc")).await.unwrap();

        assert_eq!(
            file_names(registry.root()).await,
            vec!["battery_monitor_v1.0.0.bin", "latest.json"]
        );
    }

    async fn file_names(root: &Path) -> Vec<String> {
        let mut entries = fs::read_dir(root).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        names
    }

    #[tokio::test]
    async fn failed_publish_keeps_current_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FirmwareRegistry::new(dir.path().join("firmware"));
        let current = registry.publish(upload("1.0.0", 1, b"good")).await.unwrap();

        // A non-empty directory where the binary should go makes the rename fail.
        let blocked = registry.binary_path("2.0.0").unwrap();
        fs::create_dir_all(blocked.join("occupied")).await.unwrap();

        let result = registry.publish(upload("2.0.0", 2, b"never")).await;
        assert!(matches!(result, Err(RegistryError::Io(_))));
        assert_eq!(registry.current().await.unwrap(), Some(current));

        let names = file_names(registry.root()).await;
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_republish_never_exposes_short_binary() {
        const SIZE: usize = 4 * 1024 * 1024;
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FirmwareRegistry::new(dir.path().join("firmware")));
        registry.publish(upload("1.0.0", 1, &vec![b'A'; SIZE])).await.unwrap();

        let writer = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for (build, fill) in [(2, b'B'), (3, b'C'), (4, b'D')] {
                    registry.publish(upload("1.0.0", build, &vec![fill; SIZE])).await.unwrap();
                }
            })
        };

        let path = registry.binary_path("1.0.0").unwrap();
        let mut reads = 0;
        while !writer.is_finished() || reads == 0 {
            let bytes = fs::read(&path).await.unwrap();
            assert_eq!(bytes.len(), SIZE, "partial binary after {reads} reads");
            assert!(bytes.iter().all(|&b| b == bytes[0]), "mixed binary after {reads} reads");
            reads += 1;
        }
        writer.await.unwrap();

        assert_eq!(fs::read(&path).await.unwrap(), vec![b'D'; SIZE]);
        let record = registry.current().await.unwrap().unwrap();
        assert_eq!(record.build, 4);
        assert_eq!(record.checksum, sha256_hex(&vec![b'D'; SIZE]));
    }

    #[tokio::test]
    async fn corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("firmware");
        fs::create_dir_all(&root).await.unwrap();
        fs::write(root.join(RECORD_FILE), b"{not json").await.unwrap();

        let registry = FirmwareRegistry::new(root);
        assert!(matches!(registry.current().await, Err(RegistryError::Json(_))));
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

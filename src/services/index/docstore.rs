//! docstore.json - marker and manifest of a persisted index

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult, ResultExt};

pub const DOCSTORE_FILE_NAME: &str = "docstore.json";
pub const VECTORS_DIR_NAME: &str = "vectors";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub file_name: String,
    pub sha256: String,
    pub pages: usize,
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocstoreManifest {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub vector_size: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub node_count: usize,
    pub documents: Vec<DocumentEntry>,
}

/// How the indexed files differ from the folder as it is now
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StaleFiles {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl StaleFiles {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    pub fn all(&self) -> Vec<&str> {
        self.added
            .iter()
            .chain(&self.removed)
            .chain(&self.changed)
            .map(String::as_str)
            .collect()
    }
}

impl DocstoreManifest {
    pub fn new(
        embedding_model: &str,
        vector_size: u64,
        chunk_size: usize,
        chunk_overlap: usize,
        documents: Vec<DocumentEntry>,
    ) -> Self {
        let node_count = documents.iter().map(|doc| doc.chunks).sum();
        Self {
            version: MANIFEST_VERSION,
            created_at: Utc::now(),
            embedding_model: embedding_model.to_string(),
            vector_size,
            chunk_size,
            chunk_overlap,
            node_count,
            documents,
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(DOCSTORE_FILE_NAME)
    }

    pub fn exists(dir: &Path) -> bool {
        Self::path(dir).is_file()
    }

    pub fn load(dir: &Path) -> AppResult<Self> {
        let path = Self::path(dir);
        if !path.is_file() {
            return Err(AppError::NotFound {
                entity: "docstore",
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let manifest: Self =
            serde_json::from_str(&content).parse_err(&format!("invalid {}", path.display()))?;
        if manifest.version > MANIFEST_VERSION {
            return Err(AppError::Parse(format!(
                "unsupported docstore version {} in {}",
                manifest.version,
                path.display()
            )));
        }
        Ok(manifest)
    }

    /// Delete the marker; a missing file is fine
    pub fn remove(dir: &Path) -> AppResult<()> {
        match fs::remove_file(Self::path(dir)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Write to a temporary file first so a crash never leaves a torn manifest
    pub fn save(&self, dir: &Path) -> AppResult<()> {
        fs::create_dir_all(dir)?;
        let path = Self::path(dir);
        let tmp_path = dir.join(format!("{DOCSTORE_FILE_NAME}.tmp"));
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// Compare against a `file_name -> sha256` fingerprint of the folder
    pub fn stale_files(&self, fingerprint: &BTreeMap<String, String>) -> StaleFiles {
        let indexed: BTreeMap<&str, &str> = self
            .documents
            .iter()
            .map(|doc| (doc.file_name.as_str(), doc.sha256.as_str()))
            .collect();
        let current: BTreeSet<&str> = fingerprint.keys().map(String::as_str).collect();

        let mut stale = StaleFiles::default();
        for (name, hash) in fingerprint {
            match indexed.get(name.as_str()) {
                None => stale.added.push(name.clone()),
                Some(indexed_hash) if *indexed_hash != hash.as_str() => {
                    stale.changed.push(name.clone())
                }
                Some(_) => {}
            }
        }
        for name in indexed.keys() {
            if !current.contains(name) {
                stale.removed.push(name.to_string());
            }
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn entry(name: &str, hash: &str) -> DocumentEntry {
        DocumentEntry {
            file_name: name.to_string(),
            sha256: hash.to_string(),
            pages: 2,
            chunks: 3,
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        assert!(!DocstoreManifest::exists(dir.path()));

        let manifest = DocstoreManifest::new(
            "Xenova/bge-small-en-v1.5",
            384,
            512,
            20,
            vec![entry("a.pdf", "h1"), entry("b.pdf", "h2")],
        );
        manifest.save(dir.path()).unwrap();

        assert!(DocstoreManifest::exists(dir.path()));
        assert!(!dir.path().join("docstore.json.tmp").exists());
        let loaded = DocstoreManifest::load(dir.path()).unwrap();
        assert_eq!(loaded.node_count, 6);
        assert_eq!(loaded.documents, manifest.documents);
        assert_eq!(loaded.embedding_model, "Xenova/bge-small-en-v1.5");
    }

    #[test]
    fn remove_deletes_marker_and_tolerates_absence() {
        let dir = tempdir().unwrap();
        DocstoreManifest::new("m", 4, 10, 1, Vec::new())
            .save(dir.path())
            .unwrap();
        DocstoreManifest::remove(dir.path()).unwrap();
        assert!(!DocstoreManifest::exists(dir.path()));
        DocstoreManifest::remove(dir.path()).unwrap();
    }

    #[test]
    fn load_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let err = DocstoreManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn load_garbage_is_parse_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(DOCSTORE_FILE_NAME), "{ nope").unwrap();
        let err = DocstoreManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn stale_files_reports_every_difference() {
        let manifest = DocstoreManifest::new(
            "m",
            4,
            10,
            1,
            vec![entry("same.pdf", "h1"), entry("edited.pdf", "h2"), entry("gone.pdf", "h3")],
        );
        let fingerprint: BTreeMap<String, String> = [
            ("same.pdf", "h1"),
            ("edited.pdf", "h2-new"),
            ("new.pdf", "h4"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let stale = manifest.stale_files(&fingerprint);
        assert_eq!(stale.added, vec!["new.pdf".to_string()]);
        assert_eq!(stale.removed, vec!["gone.pdf".to_string()]);
        assert_eq!(stale.changed, vec!["edited.pdf".to_string()]);
        assert_eq!(stale.all().len(), 3);
    }

    #[test]
    fn fresh_folder_is_not_stale() {
        let manifest = DocstoreManifest::new("m", 4, 10, 1, vec![entry("a.pdf", "h1")]);
        let fingerprint = BTreeMap::from([("a.pdf".to_string(), "h1".to_string())]);
        assert!(manifest.stale_files(&fingerprint).is_empty());
    }
}

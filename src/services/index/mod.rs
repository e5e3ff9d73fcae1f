//! Vector index: build from a document folder, or load a persisted one

mod docstore;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use docstore::{DocstoreManifest, DocumentEntry, StaleFiles, DOCSTORE_FILE_NAME, VECTORS_DIR_NAME};

use crate::error::{AppError, AppResult, ResultExt};
use crate::services::ai::{Document, EmbeddingService, SearchService, TextNode, VectorStore};
use crate::services::parser::{fingerprint_folder, load_documents, LoadOptions};
use crate::services::VectorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    Loaded,
    Built { persisted: bool },
}

#[derive(Debug, Clone)]
pub struct IndexRequest {
    pub folder: PathBuf,
    pub embedding_path: Option<PathBuf>,
    pub rebuild: bool,
    pub load_options: LoadOptions,
}

impl IndexRequest {
    /// A persisted index is reused unless a rebuild was asked for
    pub fn should_load(&self) -> bool {
        !self.rebuild
            && self
                .embedding_path
                .as_deref()
                .is_some_and(DocstoreManifest::exists)
    }
}

pub struct VectorIndex {
    embedding: Arc<EmbeddingService>,
    store: Arc<VectorStore>,
    source: IndexSource,
    node_count: usize,
}

impl VectorIndex {
    pub async fn build_or_load(config: &VectorConfig, request: &IndexRequest) -> AppResult<Self> {
        match request.embedding_path.as_deref() {
            Some(path) if request.should_load() => Self::load(config, request, path).await,
            _ => Self::build(config, request).await,
        }
    }

    async fn load(config: &VectorConfig, request: &IndexRequest, path: &Path) -> AppResult<Self> {
        println!("Loading embeddings from: {}", path.display());
        let manifest = DocstoreManifest::load(path)?;

        if manifest.embedding_model != config.embedding_model {
            tracing::warn!(
                persisted = %manifest.embedding_model,
                configured = %config.embedding_model,
                "Persisted index uses a different embedding model; querying with the persisted one"
            );
        }
        let config = VectorConfig {
            embedding_model: manifest.embedding_model.clone(),
            vector_size: manifest.vector_size,
            ..config.clone()
        };

        let store = VectorStore::open_existing(
            &path.join(VECTORS_DIR_NAME),
            &config.table_name,
            config.vector_size,
        )
        .await
        .map_err(|err| match err {
            AppError::NotFound { .. } => AppError::Business(format!(
                "{err}; run again with --rebuild to re-embed {}",
                request.folder.display()
            )),
            other => other,
        })?;

        if store.count().await? == 0 {
            return Err(AppError::Business(format!(
                "persisted index at {} is empty; run again with --rebuild to re-embed {}",
                path.display(),
                request.folder.display()
            )));
        }

        warn_if_stale(&manifest, request);

        let embedding = init_embedding(config).await?;
        tracing::info!(nodes = manifest.node_count, "Loaded persisted index");

        Ok(Self {
            embedding: Arc::new(embedding),
            store: Arc::new(store),
            source: IndexSource::Loaded,
            node_count: manifest.node_count,
        })
    }

    async fn build(config: &VectorConfig, request: &IndexRequest) -> AppResult<Self> {
        let folder = request.folder.clone();
        let options = request.load_options;
        let documents = tokio::task::spawn_blocking(move || load_documents(&folder, &options))
            .await
            .map_err(|e| AppError::Business(format!("document loading task failed: {e}")))??;

        let embedding = init_embedding(config.clone()).await?;
        let mut nodes = embedding.chunk_documents(&documents);
        if nodes.is_empty() {
            return Err(AppError::Validation(format!(
                "No text could be extracted from {}",
                request.folder.display()
            )));
        }
        embedding.embed_nodes(&mut nodes).await?;

        let store = match request.embedding_path.as_deref() {
            Some(path) => {
                println!("Saving embeddings to: {}", path.display());
                prepare_persistent_store(path, config).await?
            }
            None => VectorStore::ephemeral(&config.table_name, config.vector_size).await?,
        };
        store.insert(&nodes).await?;

        let persisted = match request.embedding_path.as_deref() {
            Some(path) => {
                let fingerprint = fingerprint_folder(&request.folder, &request.load_options)?;
                let manifest = DocstoreManifest::new(
                    &config.embedding_model,
                    config.vector_size,
                    config.chunk_size,
                    config.chunk_overlap,
                    document_entries(&documents, &nodes, &fingerprint),
                );
                manifest.save(path)?;
                true
            }
            None => false,
        };

        tracing::info!(
            documents = documents.len(),
            nodes = nodes.len(),
            persisted,
            "Built index"
        );

        Ok(Self {
            embedding: Arc::new(embedding),
            store: Arc::new(store),
            source: IndexSource::Built { persisted },
            node_count: nodes.len(),
        })
    }

    pub fn source(&self) -> IndexSource {
        self.source
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn embedding(&self) -> &EmbeddingService {
        &self.embedding
    }

    pub fn retriever(&self) -> SearchService {
        SearchService::new(self.embedding.clone(), self.store.clone())
    }
}

/// Forget the old index before writing a new one: the marker goes first, so an
/// interrupted build is never mistaken for a loadable index
async fn prepare_persistent_store(path: &Path, config: &VectorConfig) -> AppResult<VectorStore> {
    DocstoreManifest::remove(path)?;
    VectorStore::recreate(&path.join(VECTORS_DIR_NAME), &config.table_name, config.vector_size).await
}

async fn init_embedding(config: VectorConfig) -> AppResult<EmbeddingService> {
    // model files may be downloaded on first use
    tokio::task::spawn_blocking(move || EmbeddingService::new(config))
        .await
        .ai_err("embedding model init task failed")?
}

fn warn_if_stale(manifest: &DocstoreManifest, request: &IndexRequest) {
    match fingerprint_folder(&request.folder, &request.load_options) {
        Ok(fingerprint) => {
            let stale = manifest.stale_files(&fingerprint);
            if !stale.is_empty() {
                tracing::warn!(
                    files = ?stale.all(),
                    "Documents changed since the index was built; use --rebuild to refresh it"
                );
            }
        }
        Err(err) => {
            tracing::warn!(folder = %request.folder.display(), error = %err, "Skipped staleness check");
        }
    }
}

/// Per-file page and chunk counts for the manifest; files that yielded
/// nothing are recorded with zero counts
fn document_entries(
    documents: &[Document],
    nodes: &[TextNode],
    fingerprint: &BTreeMap<String, String>,
) -> Vec<DocumentEntry> {
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for document in documents {
        counts.entry(&document.metadata.file_name).or_default().0 += 1;
    }
    for node in nodes {
        counts.entry(&node.metadata.file_name).or_default().1 += 1;
    }

    fingerprint
        .iter()
        .map(|(file_name, sha256)| {
            let (pages, chunks) = counts.get(file_name.as_str()).copied().unwrap_or_default();
            DocumentEntry {
                file_name: file_name.clone(),
                sha256: sha256.clone(),
                pages,
                chunks,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::services::ai::DocumentMetadata;

    fn metadata(file_name: &str, page: Option<&str>) -> DocumentMetadata {
        DocumentMetadata {
            file_name: file_name.to_string(),
            file_path: format!("/docs/{file_name}"),
            page_label: page.map(str::to_string),
        }
    }

    fn node(file_name: &str) -> TextNode {
        TextNode {
            node_id: "n".to_string(),
            doc_id: "d".to_string(),
            text: "t".to_string(),
            chunk_index: 0,
            token_count: None,
            text_hash: "h".to_string(),
            metadata: metadata(file_name, None),
            embedding: None,
        }
    }

    fn request(embedding_path: Option<PathBuf>, rebuild: bool) -> IndexRequest {
        IndexRequest {
            folder: PathBuf::from("./source"),
            embedding_path,
            rebuild,
            load_options: LoadOptions::default(),
        }
    }

    #[test]
    fn loads_only_when_manifest_exists_and_no_rebuild() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();

        assert!(!request(None, false).should_load());
        assert!(!request(Some(path.clone()), false).should_load());

        DocstoreManifest::new("m", 4, 10, 1, Vec::new())
            .save(&path)
            .unwrap();
        assert!(request(Some(path.clone()), false).should_load());
        assert!(!request(Some(path), true).should_load());
    }

    #[test]
    fn entries_count_pages_and_chunks_per_file() {
        let documents = vec![
            Document {
                doc_id: "a-1".to_string(),
                text: "p1".to_string(),
                metadata: metadata("a.pdf", Some("1")),
            },
            Document {
                doc_id: "a-2".to_string(),
                text: "p2".to_string(),
                metadata: metadata("a.pdf", Some("2")),
            },
            Document {
                doc_id: "b".to_string(),
                text: "notes".to_string(),
                metadata: metadata("b.txt", None),
            },
        ];
        let nodes = vec![node("a.pdf"), node("a.pdf"), node("a.pdf"), node("b.txt")];
        let fingerprint = BTreeMap::from([
            ("a.pdf".to_string(), "ha".to_string()),
            ("b.txt".to_string(), "hb".to_string()),
        ]);

        let entries = document_entries(&documents, &nodes, &fingerprint);
        assert_eq!(
            entries,
            vec![
                DocumentEntry {
                    file_name: "a.pdf".to_string(),
                    sha256: "ha".to_string(),
                    pages: 2,
                    chunks: 3,
                },
                DocumentEntry {
                    file_name: "b.txt".to_string(),
                    sha256: "hb".to_string(),
                    pages: 1,
                    chunks: 1,
                },
            ]
        );
    }

    #[tokio::test]
    async fn load_without_vectors_suggests_rebuild() {
        let dir = tempdir().unwrap();
        let config = VectorConfig::default();
        DocstoreManifest::new(&config.embedding_model, config.vector_size, 512, 20, Vec::new())
            .save(dir.path())
            .unwrap();

        let err = VectorIndex::build_or_load(&config, &request(Some(dir.path().to_path_buf()), false))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("--rebuild"));
    }

    #[test]
    fn unreadable_files_are_not_stale_after_build() {
        let folder = tempdir().unwrap();
        fs::write(folder.path().join("notes.txt"), "pump pressure is 3 bar").unwrap();
        fs::write(folder.path().join("broken.pdf"), b"not a pdf").unwrap();
        fs::write(folder.path().join("blank.txt"), "   ").unwrap();

        let options = LoadOptions::default();
        let documents = load_documents(folder.path(), &options).unwrap();
        assert_eq!(documents.len(), 1);
        let nodes: Vec<TextNode> = documents
            .iter()
            .map(|doc| node(&doc.metadata.file_name))
            .collect();
        let fingerprint = fingerprint_folder(folder.path(), &options).unwrap();

        let entries = document_entries(&documents, &nodes, &fingerprint);
        assert_eq!(entries.len(), 3);
        let broken = entries.iter().find(|e| e.file_name == "broken.pdf").unwrap();
        assert_eq!((broken.pages, broken.chunks), (0, 0));

        let manifest = DocstoreManifest::new("m", 4, 10, 1, entries);
        assert_eq!(manifest.node_count, 1);
        let again = fingerprint_folder(folder.path(), &options).unwrap();
        assert!(manifest.stale_files(&again).is_empty());
    }

    #[tokio::test]
    async fn rebuild_drops_marker_and_old_schema() {
        let dir = tempdir().unwrap();
        let old = VectorConfig {
            vector_size: 3,
            ..VectorConfig::default()
        };
        {
            let store = VectorStore::open(&dir.path().join(VECTORS_DIR_NAME), &old.table_name, 3)
                .await
                .unwrap();
            let mut stale = node("a.pdf");
            stale.embedding = Some(vec![1.0, 0.0, 0.0]);
            store.insert(&[stale]).await.unwrap();
        }
        DocstoreManifest::new(&old.embedding_model, 3, 512, 20, Vec::new())
            .save(dir.path())
            .unwrap();

        let new = VectorConfig {
            vector_size: 4,
            ..VectorConfig::default()
        };
        let store = prepare_persistent_store(dir.path(), &new).await.unwrap();
        assert!(!DocstoreManifest::exists(dir.path()));
        assert_eq!(store.count().await.unwrap(), 0);

        let mut fresh = node("a.pdf");
        fresh.embedding = Some(vec![0.0, 1.0, 0.0, 0.0]);
        store.insert(&[fresh]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn load_of_empty_table_suggests_rebuild() {
        let dir = tempdir().unwrap();
        let config = VectorConfig::default();
        VectorStore::open(
            &dir.path().join(VECTORS_DIR_NAME),
            &config.table_name,
            config.vector_size,
        )
        .await
        .unwrap();
        DocstoreManifest::new(&config.embedding_model, config.vector_size, 512, 20, Vec::new())
            .save(dir.path())
            .unwrap();

        let err = VectorIndex::build_or_load(&config, &request(Some(dir.path().to_path_buf()), false))
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("is empty"));
        assert!(err.to_string().contains("--rebuild"));
    }
}

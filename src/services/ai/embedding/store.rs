//! LanceDB storage operations

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;

use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures_util::TryStreamExt;
use lancedb::arrow::SendableRecordBatchStream;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, DistanceType, Error as LanceError, Table};
use tempfile::TempDir;

use super::{
    COLUMN_CHUNK_INDEX, COLUMN_CHUNK_TEXT, COLUMN_DISTANCE, COLUMN_DOC_ID, COLUMN_FILE_NAME,
    COLUMN_FILE_PATH, COLUMN_NODE_ID, COLUMN_PAGE_LABEL, COLUMN_TEXT_HASH, COLUMN_TOKEN_COUNT,
    COLUMN_VECTOR,
};
use crate::error::{AppError, AppResult, ResultExt};
use crate::services::ai::{DocumentMetadata, NodeWithScore, TextNode};

pub struct VectorStore {
    table: Table,
    schema: Arc<Schema>,
    vector_size: usize,
    // Keeps the directory of an ephemeral store alive
    _temp_dir: Option<TempDir>,
}

impl VectorStore {
    /// Open the table under `dir`, creating it when missing
    pub async fn open(dir: &Path, table_name: &str, vector_size: u64) -> AppResult<Self> {
        let schema = build_schema(vector_size)?;
        let table = open_or_create_table(dir, table_name, schema.clone(), true).await?;
        Ok(Self {
            table,
            schema,
            vector_size: vector_size as usize,
            _temp_dir: None,
        })
    }

    /// Open an existing table; a missing table is `NotFound`
    pub async fn open_existing(dir: &Path, table_name: &str, vector_size: u64) -> AppResult<Self> {
        let schema = build_schema(vector_size)?;
        let table = open_or_create_table(dir, table_name, schema.clone(), false).await?;
        Ok(Self {
            table,
            schema,
            vector_size: vector_size as usize,
            _temp_dir: None,
        })
    }

    /// Drop any existing table under `dir` and create an empty one with the
    /// current schema
    pub async fn recreate(dir: &Path, table_name: &str, vector_size: u64) -> AppResult<Self> {
        let schema = build_schema(vector_size)?;
        std::fs::create_dir_all(dir)?;
        let db = connect(&dir.to_string_lossy()).execute().await.store_err("connect lancedb")?;
        match db.drop_table(table_name, &[]).await {
            Ok(()) | Err(LanceError::TableNotFound { .. }) => {}
            Err(err) => return Err(AppError::VectorStore(format!("drop table: {err}"))),
        }
        let table = db
            .create_empty_table(table_name, schema.clone())
            .execute()
            .await
            .store_err("create table")?;
        Ok(Self {
            table,
            schema,
            vector_size: vector_size as usize,
            _temp_dir: None,
        })
    }

    /// A store in a temporary directory, removed when the store is dropped
    pub async fn ephemeral(table_name: &str, vector_size: u64) -> AppResult<Self> {
        let temp_dir = tempfile::Builder::new().prefix("pdfquery-").tempdir()?;
        let mut store = Self::open(temp_dir.path(), table_name, vector_size).await?;
        tracing::debug!(dir = %temp_dir.path().display(), "Using ephemeral vector store");
        store._temp_dir = Some(temp_dir);
        Ok(store)
    }

    pub async fn insert(&self, nodes: &[TextNode]) -> AppResult<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let batch = build_record_batch(self.schema.clone(), nodes, self.vector_size)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], self.schema.clone());
        self.table
            .add(batches)
            .execute()
            .await
            .store_err("insert nodes")?;

        tracing::debug!(rows = nodes.len(), "Inserted nodes");
        Ok(())
    }

    pub async fn count(&self) -> AppResult<usize> {
        self.table.count_rows(None).await.store_err("count rows")
    }

    pub async fn search(&self, vector: Vec<f32>, top_k: usize) -> AppResult<Vec<NodeWithScore>> {
        if vector.len() != self.vector_size {
            return Err(AppError::VectorStore(format!(
                "query vector size {} does not match index size {}",
                vector.len(),
                self.vector_size
            )));
        }

        let stream = self
            .table
            .query()
            .nearest_to(vector)
            .store_err("build vector query")?
            .column(COLUMN_VECTOR)
            .distance_type(DistanceType::Cosine)
            .limit(top_k)
            .execute()
            .await
            .store_err("vector search")?;

        let mut results = collect_search_results(stream).await?;
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        results.truncate(top_k);
        Ok(results)
    }
}

pub fn build_schema(vector_size: u64) -> AppResult<Arc<Schema>> {
    let dim = i32::try_from(vector_size)
        .map_err(|_| AppError::Config("vector_size overflow".to_string()))?;

    let vector = DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dim,
    );

    Ok(Arc::new(Schema::new(vec![
        Field::new(COLUMN_NODE_ID, DataType::Utf8, false),
        Field::new(COLUMN_DOC_ID, DataType::Utf8, false),
        Field::new(COLUMN_FILE_NAME, DataType::Utf8, false),
        Field::new(COLUMN_FILE_PATH, DataType::Utf8, false),
        Field::new(COLUMN_PAGE_LABEL, DataType::Utf8, true),
        Field::new(COLUMN_CHUNK_INDEX, DataType::Int32, false),
        Field::new(COLUMN_TOKEN_COUNT, DataType::Int32, true),
        Field::new(COLUMN_TEXT_HASH, DataType::Utf8, false),
        Field::new(COLUMN_CHUNK_TEXT, DataType::Utf8, false),
        Field::new(COLUMN_VECTOR, vector, true),
    ])))
}

async fn open_or_create_table(
    dir: &Path,
    table_name: &str,
    schema: Arc<Schema>,
    create: bool,
) -> AppResult<Table> {
    std::fs::create_dir_all(dir)?;
    let uri = dir.to_string_lossy().to_string();
    let db = connect(&uri).execute().await.store_err("connect lancedb")?;

    match db.open_table(table_name).execute().await {
        Ok(table) => Ok(table),
        Err(LanceError::TableNotFound { .. }) if create => db
            .create_empty_table(table_name, schema)
            .execute()
            .await
            .store_err("create table"),
        Err(LanceError::TableNotFound { .. }) => Err(AppError::NotFound {
            entity: "vector table",
            path: format!("{}/{}", uri, table_name),
        }),
        Err(err) => Err(AppError::VectorStore(err.to_string())),
    }
}

pub fn build_record_batch(
    schema: Arc<Schema>,
    rows: &[TextNode],
    dim: usize,
) -> AppResult<RecordBatch> {
    let node_ids = StringArray::from_iter_values(rows.iter().map(|row| row.node_id.as_str()));
    let doc_ids = StringArray::from_iter_values(rows.iter().map(|row| row.doc_id.as_str()));
    let file_names =
        StringArray::from_iter_values(rows.iter().map(|row| row.metadata.file_name.as_str()));
    let file_paths =
        StringArray::from_iter_values(rows.iter().map(|row| row.metadata.file_path.as_str()));
    let page_labels =
        StringArray::from_iter(rows.iter().map(|row| row.metadata.page_label.as_deref()));
    let chunk_indices = Int32Array::from_iter_values(rows.iter().map(|row| row.chunk_index));
    let token_counts = Int32Array::from_iter(rows.iter().map(|row| row.token_count));
    let text_hashes = StringArray::from_iter_values(rows.iter().map(|row| row.text_hash.as_str()));
    let chunk_texts = StringArray::from_iter_values(rows.iter().map(|row| row.text.as_str()));
    let vectors = build_vector_column(rows, dim)?;

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(node_ids),
            Arc::new(doc_ids),
            Arc::new(file_names),
            Arc::new(file_paths),
            Arc::new(page_labels),
            Arc::new(chunk_indices),
            Arc::new(token_counts),
            Arc::new(text_hashes),
            Arc::new(chunk_texts),
            Arc::new(vectors),
        ],
    )
    .store_err("build record batch")
}

fn build_vector_column(
    rows: &[TextNode],
    dim: usize,
) -> AppResult<arrow_array::FixedSizeListArray> {
    let mut builder = FixedSizeListBuilder::with_capacity(
        Float32Builder::with_capacity(rows.len() * dim),
        dim as i32,
        rows.len(),
    );

    for row in rows {
        let vector = row.embedding.as_deref().ok_or_else(|| {
            AppError::VectorStore(format!("node {} has no embedding", row.node_id))
        })?;
        if vector.len() != dim {
            return Err(AppError::VectorStore("embedding vector size mismatch".to_string()));
        }
        builder.values().append_slice(vector);
        builder.append(true);
    }

    Ok(builder.finish())
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| AppError::VectorStore(format!("search result missing {name}")))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| AppError::VectorStore(format!("{name} column type mismatch")))
}

pub async fn collect_search_results(
    mut stream: SendableRecordBatchStream,
) -> AppResult<Vec<NodeWithScore>> {
    let mut results = Vec::new();

    while let Some(batch) = stream.try_next().await.store_err("read search results")? {
        if batch.num_rows() == 0 {
            continue;
        }

        let node_ids = string_column(&batch, COLUMN_NODE_ID)?;
        let file_names = string_column(&batch, COLUMN_FILE_NAME)?;
        let file_paths = string_column(&batch, COLUMN_FILE_PATH)?;
        let page_labels = string_column(&batch, COLUMN_PAGE_LABEL)?;
        let chunk_texts = string_column(&batch, COLUMN_CHUNK_TEXT)?;
        let chunk_indices = batch
            .column_by_name(COLUMN_CHUNK_INDEX)
            .ok_or_else(|| AppError::VectorStore("search result missing chunk_index".to_string()))?
            .as_any()
            .downcast_ref::<Int32Array>()
            .ok_or_else(|| AppError::VectorStore("chunk_index column type mismatch".to_string()))?;

        let scores = match batch.column_by_name(COLUMN_DISTANCE) {
            Some(column) => column
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| AppError::VectorStore("distance column type mismatch".to_string()))?
                .iter()
                .map(|value| 1.0 - value.unwrap_or(1.0) as f64)
                .collect::<Vec<f64>>(),
            None => vec![0.0; batch.num_rows()],
        };

        for row_idx in 0..batch.num_rows() {
            let page_label = if page_labels.is_null(row_idx) {
                None
            } else {
                Some(page_labels.value(row_idx).to_string())
            };

            results.push(NodeWithScore {
                node_id: node_ids.value(row_idx).to_string(),
                text: chunk_texts.value(row_idx).to_string(),
                chunk_index: chunk_indices.value(row_idx),
                metadata: DocumentMetadata {
                    file_name: file_names.value(row_idx).to_string(),
                    file_path: file_paths.value(row_idx).to_string(),
                    page_label,
                },
                score: scores.get(row_idx).copied().unwrap_or(0.0),
            });
        }
    }

    Ok(results)
}

//! LanceDB Vector Store - 로컬 파일 기반 벡터 저장소
//!
//! 컬렉션 하나가 LanceDB 테이블 하나에 대응합니다.
//! 코사인 거리로 검색하며 유사도는 `1 - distance`로 계산합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;

use super::document::{metadata_from_json, metadata_to_json, SearchResult};
use super::vector::{rank_results, SearchFilter, VectorEntry, VectorStore};
use crate::error::{RagError, Result};

const BACKEND: &str = "lancedb";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// 청크 ID(`id` 컬럼)를 키로 merge insert 하므로 같은 청크를 다시 넣으면 덮어씁니다.
/// 메타데이터는 타입 태그가 붙은 JSON 문자열 컬럼으로 저장되며 필터는 검색 후 적용됩니다.
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::Config(format!("Invalid path encoding: {:?}", path)))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        tracing::debug!("Opened LanceDB at {:?}", path);
        Ok(Self { db })
    }

    /// 컬렉션 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let dimension = entries
            .first()
            .map(|e| e.embedding.len())
            .ok_or_else(|| {
                RagError::InvalidState("Cannot create batch from empty entries".into())
            })?;

        if entries.iter().any(|e| e.embedding.len() != dimension) {
            return Err(RagError::store(
                BACKEND,
                "All vectors in a batch must have the same dimension",
            ));
        }

        let dimension = i32::try_from(dimension)
            .map_err(|_| RagError::store(BACKEND, "Vector dimension too large"))?;

        let ids: Vec<&str> = entries.iter().map(|e| e.chunk.id.as_str()).collect();
        let document_ids: Vec<&str> = entries
            .iter()
            .map(|e| e.chunk.document_id.as_str())
            .collect();
        let indices: Vec<i64> = entries.iter().map(|e| e.chunk.index as i64).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.chunk.text.as_str()).collect();
        let created: Vec<String> = entries
            .iter()
            .map(|e| e.chunk.created_at.to_rfc3339())
            .collect();
        let metadata = entries
            .iter()
            .map(|e| metadata_to_json(&e.chunk.metadata))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| RagError::store(BACKEND, e))?;

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| RagError::store(BACKEND, e))?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(Int64Array::from(indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(created)),
                Arc::new(StringArray::from(metadata)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(|e| RagError::store(BACKEND, e))
    }

    /// 검색 결과 배치 → SearchResult
    fn batch_to_results(batch: &RecordBatch) -> Result<Vec<SearchResult>> {
        fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
            batch
                .column_by_name(name)
                .and_then(|c| c.as_any().downcast_ref::<T>())
                .ok_or_else(|| RagError::store(BACKEND, format!("Missing {} column", name)))
        }

        let ids = column::<StringArray>(batch, "id")?;
        let document_ids = column::<StringArray>(batch, "document_id")?;
        let indices = column::<Int64Array>(batch, "chunk_index")?;
        let texts = column::<StringArray>(batch, "text")?;
        let metadata = column::<StringArray>(batch, "metadata")?;
        // _distance 컬럼 (LanceDB가 자동 추가)
        let distances = column::<Float32Array>(batch, "_distance")?;

        (0..batch.num_rows())
            .map(|i| {
                let metadata = metadata_from_json(metadata.value(i))
                    .map_err(|e| RagError::store(BACKEND, e))?;
                Ok(SearchResult {
                    id: ids.value(i).to_string(),
                    document_id: document_ids.value(i).to_string(),
                    text: texts.value(i).to_string(),
                    index: indices.value(i).max(0) as usize,
                    // 코사인 거리 → 유사도
                    score: 1.0 - distances.value(i),
                    metadata,
                })
            })
            .collect()
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;
        Ok(names.iter().any(|n| n == name))
    }

    /// 테이블 열기 (없으면 NotFound)
    async fn open_table(&self, name: &str) -> Result<lancedb::table::Table> {
        if !self.table_exists(name).await? {
            return Err(RagError::NotFound(format!(
                "Collection '{}' does not exist",
                name
            )));
        }
        self.db
            .open_table(name)
            .execute()
            .await
            .map_err(|e| RagError::store(BACKEND, e))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.table_exists(name).await? {
            tracing::debug!("Collection {} already exists", name);
            return Ok(());
        }

        let dimension = i32::try_from(dimension)
            .map_err(|_| RagError::store(BACKEND, "Vector dimension too large"))?;
        let schema: SchemaRef = Arc::new(Self::create_schema(dimension));

        self.db
            .create_empty_table(name, schema)
            .execute()
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        tracing::info!("Created LanceDB table {} (dim={})", name, dimension);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.table_exists(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.table_exists(name).await? {
            return Ok(());
        }
        self.db
            .drop_table(name)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;
        tracing::info!("Dropped LanceDB table {}", name);
        Ok(())
    }

    async fn upsert_batch(&self, collection: &str, entries: &[VectorEntry]) -> Result<()> {
        let table = self.open_table(collection).await?;
        if entries.is_empty() {
            return Ok(());
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        Ok(())
    }

    async fn search_with_filter(
        &self,
        collection: &str,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let table = self.open_table(collection).await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;
        if rows == 0 || limit == 0 {
            return Ok(vec![]);
        }

        // 필터가 있으면 전체를 스캔한 뒤 걸러냄
        let fetch = if filter.is_empty() { limit } else { rows };

        let stream = table
            .vector_search(query.to_vec())
            .map_err(|e| RagError::store(BACKEND, e))?
            .distance_type(DistanceType::Cosine)
            .limit(fetch)
            .execute()
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        let mut results = Vec::new();
        for batch in &batches {
            results.extend(
                Self::batch_to_results(batch)?
                    .into_iter()
                    .filter(|r| filter.matches(&r.metadata)),
            );
        }

        Ok(rank_results(results, limit, threshold))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let table = self.open_table(collection).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::store(BACKEND, e))
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

// ============================================================================
// Tests
// ============================================================================

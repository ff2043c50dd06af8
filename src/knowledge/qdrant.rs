//! Qdrant Vector Store (feature = "qdrant")
//!
//! gRPC로 Qdrant 서버(기본 `http://localhost:6334`)에 연결합니다.
//! 포인트 ID는 청크 ID에서 만든 결정적 UUID이며, 페이로드에는
//! `chunk_id`, `document_id`, `text`, `index`, `created_at`, `meta_<key>`가 저장됩니다.

use async_trait::async_trait;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, Distance, Filter, PointStruct,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};

use super::document::{metadata_from_json, metadata_to_json, Metadata, SearchResult};
use super::vector::{SearchFilter, VectorEntry, VectorStore};
use crate::error::{RagError, Result};

const BACKEND: &str = "qdrant";
const META_PREFIX: &str = "meta_";

/// Qdrant 벡터 저장소
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// URL로 연결 (API 키는 선택)
    pub fn new(url: &str, api_key: Option<&str>) -> Result<Self> {
        let mut builder = Qdrant::from_url(url);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        let client = builder.build().map_err(|e| RagError::store(BACKEND, e))?;
        tracing::debug!("Qdrant client configured for {}", url);
        Ok(Self { client })
    }

    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    async fn ensure_exists(&self, collection: &str) -> Result<()> {
        if self.collection_exists(collection).await? {
            Ok(())
        } else {
            Err(RagError::NotFound(format!(
                "Collection '{}' does not exist",
                collection
            )))
        }
    }

    fn extract_string(value: &QdrantValue) -> Option<String> {
        match &value.kind {
            Some(Kind::StringValue(s)) => Some(s.clone()),
            _ => None,
        }
    }

    fn extract_integer(value: &QdrantValue) -> Option<i64> {
        match &value.kind {
            Some(Kind::IntegerValue(n)) => Some(*n),
            Some(Kind::DoubleValue(n)) => Some(*n as i64),
            _ => None,
        }
    }
}

/// 엔트리 → 페이로드
///
/// `meta_<key>`는 필터용 문자열이고, 타입이 보존된 원본은 `metadata` JSON 문자열에 저장합니다.
fn build_payload(entry: &VectorEntry) -> Result<Payload> {
    let json = payload_json(entry)?;
    Payload::try_from(serde_json::Value::Object(json)).map_err(|e| RagError::store(BACKEND, e))
}

fn payload_json(entry: &VectorEntry) -> Result<serde_json::Map<String, serde_json::Value>> {
    let chunk = &entry.chunk;
    let mut map = serde_json::Map::new();
    map.insert("chunk_id".into(), chunk.id.clone().into());
    map.insert("document_id".into(), chunk.document_id.clone().into());
    map.insert("text".into(), chunk.text.clone().into());
    map.insert("index".into(), (chunk.index as u64).into());
    map.insert("created_at".into(), chunk.created_at.to_rfc3339().into());

    for (key, value) in &chunk.metadata {
        map.insert(format!("{}{}", META_PREFIX, key), value.to_string().into());
    }

    let metadata = metadata_to_json(&chunk.metadata).map_err(|e| RagError::store(BACKEND, e))?;
    map.insert("metadata".into(), metadata.into());

    Ok(map)
}

/// SearchFilter → Qdrant 필터
///
/// 조건마다 `meta_k` 또는 `meta_doc_k` 중 하나가 일치해야 합니다 (조건끼리는 AND).
fn build_filter(filter: &SearchFilter) -> Option<Filter> {
    if filter.is_empty() {
        return None;
    }

    let must: Vec<Condition> = filter
        .conditions()
        .map(|(key, value)| {
            let expected = value.to_string();
            Filter::should([
                Condition::matches(format!("{}{}", META_PREFIX, key), expected.clone()),
                Condition::matches(format!("{}doc_{}", META_PREFIX, key), expected),
            ])
            .into()
        })
        .collect();

    Some(Filter::must(must))
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            tracing::debug!("Collection {} already exists", name);
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimension as u64, Distance::Cosine)),
            )
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        tracing::info!("Created Qdrant collection {} (dim={})", name, dimension);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| RagError::store(BACKEND, e))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        if !self.collection_exists(name).await? {
            return Ok(());
        }
        self.client
            .delete_collection(name)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;
        tracing::info!("Deleted Qdrant collection {}", name);
        Ok(())
    }

    async fn upsert_batch(&self, collection: &str, entries: &[VectorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let points = entries
            .iter()
            .map(|entry| {
                Ok(PointStruct::new(
                    entry.chunk.point_id().to_string(),
                    entry.embedding.clone(),
                    build_payload(entry)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        tracing::debug!("Upserted {} points to {}", entries.len(), collection);
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
        self.ensure_exists(collection).await?;

        let mut request = SearchPointsBuilder::new(collection, query.to_vec(), limit as u64)
            .with_payload(true)
            .score_threshold(threshold);
        if let Some(filter) = build_filter(filter) {
            request = request.filter(filter);
        }

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;

        response
            .result
            .into_iter()
            .map(|scored| {
                let payload = &scored.payload;
                let get_string = |key: &str| {
                    payload
                        .get(key)
                        .and_then(Self::extract_string)
                        .unwrap_or_default()
                };

                let metadata = match payload.get("metadata").and_then(Self::extract_string) {
                    Some(json) => {
                        metadata_from_json(&json).map_err(|e| RagError::store(BACKEND, e))?
                    }
                    None => Metadata::new(),
                };

                Ok(SearchResult {
                    id: get_string("chunk_id"),
                    document_id: get_string("document_id"),
                    text: get_string("text"),
                    index: payload
                        .get("index")
                        .and_then(Self::extract_integer)
                        .unwrap_or(0)
                        .max(0) as usize,
                    score: scored.score,
                    metadata,
                })
            })
            .collect()
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.ensure_exists(collection).await?;
        let response = self
            .client
            .count(CountPointsBuilder::new(collection).exact(true))
            .await
            .map_err(|e| RagError::store(BACKEND, e))?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

// ============================================================================
// Tests
// ============================================================================

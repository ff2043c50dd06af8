//! In-memory Vector Store
//!
//! `tokio::sync::RwLock`으로 보호되는 HashMap 기반 저장소입니다.
//! 정확한(exhaustive) 코사인 유사도 검색을 수행하며 테스트/소규모 용도에 적합합니다.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::document::SearchResult;
use super::vector::{cosine_similarity, rank_results, SearchFilter, VectorEntry, VectorStore};
use crate::error::{RagError, Result};

const BACKEND: &str = "memory";

/// 컬렉션: 차원 + (청크 ID → 엔트리)
#[derive(Debug, Default)]
struct Collection {
    dimension: usize,
    entries: HashMap<String, VectorEntry>,
}

/// 메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::NotFound(format!("Collection '{}' does not exist", collection))
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            tracing::debug!("Collection {} already exists", name);
            return Ok(());
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                entries: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn upsert_batch(&self, collection: &str, entries: &[VectorEntry]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        // 전체 검증 후 삽입 (부분 반영 방지)
        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != store.dimension)
        {
            return Err(RagError::store(
                BACKEND,
                format!(
                    "Vector dimension {} does not match collection '{}' dimension {}",
                    bad.embedding.len(),
                    collection,
                    store.dimension
                ),
            ));
        }

        for entry in entries {
            store.entries.insert(entry.chunk.id.clone(), entry.clone());
        }
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
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let scored = store
            .entries
            .values()
            .filter(|entry| filter.matches(&entry.chunk.metadata))
            .map(|entry| SearchResult {
                id: entry.chunk.id.clone(),
                document_id: entry.chunk.document_id.clone(),
                text: entry.chunk.text.clone(),
                index: entry.chunk.index,
                score: cosine_similarity(&entry.embedding, query),
                metadata: entry.chunk.metadata.clone(),
            })
            .collect();

        Ok(rank_results(scored, limit, threshold))
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.entries.len())
            .ok_or_else(|| missing(collection))
    }

    fn name(&self) -> &str {
        BACKEND
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::document::DocumentChunk;

    fn entry(doc: &str, index: usize, category: &str, embedding: Vec<f32>) -> VectorEntry {
        let mut chunk = DocumentChunk::new(doc, index, format!("{} chunk {}", doc, index));
        chunk
            .metadata
            .insert("doc_category".into(), category.into());
        VectorEntry::new(chunk, embedding)
    }

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let store = InMemoryVectorStore::new();
        assert!(!store.collection_exists("docs").await.unwrap());

        store.create_collection("docs", 3).await.unwrap();
        store.create_collection("docs", 3).await.unwrap();
        assert!(store.collection_exists("docs").await.unwrap());

        store.delete_collection("docs").await.unwrap();
        store.delete_collection("docs").await.unwrap();
        assert!(!store.collection_exists("docs").await.unwrap());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();

        let batch = vec![
            entry("a", 0, "Packaging", vec![1.0, 0.0]),
            entry("a", 1, "Packaging", vec![0.0, 1.0]),
        ];
        store.upsert_batch("docs", &batch).await.unwrap();
        store.upsert_batch("docs", &batch).await.unwrap();
        store.upsert("docs", &batch[0]).await.unwrap();

        assert_eq!(store.count("docs").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();

        let err = store
            .upsert_batch("docs", &[entry("a", 0, "CNC", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store { .. }));
        assert_eq!(store.count("docs").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_threshold_and_filter() {
        let store = InMemoryVectorStore::new();
        store.create_collection("docs", 2).await.unwrap();
        store
            .upsert_batch(
                "docs",
                &[
                    entry("krones", 0, "Packaging", vec![1.0, 0.0]),
                    entry("fanuc", 0, "Robotics", vec![0.9, 0.1]),
                    entry("siemens", 0, "CNC", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search("docs", &[1.0, 0.0], 5, 0.7).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["krones_0", "fanuc_0"]);

        let filter = SearchFilter::new().where_eq("category", "Robotics");
        let results = store
            .search_with_filter("docs", &[1.0, 0.0], &filter, 5, 0.7)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "fanuc");
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_found() {
        let store = InMemoryVectorStore::new();
        let err = store.search("nope", &[1.0], 5, 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound(_)));
    }
}

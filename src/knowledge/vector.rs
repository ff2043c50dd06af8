//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 이름 있는 컬렉션 단위로 (청크, 임베딩)을 저장하고
//! 코사인 유사도 기반 최근접 검색을 제공합니다.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::document::{DocumentChunk, Metadata, MetadataValue, SearchResult};
use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용) - 청크와 임베딩 쌍
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    pub fn new(chunk: DocumentChunk, embedding: Vec<f32>) -> Self {
        Self { chunk, embedding }
    }
}

/// 메타데이터 동등 필터 (모든 조건 AND)
///
/// 조건 `k = v`는 결과 메타데이터의 `k` 또는 `doc_k`가 `v`와 일치하면 만족합니다.
/// `chunk_document`가 문서 메타데이터를 `doc_` 접두사로 저장하기 때문입니다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    conditions: BTreeMap<String, MetadataValue>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 조건 추가
    pub fn where_eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.conditions.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn conditions(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.conditions.iter()
    }

    /// 메타데이터가 모든 조건을 만족하는지 확인
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|(key, expected)| {
            metadata
                .get(key)
                .or_else(|| metadata.get(&format!("doc_{}", key)))
                .map(|actual| actual.matches(expected))
                .unwrap_or(false)
        })
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for SearchFilter {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            conditions: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다. 검색 결과는 점수 내림차순이며
/// `threshold` 미만의 결과는 포함하지 않습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 컬렉션 생성 (이미 있으면 아무것도 하지 않음)
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// 컬렉션 존재 여부
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// 컬렉션 삭제 (없으면 아무것도 하지 않음)
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// 단일 엔트리 upsert
    async fn upsert(&self, collection: &str, entry: &VectorEntry) -> Result<()> {
        self.upsert_batch(collection, std::slice::from_ref(entry)).await
    }

    /// 배치 upsert (같은 청크 ID는 덮어씀)
    async fn upsert_batch(&self, collection: &str, entries: &[VectorEntry]) -> Result<()>;

    /// 벡터 검색
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.search_with_filter(collection, query, &SearchFilter::default(), limit, threshold)
            .await
    }

    /// 메타데이터 필터를 적용한 벡터 검색
    async fn search_with_filter(
        &self,
        collection: &str,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// 컬렉션의 벡터 개수
    async fn count(&self, collection: &str) -> Result<usize>;

    /// 저장소 이름 (로그용)
    fn name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 점수 내림차순 정렬 후 threshold / limit 적용
pub(crate) fn rank_results(
    mut results: Vec<SearchResult>,
    limit: usize,
    threshold: f32,
) -> Vec<SearchResult> {
    results.retain(|r| r.score >= threshold);
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    results
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal_and_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.0001);
        assert!((cosine_similarity(&a, &[-1.0, 0.0, 0.0]) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_filter_matches_conjunction_and_doc_prefix() {
        let mut meta = Metadata::new();
        meta.insert("doc_category".into(), "Packaging".into());
        meta.insert("strategy".into(), "paragraph".into());
        meta.insert("doc_year".into(), "2024".into());

        assert!(SearchFilter::new().matches(&meta));
        assert!(SearchFilter::new().where_eq("category", "Packaging").matches(&meta));
        assert!(SearchFilter::new()
            .where_eq("category", "Packaging")
            .where_eq("year", 2024i64)
            .matches(&meta));
        assert!(!SearchFilter::new()
            .where_eq("category", "Packaging")
            .where_eq("strategy", "token")
            .matches(&meta));
        assert!(!SearchFilter::new().where_eq("manufacturer", "Krones AG").matches(&meta));
    }

    #[test]
    fn test_rank_results() {
        let result = |id: &str, score: f32| SearchResult {
            id: id.to_string(),
            document_id: "d".to_string(),
            text: id.to_string(),
            index: 0,
            score,
            metadata: Metadata::new(),
        };
        let ranked = rank_results(
            vec![result("a", 0.5), result("b", 0.9), result("c", 0.75), result("d", 0.8)],
            2,
            0.7,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "d"]);
    }
}

//! RAG 파이프라인 - 인덱싱(청킹 → 임베딩 → 저장)과 질의(임베딩 → 검색 → 생성)
//!
//! 모든 작업은 `CancellationToken`을 받으며, 게이트웨이 호출마다 토큰과 경합합니다.
//! 취소되면 이후 단계는 실행되지 않습니다.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::chunker::{ChunkingOptions, DocumentChunker};
use super::document::{Document, DocumentChunk, SearchResult};
use super::vector::{SearchFilter, VectorEntry, VectorStore};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::TextGenerator;

/// 검색 결과가 없을 때의 답변
pub const NO_RESULTS_MESSAGE: &str =
    "I couldn't find any relevant information in the knowledge base to answer your question.";

/// 필터 검색 결과가 없을 때의 답변
pub const NO_FILTERED_RESULTS_MESSAGE: &str = "No relevant documents found matching the filters.";

/// 컨텍스트 항목 구분자
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

// ============================================================================
// Types
// ============================================================================

/// 질의 옵션
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryOptions {
    /// 최대 검색 결과 수
    pub top_k: usize,
    /// 최소 유사도
    pub threshold: f32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.7,
        }
    }
}

/// 인덱싱 결과 요약
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub document_id: String,
    pub collection: String,
    /// 저장된 청크 수
    pub chunks: usize,
    /// 벡터 차원
    pub dimension: usize,
    /// 이번 호출에서 컬렉션을 새로 만들었는지
    pub created_collection: bool,
}

/// 답변 + 근거 청크
#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    /// 점수 내림차순 (비어 있으면 생성기를 호출하지 않은 것)
    pub sources: Vec<SearchResult>,
}

// ============================================================================
// RagPipeline
// ============================================================================

/// RAG 파이프라인
///
/// 게이트웨이는 시작 시점에 명시적으로 주입되며 호출 간 상태를 갖지 않습니다.
#[derive(Clone)]
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn VectorStore>,
    chunker: DocumentChunker,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn TextGenerator>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedder,
            generator,
            store,
            chunker: DocumentChunker::new(),
        }
    }

    /// 청커 교체 (예: 다른 텍스트 추출기 사용)
    pub fn with_chunker(mut self, chunker: DocumentChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn chunker(&self) -> &DocumentChunker {
        &self.chunker
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    /// 문서 인덱싱
    ///
    /// 1. 청킹 2. 일괄 임베딩 3. 첫 벡터 길이로 차원 결정 4. 컬렉션이 없으면 생성
    /// 5. 청크 i와 벡터 i를 묶어 일괄 upsert
    ///
    /// # Errors
    /// - 벡터가 0개이거나 청크 수와 다르면 `Embedding`
    /// - 차원이 0이면 `InvalidState`
    /// - 이번 호출에서 컬렉션을 만든 뒤 실패하면 `PartiallyIndexed`
    pub async fn index_document(
        &self,
        collection: &str,
        document: &Document,
        options: &ChunkingOptions,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let chunks = self.chunker.chunk_document(document, options)?;
        tracing::info!(
            "Chunked document {} into {} chunks ({})",
            document.id,
            chunks.len(),
            options.strategy
        );
        self.store_chunks(collection, &document.id, chunks, cancel)
            .await
    }

    /// 파일 인덱싱 (청크 ID는 파일 이름 기준)
    pub async fn index_file(
        &self,
        collection: &str,
        path: &Path,
        options: &ChunkingOptions,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let chunks = with_cancel(cancel, "extraction", self.chunker.chunk_file(path, options))
            .await?;
        let document_id = chunks
            .first()
            .map(|c| c.document_id.clone())
            .unwrap_or_else(|| path.display().to_string());
        tracing::info!("Chunked file {:?} into {} chunks", path, chunks.len());
        self.store_chunks(collection, &document_id, chunks, cancel)
            .await
    }

    /// 파일 인덱싱 (청크 ID 시드 지정)
    ///
    /// 폴더 인덱싱에서는 수집 루트 기준 상대 경로를 넘겨 같은 이름의 파일끼리
    /// ID가 겹치지 않게 합니다.
    pub async fn index_file_as(
        &self,
        collection: &str,
        path: &Path,
        document_id: &str,
        options: &ChunkingOptions,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let chunks = with_cancel(
            cancel,
            "extraction",
            self.chunker.chunk_file_as(path, document_id, options),
        )
        .await?;
        tracing::info!("Chunked file {:?} into {} chunks", path, chunks.len());
        self.store_chunks(collection, document_id, chunks, cancel)
            .await
    }

    async fn store_chunks(
        &self,
        collection: &str,
        document_id: &str,
        chunks: Vec<DocumentChunk>,
        cancel: &CancellationToken,
    ) -> Result<IndexReport> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            with_cancel(cancel, "embedding", self.embedder.embed_batch(&texts)).await?
        };

        if embeddings.is_empty() {
            return Err(RagError::embedding(
                self.embedder.name(),
                format!("No embeddings generated for document {}", document_id),
            ));
        }
        if embeddings.len() != chunks.len() {
            return Err(RagError::embedding(
                self.embedder.name(),
                format!(
                    "Generated {} embeddings for {} chunks",
                    embeddings.len(),
                    chunks.len()
                ),
            ));
        }

        let dimension = embeddings[0].len();
        if dimension == 0 {
            return Err(RagError::InvalidState(
                "Embedding dimension is zero".to_string(),
            ));
        }

        let exists = with_cancel(
            cancel,
            "collection",
            self.store.collection_exists(collection),
        )
        .await?;
        if !exists {
            with_cancel(
                cancel,
                "collection",
                self.store.create_collection(collection, dimension),
            )
            .await?;
            tracing::info!("Created collection {} (dim={})", collection, dimension);
        }

        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry::new(chunk, embedding))
            .collect();
        let count = entries.len();

        let upserted = with_cancel(
            cancel,
            "upsert",
            self.store.upsert_batch(collection, &entries),
        )
        .await;
        if let Err(e) = upserted {
            return Err(if exists {
                e
            } else {
                RagError::PartiallyIndexed {
                    collection: collection.to_string(),
                    source: Box::new(e),
                }
            });
        }

        tracing::info!(
            "Indexed {} chunks of {} into {} via {}",
            count,
            document_id,
            collection,
            self.store.name()
        );

        Ok(IndexReport {
            document_id: document_id.to_string(),
            collection: collection.to_string(),
            chunks: count,
            dimension,
            created_collection: !exists,
        })
    }

    // ------------------------------------------------------------------------
    // Querying
    // ------------------------------------------------------------------------

    /// 질의 임베딩 + 검색만 수행 (생성 없음)
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
        filter: &SearchFilter,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding =
            with_cancel(cancel, "embedding", self.embedder.embed_query(query)).await?;

        let results = with_cancel(
            cancel,
            "search",
            self.store.search_with_filter(
                collection,
                &query_embedding,
                filter,
                options.top_k,
                options.threshold,
            ),
        )
        .await?;

        tracing::info!(
            "Retrieved {} results from {} (top_k={}, threshold={}, filters={})",
            results.len(),
            collection,
            options.top_k,
            options.threshold,
            filter.len()
        );
        Ok(results)
    }

    /// 질의 → 답변
    pub async fn query(
        &self,
        collection: &str,
        query: &str,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.answer(collection, query, &SearchFilter::default(), options, cancel)
            .await
            .map(|a| a.answer)
    }

    /// 메타데이터 필터(AND)를 적용한 질의 → 답변
    pub async fn query_with_filter(
        &self,
        collection: &str,
        query: &str,
        filter: &SearchFilter,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.answer(collection, query, filter, options, cancel)
            .await
            .map(|a| a.answer)
    }

    /// 질의 → 답변 + 근거
    ///
    /// 결과가 없으면 생성기를 호출하지 않고 고정 메시지를 반환합니다.
    pub async fn answer(
        &self,
        collection: &str,
        query: &str,
        filter: &SearchFilter,
        options: &QueryOptions,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer> {
        let sources = self
            .retrieve(collection, query, filter, options, cancel)
            .await?;

        if sources.is_empty() {
            tracing::warn!("No relevant chunks found in {} for query", collection);
            let answer = if filter.is_empty() {
                NO_RESULTS_MESSAGE
            } else {
                NO_FILTERED_RESULTS_MESSAGE
            };
            return Ok(RagAnswer {
                answer: answer.to_string(),
                sources,
            });
        }

        let prompt = build_prompt(&build_context(&sources), query);
        let answer = with_cancel(cancel, "generation", self.generator.generate(&prompt)).await?;

        tracing::info!(
            "Generated answer with {} ({} context chunks)",
            self.generator.name(),
            sources.len()
        );
        Ok(RagAnswer { answer, sources })
    }
}

// ============================================================================
// Prompt Assembly
// ============================================================================

/// 검색 결과 → 컨텍스트 문자열 (주어진 순서 유지)
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("[Relevance: {:.2}]\n{}", r.score, r.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// 컨텍스트와 질문을 고정 지시문에 삽입
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "You are a helpful assistant. Answer the question using ONLY the provided context.\n\
         If the context doesn't contain the answer, say \"I don't have enough information.\"\n\
         \n\
         Context:\n\
         {context}\n\
         \n\
         Question: {query}\n\
         \n\
         Answer:"
    )
}

/// 게이트웨이 호출을 취소 토큰과 경합
async fn with_cancel<T>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    if cancel.is_cancelled() {
        return Err(RagError::Cancelled { stage });
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::warn!("Cancelled during {}", stage);
            Err(RagError::Cancelled { stage })
        }
        result = fut => result,
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Knowledge 모듈 - 청킹, 벡터 저장소, RAG 파이프라인
//!
//! - Chunker: 문단/문장/토큰/고정 길이 분할 (오버랩 지원)
//! - VectorStore: 메모리 / LanceDB / Qdrant(feature) 구현
//! - Pipeline: 인덱싱과 질의 오케스트레이션

mod chunker;
mod document;
mod lance;
mod memory;
mod pipeline;
#[cfg(feature = "qdrant")]
mod qdrant;
mod vector;

// Re-exports
pub use chunker::{ChunkingOptions, ChunkingStrategy, DocumentChunker};
pub use document::{
    chunk_id, point_id, Document, DocumentChunk, Metadata, MetadataValue, SearchResult,
};
pub use lance::LanceVectorStore;
pub use memory::InMemoryVectorStore;
pub use pipeline::{
    build_context, build_prompt, IndexReport, QueryOptions, RagAnswer, RagPipeline,
    NO_FILTERED_RESULTS_MESSAGE, NO_RESULTS_MESSAGE,
};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
pub use vector::{cosine_similarity, SearchFilter, VectorEntry, VectorStore};

//! docrag - 문서 RAG 파이프라인
//!
//! 문서를 청크로 나누고 임베딩하여 벡터 저장소에 넣은 뒤,
//! 질의와 가장 가까운 청크를 컨텍스트로 답변을 생성합니다.

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;

// Re-exports
pub use config::{build_pipeline, get_data_dir, Provider, RagSettings, VectorBackend};
pub use embedding::{EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding};
pub use error::{RagError, Result};
pub use extractor::{FileExtractor, TextExtractor};
pub use generation::{GeminiGenerator, OpenAiChat, TextGenerator};
pub use knowledge::{
    ChunkingOptions, ChunkingStrategy, Document, DocumentChunk, DocumentChunker,
    InMemoryVectorStore, IndexReport, LanceVectorStore, Metadata, MetadataValue, QueryOptions,
    RagAnswer, RagPipeline, SearchFilter, SearchResult, VectorEntry, VectorStore,
};

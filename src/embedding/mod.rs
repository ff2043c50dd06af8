//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 `EmbeddingProvider` 트레이트와 구현체입니다.
//! - `GeminiEmbedding`: Gemini embedContent API (rate limit + 429 재시도)
//! - `OpenAiEmbedding`: OpenAI 호환 `/embeddings` 엔드포인트 (OpenAI, Ollama)
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

pub mod gemini;
pub mod openai;
mod rate_limit;

pub use gemini::GeminiEmbedding;
pub use openai::OpenAiEmbedding;

use async_trait::async_trait;

use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 질의 임베딩 (기본 구현: `embed`)
    ///
    /// 질의와 문서를 다른 용도로 임베딩하는 프로바이더는 재정의합니다.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 결과는 입력 순서와 같아야 합니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// API Key Management
// ============================================================================

/// Gemini API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_gemini_api_key() -> Result<String> {
    first_env(&["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]).ok_or_else(|| {
        RagError::Config(
            "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
             Get your API key at: https://aistudio.google.com/app/apikey"
                .to_string(),
        )
    })
}

/// 비어 있지 않은 첫 번째 환경변수 값
pub(crate) fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .inspect(|_| tracing::debug!("Using API key from {}", name))
    })
}

// ============================================================================
// Tests
// ============================================================================

//! 에러 타입
//!
//! 라이브러리 전체에서 사용하는 `RagError`와 `Result` 별칭을 정의합니다.
//! CLI(바이너리)는 anyhow로 감싸서 사용합니다.

use std::path::PathBuf;

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 파일 또는 컬렉션이 존재하지 않음
    #[error("Not found: {0}")]
    NotFound(String),

    /// 지원하지 않는 파일 확장자 또는 청킹 전략
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// 임베딩 생성 실패 (0개 또는 개수 불일치 포함)
    #[error("Embedding error ({provider}): {message}")]
    Embedding { provider: String, message: String },

    /// 잘못된 상태 (0 차원 벡터, 잘못된 옵션 등)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 벡터 저장소 실패
    #[error("Vector store error ({backend}): {message}")]
    Store { backend: String, message: String },

    /// 텍스트 생성 실패
    #[error("Generation error ({provider}): {message}")]
    Generation { provider: String, message: String },

    /// 파일 텍스트 추출 실패 (추출기 내부에서만 사용, 외부로는 빈 텍스트)
    #[error("Extraction failed for {path:?}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),

    /// 취소 토큰에 의해 중단됨
    #[error("Operation cancelled during {stage}")]
    Cancelled { stage: &'static str },

    /// 이번 호출에서 컬렉션을 만든 뒤 이후 단계가 실패함 (롤백 없음)
    #[error("Collection '{collection}' was created but indexing failed: {source}")]
    PartiallyIndexed {
        collection: String,
        #[source]
        source: Box<RagError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub(crate) fn store(backend: &str, message: impl std::fmt::Display) -> Self {
        Self::Store {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn embedding(provider: &str, message: impl std::fmt::Display) -> Self {
        Self::Embedding {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn generation(provider: &str, message: impl std::fmt::Display) -> Self {
        Self::Generation {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// 원인 에러 (PartiallyIndexed는 내부 에러를 반환)
    pub fn root(&self) -> &RagError {
        match self {
            Self::PartiallyIndexed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// RAG 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;

//! 설정 모듈
//!
//! 기본값은 로컬 Ollama(OpenAI 호환 엔드포인트) + LanceDB 입니다.
//! `RagSettings::from_env()`가 `DOCRAG_*` 환경변수로 덮어씁니다.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding};
use crate::error::{RagError, Result};
use crate::generation::{GeminiGenerator, OpenAiChat, TextGenerator};
use crate::knowledge::{InMemoryVectorStore, LanceVectorStore, RagPipeline, VectorStore};

/// Ollama 기본 엔드포인트 (OpenAI 호환)
pub const OLLAMA_ENDPOINT: &str = "http://localhost:11434/v1";

/// Qdrant 기본 gRPC URL
pub const QDRANT_URL: &str = "http://localhost:6334";

/// Ollama는 키를 검사하지 않지만 Authorization 헤더는 필요
const PLACEHOLDER_API_KEY: &str = "apikey";

/// 데이터 디렉토리 경로 (`<data_local_dir>/.docrag`)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docrag")
}

// ============================================================================
// Provider / Backend
// ============================================================================

/// 모델 프로바이더
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ollama,
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }

    fn default_endpoint(&self) -> &'static str {
        match self {
            Self::Ollama => OLLAMA_ENDPOINT,
            Self::OpenAi => crate::embedding::openai::OPENAI_ENDPOINT,
            Self::Gemini => crate::embedding::gemini::GEMINI_API_BASE,
        }
    }

    fn default_embedding_model(&self) -> &'static str {
        match self {
            Self::Ollama => "nomic-embed-text",
            Self::OpenAi => "text-embedding-3-small",
            Self::Gemini => crate::embedding::gemini::DEFAULT_MODEL,
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Ollama => "llama3",
            Self::OpenAi => "gpt-4o-mini",
            Self::Gemini => crate::generation::gemini::DEFAULT_MODEL,
        }
    }

    /// `DOCRAG_API_KEY`가 없을 때 확인하는 환경변수
    fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Ollama => &["OPENAI_API_KEY"],
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"],
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(RagError::Config(format!(
                "Unknown provider '{}'. Use ollama, openai, or gemini",
                other
            ))),
        }
    }
}

/// 벡터 저장소 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Memory,
    Lance,
    Qdrant,
}

impl VectorBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Lance => "lance",
            Self::Qdrant => "qdrant",
        }
    }
}

impl fmt::Display for VectorBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VectorBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "inmemory" => Ok(Self::Memory),
            "lance" | "lancedb" => Ok(Self::Lance),
            "qdrant" => Ok(Self::Qdrant),
            other => Err(RagError::Config(format!(
                "Unknown vector backend '{}'. Use memory, lance, or qdrant",
                other
            ))),
        }
    }
}

// ============================================================================
// RagSettings
// ============================================================================

/// 런타임 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSettings {
    pub provider: Provider,
    /// OpenAI 호환 베이스 URL (Gemini는 사용하지 않음)
    pub endpoint: String,
    pub embedding_model: String,
    pub chat_model: String,
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub vector_backend: VectorBackend,
    pub data_dir: PathBuf,
    pub qdrant_url: String,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self::for_provider(Provider::Ollama)
    }
}

impl RagSettings {
    /// 프로바이더 기본값으로 생성
    pub fn for_provider(provider: Provider) -> Self {
        Self {
            provider,
            endpoint: provider.default_endpoint().to_string(),
            embedding_model: provider.default_embedding_model().to_string(),
            chat_model: provider.default_chat_model().to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            vector_backend: VectorBackend::Lance,
            data_dir: get_data_dir(),
            qdrant_url: QDRANT_URL.to_string(),
        }
    }

    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.trim().is_empty())
        })
    }

    /// 이름 → 값 조회 함수로 설정 구성
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let provider = match lookup("DOCRAG_PROVIDER") {
            Some(value) => value.parse()?,
            None => Provider::Ollama,
        };

        let mut settings = Self::for_provider(provider);

        if let Some(endpoint) = lookup("DOCRAG_ENDPOINT") {
            settings.endpoint = endpoint;
        }
        if let Some(model) = lookup("DOCRAG_EMBEDDING_MODEL") {
            settings.embedding_model = model;
        }
        if let Some(model) = lookup("DOCRAG_CHAT_MODEL") {
            settings.chat_model = model;
        }
        if let Some(key) = lookup("DOCRAG_API_KEY")
            .or_else(|| provider.api_key_vars().iter().find_map(|name| lookup(name)))
        {
            settings.api_key = key;
        }
        if let Some(backend) = lookup("DOCRAG_VECTOR_BACKEND") {
            settings.vector_backend = backend.parse()?;
        }
        if let Some(dir) = lookup("DOCRAG_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("DOCRAG_QDRANT_URL") {
            settings.qdrant_url = url;
        }

        tracing::debug!(
            "Loaded settings: provider={}, backend={}, data_dir={:?}",
            settings.provider,
            settings.vector_backend,
            settings.data_dir
        );
        Ok(settings)
    }

    /// 실제 API 키가 설정되었는지 (Ollama는 항상 true)
    pub fn has_api_key(&self) -> bool {
        self.provider == Provider::Ollama || self.api_key != PLACEHOLDER_API_KEY
    }

    /// LanceDB 디렉토리
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    fn require_api_key(&self) -> Result<()> {
        if self.has_api_key() {
            return Ok(());
        }
        let vars = self.provider.api_key_vars().join(" or ");
        Err(RagError::Config(format!(
            "API key not set for provider {}. Set DOCRAG_API_KEY or {}",
            self.provider, vars
        )))
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 임베딩 프로바이더 생성
pub fn create_embedder(settings: &RagSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    settings.require_api_key()?;
    let embedder: Arc<dyn EmbeddingProvider> = match settings.provider {
        Provider::Gemini => Arc::new(
            GeminiEmbedding::new(settings.api_key.clone())?.with_model(&settings.embedding_model),
        ),
        Provider::Ollama | Provider::OpenAi => Arc::new(OpenAiEmbedding::new(
            &settings.endpoint,
            &settings.api_key,
            &settings.embedding_model,
        )?),
    };
    tracing::info!(
        "Using {} embedding {} (dimension: {})",
        settings.provider,
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

/// 텍스트 생성기 생성
pub fn create_generator(settings: &RagSettings) -> Result<Arc<dyn TextGenerator>> {
    settings.require_api_key()?;
    let generator: Arc<dyn TextGenerator> = match settings.provider {
        Provider::Gemini => Arc::new(GeminiGenerator::new(
            settings.api_key.clone(),
            &settings.chat_model,
        )?),
        Provider::Ollama | Provider::OpenAi => Arc::new(OpenAiChat::new(
            &settings.endpoint,
            &settings.api_key,
            &settings.chat_model,
        )?),
    };
    Ok(generator)
}

/// 벡터 저장소 생성
pub async fn create_vector_store(settings: &RagSettings) -> Result<Arc<dyn VectorStore>> {
    match settings.vector_backend {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        VectorBackend::Lance => Ok(Arc::new(
            LanceVectorStore::open(&settings.lance_path()).await?,
        )),
        #[cfg(feature = "qdrant")]
        VectorBackend::Qdrant => {
            let api_key = crate::embedding::first_env(&["QDRANT_API_KEY"]);
            Ok(Arc::new(crate::knowledge::QdrantVectorStore::new(
                &settings.qdrant_url,
                api_key.as_deref(),
            )?))
        }
        #[cfg(not(feature = "qdrant"))]
        VectorBackend::Qdrant => Err(RagError::Config(
            "Qdrant backend requires building with the `qdrant` feature".to_string(),
        )),
    }
}

/// 설정으로 전체 파이프라인 구성
pub async fn build_pipeline(settings: &RagSettings) -> Result<RagPipeline> {
    let embedder = create_embedder(settings)?;
    let generator = create_generator(settings)?;
    let store = create_vector_store(settings).await?;
    Ok(RagPipeline::new(embedder, generator, store))
}

// ============================================================================
// Tests
// ============================================================================

//! OpenAI 호환 임베딩 (`POST {endpoint}/embeddings`)
//!
//! OpenAI와 Ollama(`http://localhost:11434/v1`) 모두 같은 요청 형식을 사용합니다.
//! 한 번의 요청으로 배치 전체를 임베딩합니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::error::{RagError, Result};

/// OpenAI API 기본 엔드포인트
pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "openai";

/// 모델 이름으로 알려진 기본 차원 추정
fn known_dimension(model: &str) -> usize {
    match model {
        "nomic-embed-text" => 768,
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 768,
    }
}

/// OpenAI 호환 임베딩 구현체
#[derive(Debug, Clone)]
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    /// 설정 시 API에 `dimensions`로 전달 (MRL 축소)
    request_dimension: Option<usize>,
}

impl OpenAiEmbedding {
    /// 엔드포인트 / API 키 / 모델로 생성
    ///
    /// # Arguments
    /// * `endpoint` - `/embeddings` 앞까지의 베이스 URL (예: `http://localhost:11434/v1`)
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("API key must not be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                RagError::embedding(PROVIDER, format!("Failed to create HTTP client: {}", e))
            })?;

        let model = model.into();
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            dimension: known_dimension(&model),
            model,
            request_dimension: None,
        })
    }

    /// 출력 차원 지정 (API에도 전달)
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self.request_dimension = Some(dimension);
        self
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.endpoint)
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    pub message: String,
}

/// 응답 본문 → 입력 순서의 벡터 (개수 검증 포함)
fn parse_embeddings(body: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| RagError::embedding(PROVIDER, format!("Failed to parse response: {}", e)))?;

    if response.data.len() != expected {
        return Err(RagError::embedding(
            PROVIDER,
            format!(
                "Expected {} embeddings but received {}",
                expected,
                response.data.len()
            ),
        ));
    }

    response.data.sort_by_key(|d| d.index);
    Ok(response.data.into_iter().map(|d| d.embedding).collect())
}

/// 에러 응답 본문 → 메시지
pub(crate) fn describe_openai_error(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    format!("API returned {}: {}", status, detail)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(
            "Embedding {} texts with {} via {}",
            texts.len(),
            self.model,
            self.endpoint
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimension,
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::embedding(PROVIDER, format!("Request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            RagError::embedding(PROVIDER, format!("Failed to read response body: {}", e))
        })?;

        if !status.is_success() {
            tracing::error!("Embedding API error ({})", status);
            return Err(RagError::embedding(
                PROVIDER,
                describe_openai_error(status, &body),
            ));
        }

        parse_embeddings(&body, texts.len())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

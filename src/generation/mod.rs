//! 생성 모듈 - 프롬프트 → 답변 텍스트
//!
//! - `GeminiGenerator`: Gemini generateContent API
//! - `OpenAiChat`: OpenAI 호환 `/chat/completions` (OpenAI, Ollama)

pub mod gemini;
pub mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiChat;

use async_trait::async_trait;

use crate::error::Result;

/// 기본 생성 온도
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// 기본 최대 출력 토큰
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// 텍스트 생성기 트레이트
///
/// 프롬프트 하나를 받아 모델 출력을 그대로 반환합니다.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 생성기 이름 (로그용)
    fn name(&self) -> &str;
}

//! 콘텐츠 추출 모듈
//!
//! 파일 확장자에 따라 평문 텍스트를 추출합니다.
//! - 텍스트 파일 (txt, md, json): 직접 읽기
//! - PDF 파일: pdf-extract로 텍스트 추출
//! - DOCX 파일: zip 아카이브의 word/document.xml에서 텍스트 추출
//!
//! PDF/DOCX 추출 실패는 경고 로그를 남기고 빈 문자열을 반환합니다.

pub mod docx;
pub mod pdf;

use std::path::Path;

use async_trait::async_trait;

use crate::collector::FileType;
use crate::error::{RagError, Result};

// ============================================================================
// TextExtractor Trait
// ============================================================================

/// 텍스트 추출기 트레이트
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// 파일에서 평문 텍스트 추출
    ///
    /// 지원하지 않는 확장자는 `NotSupported`, 읽기 실패는 `Io`로 실패합니다.
    /// 포맷별 파싱 실패는 빈 문자열로 처리됩니다.
    async fn extract(&self, path: &Path) -> Result<String>;
}

// ============================================================================
// FileExtractor
// ============================================================================

/// 확장자 기반 기본 추출기
#[derive(Debug, Default, Clone)]
pub struct FileExtractor;

impl FileExtractor {
    /// 텍스트 파일 읽기
    async fn extract_text(&self, path: &Path) -> Result<String> {
        Ok(tokio::fs::read_to_string(path).await?)
    }

    /// PDF 파일에서 추출 (CPU 바운드이므로 spawn_blocking 사용)
    async fn extract_pdf(&self, path: &Path) -> String {
        let owned = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
            .await
            .map_err(|e| RagError::Extraction {
                path: path.to_path_buf(),
                message: format!("PDF extraction task failed: {}", e),
            })
            .and_then(|r| r);

        match result {
            Ok(pages) => pages
                .into_iter()
                .map(|(_, text)| text)
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(e) => {
                tracing::warn!("Failed to extract PDF text from {:?}: {}", path, e);
                String::new()
            }
        }
    }

    /// DOCX 파일에서 추출
    async fn extract_docx(&self, path: &Path) -> String {
        let owned = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || docx::extract_text_from_docx(&owned))
            .await
            .map_err(|e| RagError::Extraction {
                path: path.to_path_buf(),
                message: format!("DOCX extraction task failed: {}", e),
            })
            .and_then(|r| r);

        match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to extract DOCX text from {:?}: {}", path, e);
                String::new()
            }
        }
    }
}

#[async_trait]
impl TextExtractor for FileExtractor {
    async fn extract(&self, path: &Path) -> Result<String> {
        let file_type = FileType::from_path(path).ok_or_else(|| {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            RagError::NotSupported(format!("File type .{} not supported", ext))
        })?;

        match file_type {
            FileType::Text => self.extract_text(path).await,
            FileType::Pdf => Ok(self.extract_pdf(path).await),
            FileType::Docx => Ok(self.extract_docx(path).await),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

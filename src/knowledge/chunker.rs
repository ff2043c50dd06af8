//! Text Chunking Module
//!
//! 문서를 검색 가능한 크기의 청크로 분할합니다.
//!
//! - Paragraph: 빈 줄 경계로 문단 누적 (긴 문단은 문장 단위로 재분할)
//! - Sentence: 문장 누적 (긴 문장은 단어 단위로 재분할)
//! - Token: 단어 수 기반 슬라이딩 윈도우
//! - Fixed: 문자 수 기반 슬라이딩 윈도우
//!
//! 오버랩은 전략과 관계없이 항상 직전 청크의 마지막 N개 **단어**입니다.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::document::{Document, DocumentChunk, MetadataValue};
use crate::error::{RagError, Result};
use crate::extractor::{FileExtractor, TextExtractor};

/// 문단 경계 (빈 줄)
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("Invalid regex"));

/// 문장 끝 (마침표/느낌표/물음표 + 공백)
static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("Invalid regex"));

// ============================================================================
// Chunking Options
// ============================================================================

/// 청킹 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// 문단 우선, 크기 초과 시 문장 단위 (문자 수 기준)
    #[default]
    Paragraph,
    /// 문장 단위 (문자 수 기준)
    Sentence,
    /// 단어 수 기준 윈도우
    Token,
    /// 임베딩 기반 경계 탐지 - 구현하지 않음 (NotSupported)
    Semantic,
    /// 문자 수 기준 고정 윈도우
    Fixed,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Sentence => "sentence",
            Self::Token => "token",
            Self::Semantic => "semantic",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "paragraph" => Ok(Self::Paragraph),
            "sentence" => Ok(Self::Sentence),
            "token" => Ok(Self::Token),
            "semantic" => Ok(Self::Semantic),
            "fixed" => Ok(Self::Fixed),
            other => Err(RagError::Config(format!("Unknown chunking strategy: {}", other))),
        }
    }
}

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingOptions {
    /// 목표 청크 크기 (Token: 단어 수, 그 외: 문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (Token/Fixed 윈도우 이동량 계산에도 사용)
    pub overlap: usize,
    pub strategy: ChunkingStrategy,
    /// chunk_size / word_count / strategy / document_id 메타데이터 첨부 여부
    pub include_metadata: bool,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
            strategy: ChunkingStrategy::Paragraph,
            include_metadata: true,
        }
    }
}

impl ChunkingOptions {
    pub fn new(chunk_size: usize, overlap: usize, strategy: ChunkingStrategy) -> Self {
        Self {
            chunk_size,
            overlap,
            strategy,
            include_metadata: true,
        }
    }

    /// 윈도우가 최소 1 이상 전진하도록 보정된 오버랩
    pub fn effective_overlap(&self) -> usize {
        self.overlap.min(self.chunk_size.saturating_sub(1))
    }

    /// 옵션 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidState(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.strategy == ChunkingStrategy::Semantic {
            return Err(RagError::NotSupported(
                "semantic chunking strategy is not implemented".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// DocumentChunker
// ============================================================================

/// 문서 청커
///
/// 텍스트 분할 자체는 순수 함수이며, 파일 청킹만 텍스트 추출기를 사용합니다.
#[derive(Clone)]
pub struct DocumentChunker {
    extractor: Arc<dyn TextExtractor>,
}

impl Default for DocumentChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentChunker {
    /// 기본 파일 추출기로 생성
    pub fn new() -> Self {
        Self::with_extractor(Arc::new(FileExtractor::default()))
    }

    /// 추출기 지정
    pub fn with_extractor(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }

    /// 텍스트를 청크로 분할
    ///
    /// 빈 텍스트는 0개의 청크를 반환합니다. `document_id`가 없으면
    /// 임의의 UUID를 ID 시드로 사용합니다.
    ///
    /// # Errors
    /// 옵션이 잘못된 경우에만 실패합니다 (Semantic 전략, chunk_size 0).
    pub fn chunk_text(
        &self,
        text: &str,
        document_id: Option<&str>,
        options: &ChunkingOptions,
    ) -> Result<Vec<DocumentChunk>> {
        options.validate()?;

        let document_id = document_id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if options.effective_overlap() != options.overlap {
            tracing::warn!(
                "Overlap {} >= chunk size {}, clamped to {}",
                options.overlap,
                options.chunk_size,
                options.effective_overlap()
            );
        }

        tracing::debug!(
            "Chunking text of length {} with strategy {}",
            text.len(),
            options.strategy
        );

        let size = options.chunk_size;
        let overlap = options.effective_overlap();

        let pieces = match options.strategy {
            ChunkingStrategy::Paragraph => chunk_by_paragraph(text, size, overlap),
            ChunkingStrategy::Sentence => chunk_by_sentence(text, size, overlap),
            ChunkingStrategy::Token => chunk_by_token(text, size, overlap),
            ChunkingStrategy::Fixed => chunk_by_fixed_size(text, size, overlap),
            ChunkingStrategy::Semantic => {
                return Err(RagError::NotSupported(
                    "semantic chunking strategy is not implemented".to_string(),
                ))
            }
        };

        let chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .filter(|piece| !piece.trim().is_empty())
            .enumerate()
            .map(|(index, piece)| {
                let mut chunk = DocumentChunk::new(&document_id, index, piece);
                if options.include_metadata {
                    let meta = &mut chunk.metadata;
                    meta.insert("chunk_size".into(), char_len(&chunk.text).into());
                    meta.insert("word_count".into(), count_words(&chunk.text).into());
                    meta.insert("strategy".into(), options.strategy.as_str().into());
                    meta.insert("document_id".into(), document_id.as_str().into());
                }
                chunk
            })
            .collect();

        tracing::debug!("Created {} chunks for {}", chunks.len(), document_id);
        Ok(chunks)
    }

    /// 문서를 청크로 분할 (문서 메타데이터는 `doc_` 접두사로 첨부)
    pub fn chunk_document(
        &self,
        document: &Document,
        options: &ChunkingOptions,
    ) -> Result<Vec<DocumentChunk>> {
        let mut chunks = self.chunk_text(&document.content, Some(&document.id), options)?;

        for chunk in &mut chunks {
            chunk
                .metadata
                .insert("title".into(), document.title.as_str().into());
            chunk
                .metadata
                .insert("content_type".into(), document.content_type.as_str().into());

            for (key, value) in &document.metadata {
                chunk.metadata.insert(format!("doc_{}", key), value.clone());
            }
        }

        Ok(chunks)
    }

    /// 파일을 청크로 분할 (청크 ID는 파일 이름 기준)
    ///
    /// # Errors
    /// - 파일이 없으면 `NotFound`
    /// - 지원하지 않는 확장자면 `NotSupported`
    pub async fn chunk_file(
        &self,
        path: &Path,
        options: &ChunkingOptions,
    ) -> Result<Vec<DocumentChunk>> {
        self.chunk_file_as(path, &file_name_of(path), options).await
    }

    /// 파일을 청크로 분할하되 청크 ID 시드를 직접 지정
    ///
    /// 폴더 인덱싱처럼 같은 이름의 파일이 여러 개일 수 있을 때 상대 경로를 넘깁니다.
    /// `filename` 메타데이터는 항상 실제 파일 이름입니다.
    pub async fn chunk_file_as(
        &self,
        path: &Path,
        document_id: &str,
        options: &ChunkingOptions,
    ) -> Result<Vec<DocumentChunk>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(RagError::NotFound(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let file_name = file_name_of(path);
        let extension = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        let content = self.extractor.extract(path).await?;
        let file_size = tokio::fs::metadata(path).await?.len();

        let mut chunks = self.chunk_text(&content, Some(document_id), options)?;

        for chunk in &mut chunks {
            chunk
                .metadata
                .insert("filename".into(), file_name.as_str().into());
            chunk
                .metadata
                .insert("filetype".into(), extension.as_str().into());
            chunk
                .metadata
                .insert("filesize".into(), MetadataValue::from(file_size));
        }

        tracing::info!("Chunked file {} into {} chunks", document_id, chunks.len());
        Ok(chunks)
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// Strategies
// ============================================================================

/// 문단 단위 청킹 (문자 수 기준)
fn chunk_by_paragraph(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_size = 0;

    for para in split_paragraphs(text) {
        let para_size = char_len(para);

        // 문단 자체가 최대 크기 초과 → 문장 단위로 재분할
        if para_size > chunk_size {
            flush(&mut chunks, &mut current);
            current_size = 0;
            chunks.extend(chunk_by_sentence(para, chunk_size, overlap));
            continue;
        }

        if current_size + para_size > chunk_size && !current.trim().is_empty() {
            let closed = std::mem::take(&mut current);
            current = overlap_seed(&closed, overlap);
            current_size = char_len(&current);
            chunks.push(closed.trim().to_string());
        }

        current.push_str(para);
        current.push_str("\n\n");
        current_size += para_size + 2;
    }

    flush(&mut chunks, &mut current);
    chunks
}

/// 문장 단위 청킹 (문자 수 기준)
fn chunk_by_sentence(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_size = 0;

    for sentence in split_sentences(text) {
        let sentence_size = char_len(sentence);

        // 문장이 너무 길면 단어 단위로 분할 (오버랩 없음)
        if sentence_size > chunk_size {
            flush(&mut chunks, &mut current);
            current_size = 0;
            chunks.extend(split_words(sentence, chunk_size));
            continue;
        }

        if current_size + sentence_size > chunk_size && !current.trim().is_empty() {
            let closed = std::mem::take(&mut current);
            current = overlap_seed(&closed, overlap);
            current_size = char_len(&current);
            chunks.push(closed.trim().to_string());
        }

        current.push_str(sentence);
        current.push(' ');
        current_size += sentence_size + 1;
    }

    flush(&mut chunks, &mut current);
    chunks
}

/// 단어 수 기준 슬라이딩 윈도우
fn chunk_by_token(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return vec![];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end >= words.len() {
            break;
        }

        start += step;
    }

    chunks
}

/// 문자 수 기준 고정 윈도우 (UTF-8 안전)
fn chunk_by_fixed_size(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    // 문자 경계 바이트 오프셋 (마지막은 text.len())
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < char_count {
        let end = (start + chunk_size).min(char_count);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());

        if end >= char_count {
            break;
        }

        start += step;
    }

    chunks
}

// ============================================================================
// Helper Functions
// ============================================================================

fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for m in SENTENCE_END.find_iter(text) {
        // 구두점은 ASCII 1바이트
        let sentence = text[start..m.start() + 1].trim();
        if !sentence.is_empty() {
            sentences.push(sentence);
        }
        start = m.end();
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

/// 단어 누적 분할 (innermost level, 오버랩 없음)
fn split_words(sentence: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    let mut size = 0;

    for word in sentence.split_whitespace() {
        let word_size = char_len(word);
        if size + word_size + 1 > chunk_size && !words.is_empty() {
            chunks.push(words.join(" "));
            words.clear();
            size = 0;
        }
        words.push(word);
        size += word_size + 1;
    }

    if !words.is_empty() {
        chunks.push(words.join(" "));
    }

    chunks
}

/// 직전 청크의 마지막 `overlap`개 단어
fn overlap_tail(text: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(overlap);
    words[start..].join(" ")
}

/// 다음 청크의 시작 부분 (오버랩 + 구분 공백)
fn overlap_seed(closed: &str, overlap: usize) -> String {
    let tail = overlap_tail(closed, overlap);
    if tail.is_empty() {
        tail
    } else {
        tail + " "
    }
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let text = std::mem::take(current);
    if !text.trim().is_empty() {
        chunks.push(text.trim().to_string());
    }
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

// ============================================================================
// Tests
// ============================================================================

//! 문서 / 청크 / 검색 결과 타입
//!
//! 메타데이터는 문자열 키와 닫힌 값 집합(문자열, 숫자, 타임스탬프)으로 표현합니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ============================================================================
// Metadata
// ============================================================================

/// 메타데이터 값
///
/// JSON으로는 untagged 직렬화됩니다. 역직렬화 시 숫자 → RFC 3339 타임스탬프 →
/// 문자열 순으로 시도합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl MetadataValue {
    /// 필터 비교: 표시 문자열이 같으면 일치 (`"2024"` == `2024`)
    pub fn matches(&self, other: &MetadataValue) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            (Self::Timestamp(t), Self::String(s)) | (Self::String(s), Self::Timestamp(t)) => {
                DateTime::parse_from_rfc3339(s)
                    .map(|parsed| parsed == *t)
                    .unwrap_or(false)
            }
            _ => self.to_string() == other.to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            Self::Number(n) => write!(f, "{}", n),
            Self::Timestamp(t) => f.write_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u64> for MetadataValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<DateTime<Utc>> for MetadataValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// 메타데이터 맵 (키 정렬 유지)
pub type Metadata = BTreeMap<String, MetadataValue>;

/// 저장소 컬럼용 태그 표현
///
/// untagged JSON은 날짜처럼 보이는 문자열을 `Timestamp`로 되읽으므로
/// 저장할 때는 `{"string": ...}` 형태로 타입을 함께 기록합니다.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StoredValue {
    String(String),
    Number(f64),
    Timestamp(DateTime<Utc>),
}

impl From<&MetadataValue> for StoredValue {
    fn from(value: &MetadataValue) -> Self {
        match value {
            MetadataValue::String(s) => Self::String(s.clone()),
            MetadataValue::Number(n) => Self::Number(*n),
            MetadataValue::Timestamp(t) => Self::Timestamp(*t),
        }
    }
}

impl From<StoredValue> for MetadataValue {
    fn from(value: StoredValue) -> Self {
        match value {
            StoredValue::String(s) => Self::String(s),
            StoredValue::Number(n) => Self::Number(n),
            StoredValue::Timestamp(t) => Self::Timestamp(t),
        }
    }
}

/// 메타데이터 → 타입 태그가 붙은 JSON 문자열
pub(crate) fn metadata_to_json(metadata: &Metadata) -> serde_json::Result<String> {
    let stored: BTreeMap<&str, StoredValue> = metadata
        .iter()
        .map(|(k, v)| (k.as_str(), StoredValue::from(v)))
        .collect();
    serde_json::to_string(&stored)
}

/// `metadata_to_json`의 역변환
pub(crate) fn metadata_from_json(json: &str) -> serde_json::Result<Metadata> {
    let stored: BTreeMap<String, StoredValue> = serde_json::from_str(json)?;
    Ok(stored.into_iter().map(|(k, v)| (k, v.into())).collect())
}

// ============================================================================
// Document
// ============================================================================

/// 원본 문서
///
/// 호출자가 소유하며 파이프라인은 수정하지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub content: String,
    pub content_type: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// 새 문서 생성 (content_type = text/plain)
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            content_type: "text/plain".to_string(),
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// 메타데이터 항목 추가
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

// ============================================================================
// DocumentChunk
// ============================================================================

/// 문서 청크
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// `{document_id}_{index}`
    pub id: String,
    pub document_id: String,
    pub text: String,
    /// 문서 내 0-based 순서
    pub index: usize,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub(crate) fn new(document_id: &str, index: usize, text: String) -> Self {
        Self {
            id: chunk_id(document_id, index),
            document_id: document_id.to_string(),
            text,
            index,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    /// UUID 형식의 포인트 ID (Qdrant 등 UUID가 필요한 저장소용)
    pub fn point_id(&self) -> Uuid {
        point_id(&self.id)
    }
}

/// 청크 ID 생성 - 같은 문서, 같은 인덱스면 항상 같은 ID
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}_{}", document_id, index)
}

/// 청크 ID의 SHA-256 앞 16바이트로 만든 결정적 UUID
pub fn point_id(chunk_id: &str) -> Uuid {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

// ============================================================================
// SearchResult
// ============================================================================

/// 벡터 검색 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// 청크 ID
    pub id: String,
    pub document_id: String,
    pub text: String,
    pub index: usize,
    /// 코사인 유사도 (-1.0 ~ 1.0, 높을수록 관련)
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_id_deterministic() {
        assert_eq!(chunk_id("krones-doc-1", 3), "krones-doc-1_3");
        assert_eq!(point_id("krones-doc-1_3"), point_id("krones-doc-1_3"));
        assert_ne!(point_id("krones-doc-1_3"), point_id("krones-doc-1_4"));
    }

    #[test]
    fn test_metadata_value_display() {
        assert_eq!(MetadataValue::from(42usize).to_string(), "42");
        assert_eq!(MetadataValue::from(0.5).to_string(), "0.5");
        assert_eq!(MetadataValue::from("Packaging").to_string(), "Packaging");
    }

    #[test]
    fn test_metadata_value_matches_across_kinds() {
        let year = MetadataValue::from("2024");
        assert!(year.matches(&MetadataValue::from(2024i64)));
        assert!(!year.matches(&MetadataValue::from("2023")));
    }

    #[test]
    fn test_metadata_value_json_roundtrip_kinds() {
        let json = serde_json::json!({
            "category": "Packaging",
            "filesize": 1024,
            "indexed": "2024-05-01T12:00:00Z"
        });
        let meta: Metadata = serde_json::from_value(json).unwrap();
        assert!(matches!(meta["category"], MetadataValue::String(_)));
        assert!(matches!(meta["filesize"], MetadataValue::Number(_)));
        assert!(matches!(meta["indexed"], MetadataValue::Timestamp(_)));
    }

    #[test]
    fn test_timestamp_display_and_string_match() {
        let published: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
        let value = MetadataValue::from(published);
        assert_eq!(value.to_string(), "2024-05-01T12:00:00Z");
        assert!(value.matches(&MetadataValue::from("2024-05-01T12:00:00Z")));
        assert!(value.matches(&MetadataValue::from("2024-05-01T14:00:00+02:00")));
        assert!(!value.matches(&MetadataValue::from("2024-05-02T12:00:00Z")));
    }

    #[test]
    fn test_stored_metadata_keeps_kinds() {
        let mut meta = Metadata::new();
        meta.insert("doc_published".into(), "2024-05-01T12:00:00Z".into());
        meta.insert("filesize".into(), 1024usize.into());
        meta.insert(
            "indexed".into(),
            "2024-06-01T08:30:00Z".parse::<DateTime<Utc>>().unwrap().into(),
        );

        let json = metadata_to_json(&meta).unwrap();
        let restored = metadata_from_json(&json).unwrap();

        assert_eq!(restored, meta);
        assert!(matches!(restored["doc_published"], MetadataValue::String(_)));
        assert!(matches!(restored["indexed"], MetadataValue::Timestamp(_)));
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new("d1", "Title", "Body").with_metadata("category", "CNC");
        assert_eq!(doc.content_type, "text/plain");
        assert_eq!(doc.metadata["category"].as_str(), Some("CNC"));
    }
}

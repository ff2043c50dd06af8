//! DOCX 텍스트 추출 모듈
//!
//! DOCX는 zip 아카이브이며 본문은 `word/document.xml`에 있습니다.
//! 문단(`</w:p>`)은 빈 줄로, 탭/줄바꿈 요소는 공백 문자로 바꾼 뒤 태그를 제거합니다.

use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{RagError, Result};

static PARAGRAPH_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</w:p>").expect("Invalid regex"));
static TAB: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<w:tab\s*/>").expect("Invalid regex"));
static BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<w:(?:br|cr)\s*/>").expect("Invalid regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("Invalid regex"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(?:#x([0-9A-Fa-f]+)|#([0-9]+)|(lt|gt|quot|apos|amp));").expect("Invalid regex")
});

/// DOCX 파일에서 텍스트 추출
pub fn extract_text_from_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let extraction_err = |message: String| RagError::Extraction {
        path: path.to_path_buf(),
        message,
    };

    let mut archive = zip::ZipArchive::new(file).map_err(|e| extraction_err(e.to_string()))?;
    let mut entry = archive
        .by_name("word/document.xml")
        .map_err(|e| extraction_err(format!("word/document.xml: {}", e)))?;

    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;

    Ok(document_xml_to_text(&xml))
}

/// document.xml → 평문
fn document_xml_to_text(xml: &str) -> String {
    let text = PARAGRAPH_END.replace_all(xml, "\n\n");
    let text = TAB.replace_all(&text, "\t");
    let text = BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");

    unescape_xml(&text).trim().to_string()
}

/// XML 엔티티 디코딩 (이름 엔티티 + `&#NNN;` / `&#xHH;` 문자 참조)
///
/// 한 번에 치환하므로 `&amp;lt;`는 `&lt;`로 남습니다.
/// 유효하지 않은 코드 포인트는 원문 그대로 둡니다.
fn unescape_xml(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let code_point = if let Some(hex) = caps.get(1) {
                u32::from_str_radix(hex.as_str(), 16).ok()
            } else if let Some(dec) = caps.get(2) {
                dec.as_str().parse::<u32>().ok()
            } else {
                let named = match caps.get(3).map(|m| m.as_str()) {
                    Some("lt") => "<",
                    Some("gt") => ">",
                    Some("quot") => "\"",
                    Some("apos") => "'",
                    _ => "&",
                };
                return named.to_string();
            };

            code_point
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_xml_to_text() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Fanuc M-710iC</w:t></w:r></w:p><w:p><w:r><w:t>Payload</w:t><w:tab/><w:t>70kg &amp; reach 2050mm</w:t></w:r></w:p></w:body></w:document>"#;
        let text = document_xml_to_text(xml);
        assert_eq!(text, "Fanuc M-710iC\n\nPayload\t70kg & reach 2050mm");
    }

    #[test]
    fn test_unescape_numeric_references() {
        assert_eq!(
            unescape_xml("Krones&#8217; line &#x2019;A&#x2019; &amp; &#38;"),
            "Krones\u{2019} line \u{2019}A\u{2019} & &"
        );
        assert_eq!(unescape_xml("&amp;lt;tag&amp;gt;"), "&lt;tag&gt;");
        assert_eq!(unescape_xml("bad &#xD800; ref"), "bad &#xD800; ref");
    }

    #[test]
    fn test_extract_docx_from_zip() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manual.docx");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("word/document.xml", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(b"<w:p><w:t>Sinumerik 840D</w:t></w:p>").unwrap();
        zip.finish().unwrap();

        let text = extract_text_from_docx(&path).unwrap();
        assert_eq!(text, "Sinumerik 840D");
    }
}

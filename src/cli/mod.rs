//! CLI 모듈
//!
//! docrag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::collector::{CollectionStats, CollectorConfig, FileCollector, FileType};
use crate::config::{build_pipeline, create_vector_store, RagSettings};
use crate::error::RagError;
use crate::knowledge::{
    ChunkingOptions, ChunkingStrategy, Document, DocumentChunker, QueryOptions, RagPipeline,
    SearchFilter,
};

/// 기본 컬렉션 이름
const DEFAULT_COLLECTION: &str = "documents";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docrag")]
#[command(version, about = "문서 RAG 파이프라인", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 청킹 관련 공통 인자
#[derive(clap::Args, Debug, Clone)]
pub struct ChunkArgs {
    /// 청킹 전략 (paragraph, sentence, token, fixed)
    #[arg(short, long, default_value = "paragraph")]
    pub strategy: ChunkingStrategy,

    /// 청크 크기 (token/fixed는 단어/문자 수, 나머지는 문자 수)
    #[arg(long, default_value = "500")]
    pub chunk_size: usize,

    /// 오버랩 (단어 또는 문자 수)
    #[arg(long, default_value = "50")]
    pub overlap: usize,
}

impl ChunkArgs {
    fn options(&self) -> ChunkingOptions {
        ChunkingOptions::new(self.chunk_size, self.overlap, self.strategy)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일, 폴더, 또는 텍스트를 인덱싱
    Index {
        /// 인덱싱할 파일 경로
        #[arg(long)]
        file: Option<PathBuf>,

        /// 인덱싱할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 텍스트 문서 제목
        #[arg(long, requires = "text")]
        title: Option<String>,

        /// 텍스트 문서 메타데이터 (key=value, 반복 가능)
        #[arg(short, long = "meta", value_parser = parse_key_val, requires = "text")]
        meta: Vec<(String, String)>,

        /// 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        #[command(flatten)]
        chunking: ChunkArgs,

        /// PDF 파일 건너뛰기
        #[arg(long)]
        skip_pdfs: bool,

        /// DOCX 파일 건너뛰기
        #[arg(long)]
        skip_docx: bool,
    },

    /// 파일 청킹 미리보기 (API 호출 없음)
    Chunk {
        /// 청킹할 파일 경로
        #[arg(long)]
        file: PathBuf,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// 질문에 답변
    Query {
        /// 질문
        query: String,

        /// 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// 검색 결과 개수
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// 최소 유사도
        #[arg(long, default_value = "0.7")]
        threshold: f32,

        /// 메타데이터 필터 (key=value, 반복 시 AND)
        #[arg(short, long = "filter", value_parser = parse_key_val)]
        filter: Vec<(String, String)>,

        /// 근거 청크 출력
        #[arg(long)]
        show_sources: bool,
    },

    /// 컬렉션 삭제
    Drop {
        /// 삭제할 컬렉션 이름
        collection: String,
    },

    /// 상태 확인
    Status {
        /// 청크 수를 확인할 컬렉션
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,
    },
}

/// `key=value` 파서
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("'{}' 형식이 잘못되었습니다 (key=value)", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("'{}'의 키가 비어 있습니다", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
///
/// Ctrl-C는 취소 토큰을 통해 진행 중인 명령을 중단합니다.
pub async fn run(cli: Cli) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n[!] 취소 요청됨...");
                cancel.cancel();
            }
        })
    };

    let settings = RagSettings::from_env().context("설정 로드 실패")?;

    let result = match cli.command {
        Commands::Index {
            file,
            dir,
            text,
            title,
            meta,
            collection,
            chunking,
            skip_pdfs,
            skip_docx,
        } => {
            let options = chunking.options();
            if let Some(text) = text {
                cmd_index_text(&settings, &collection, text, title, meta, &options, &cancel).await
            } else {
                let config = CollectorConfig {
                    skip_pdfs,
                    skip_docx,
                    ..Default::default()
                };
                cmd_index_files(&settings, &collection, file, dir, config, &options, &cancel)
                    .await
            }
        }
        Commands::Chunk { file, chunking } => cmd_chunk(&file, &chunking.options()).await,
        Commands::Query {
            query,
            collection,
            top_k,
            threshold,
            filter,
            show_sources,
        } => {
            let options = QueryOptions { top_k, threshold };
            let filter: SearchFilter = filter.into_iter().collect();
            cmd_query(
                &settings,
                &collection,
                &query,
                &filter,
                &options,
                show_sources,
                &cancel,
            )
            .await
        }
        Commands::Drop { collection } => cmd_drop(&settings, &collection).await,
        Commands::Status { collection } => cmd_status(&settings, &collection).await,
    };

    watcher.abort();
    result
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn open_pipeline(settings: &RagSettings) -> Result<RagPipeline> {
    if !settings.has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다 (provider: {}).\n\n\
             설정 방법:\n  \
             export DOCRAG_API_KEY=your-api-key\n  \
             또는 OPENAI_API_KEY / GEMINI_API_KEY",
            settings.provider
        );
    }
    build_pipeline(settings)
        .await
        .context("파이프라인 초기화 실패")
}

/// 텍스트 인덱싱 명령어
async fn cmd_index_text(
    settings: &RagSettings,
    collection: &str,
    text: String,
    title: Option<String>,
    meta: Vec<(String, String)>,
    options: &ChunkingOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let pipeline = open_pipeline(settings).await?;

    let mut document = Document::new(
        uuid::Uuid::new_v4().to_string(),
        title.unwrap_or_else(|| "direct-input".to_string()),
        text,
    );
    for (key, value) in meta {
        document = document.with_metadata(key, value);
    }

    println!("[*] 청킹 및 임베딩 생성 중...");

    let report = pipeline
        .index_document(collection, &document, options, cancel)
        .await
        .context("문서 인덱싱 실패")?;

    println!(
        "[OK] 문서가 인덱싱되었습니다 (ID: {}, 청크: {}, 차원: {})",
        report.document_id, report.chunks, report.dimension
    );
    if report.created_collection {
        println!("     새 컬렉션 생성: {}", report.collection);
    }

    Ok(())
}

/// 파일/폴더 인덱싱 명령어
async fn cmd_index_files(
    settings: &RagSettings,
    collection: &str,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    config: CollectorConfig,
    options: &ChunkingOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let collector = FileCollector::new(config);

    let files = if let Some(ref file_path) = file {
        match collector.collect_file(file_path)? {
            Some(f) => vec![f],
            None => {
                println!("[!] 지원하지 않는 파일 형식: {:?}", file_path);
                return Ok(());
            }
        }
    } else if let Some(ref dir_path) = dir {
        collector.collect_directory(dir_path)?
    } else {
        bail!("--file, --dir, --text 중 하나를 지정해야 합니다");
    };

    if files.is_empty() {
        println!("[!] 인덱싱할 파일이 없습니다.");
        return Ok(());
    }

    let stats = CollectionStats::from_files(&files);
    println!("[*] 인덱싱 대상: {} 파일", stats.total_files);
    println!(
        "    텍스트: {}, PDF: {}, DOCX: {}",
        stats.text_files, stats.pdf_files, stats.docx_files
    );
    println!("    총 크기: {}", format_bytes(stats.total_size as usize));
    println!();

    let pipeline = open_pipeline(settings).await?;

    let mut success_count = 0;
    let mut error_count = 0;

    for (i, collected_file) in files.iter().enumerate() {
        let type_str = match collected_file.file_type {
            FileType::Text => "TXT",
            FileType::Pdf => "PDF",
            FileType::Docx => "DOCX",
        };

        print!(
            "[{}/{}] [{}] {}... ",
            i + 1,
            files.len(),
            type_str,
            collected_file.document_id
        );

        match pipeline
            .index_file_as(
                collection,
                &collected_file.path,
                &collected_file.document_id,
                options,
                cancel,
            )
            .await
        {
            Ok(report) => {
                println!("완료 ({} 청크)", report.chunks);
                success_count += 1;
            }
            Err(e) if matches!(e.root(), RagError::Cancelled { .. }) => {
                println!("취소됨");
                return Err(e.into());
            }
            Err(e) => {
                println!("실패: {}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);

    Ok(())
}

/// 청킹 미리보기 명령어 (chunk)
async fn cmd_chunk(file: &Path, options: &ChunkingOptions) -> Result<()> {
    let chunks = DocumentChunker::new()
        .chunk_file(file, options)
        .await
        .with_context(|| format!("청킹 실패: {}", file.display()))?;

    if chunks.is_empty() {
        println!("[!] 생성된 청크가 없습니다.");
        return Ok(());
    }

    println!(
        "[OK] {} 청크 ({}, 크기 {}, 오버랩 {}):\n",
        chunks.len(),
        options.strategy,
        options.chunk_size,
        options.effective_overlap()
    );

    for chunk in &chunks {
        let words = chunk
            .metadata
            .get("word_count")
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<3} {} chars | {} words",
            chunk.index,
            chunk.text.chars().count(),
            words
        );
        println!("       {}", truncate_text(&chunk.text, 120));
    }

    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(
    settings: &RagSettings,
    collection: &str,
    query: &str,
    filter: &SearchFilter,
    options: &QueryOptions,
    show_sources: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let pipeline = open_pipeline(settings).await?;

    println!("[*] 질의 중: \"{}\"", query);

    let answer = pipeline
        .answer(collection, query, filter, options, cancel)
        .await
        .context("질의 실패")?;

    println!("\n{}\n", answer.answer);

    if show_sources && !answer.sources.is_empty() {
        println!("[OK] 근거 ({} 건):\n", answer.sources.len());
        for (i, source) in answer.sources.iter().enumerate() {
            println!(
                "{}. [점수: {:.4}] {} #{}",
                i + 1,
                source.score,
                source.document_id,
                source.index
            );
            if let Some(title) = source.metadata.get("title") {
                println!("   제목: {}", title);
            }
            println!("   내용: {}", truncate_text(&source.text, 200));
            println!();
        }
    }

    Ok(())
}

/// 컬렉션 삭제 명령어 (drop)
async fn cmd_drop(settings: &RagSettings, collection: &str) -> Result<()> {
    let store = create_vector_store(settings)
        .await
        .context("벡터 저장소 열기 실패")?;

    if !store.collection_exists(collection).await? {
        println!("[!] 컬렉션 '{}'이(가) 없습니다", collection);
        return Ok(());
    }

    store
        .delete_collection(collection)
        .await
        .context("컬렉션 삭제 실패")?;
    println!("[OK] 컬렉션 '{}' 삭제됨", collection);

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &RagSettings, collection: &str) -> Result<()> {
    println!("docrag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());
    println!("[*] 프로바이더: {} ({})", settings.provider, settings.endpoint);
    println!(
        "    임베딩 모델: {}, 채팅 모델: {}",
        settings.embedding_model, settings.chat_model
    );

    if settings.has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export DOCRAG_API_KEY=your-key");
    }

    println!("[*] 벡터 저장소: {}", settings.vector_backend);
    match create_vector_store(settings).await {
        Ok(store) => match store.count(collection).await {
            Ok(count) => println!("[OK] 컬렉션 '{}': {} 청크", collection, count),
            Err(RagError::NotFound(_)) => println!("[!] 컬렉션 '{}' 없음", collection),
            Err(e) => println!("[!] 컬렉션 조회 실패: {}", e),
        },
        Err(e) => {
            println!("[!] 벡터 저장소 열기 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("category=Packaging").unwrap(),
            ("category".to_string(), "Packaging".to_string())
        );
        assert_eq!(
            parse_key_val("model = ErgoBloc L=2").unwrap(),
            ("model".to_string(), "ErgoBloc L=2".to_string())
        );
        assert!(parse_key_val("no-separator").is_err());
        assert!(parse_key_val("=value").is_err());
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from([
            "docrag",
            "query",
            "How fast?",
            "--filter",
            "category=Packaging",
            "-k",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                query,
                top_k,
                threshold,
                filter,
                ..
            } => {
                assert_eq!(query, "How fast?");
                assert_eq!(top_k, 3);
                assert!((threshold - 0.7).abs() < f32::EPSILON);
                assert_eq!(filter.len(), 1);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_cli_parses_chunk_strategy() {
        let cli = Cli::try_parse_from([
            "docrag", "chunk", "--file", "notes.md", "--strategy", "token", "--chunk-size", "25",
            "--overlap", "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Chunk { chunking, .. } => {
                let options = chunking.options();
                assert_eq!(options.strategy, ChunkingStrategy::Token);
                assert_eq!(options.chunk_size, 25);
                assert_eq!(options.overlap, 10);
            }
            _ => panic!("expected chunk command"),
        }
    }

    #[test]
    fn test_cli_meta_requires_text() {
        let parsed = Cli::try_parse_from(["docrag", "index", "--file", "a.md", "--meta", "k=v"]);
        assert!(parsed.is_err());
    }
}

//! 파이프라인 통합 테스트
//!
//! 키워드 개념 임베더 + 프롬프트를 그대로 돌려주는 생성기 + 메모리 저장소로
//! 인덱싱/질의 전체 흐름을 검증합니다.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docrag::collector::FileCollector;
use docrag::knowledge::{NO_FILTERED_RESULTS_MESSAGE, NO_RESULTS_MESSAGE};
use docrag::{
    ChunkingOptions, ChunkingStrategy, Document, EmbeddingProvider, InMemoryVectorStore,
    QueryOptions, RagError, RagPipeline, Result, SearchFilter, SearchResult, TextGenerator,
    VectorEntry, VectorStore,
};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Doubles
// ============================================================================

const CONCEPTS: &[&str] = &[
    "krones", "bottle", "fill", "robot", "payload", "fanuc", "cnc", "siemens", "sinumerik",
];

/// 단어가 개념 접두사로 시작하면 해당 차원을 1 증가
fn concept_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; CONCEPTS.len()];
    for word in text.split_whitespace() {
        let word = word.to_lowercase();
        for (i, concept) in CONCEPTS.iter().enumerate() {
            if word.starts_with(concept) {
                vector[i] += 1.0;
            }
        }
    }
    vector
}

struct ConceptEmbedder;

#[async_trait]
impl EmbeddingProvider for ConceptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(concept_vector(text))
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }

    fn name(&self) -> &str {
        "concept"
    }
}

/// 벡터 하나를 빠뜨리는 임베더
struct DroppingEmbedder;

#[async_trait]
impl EmbeddingProvider for DroppingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(concept_vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .skip(1)
            .map(|t| concept_vector(t))
            .collect())
    }

    fn dimension(&self) -> usize {
        CONCEPTS.len()
    }

    fn name(&self) -> &str {
        "dropping"
    }
}

/// 문서와 질의를 서로 직교하는 벡터로 임베딩
struct SplitRoleEmbedder;

#[async_trait]
impl EmbeddingProvider for SplitRoleEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.0, 1.0])
    }

    fn dimension(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "split-role"
    }
}

/// 응답이 오지 않는 임베더
struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![1.0])
    }

    fn dimension(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// 프롬프트를 그대로 반환
struct EchoGenerator;

#[async_trait]
impl TextGenerator for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(prompt.to_string())
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// upsert만 실패하는 저장소
#[derive(Default)]
struct FailingUpsertStore {
    inner: InMemoryVectorStore,
}

#[async_trait]
impl VectorStore for FailingUpsertStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        self.inner.create_collection(name, dimension).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.inner.collection_exists(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn upsert_batch(&self, _collection: &str, _entries: &[VectorEntry]) -> Result<()> {
        Err(RagError::Store {
            backend: "failing".to_string(),
            message: "disk full".to_string(),
        })
    }

    async fn search_with_filter(
        &self,
        collection: &str,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.inner
            .search_with_filter(collection, query, filter, limit, threshold)
            .await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 컬렉션 생성이 끝나지 않는 저장소 (upsert 호출 여부 기록)
#[derive(Default)]
struct StalledCreateStore {
    inner: InMemoryVectorStore,
    upserted: AtomicBool,
}

#[async_trait]
impl VectorStore for StalledCreateStore {
    async fn create_collection(&self, _name: &str, _dimension: usize) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        self.inner.collection_exists(name).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn upsert_batch(&self, collection: &str, entries: &[VectorEntry]) -> Result<()> {
        self.upserted.store(true, Ordering::SeqCst);
        self.inner.upsert_batch(collection, entries).await
    }

    async fn search_with_filter(
        &self,
        collection: &str,
        query: &[f32],
        filter: &SearchFilter,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        self.inner
            .search_with_filter(collection, query, filter, limit, threshold)
            .await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        self.inner.count(collection).await
    }

    fn name(&self) -> &str {
        "stalled-create"
    }
}

// ============================================================================
// Fixtures
// ============================================================================

const KRONES_SENTENCE: &str = "The Krones ErgoBloc L fills up to 80,000 bottles per hour.";

fn machines_document() -> Document {
    let content = format!(
        "{}\n\nThe Fanuc M-710iC robot handles payloads up to 70 kg.\n\n\
         Siemens Sinumerik 840D controls CNC machining centers.",
        KRONES_SENTENCE
    );
    Document::new("machines", "Machine Handbook", content)
        .with_metadata("category", "Manufacturing")
}

fn paragraph_options() -> ChunkingOptions {
    ChunkingOptions::new(80, 0, ChunkingStrategy::Paragraph)
}

fn pipeline_with(store: Arc<dyn VectorStore>) -> RagPipeline {
    RagPipeline::new(Arc::new(ConceptEmbedder), Arc::new(EchoGenerator), store)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_index_then_query_round_trip() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();

    let report = pipeline
        .index_document("machines", &machines_document(), &paragraph_options(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.chunks, 3);
    assert_eq!(report.dimension, CONCEPTS.len());
    assert!(report.created_collection);
    assert_eq!(store.count("machines").await.unwrap(), 3);

    let question = "How fast does the Krones machine fill bottles?";
    let results = pipeline
        .retrieve(
            "machines",
            question,
            &SearchFilter::new(),
            &QueryOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "machines_0");
    assert_eq!(results[0].text, KRONES_SENTENCE);
    assert!(results[0].score >= 0.7);

    let answer = pipeline
        .query("machines", question, &QueryOptions::default(), &cancel)
        .await
        .unwrap();
    assert!(answer.contains(KRONES_SENTENCE));
    assert!(answer.contains("[Relevance: 1.00]"));
    assert!(answer.contains("Question: How fast does the Krones machine fill bottles?"));
    assert!(!answer.contains("Fanuc"));
}

#[tokio::test]
async fn test_reindexing_is_idempotent() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();
    let document = machines_document();

    let first = pipeline
        .index_document("machines", &document, &paragraph_options(), &cancel)
        .await
        .unwrap();
    let second = pipeline
        .index_document("machines", &document, &paragraph_options(), &cancel)
        .await
        .unwrap();

    assert!(first.created_collection);
    assert!(!second.created_collection);
    assert_eq!(store.count("machines").await.unwrap(), 3);
}

#[tokio::test]
async fn test_query_with_filter_is_conjunctive() {
    let pipeline = pipeline_with(Arc::new(InMemoryVectorStore::new()));
    let cancel = CancellationToken::new();
    let options = paragraph_options();

    let packaging = Document::new("krones", "Krones", "The Krones Modulfill fills glass bottles.")
        .with_metadata("category", "Packaging")
        .with_metadata("manufacturer", "Krones AG");
    let robotics = Document::new(
        "fanuc",
        "Fanuc",
        "The Fanuc robot can fill bottles on a palletizing line.",
    )
    .with_metadata("category", "Robotics");

    pipeline
        .index_document("catalog", &packaging, &options, &cancel)
        .await
        .unwrap();
    pipeline
        .index_document("catalog", &robotics, &options, &cancel)
        .await
        .unwrap();

    let question = "Which machine fills bottles?";
    let query_options = QueryOptions {
        top_k: 5,
        threshold: 0.5,
    };

    let unfiltered = pipeline
        .retrieve("catalog", question, &SearchFilter::new(), &query_options, &cancel)
        .await
        .unwrap();
    assert_eq!(unfiltered.len(), 2);

    let filter = SearchFilter::new().where_eq("category", "Packaging");
    let filtered = pipeline
        .retrieve("catalog", question, &filter, &query_options, &cancel)
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].document_id, "krones");

    let answer = pipeline
        .query_with_filter("catalog", question, &filter, &query_options, &cancel)
        .await
        .unwrap();
    assert!(answer.contains("Modulfill"));
    assert!(!answer.contains("palletizing"));

    let both = filter.clone().where_eq("manufacturer", "Fanuc Corp");
    let answer = pipeline
        .query_with_filter("catalog", question, &both, &query_options, &cancel)
        .await
        .unwrap();
    assert_eq!(answer, NO_FILTERED_RESULTS_MESSAGE);
}

#[tokio::test]
async fn test_zero_results_returns_fixed_message() {
    let pipeline = pipeline_with(Arc::new(InMemoryVectorStore::new()));
    let cancel = CancellationToken::new();

    pipeline
        .index_document("machines", &machines_document(), &paragraph_options(), &cancel)
        .await
        .unwrap();

    let answer = pipeline
        .query(
            "machines",
            "What is the weather in Paris today?",
            &QueryOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(answer, NO_RESULTS_MESSAGE);
}

#[tokio::test]
async fn test_query_unknown_collection_is_not_found() {
    let pipeline = pipeline_with(Arc::new(InMemoryVectorStore::new()));
    let err = pipeline
        .query(
            "missing",
            "Krones?",
            &QueryOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NotFound(_)));
}

#[tokio::test]
async fn test_empty_document_is_embedding_failure() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone());

    let err = pipeline
        .index_document(
            "machines",
            &Document::new("empty", "Empty", "   \n\n  "),
            &paragraph_options(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
    assert!(!store.collection_exists("machines").await.unwrap());
}

#[tokio::test]
async fn test_embedding_count_mismatch() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = RagPipeline::new(
        Arc::new(DroppingEmbedder),
        Arc::new(EchoGenerator),
        store.clone(),
    );

    let err = pipeline
        .index_document(
            "machines",
            &machines_document(),
            &paragraph_options(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Embedding { .. }));
    assert!(!store.collection_exists("machines").await.unwrap());
}

#[tokio::test]
async fn test_upsert_failure_after_create_is_partially_indexed() {
    let store = Arc::new(FailingUpsertStore::default());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();

    let err = pipeline
        .index_document("machines", &machines_document(), &paragraph_options(), &cancel)
        .await
        .unwrap_err();
    match &err {
        RagError::PartiallyIndexed { collection, .. } => assert_eq!(collection, "machines"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(matches!(err.root(), RagError::Store { .. }));
    assert!(store.collection_exists("machines").await.unwrap());

    // 컬렉션이 이미 있으면 원래 에러 그대로
    let err = pipeline
        .index_document("machines", &machines_document(), &paragraph_options(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Store { .. }));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline
        .index_document("machines", &machines_document(), &paragraph_options(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Cancelled { stage: "embedding" }));
    assert!(!store.collection_exists("machines").await.unwrap());
}

#[tokio::test]
async fn test_cancel_interrupts_stalled_embedding() {
    let pipeline = RagPipeline::new(
        Arc::new(StalledEmbedder),
        Arc::new(EchoGenerator),
        Arc::new(InMemoryVectorStore::new()),
    );
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.query("machines", "Krones?", &QueryOptions::default(), &cancel),
    )
    .await
    .expect("cancellation should finish the query promptly")
    .unwrap_err();
    assert!(matches!(err, RagError::Cancelled { stage: "embedding" }));
}

#[tokio::test]
async fn test_index_file_uses_file_name_ids() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("line.md");
    tokio::fs::write(&path, format!("# Line 3\n\n{}", KRONES_SENTENCE))
        .await
        .unwrap();

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();

    let report = pipeline
        .index_file("files", &path, &paragraph_options(), &cancel)
        .await
        .unwrap();
    assert_eq!(report.document_id, "line.md");

    let results = pipeline
        .retrieve(
            "files",
            "Krones bottles fill",
            &SearchFilter::new().where_eq("filetype", ".md"),
            &QueryOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].id.starts_with("line.md_"));
    assert_eq!(results[0].metadata["filename"].to_string(), "line.md");
}

#[tokio::test]
async fn test_cancel_during_create_collection_skips_upsert() {
    let store = Arc::new(StalledCreateStore::default());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.index_document("machines", &machines_document(), &paragraph_options(), &cancel),
    )
    .await
    .expect("cancellation should finish indexing promptly")
    .unwrap_err();

    assert!(matches!(err, RagError::Cancelled { stage: "collection" }));
    assert!(!store.upserted.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_same_file_name_in_subfolders_is_kept_apart() {
    let dir = tempfile::tempdir().unwrap();
    for (sub, body) in [
        ("krones", KRONES_SENTENCE),
        ("fanuc", "The Fanuc M-710iC robot handles payloads up to 70 kg."),
    ] {
        tokio::fs::create_dir(dir.path().join(sub)).await.unwrap();
        tokio::fs::write(dir.path().join(sub).join("readme.md"), body)
            .await
            .unwrap();
    }

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = pipeline_with(store.clone());
    let cancel = CancellationToken::new();

    let files = FileCollector::with_defaults()
        .collect_directory(dir.path())
        .unwrap();
    assert_eq!(files.len(), 2);

    for file in &files {
        pipeline
            .index_file_as(
                "readmes",
                &file.path,
                &file.document_id,
                &paragraph_options(),
                &cancel,
            )
            .await
            .unwrap();
    }

    assert_eq!(store.count("readmes").await.unwrap(), 2);

    let results = pipeline
        .retrieve(
            "readmes",
            "Which robot handles payloads?",
            &SearchFilter::new().where_eq("filename", "readme.md"),
            &QueryOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, "fanuc/readme.md_0");
}

#[tokio::test]
async fn test_retrieve_embeds_question_as_query() {
    let pipeline = RagPipeline::new(
        Arc::new(SplitRoleEmbedder),
        Arc::new(EchoGenerator),
        Arc::new(InMemoryVectorStore::new()),
    );
    let cancel = CancellationToken::new();

    pipeline
        .index_document("machines", &machines_document(), &paragraph_options(), &cancel)
        .await
        .unwrap();

    let results = pipeline
        .retrieve(
            "machines",
            "Krones?",
            &SearchFilter::new(),
            &QueryOptions {
                top_k: 5,
                threshold: 0.5,
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(results.is_empty());
}

//! End-to-end pipeline tests: ingestion through retrieval-augmented answering
//! against a real SQLite store, with in-process embedding/generation doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use corpora_backend::core::errors::PipelineError;
use corpora_backend::ingest::chunker::ChunkConfig;
use corpora_backend::ingest::crawler::{CrawlOptions, Crawler};
use corpora_backend::ingest::IngestService;
use corpora_backend::llm::{ChatPrompt, LlmClient};
use corpora_backend::query::prompt::NO_RELEVANT_INFORMATION;
use corpora_backend::query::{AnswerEvent, QueryEngine, QueryOptions};
use corpora_backend::store::{
    SearchFilter, SqliteVectorStore, VectorStore, VectorStoreGateway,
};

/// Deterministic bag-of-words embedder over a tiny fixed vocabulary. Texts
/// sharing a vocabulary word have positive cosine similarity; texts with no
/// vocabulary words embed to the zero vector and score 0 against everything.
const VOCAB: &[&str] = &[
    "sky", "blue", "color", "ocean", "deep", "water", "acme", "welcome", "team",
    "reach", "office",
];

fn embed_text(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; VOCAB.len()];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        if let Some(idx) = VOCAB.iter().position(|word| *word == token) {
            vector[idx] += 1.0;
        }
    }
    vector
}

/// Generation/embedding double. Counts generation calls so tests can assert
/// the engine skipped the model entirely.
struct MockLlm {
    reply: String,
    generation_calls: AtomicUsize,
}

impl MockLlm {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            generation_calls: AtomicUsize::new(0),
        })
    }

    fn generations(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(
        &self,
        _prompt: ChatPrompt,
        _api_key: Option<&str>,
    ) -> Result<String, PipelineError> {
        self.generation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }

    async fn stream_chat(
        &self,
        _prompt: ChatPrompt,
        _api_key: Option<&str>,
    ) -> Result<mpsc::Receiver<Result<String, PipelineError>>, PipelineError> {
        self.generation_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        let reply = self.reply.clone();
        tokio::spawn(async move {
            for word in reply.split_inclusive(' ') {
                if tx.send(Ok(word.to_string())).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn embed(
        &self,
        inputs: &[String],
        _api_key: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        Ok(inputs.iter().map(|text| embed_text(text)).collect())
    }
}

struct Stack {
    _dir: tempfile::TempDir,
    gateway: Arc<VectorStoreGateway>,
    ingest: IngestService,
    query: QueryEngine,
    llm: Arc<MockLlm>,
}

async fn build_stack(reply: &str, chunking: ChunkConfig) -> Stack {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteVectorStore::open(dir.path().join("test.db"))
        .await
        .unwrap();
    let store: Arc<dyn VectorStore> = Arc::new(store);
    let llm = MockLlm::new(reply);

    let gateway = Arc::new(VectorStoreGateway::new(store, llm.clone()));
    let ingest = IngestService::new(gateway.clone(), chunking);
    let query = QueryEngine::new(gateway.clone(), llm.clone());

    Stack {
        _dir: dir,
        gateway,
        ingest,
        query,
        llm,
    }
}

fn test_options() -> QueryOptions {
    QueryOptions {
        // The bag-of-words doubles produce lower cosines than a real
        // embedding model, so relevance cuts in at a lower threshold.
        score_threshold: 0.3,
        ..QueryOptions::default()
    }
}

#[tokio::test]
async fn answers_from_ingested_note_with_sources() {
    let stack = build_stack(
        "The sky is blue, according to your notes.",
        ChunkConfig::default(),
    )
    .await;

    stack
        .ingest
        .ingest_note(
            "u1",
            "The sky is blue.",
            Some("Sky Fact".to_string()),
            vec![],
            None,
        )
        .await
        .unwrap();

    let result = stack
        .query
        .answer("What color is the sky?", "u1", &test_options(), None)
        .await
        .unwrap();

    assert!(result.answer.contains("blue"));
    assert!(!result.sources.is_empty());
    assert!(result
        .sources
        .iter()
        .any(|source| source.content == "The sky is blue."));
    assert_eq!(stack.llm.generations(), 1);
}

#[tokio::test]
async fn other_users_content_is_invisible() {
    let stack = build_stack("unused", ChunkConfig::default()).await;

    stack
        .ingest
        .ingest_note(
            "u1",
            "The sky is blue.",
            Some("Sky Fact".to_string()),
            vec![],
            None,
        )
        .await
        .unwrap();

    let result = stack
        .query
        .answer("What color is the sky?", "u2", &test_options(), None)
        .await
        .unwrap();

    assert_eq!(result.answer, NO_RELEVANT_INFORMATION);
    assert!(result.sources.is_empty());
    assert_eq!(stack.llm.generations(), 0);
}

#[tokio::test]
async fn search_never_crosses_owners() {
    let stack = build_stack("unused", ChunkConfig::default()).await;

    stack
        .ingest
        .ingest_note("u1", "The sky is blue.", None, vec![], None)
        .await
        .unwrap();
    stack
        .ingest
        .ingest_note("u2", "The ocean is deep blue water.", None, vec![], None)
        .await
        .unwrap();

    let hits = stack
        .gateway
        .search("deep blue water", &SearchFilter::owner("u1"), 10, None)
        .await
        .unwrap();

    assert!(!hits.is_empty());
    assert!(hits.iter().all(|hit| hit.chunk.owner_id == "u1"));
}

#[tokio::test]
async fn unrelated_question_skips_generation() {
    let stack = build_stack("unused", ChunkConfig::default()).await;

    stack
        .ingest
        .ingest_note("u1", "The sky is blue.", None, vec![], None)
        .await
        .unwrap();

    let result = stack
        .query
        .answer("How do mountains form?", "u1", &test_options(), None)
        .await
        .unwrap();

    assert_eq!(result.answer, NO_RELEVANT_INFORMATION);
    assert!(result.sources.is_empty());
    assert_eq!(stack.llm.generations(), 0);
}

#[tokio::test]
async fn streaming_answer_ends_with_sources() {
    let stack = build_stack("The sky is blue.", ChunkConfig::default()).await;

    stack
        .ingest
        .ingest_note("u1", "The sky is blue.", None, vec![], None)
        .await
        .unwrap();

    let mut rx = stack
        .query
        .answer_stream(
            "What color is the sky?".to_string(),
            "u1".to_string(),
            test_options(),
            None,
        )
        .await;

    let mut answer = String::new();
    let mut sources = None;
    while let Some(event) = rx.recv().await {
        match event {
            AnswerEvent::Token(text) => answer.push_str(&text),
            AnswerEvent::Sources(list) => sources = Some(list),
        }
    }

    assert!(answer.contains("blue"));
    assert!(!sources.unwrap().is_empty());
}

#[tokio::test]
async fn delete_is_idempotent_and_removes_all_chunks() {
    let stack = build_stack("unused", ChunkConfig { size: 60, overlap: 10 }).await;

    let long_note = "The sky is blue. ".repeat(40);
    let document = stack
        .ingest
        .ingest_note("u1", &long_note, None, vec![], None)
        .await
        .unwrap();
    assert!(document.chunk_count > 1);

    let removed = stack
        .gateway
        .delete_document("u1", document.id)
        .await
        .unwrap();
    assert_eq!(removed, document.chunk_count);

    // Second delete of the same id is a successful no-op.
    let removed_again = stack
        .gateway
        .delete_document("u1", document.id)
        .await
        .unwrap();
    assert_eq!(removed_again, 0);

    let filter = SearchFilter {
        owner_id: "u1".to_string(),
        document_id: Some(document.id),
        content_type: None,
    };
    let hits = stack.gateway.search("blue sky", &filter, 10, None).await.unwrap();
    assert!(hits.is_empty());
}

async fn spawn_site() -> String {
    let index = r#"<html><body><main>
        <p>Welcome to Acme. Acme builds things.</p>
        <a href="/about">About</a>
        <a href="/contact">Contact</a>
        <a href="https://elsewhere.example/partners">Partners</a>
        <a href="/admin/panel">Admin</a>
        <a href="/broken">Status</a>
    </main></body></html>"#;
    let about = r#"<html><body><main>
        <p>About the Acme team and what the team does.</p>
        <a href="/">Home</a>
    </main></body></html>"#;
    let contact = r#"<html><body><main>
        <p>Reach the Acme office by mail.</p>
        <a href="/">Home</a>
    </main></body></html>"#;

    let app = Router::new()
        .route("/", get(move || async move { Html(index) }))
        .route("/about", get(move || async move { Html(about) }))
        .route("/contact", get(move || async move { Html(contact) }))
        .route("/admin/panel", get(move || async move { Html("<p>secret</p>") }))
        .route(
            "/broken",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn crawl_ingests_three_page_site() {
    let base = spawn_site().await;
    let stack = build_stack("unused", ChunkConfig::default()).await;

    let options = CrawlOptions {
        max_depth: 1,
        ..CrawlOptions::default()
    };
    let document = stack
        .ingest
        .ingest_url("u1", &base, None, vec![], Some(options), None)
        .await
        .unwrap();

    assert_eq!(document.metadata.total_pages, Some(3));

    let chunks = stack.gateway.get_chunks("u1", document.id).await.unwrap();
    let mut page_indexes: Vec<usize> = chunks
        .iter()
        .filter_map(|chunk| chunk.page.as_ref().map(|page| page.page_index))
        .collect();
    page_indexes.sort_unstable();
    page_indexes.dedup();
    assert_eq!(page_indexes, vec![0, 1, 2]);
}

#[tokio::test]
async fn crawl_stays_on_seed_domain() {
    let base = spawn_site().await;
    let crawler = Crawler::new(Duration::from_secs(5)).unwrap();

    let options = CrawlOptions {
        max_depth: 2,
        ..CrawlOptions::default()
    };
    let pages = crawler.crawl(&base, &options).await.unwrap();

    let seed_host = url::Url::parse(&base).unwrap().host_str().unwrap().to_string();
    assert!(!pages.is_empty());
    for page in &pages {
        let host = url::Url::parse(&page.url)
            .unwrap()
            .host_str()
            .unwrap()
            .to_string();
        assert_eq!(host, seed_host);
        assert!(!page.url.contains("/admin"));
    }
}

#[tokio::test]
async fn crawl_respects_page_budget() {
    let base = spawn_site().await;
    let crawler = Crawler::new(Duration::from_secs(5)).unwrap();

    let options = CrawlOptions {
        max_depth: 3,
        max_pages: 2,
        ..CrawlOptions::default()
    };
    let pages = crawler.crawl(&base, &options).await.unwrap();
    assert!(pages.len() <= 2);
}

#[tokio::test]
async fn failing_page_is_skipped_not_fatal() {
    let base = spawn_site().await;
    let crawler = Crawler::new(Duration::from_secs(5)).unwrap();

    let options = CrawlOptions {
        max_depth: 1,
        ..CrawlOptions::default()
    };
    // The index links to /broken, which returns 500; the healthy pages
    // still come back.
    let pages = crawler.crawl(&base, &options).await.unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|page| !page.url.contains("/broken")));
}

#[tokio::test]
async fn seed_with_no_reachable_pages_is_no_content() {
    let app = Router::new().route(
        "/",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let crawler = Crawler::new(Duration::from_secs(5)).unwrap();
    let err = crawler
        .crawl(&format!("http://{addr}"), &CrawlOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::NoContentExtracted(_)));
}

#[tokio::test]
async fn purging_a_user_leaves_others_intact() {
    let stack = build_stack("unused", ChunkConfig::default()).await;

    stack
        .ingest
        .ingest_note("u1", "The sky is blue.", None, vec![], None)
        .await
        .unwrap();
    stack
        .ingest
        .ingest_note("u1", "The ocean is deep.", None, vec![], None)
        .await
        .unwrap();
    stack
        .ingest
        .ingest_note("u2", "Water is wet.", None, vec![], None)
        .await
        .unwrap();

    let removed = stack.gateway.delete_all_for_user("u1").await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(stack.gateway.delete_all_for_user("u1").await.unwrap(), 0);

    let (_, u1_total) = stack
        .gateway
        .list_documents("u1", None, 10, 0)
        .await
        .unwrap();
    assert_eq!(u1_total, 0);
    let (_, u2_total) = stack
        .gateway
        .list_documents("u2", None, 10, 0)
        .await
        .unwrap();
    assert_eq!(u2_total, 1);
}

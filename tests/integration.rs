//! Integration tests for the tonecheck library and HTTP front-end.
//!
//! The classifier is replaced by a stub so these run without a model file.
//! Run with: cargo test --test integration

use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tonecheck::classifier::Classifier;
use tonecheck::highlight::annotate;
use tonecheck::replacements::SubstitutionTable;
use tonecheck::server::{serve, ServerConfig, ServerState};
use tonecheck::service::{Analysis, ToxicityService};
use tonecheck::vectorizer::TextVectorizer;
use tonecheck::vocab::Vocabulary;

/// Scores text by the share of its ids that are the "bad" word id.
struct KeywordClassifier {
    bad_id: i32,
}

impl Classifier for KeywordClassifier {
    fn predict(&self, ids: &[i32]) -> eyre::Result<f64> {
        let words = ids.iter().filter(|&&id| id != 0).count();
        if words == 0 {
            return Ok(0.0);
        }
        let bad = ids.iter().filter(|&&id| id == self.bad_id).count();
        Ok(bad as f64 / words as f64)
    }

    fn model_hash(&self) -> String {
        "sha256:keyword".to_string()
    }
}

fn service() -> ToxicityService {
    // "" and "[UNK]" are reserved, so "idiot" gets id 2.
    let vocab = Vocabulary::from_tokens(["", "[UNK]", "idiot", "you", "are", "an"], 20_000);
    ToxicityService::new(
        TextVectorizer::new(&vocab, 16),
        Arc::new(KeywordClassifier { bad_id: 2 }),
        SubstitutionTable::builtin(),
    )
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[test]
fn test_vocabulary_file_dedup_and_cap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vocab.txt");
    fs::write(&path, "a\nb\na\nc\nb\nd\ne\n").unwrap();

    let full = Vocabulary::load(&path, 100).unwrap();
    assert_eq!(full.tokens(), &["a", "b", "c", "d", "e"]);

    let capped = Vocabulary::load(&path, 3).unwrap();
    assert_eq!(capped.tokens(), &full.tokens()[..3]);
}

#[test]
fn test_analyze_toxic_text() {
    let analysis = service().analyze("you are an IDIOT!");
    match &analysis {
        Analysis::Scored {
            verdict,
            annotation,
        } => {
            assert!(!verdict.is_toxic(), "one bad word in four is 25%");
            assert_eq!(verdict.confidence, 75.0);
            assert_eq!(annotation.suggestion_for("IDIOT!"), Some("friend"));
        }
        other => panic!("expected a score, got {other:?}"),
    }
}

#[test]
fn test_analyze_boundary_is_not_toxic() {
    let analysis = service().analyze("idiot you");
    assert_eq!(analysis.message(), "Not Toxic (50.0%)");
}

#[test]
fn test_analyze_blank() {
    let analysis = service().analyze(" \n\t ");
    assert_eq!(analysis, Analysis::Blank);
    assert_eq!(analysis.message(), "⚠ Please enter some text.");
}

#[test]
fn test_custom_replacements_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("replacements.toml");
    fs::write(&path, "[replacements]\nidiot = \"pal\"\n").unwrap();

    let table = SubstitutionTable::load(&path).unwrap();
    let annotation = annotate("hey idiot, you fool", &table);
    assert_eq!(annotation.suggestions.len(), 1);
    assert_eq!(annotation.suggestion_for("idiot,"), Some("pal"));
}

#[test]
fn test_annotation_quirks() {
    let table = SubstitutionTable::builtin();

    let a = annotate("I hate you, fool!", &table);
    assert_eq!(a.suggestion_for("hate"), Some("dislike"));
    assert_eq!(a.suggestion_for("fool!"), Some("silly one"));

    let b = annotate("fuck fuck!", &table);
    assert_eq!(b.suggestions.len(), 2);

    let c = annotate("hate: fool;", &table);
    assert!(c.suggestions.is_empty());
}

// ---------------------------------------------------------------------------
// HTTP end to end
// ---------------------------------------------------------------------------

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        bind_addr: addr,
        ..ServerConfig::default()
    };
    let state = Arc::new(ServerState::new(config, service()));
    tokio::spawn(async move {
        serve(listener, state).await.unwrap();
    });
    addr
}

async fn http(addr: SocketAddr, request: String) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

async fn get(addr: SocketAddr, path: &str) -> String {
    http(
        addr,
        format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"),
    )
    .await
}

async fn post_form(addr: SocketAddr, body: &str) -> String {
    http(
        addr,
        format!(
            "POST / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        ),
    )
    .await
}

#[tokio::test]
async fn test_http_index_and_about() {
    let addr = spawn_server().await;

    let index = get(addr, "/").await;
    assert!(index.starts_with("HTTP/1.1 200"));
    assert!(index.contains("<form method=\"post\""));

    let about = get(addr, "/about").await;
    assert!(about.starts_with("HTTP/1.1 200"));
    assert!(about.contains("<h1>About</h1>"));
}

#[tokio::test]
async fn test_http_submit() {
    let addr = spawn_server().await;

    let page = post_form(addr, "text=idiot+idiot+you").await;
    assert!(page.starts_with("HTTP/1.1 200"));
    assert!(page.contains("Toxic (66.67%)"));
    assert!(page.contains("<span class='toxic'>idiot</span> &rarr; friend"));
}

#[tokio::test]
async fn test_http_submit_escapes_input() {
    let addr = spawn_server().await;

    let page = post_form(addr, "text=%3Cb%3Eyou%3C%2Fb%3E").await;
    assert!(page.contains("&lt;b&gt;you&lt;/b&gt;"));
    assert!(!page.contains("<b>you</b>"));
}

#[tokio::test]
async fn test_http_missing_field_is_blank() {
    let addr = spawn_server().await;

    let page = post_form(addr, "other=1").await;
    assert!(page.starts_with("HTTP/1.1 200"));
    assert!(page.contains("⚠ Please enter some text."));
}

#[tokio::test]
async fn test_http_empty_post_is_blank() {
    let addr = spawn_server().await;

    let page = http(
        addr,
        "POST / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
            .to_string(),
    )
    .await;
    assert!(page.starts_with("HTTP/1.1 200"), "{page}");
    assert!(page.contains("⚠ Please enter some text."));
}

#[tokio::test]
async fn test_http_non_form_content_type_is_blank() {
    let addr = spawn_server().await;

    let page = http(
        addr,
        "POST / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
         Content-Type: text/plain\r\nContent-Length: 7\r\n\r\ntext=hi"
            .to_string(),
    )
    .await;
    assert!(page.starts_with("HTTP/1.1 200"), "{page}");
    assert!(page.contains("⚠ Please enter some text."));
}

#[tokio::test]
async fn test_http_health_and_stats() {
    let addr = spawn_server().await;
    let _ = post_form(addr, "text=you").await;

    let health = get(addr, "/health").await;
    assert!(health.contains("\"model_hash\":\"sha256:keyword\""));

    let stats = get(addr, "/stats").await;
    assert!(stats.contains("\"not_toxic\":1"));
}

//! Pitch deck analyzer REST client.
//!
//! Async HTTP client using `reqwest`. Every endpoint answers with JSON that
//! decodes into the `pitchdeck_protocol` data model.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

use pitchdeck_protocol::constants::DEFAULT_API_URL;
use pitchdeck_protocol::{
    Analysis, AnalysisResult, Deck, JobId, KnowledgeFile, encode_path_segment,
};

use crate::upload::{self, UploadError, UploadFile};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload rejected: {0}")]
    Upload(#[from] UploadError),
}

/// Pitch deck analyzer API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Creates a client for the default local backend.
    pub fn new() -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pitchdeck/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_API_URL.to_string(),
        })
    }

    /// Points the client at another backend.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, "GET");
        let resp = self.http.get(&url).query(params).send().await?;
        read_body(resp).await
    }

    async fn post_form(&self, endpoint: &str, form: Form) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!(%url, "POST multipart");
        let resp = self.http.post(&url).multipart(form).send().await?;
        read_body(resp).await
    }

    /// Uploads a deck and starts its analysis.
    ///
    /// The file must be a PDF or PowerPoint document no larger than the upload
    /// limit, and `startup_name` must not be blank. The returned analysis'
    /// id is the job identifier for the status stream.
    pub async fn analyze_deck(&self, path: &Path, startup_name: &str) -> Result<Analysis, ApiError> {
        let startup_name = upload::startup_name(startup_name)?.to_string();
        let mime = upload::deck_mime(path)?;
        let file = upload::load(path, mime).await?;

        let form = Form::new()
            .part("file", file_part(file)?)
            .text("startupName", startup_name);
        let body = self.post_form("/api/analyze", form).await?;
        decode(&body)
    }

    pub async fn decks(&self) -> Result<Vec<Deck>, ApiError> {
        let body = self.get("/api/decks", &[]).await?;
        decode(&body)
    }

    pub async fn deck(&self, id: &str) -> Result<Deck, ApiError> {
        let body = self.get(&format!("/api/decks/{}", encode_path_segment(id)), &[]).await?;
        decode(&body)
    }

    /// Polls the status of an analysis job.
    pub async fn analysis_status(&self, job_id: &JobId) -> Result<Analysis, ApiError> {
        let body = self
            .get(&format!("/api/analysis/{}/status", job_id.path_segment()), &[])
            .await?;
        decode(&body)
    }

    /// Fetches the result of a completed analysis job.
    pub async fn analysis_result(&self, job_id: &JobId) -> Result<AnalysisResult, ApiError> {
        let body = self
            .get(&format!("/api/analysis/{}/result", job_id.path_segment()), &[])
            .await?;
        decode(&body)
    }

    /// Adds a document to the knowledge base.
    pub async fn upload_knowledge_file(&self, path: &Path) -> Result<KnowledgeFile, ApiError> {
        let file = upload::load(path, upload::knowledge_mime(path)).await?;
        let form = Form::new().part("file", file_part(file)?);
        let body = self.post_form("/api/knowledge", form).await?;
        decode(&body)
    }

    pub async fn knowledge_files(&self) -> Result<Vec<KnowledgeFile>, ApiError> {
        let body = self.get("/api/knowledge", &[]).await?;
        decode(&body)
    }

    /// Full-text search over the knowledge base.
    pub async fn search_knowledge(&self, query: &str) -> Result<Vec<KnowledgeFile>, ApiError> {
        let body = self.get("/api/knowledge/search", &[("q", query)]).await?;
        decode(&body)
    }
}

async fn read_body(resp: reqwest::Response) -> Result<Vec<u8>, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.bytes().await?.to_vec())
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    Ok(serde_json::from_slice(body)?)
}

fn file_part(file: UploadFile) -> Result<Part, ApiError> {
    Ok(Part::bytes(file.bytes)
        .file_name(file.file_name)
        .mime_str(file.mime)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Starts a one-shot mock HTTP server. The handle yields the raw request.
    async fn mock_server(status: u16, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let body = body.to_string();

        let handle = tokio::spawn(async move {
            let Ok((mut stream, _)) = listener.accept().await else {
                return String::new();
            };
            let request = read_request(&mut stream).await;

            let resp = format!(
                "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(resp.as_bytes()).await;
            let _ = stream.shutdown().await;
            request
        });

        (url, handle)
    }

    /// Reads one request: headers, then a body of `Content-Length` bytes or
    /// a chunked body up to its terminator.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = stream.read(&mut chunk).await.unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_ascii_lowercase();
            let received = buf.len() - header_end - 4;
            let content_length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            match content_length {
                Some(len) if received >= len => break,
                Some(_) => continue,
                None if headers.contains("transfer-encoding: chunked") => {
                    if text.ends_with("0\r\n\r\n") {
                        break;
                    }
                }
                None => break,
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn client(url: String) -> ApiClient {
        ApiClient::new().unwrap().with_base_url(url)
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn client_defaults_to_local_backend() {
        let client = ApiClient::new().unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn with_base_url_trims_trailing_slash() {
        let client = ApiClient::new().unwrap().with_base_url("https://api.example.com/");
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[tokio::test]
    async fn decks_returns_list() {
        let json = r#"[
            {"id":1,"name":"Seed deck","startupName":"Acme","createdAt":"2024-03-01T10:00:00Z","status":"completed"},
            {"id":"d-2","name":"Series A","startupName":"Globex","createdAt":"2024-03-02T10:00:00Z"}
        ]"#;
        let (url, handle) = mock_server(200, json).await;

        let decks = client(url).decks().await.unwrap();

        assert_eq!(decks.len(), 2);
        assert_eq!(decks[0].id, "1");
        assert_eq!(decks[0].startup_name, "Acme");
        assert_eq!(decks[1].id, "d-2");
        assert!(decks[1].status.is_none());

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/decks HTTP/1.1"));
    }

    #[tokio::test]
    async fn deck_encodes_id() {
        let json = r#"{"id":"a b","name":"n","startupName":"s","createdAt":"2024-03-01T10:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        let deck = client(url).deck("a b").await.unwrap();
        assert_eq!(deck.id, "a b");

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/decks/a%20b HTTP/1.1"), "{request}");
    }

    #[tokio::test]
    async fn deck_id_keeps_unreserved_characters() {
        let json = r#"{"id":"seed-round_v2.1","name":"n","startupName":"s","createdAt":"2024-03-01T10:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        client(url).deck("seed-round_v2.1").await.unwrap();

        let request = handle.await.unwrap();
        assert!(
            request.starts_with("GET /api/decks/seed-round_v2.1 HTTP/1.1"),
            "{request}"
        );
    }

    #[tokio::test]
    async fn analysis_status_hits_job_path() {
        let json = r#"{"id":"job-42","deckId":7,"status":"processing","createdAt":"2024-03-01T10:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        let analysis = client(url)
            .analysis_status(&JobId::from("job-42"))
            .await
            .unwrap();
        assert_eq!(analysis.deck_id, "7");
        assert_eq!(analysis.status, pitchdeck_protocol::JobStatus::Processing);
        assert!(analysis.completed_at.is_none());

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/analysis/job-42/status HTTP/1.1"));
    }

    #[tokio::test]
    async fn analysis_result_decodes_scores() {
        let json = r#"{"id":3,"deckId":7,"insights":["Strong team"],"recommendations":["Clarify GTM"],"score":8.5,"createdAt":"2024-03-01T10:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        let result = client(url)
            .analysis_result(&JobId::from("job-42"))
            .await
            .unwrap();
        assert_eq!(result.score, 8.5);
        assert_eq!(result.insights, vec!["Strong team"]);

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/analysis/job-42/result HTTP/1.1"));
    }

    #[tokio::test]
    async fn search_knowledge_sends_query() {
        let json = r#"[{"id":5,"name":"tam.md","type":"text/markdown","size":120,"uploadedAt":"2024-03-01T10:00:00Z"}]"#;
        let (url, handle) = mock_server(200, json).await;

        let files = client(url).search_knowledge("market size").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, "text/markdown");

        let request = handle.await.unwrap();
        assert!(
            request.starts_with("GET /api/knowledge/search?q=market+size HTTP/1.1"),
            "{request}"
        );
    }

    #[tokio::test]
    async fn knowledge_files_returns_list() {
        let (url, handle) = mock_server(200, "[]").await;

        let files = client(url).knowledge_files().await.unwrap();
        assert!(files.is_empty());

        let request = handle.await.unwrap();
        assert!(request.starts_with("GET /api/knowledge HTTP/1.1"));
    }

    #[tokio::test]
    async fn analyze_deck_posts_multipart() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "deck.pdf", b"%PDF-1.7 fake deck");
        let json = r#"{"id":"job-9","deckId":"11","status":"pending","createdAt":"2024-03-01T10:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        let analysis = client(url).analyze_deck(&path, "  Acme  ").await.unwrap();
        assert_eq!(analysis.job_id(), JobId::from("job-9"));

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/analyze HTTP/1.1"));
        assert!(request.contains(r#"name="file"; filename="deck.pdf""#));
        assert!(request.contains("Content-Type: application/pdf"));
        assert!(request.contains(r#"name="startupName""#));
        assert!(request.contains("\r\n\r\nAcme\r\n"));
        assert!(request.contains("%PDF-1.7 fake deck"));
    }

    #[tokio::test]
    async fn analyze_deck_rejects_before_request() {
        let dir = tempfile::tempdir().unwrap();
        let notes = write_file(&dir, "deck.txt", b"not a deck");
        let deck = write_file(&dir, "deck.pdf", b"%PDF");
        // Nothing listens here; validation must fail first.
        let client = client("http://127.0.0.1:9".into());

        let err = client.analyze_deck(&notes, "Acme").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Upload(UploadError::UnsupportedType(_))
        ));

        let err = client.analyze_deck(&deck, " ").await.unwrap_err();
        assert!(matches!(err, ApiError::Upload(UploadError::MissingStartupName)));
    }

    #[tokio::test]
    async fn upload_knowledge_file_posts_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "notes.md", b"# Market\nLarge.");
        let json = r#"{"id":12,"name":"notes.md","type":"text/markdown","size":15,"uploadedAt":"2024-03-01T10:00:00Z"}"#;
        let (url, handle) = mock_server(200, json).await;

        let file = client(url).upload_knowledge_file(&path).await.unwrap();
        assert_eq!(file.id, "12");
        assert_eq!(file.size, 15);

        let request = handle.await.unwrap();
        assert!(request.starts_with("POST /api/knowledge HTTP/1.1"));
        assert!(request.contains(r#"filename="notes.md""#));
        assert!(request.contains("Content-Type: text/markdown"));
        assert!(!request.contains("startupName"));
    }

    #[tokio::test]
    async fn api_error_carries_status_and_body() {
        let (url, handle) = mock_server(404, r#"{"detail":"Deck not found"}"#).await;

        let err = client(url).deck("missing").await.unwrap_err();
        match &err {
            ApiError::Api { status, body } => {
                assert_eq!(*status, 404);
                assert!(body.contains("Deck not found"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
        assert!(err.to_string().contains("404"));

        handle.abort();
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let (url, handle) = mock_server(200, r#"{"id":"#).await;

        let err = client(url).decks().await.unwrap_err();
        assert!(matches!(err, ApiError::Json(_)));

        handle.abort();
    }
}

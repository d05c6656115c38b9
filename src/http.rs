use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header, redirect};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_REDIRECTS: usize = 10;
const BACKOFF_BASE: Duration = Duration::from_millis(250);
// 250ms * 2^6 = 16s at most between attempts
const MAX_BACKOFF_SHIFT: u32 = 6;
/// Pages larger than this are not HTML worth scanning.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects; relative references resolve against it.
    pub url: Url,
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: StatusCode },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} is not a document ({content_type})")]
    NotDocument { url: String, content_type: String },
    #[error("{url} body exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },
    #[error("could not build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// GET capability handed to the resolver and the site scrapers.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Page, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            retries: 3,
        }
    }
}

/// reqwest-backed fetcher. Follows redirects and retries connect/timeout
/// failures with exponential backoff; HTTP statuses are never retried.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retries: u32,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(options.timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            retries: options.retries,
        })
    }

    async fn attempt(&self, url: &Url) -> Result<Page, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let resp = self
            .client
            .get(url.clone())
            .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
            .send()
            .await
            .map_err(transport)?;

        let status = resp.status();
        let final_url = resp.url().clone();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: final_url.to_string(),
                status,
            });
        }

        let content_type = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !is_document(content_type.as_deref()) {
            return Err(FetchError::NotDocument {
                url: final_url.to_string(),
                content_type: content_type.unwrap_or_default(),
            });
        }
        let too_large = || FetchError::TooLarge {
            url: final_url.to_string(),
            limit: MAX_BODY_BYTES,
        };
        if resp.content_length().is_some_and(|len| len > MAX_BODY_BYTES as u64) {
            return Err(too_large());
        }

        let mut resp = resp;
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(transport)? {
            if !append_capped(&mut body, &chunk, MAX_BODY_BYTES) {
                return Err(too_large());
            }
        }
        Ok(Page {
            body: String::from_utf8_lossy(&body).into_owned(),
            url: final_url,
            status,
        })
    }
}

/// HTML, text and script responses can be scanned; video, audio, images,
/// playlists and binary downloads cannot. A missing header counts as a page.
fn is_document(content_type: Option<&str>) -> bool {
    let Some(content_type) = content_type else {
        return true;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if mime.is_empty() {
        return true;
    }
    if mime.contains("mpegurl") || mime.contains("dash+xml") {
        return false;
    }
    mime.starts_with("text/")
        || matches!(
            mime.as_str(),
            "application/xhtml+xml"
                | "application/xml"
                | "application/json"
                | "application/javascript"
                | "application/x-javascript"
        )
}

/// Appends `chunk` unless that would take `body` past `limit`.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> bool {
    if body.len() + chunk.len() > limit {
        return false;
    }
    body.extend_from_slice(chunk);
    true
}

fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE * 2u32.pow(attempt.min(MAX_BACKOFF_SHIFT))
}

fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Transport { source, .. } => source.is_connect() || source.is_timeout(),
        _ => false,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, url: &Url) -> Result<Page, FetchError> {
        let mut attempt = 0;
        loop {
            match self.attempt(url).await {
                Ok(page) => {
                    debug!(url = %url, status = %page.status, bytes = page.body.len(), "fetched");
                    return Ok(page);
                }
                Err(err) if attempt < self.retries && is_retryable(&err) => {
                    let delay = backoff(attempt);
                    attempt += 1;
                    warn!(url = %url, attempt, ?delay, error = %err, "retrying fetch");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeFetcher;
    use super::*;

    #[test]
    fn only_transport_errors_are_retried() {
        let err = FetchError::Status {
            url: "https://example.com/".into(),
            status: StatusCode::BAD_GATEWAY,
        };
        assert!(!is_retryable(&err));
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn client_builds_with_defaults() {
        assert!(HttpFetcher::new(FetchOptions::default()).is_ok());
    }

    #[test]
    fn media_content_types_are_not_documents() {
        assert!(is_document(Some("text/html; charset=UTF-8")));
        assert!(is_document(Some("application/xhtml+xml")));
        assert!(is_document(None));
        assert!(!is_document(Some("video/mp4")));
        assert!(!is_document(Some("application/vnd.apple.mpegurl")));
        assert!(!is_document(Some("image/jpeg")));
        assert!(!is_document(Some("application/octet-stream")));
    }

    #[test]
    fn body_stops_at_the_limit() {
        let mut body = Vec::new();
        assert!(append_capped(&mut body, b"abcd", 6));
        assert!(append_capped(&mut body, b"ef", 6));
        assert!(!append_capped(&mut body, b"g", 6));
        assert_eq!(body, b"abcdef");
    }

    #[test]
    fn backoff_is_capped_for_large_retry_counts() {
        assert_eq!(backoff(0), BACKOFF_BASE);
        assert_eq!(backoff(2), BACKOFF_BASE * 4);
        assert_eq!(backoff(40), BACKOFF_BASE * 64);
        assert_eq!(backoff(u32::MAX), backoff(MAX_BACKOFF_SHIFT));
    }

    #[tokio::test]
    async fn media_responses_are_refused_before_the_body_is_read() {
        use axum::{Router, http::header::CONTENT_TYPE, routing::get};

        let app = Router::new()
            .route("/page", get(|| async { ([(CONTENT_TYPE, "text/html")], "<p>page</p>") }))
            .route("/v.mp4", get(|| async { ([(CONTENT_TYPE, "video/mp4")], vec![0u8; 64 * 1024]) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let fetcher = HttpFetcher::new(FetchOptions::default()).unwrap();
        let page = fetcher
            .get(&Url::parse(&format!("http://{}/page", addr)).unwrap())
            .await
            .unwrap();
        assert_eq!(page.body, "<p>page</p>");

        let media = fetcher.get(&Url::parse(&format!("http://{}/v.mp4", addr)).unwrap()).await;
        assert!(matches!(media, Err(FetchError::NotDocument { .. })), "{:?}", media);
    }

    #[tokio::test]
    async fn fake_fetcher_counts_and_404s() {
        let fetcher = FakeFetcher::new().page("https://a.example/", "<p>hi</p>");
        let ok = fetcher.get(&Url::parse("https://a.example/").unwrap()).await.unwrap();
        assert_eq!(ok.body, "<p>hi</p>");
        let miss = fetcher.get(&Url::parse("https://a.example/x").unwrap()).await;
        assert_eq!(miss.unwrap_err().status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(fetcher.hits(), 2);
    }
}

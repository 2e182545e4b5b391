//! Downloads `ads.txt` files.

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use reqwest::redirect::Policy;
use std::time::Duration;
use url::Url;

use crate::error::FetchError;

pub const USER_AGENT: &str = "AdsTxt-Analyzer/1.0";
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
const MAX_REDIRECTS: usize = 5;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Returns the raw ads.txt body for `domain`.
    async fn fetch(&self, domain: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    scheme: String,
    max_body: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            scheme: "https".to_string(),
            max_body: MAX_BODY_BYTES,
        })
    }

    // plain http is only useful against local test servers
    pub fn with_scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    async fn read_body(&self, mut response: reqwest::Response) -> Result<String, FetchError> {
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() > self.max_body {
                return Err(FetchError::TooLarge(self.max_body));
            }
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, domain: &str) -> Result<String, FetchError> {
        let host = normalize_domain(domain).ok_or(FetchError::InvalidDomain)?;
        let url = format!("{}://{}/ads.txt", self.scheme, host);

        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/plain")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => self.read_body(response).await,
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(StatusCode::NOT_FOUND.as_u16())),
            status => Err(FetchError::UnexpectedStatus(status)),
        }
    }
}

/// Reduces user input such as `https://Example.com/path` to `example.com`.
/// A port, if present, is kept.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim();
    let bare = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);

    if bare.is_empty() {
        return None;
    }

    match Url::parse(&format!("http://{bare}")) {
        Ok(url) => {
            let host = url.host_str()?;
            if host.is_empty() {
                return None;
            }
            Some(match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            })
        }
        Err(_) => bare
            .split('/')
            .next()
            .filter(|host| !host.is_empty())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ads.txt"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(2))
            .unwrap()
            .with_scheme("http")
    }

    fn host_of(server: &MockServer) -> String {
        server.address().to_string()
    }

    #[test]
    fn normalizes_user_supplied_domains() {
        assert_eq!(normalize_domain("example.com").as_deref(), Some("example.com"));
        assert_eq!(
            normalize_domain("https://Example.com/some/path").as_deref(),
            Some("example.com")
        );
        assert_eq!(normalize_domain(" http://example.com ").as_deref(), Some("example.com"));
        assert_eq!(normalize_domain("127.0.0.1:8080").as_deref(), Some("127.0.0.1:8080"));
        assert_eq!(normalize_domain(""), None);
        assert_eq!(normalize_domain("https://"), None);
    }

    #[tokio::test]
    async fn fetches_body_with_expected_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ads.txt"))
            .and(header("user-agent", USER_AGENT))
            .and(header("accept", "text/plain"))
            .respond_with(ResponseTemplate::new(200).set_body_string("google.com, 1, DIRECT"))
            .expect(1)
            .mount(&server)
            .await;

        let body = fetcher().fetch(&host_of(&server)).await.unwrap();
        assert_eq!(body, "google.com, 1, DIRECT");
    }

    #[tokio::test]
    async fn missing_file_maps_to_not_found() {
        let server = serve(ResponseTemplate::new(404)).await;
        let err = fetcher().fetch(&host_of(&server)).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(404)));
    }

    #[tokio::test]
    async fn server_error_maps_to_unexpected_status() {
        let server = serve(ResponseTemplate::new(503)).await;
        let err = fetcher().fetch(&host_of(&server)).await.unwrap_err();
        assert!(matches!(err, FetchError::UnexpectedStatus(s) if s == StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let server = serve(ResponseTemplate::new(200).set_body_string("x".repeat(2048))).await;
        let err = fetcher()
            .with_max_body(1024)
            .fetch(&host_of(&server))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::TooLarge(1024)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string("google.com, 1, DIRECT")
                .set_delay(Duration::from_secs(2)),
        )
        .await;

        let fetcher = HttpFetcher::new(Duration::from_millis(200))
            .unwrap()
            .with_scheme("http");
        let err = fetcher.fetch(&host_of(&server)).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout));
    }

    #[tokio::test]
    async fn empty_domain_is_invalid() {
        let err = fetcher().fetch("  ").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidDomain));
    }
}

//! Recipe Page Fetcher
//!
//! Plain HTTP GET of a recipe page, usable as a unit of work behind the
//! gated executor. Parsing the page is out of scope; the body comes back
//! as text.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::work::UnitOfWork;
use crate::config::FetchConfig;

/// Errors raised while fetching a page
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header, if any
    pub content_type: Option<String>,

    /// Response body as text
    pub body: String,
}

/// Short description of a fetched page, without the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body_bytes: usize,
}

impl FetchedPage {
    /// Summary suitable for reports
    pub fn summary(&self) -> PageSummary {
        PageSummary {
            url: self.url.clone(),
            status: self.status,
            content_type: self.content_type.clone(),
            body_bytes: self.body.len(),
        }
    }
}

/// HTTP client for recipe pages
#[derive(Debug, Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    courtesy_delay: Duration,
}

impl PageFetcher {
    /// Build a fetcher from configuration
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            courtesy_delay: Duration::from_millis(config.courtesy_delay_ms),
        })
    }

    /// Fetch one page
    pub async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !self.courtesy_delay.is_zero() {
            tokio::time::sleep(self.courtesy_delay).await;
        }

        tracing::debug!("GET {}", parsed);
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        if status >= 400 {
            return Err(FetchError::Status {
                url: final_url,
                status,
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        Ok(FetchedPage {
            url: final_url,
            status,
            content_type,
            body,
        })
    }
}

#[async_trait]
impl UnitOfWork<String, FetchedPage> for PageFetcher {
    async fn perform(&self, url: String) -> anyhow::Result<FetchedPage> {
        Ok(self.fetch(&url).await?)
    }
}

/// Outcome of checking a recipe URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlValidation {
    /// URL as given
    pub url: String,

    /// Whether the URL points at a supported recipe page
    pub valid: bool,

    /// Why it does not, when invalid
    pub reason: Option<String>,

    /// Host the URL points at
    pub site: Option<String>,

    /// Numeric recipe identifier, when valid
    pub recipe_id: Option<String>,
}

impl UrlValidation {
    fn invalid(url: &str, site: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            valid: false,
            reason: Some(reason.into()),
            site,
            recipe_id: None,
        }
    }
}

/// Check that `url` is an https recipe page on an allowed host
///
/// Recipe pages look like `https://{host}{prefix}{id}-{slug}`.
pub fn validate_recipe_url(url: &str, config: &FetchConfig) -> UrlValidation {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => return UrlValidation::invalid(url, None, format!("Malformed URL: {}", e)),
    };

    let site = parsed.host_str().map(str::to_string);
    if parsed.scheme() != "https" {
        return UrlValidation::invalid(url, site, "URL must use https");
    }

    let host = site.as_deref().unwrap_or_default();
    if !config.allowed_hosts.iter().any(|h| h.eq_ignore_ascii_case(host)) {
        return UrlValidation::invalid(
            url,
            site.clone(),
            format!("Unsupported recipe site: {}", host),
        );
    }

    let Some(rest) = parsed.path().strip_prefix(config.recipe_path_prefix.as_str()) else {
        return UrlValidation::invalid(
            url,
            site,
            format!("Not a recipe URL: path must start with {}", config.recipe_path_prefix),
        );
    };

    let identifier = rest.split('/').next().unwrap_or_default();
    let Some((id, slug)) = identifier.split_once('-') else {
        return UrlValidation::invalid(url, site, "Recipe identifier must look like {id}-{name}");
    };
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) || slug.is_empty() {
        return UrlValidation::invalid(url, site, "Recipe identifier must look like {id}-{name}");
    }

    UrlValidation {
        url: url.to_string(),
        valid: true,
        reason: None,
        site,
        recipe_id: Some(id.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/recipes/1-test", addr)
    }

    #[test]
    fn test_valid_recipe_url() {
        let config = FetchConfig::default();
        let result = validate_recipe_url(
            "https://cooking.nytimes.com/recipes/1017256-french-onion-soup",
            &config,
        );
        assert!(result.valid, "{:?}", result.reason);
        assert_eq!(result.recipe_id.as_deref(), Some("1017256"));
        assert_eq!(result.site.as_deref(), Some("cooking.nytimes.com"));
    }

    #[test]
    fn test_invalid_recipe_urls() {
        let config = FetchConfig::default();
        let cases = [
            "not a url",
            "http://cooking.nytimes.com/recipes/1017256-french-onion-soup",
            "https://example.com/recipes/1017256-french-onion-soup",
            "https://cooking.nytimes.com/guides/1017256-french-onion-soup",
            "https://cooking.nytimes.com/recipes/french",
            "https://cooking.nytimes.com/recipes/abc-french-onion-soup",
            "https://cooking.nytimes.com/recipes/",
        ];
        for url in cases {
            let result = validate_recipe_url(url, &config);
            assert!(!result.valid, "{} should be invalid", url);
            assert!(result.reason.is_some());
            assert!(result.recipe_id.is_none());
        }
    }

    #[test]
    fn test_allowed_hosts_are_configurable() {
        let config = FetchConfig {
            allowed_hosts: vec!["recipes.example.org".to_string()],
            ..FetchConfig::default()
        };
        let result = validate_recipe_url("https://recipes.example.org/recipes/42-stew", &config);
        assert!(result.valid);
        assert_eq!(result.recipe_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_page_summary() {
        let page = FetchedPage {
            url: "https://cooking.nytimes.com/recipes/1-x".to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            body: "hello".to_string(),
        };
        assert_eq!(page.summary().body_bytes, 5);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = serve_once("200 OK", "<html>soup</html>").await;
        let fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();

        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<html>soup</html>");
        assert_eq!(page.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_fetch_http_error_status() {
        let url = serve_once("404 Not Found", "gone").await;
        let fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();

        match fetcher.fetch(&url).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_url() {
        let fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();
        assert!(matches!(
            fetcher.fetch("::nope::").await,
            Err(FetchError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetcher_as_unit_of_work() {
        let url = serve_once("500 Internal Server Error", "boom").await;
        let fetcher = PageFetcher::new(&FetchConfig::default()).unwrap();

        let err = fetcher.perform(url).await.unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
    }
}

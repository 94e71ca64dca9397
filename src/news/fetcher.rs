use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};

use super::types::{ApiResponse, Page, Query, MAX_PAGE_SIZE};

/// Issues one query against the upstream and returns a single page.
#[async_trait]
pub trait NewsFetcher: Send + Sync {
    async fn fetch(&self, query: &Query) -> Result<Page>;

    fn page_size(&self) -> u32;
}

pub struct NewsApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    page_size: u32,
}

impl NewsApiClient {
    pub fn new(api_key: String, base_url: &str, page_size: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(concat!("news-collector/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        // Url::join replaces the last path segment unless the base ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            api_key,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        })
    }

    fn endpoint_url(&self, query: &Query) -> Result<Url> {
        Ok(self.base_url.join(query.endpoint())?)
    }
}

#[async_trait]
impl NewsFetcher for NewsApiClient {
    async fn fetch(&self, query: &Query) -> Result<Page> {
        let url = self.endpoint_url(query)?;
        tracing::debug!(%url, page = query.page(), "Requesting news");

        let response = self
            .client
            .get(url)
            .header("X-Api-Key", &self.api_key)
            .query(&query.params(self.page_size))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AppError::upstream(format!("HTTP {}: {}", status, body.trim())));
        }

        parse_response(&body)
    }

    fn page_size(&self) -> u32 {
        self.page_size
    }
}

fn parse_response(body: &str) -> Result<Page> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| AppError::upstream(format!("malformed payload: {e}")))?;

    if response.status != "ok" {
        return Err(AppError::upstream(format!(
            "{}: {}",
            response.code.as_deref().unwrap_or("unknown"),
            response.message.as_deref().unwrap_or("no message")
        )));
    }

    Ok(Page {
        total_results: response.total_results,
        articles: response.articles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str, page_size: u32) -> NewsApiClient {
        NewsApiClient::new("key".to_string(), base, page_size, Duration::from_secs(10)).unwrap()
    }

    #[test]
    fn endpoints_join_below_the_base_path() {
        let client = client("https://newsapi.org/v2", 100);
        assert_eq!(
            client.endpoint_url(&Query::headlines("it")).unwrap().as_str(),
            "https://newsapi.org/v2/top-headlines"
        );
        assert_eq!(
            client
                .endpoint_url(&Query::everything("ansa.it", "en"))
                .unwrap()
                .as_str(),
            "https://newsapi.org/v2/everything"
        );
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(client("https://newsapi.org/v2/", 500).page_size(), 100);
        assert_eq!(client("https://newsapi.org/v2/", 0).page_size(), 1);
        assert_eq!(client("https://newsapi.org/v2/", 20).page_size(), 20);
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = NewsApiClient::new("key".to_string(), "not a url", 100, Duration::from_secs(10));
        assert!(matches!(result, Err(AppError::Url(_))));
    }

    #[test]
    fn parses_ok_payload() {
        let page = parse_response(r#"{"status":"ok","totalResults":250,"articles":[]}"#).unwrap();
        assert_eq!(page.total_results, 250);
        assert!(page.articles.is_empty());
    }

    #[test]
    fn error_payload_is_an_upstream_error() {
        let err = parse_response(
            r#"{"status":"error","code":"rateLimited","message":"You have made too many requests"}"#,
        )
        .unwrap_err();
        match err {
            AppError::Upstream(msg) => {
                assert_eq!(msg, "rateLimited: You have made too many requests")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_payload_is_an_upstream_error() {
        let err = parse_response("<html>gateway timeout</html>").unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));
        assert!(!err.is_storage());
    }

    #[test]
    fn page_with_null_date_and_url_keeps_every_article() {
        let page = parse_response(
            r#"{"status":"ok","totalResults":2,"articles":[
                {"source":{"id":null,"name":"Ansa"},"title":"A","url":"https://www.ansa.it/a",
                 "publishedAt":"2024-05-01T08:30:00Z"},
                {"source":{"id":null,"name":"Ansa"},"title":"B","url":null,"publishedAt":null}
            ]}"#,
        )
        .unwrap();

        assert_eq!(page.articles.len(), 2);
        assert_eq!(page.articles[1].url, "");
        assert_eq!(page.articles[1].published_at, None);
    }
}

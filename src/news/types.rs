use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Upper bound the upstream accepts for `pageSize`.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Raw response envelope of both upstream endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiResponse {
    pub status: String,
    #[serde(default)]
    pub total_results: u32,
    #[serde(default)]
    pub articles: Vec<FetchedArticle>,
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArticleSource {
    #[allow(dead_code)]
    pub id: Option<String>,
    pub name: Option<String>,
}

/// One article exactly as the upstream reports it. Missing, null or
/// unparseable fields decode to their empty value so one bad article never
/// rejects the whole page.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedArticle {
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: ArticleSource,
    pub author: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    pub url_to_image: Option<String>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub published_at: Option<DateTime<Utc>>,
    pub content: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

impl FetchedArticle {
    pub fn source_name(&self) -> &str {
        self.source.name.as_deref().unwrap_or("")
    }
}

/// One page of results together with the upstream's total hit count.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub total_results: u32,
    pub articles: Vec<FetchedArticle>,
}

impl Page {
    /// Number of pages of `page_size` needed to read every result.
    pub fn pages_needed(&self, page_size: u32) -> u32 {
        if page_size == 0 {
            return 0;
        }
        self.total_results.div_ceil(page_size)
    }
}

/// The two query shapes the collector issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Country headlines (`/top-headlines`).
    Headlines {
        country_code: String,
        q: Option<String>,
        page: u32,
    },
    /// Full-text search scoped to one or more domains (`/everything`).
    Everything {
        domains: String,
        q: Option<String>,
        language: String,
        page: u32,
    },
}

impl Query {
    /// Country headlines, first page.
    pub fn headlines(country_code: impl Into<String>) -> Self {
        Query::Headlines {
            country_code: country_code.into(),
            q: None,
            page: 1,
        }
    }

    pub fn everything(domains: impl Into<String>, language: impl Into<String>) -> Self {
        Query::Everything {
            domains: domains.into(),
            q: None,
            language: language.into(),
            page: 1,
        }
    }

    /// Narrows the query with free text.
    pub fn with_q(mut self, text: Option<String>) -> Self {
        match &mut self {
            Query::Headlines { q, .. } | Query::Everything { q, .. } => *q = text,
        }
        self
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            Query::Headlines { .. } => "top-headlines",
            Query::Everything { .. } => "everything",
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Query::Headlines { page, .. } | Query::Everything { page, .. } => *page,
        }
    }

    /// Query-string pairs for this request.
    pub fn params(&self, page_size: u32) -> Vec<(&'static str, String)> {
        let page_size = page_size.min(MAX_PAGE_SIZE);
        match self {
            Query::Headlines { country_code, q, page } => {
                let mut params = vec![("country", country_code.clone())];
                if let Some(q) = q.as_ref().filter(|q| !q.is_empty()) {
                    params.push(("q", q.clone()));
                }
                params.push(("pageSize", page_size.to_string()));
                params.push(("page", page.to_string()));
                params
            }
            Query::Everything { domains, q, language, page } => {
                let mut params = vec![("domains", domains.clone())];
                if let Some(q) = q.as_ref().filter(|q| !q.is_empty()) {
                    params.push(("q", q.clone()));
                }
                params.push(("pageSize", page_size.to_string()));
                params.push(("page", page.to_string()));
                params.push(("sortBy", "publishedAt".to_string()));
                if !language.is_empty() {
                    params.push(("language", language.clone()));
                }
                params
            }
        }
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored article joined with its source and domain names.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub id: i64,
    pub source: String,
    pub domain: String,
    pub author: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub url_to_image: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub country: String,
    pub language: String,
    pub category: String,
}

/// An article ready for insertion, with its identifiers already resolved.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub source_id: i64,
    pub domain_id: i64,
    pub author: String,
    pub title: String,
    pub description: String,
    pub url: String,
    pub url_to_image: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub country: String,
    pub language: String,
    pub category: String,
}

/// Filter used by the article listing and count queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleQuery {
    /// Exact match on the country tag.
    pub country: Option<String>,
    /// Case-insensitive substring over title, description and content.
    pub search: Option<String>,
}

impl ArticleQuery {
    pub fn new(country: Option<String>, search: Option<String>) -> Self {
        Self {
            country: country.filter(|c| !c.is_empty()),
            search: search.filter(|s| !s.is_empty()),
        }
    }
}

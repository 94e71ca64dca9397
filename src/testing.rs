//! Shared fixtures for unit tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use crate::db::Repository;
use crate::error::Result;
use crate::news::types::{ArticleSource, Page};
use crate::news::{FetchedArticle, NewsFetcher, Query};

type Respond = Box<dyn Fn(&Query) -> Result<Page> + Send + Sync>;

/// Answers every query from a closure and remembers what was asked.
pub struct ScriptedFetcher {
    respond: Respond,
    queries: Mutex<Vec<Query>>,
}

impl ScriptedFetcher {
    pub fn new(respond: impl Fn(&Query) -> Result<Page> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            respond: Box::new(respond),
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<Query> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsFetcher for ScriptedFetcher {
    async fn fetch(&self, query: &Query) -> Result<Page> {
        self.queries.lock().unwrap().push(query.clone());
        (self.respond)(query)
    }

    fn page_size(&self) -> u32 {
        100
    }
}

pub fn fetched(source: &str, url: &str, title: &str, minute: u32) -> FetchedArticle {
    FetchedArticle {
        source: ArticleSource {
            id: None,
            name: Some(source.to_string()),
        },
        author: None,
        title: Some(title.to_string()),
        description: Some(format!("{title} description")),
        url: url.to_string(),
        url_to_image: None,
        published_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap()),
        content: None,
    }
}

pub fn page(total_results: u32, articles: Vec<FetchedArticle>) -> Page {
    Page {
        total_results,
        articles,
    }
}

/// A fresh database in a temporary directory; keep the `TempDir` alive.
pub async fn temp_repository() -> (TempDir, Arc<Repository>) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("news.db");
    let repo = Repository::connect(path.to_str().unwrap(), 1).await.unwrap();
    (dir, Arc::new(repo))
}

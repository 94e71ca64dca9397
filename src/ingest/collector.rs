use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::NewArticle;
use crate::news::{country_code, FetchedArticle, NewsFetcher, Query};

use super::domain::extract_domain;
use super::resolver::Resolver;

/// A single unit of collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Country headlines; articles carry the country and language tags and
    /// their domain comes from each article's own URL.
    ByCountry {
        country: String,
        language: String,
        query: Option<String>,
    },
    /// Full-text search scoped to one domain; every article is filed under
    /// that domain.
    Global { domain: String },
}

impl Target {
    pub fn by_country(country: impl Into<String>, language: impl Into<String>) -> Self {
        Target::ByCountry {
            country: country.into(),
            language: language.into(),
            query: None,
        }
    }

    pub fn global(domain: impl Into<String>) -> Self {
        Target::Global {
            domain: domain.into(),
        }
    }

    fn tags(&self) -> (&str, &str) {
        match self {
            Target::ByCountry {
                country, language, ..
            } => (country, language),
            Target::Global { .. } => ("", ""),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::ByCountry { country, .. } => write!(f, "ByCountry({country})"),
            Target::Global { domain } => write!(f, "Global({domain})"),
        }
    }
}

/// Outcome of one fetch-and-store cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub target: String,
    pub total_results: u32,
    /// Pages the query would take to exhaust; only the first is collected.
    pub pages_available: u32,
    pub fetched: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Collector {
    repository: Arc<Repository>,
    resolver: Resolver,
    fetcher: Arc<dyn NewsFetcher>,
    global_language: String,
}

impl Collector {
    pub fn new(
        repository: Arc<Repository>,
        fetcher: Arc<dyn NewsFetcher>,
        global_language: impl Into<String>,
    ) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&repository)),
            repository,
            fetcher,
            global_language: global_language.into(),
        }
    }

    fn query_for(&self, target: &Target) -> Result<Query> {
        match target {
            Target::ByCountry { country, query, .. } => {
                let code = country_code(country)
                    .ok_or_else(|| AppError::config(format!("unknown country '{country}'")))?;
                Ok(Query::headlines(code).with_q(query.clone()))
            }
            Target::Global { domain } => {
                Ok(Query::everything(domain.as_str(), self.global_language.as_str()))
            }
        }
    }

    /// Fetches the first page for `target` and stores every article in
    /// upstream order. An upstream failure aborts the cycle; a failure on one
    /// article is logged and the cycle moves on.
    pub async fn collect(&self, target: &Target) -> Result<CycleReport> {
        tracing::info!(%target, "News collection start");

        let query = self.query_for(target)?;
        let page = self.fetcher.fetch(&query).await?;

        let mut report = CycleReport {
            target: target.to_string(),
            total_results: page.total_results,
            pages_available: page.pages_needed(self.fetcher.page_size()),
            fetched: page.articles.len(),
            ..Default::default()
        };
        tracing::info!(
            %target,
            total_results = report.total_results,
            pages = report.pages_available,
            "Total results retrieved"
        );

        // The search was scoped to this domain, so its id is used as-is.
        let known_domain = match target {
            Target::Global { domain } => Some(self.resolver.resolve_domain(domain).await?),
            Target::ByCountry { .. } => None,
        };
        let (country, language) = target.tags();

        for (i, article) in page.articles.into_iter().enumerate() {
            tracing::debug!(
                %target,
                article = i + 1,
                title = article.title.as_deref().unwrap_or(""),
                "Processing article"
            );
            match self.store(article, known_domain, country, language).await {
                Ok(Some(_)) => report.stored += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    let kind = if e.is_storage() { "storage" } else { "processing" };
                    tracing::warn!(%target, article = i + 1, error = %e, "Article not stored ({kind} failure)");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            %target,
            stored = report.stored,
            skipped = report.skipped,
            failed = report.failed,
            "News collection end"
        );
        Ok(report)
    }

    async fn store(
        &self,
        article: FetchedArticle,
        known_domain: Option<i64>,
        country: &str,
        language: &str,
    ) -> Result<Option<i64>> {
        let source_name = article.source_name();
        if source_name.is_empty() {
            tracing::warn!(url = %article.url, "Article has no source name, skipping");
            return Ok(None);
        }

        let published_at = article.published_at.unwrap_or_else(|| {
            tracing::warn!(url = %article.url, "Article has no usable publish date, storing the epoch");
            DateTime::<Utc>::default()
        });

        let source_id = self.resolver.resolve_source(source_name).await?;
        let domain_id = match known_domain {
            Some(id) => id,
            None => {
                self.resolver
                    .resolve_domain(&extract_domain(&article.url))
                    .await?
            }
        };

        let id = self
            .repository
            .insert_article(NewArticle {
                source_id,
                domain_id,
                author: article.author.unwrap_or_default(),
                title: article.title.unwrap_or_default(),
                description: article.description.unwrap_or_default(),
                url: article.url,
                url_to_image: article.url_to_image.unwrap_or_default(),
                published_at,
                content: article.content.unwrap_or_default(),
                country: country.to_string(),
                language: language.to_string(),
                category: String::new(),
            })
            .await?;

        tracing::debug!(id, source_id, domain_id, "Article stored");
        Ok(Some(id))
    }

    /// Runs one global cycle per favourite domain. A failed domain is logged
    /// and does not stop the others.
    pub async fn collect_favourites(&self) -> Result<Vec<CycleReport>> {
        let favourites = self.repository.favourite_domains().await?;
        tracing::info!(count = favourites.len(), "Global collection over favourite domains");

        let mut reports = Vec::with_capacity(favourites.len());
        for domain in favourites {
            let target = Target::global(domain.name);
            match self.collect(&target).await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::error!(%target, error = %e, "Collection cycle aborted"),
            }
        }
        Ok(reports)
    }
}

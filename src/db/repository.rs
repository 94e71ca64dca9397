use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Article, ArticleQuery, Domain, NamedRow, NewArticle};

use super::schema::SCHEMA;

/// Fixed pause between two connection attempts.
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

// ?2 is the search text, already lowercased and LIKE-escaped.
const ARTICLE_FILTER: &str = r#"(?1 IS NULL OR a.country = ?1)
    AND (?2 IS NULL
         OR lower_unicode(a.title) LIKE '%' || ?2 || '%' ESCAPE '\'
         OR lower_unicode(a.description) LIKE '%' || ?2 || '%' ESCAPE '\'
         OR lower_unicode(a.content) LIKE '%' || ?2 || '%' ESCAPE '\')"#;

/// Tables keyed by a unique `name` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedTable {
    Sources,
    Domains,
}

impl NamedTable {
    fn as_str(self) -> &'static str {
        match self {
            NamedTable::Sources => "sources",
            NamedTable::Domains => "domains",
        }
    }
}

/// Owns the database connection and every query the collector and the
/// visualizer run against it.
pub struct Repository {
    conn: Connection,
}

impl Repository {
    /// Opens the database, retrying with a fixed delay. `max_retries == 0`
    /// keeps retrying until the database comes up.
    pub async fn connect(db_path: &str, max_retries: u32) -> Result<Self> {
        Self::connect_with_delay(db_path, max_retries, CONNECT_RETRY_DELAY).await
    }

    pub(crate) async fn connect_with_delay(
        db_path: &str,
        max_retries: u32,
        delay: Duration,
    ) -> Result<Self> {
        tracing::info!(db_path, "Initiating connection to database");
        let mut attempt = 0;
        loop {
            attempt += 1;
            match Self::open(db_path).await {
                Ok(repo) => {
                    tracing::info!(attempt, "Connection to database successful");
                    return Ok(repo);
                }
                Err(e) if max_retries == 0 || attempt < max_retries => {
                    tracing::warn!(attempt, error = %e, "Database connection attempt failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(AppError::Connection {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            register_functions(conn)?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Name-keyed primitives

    pub async fn lookup_by_name(&self, table: NamedTable, name: &str) -> Result<Vec<NamedRow>> {
        let name = name.to_string();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, name FROM {} WHERE name = ?1 ORDER BY id",
                    table.as_str()
                ))?;
                let rows = stmt
                    .query_map(params![name], |row| {
                        Ok(NamedRow {
                            id: row.get(0)?,
                            name: row.get(1)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// Plain insert; fails if the name already exists.
    pub async fn insert_named(&self, table: NamedTable, name: &str) -> Result<i64> {
        let name = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                let id = conn.query_row(
                    &format!("INSERT INTO {} (name) VALUES (?1) RETURNING id", table.as_str()),
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    /// Returns the id for `name`, creating the row in the same statement if
    /// it does not exist yet.
    pub async fn insert_or_get(&self, table: NamedTable, name: &str) -> Result<i64> {
        let name = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                let id = conn.query_row(
                    &format!(
                        "INSERT INTO {} (name) VALUES (?1)
                         ON CONFLICT(name) DO UPDATE SET name = excluded.name
                         RETURNING id",
                        table.as_str()
                    ),
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    pub async fn domain_id(&self, name: &str) -> Result<Option<i64>> {
        let name = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                let id = conn
                    .query_row(
                        "SELECT id FROM domains WHERE name = ?1",
                        params![name],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(id)
            })
            .await?;
        Ok(id)
    }

    // Article operations

    pub async fn insert_article(&self, article: NewArticle) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO articles (source_id, domain_id, author, title, description, url,
                                             url_to_image, published_at, content, country, language, category)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
                    params![
                        article.source_id,
                        article.domain_id,
                        article.author,
                        article.title,
                        article.description,
                        article.url,
                        article.url_to_image,
                        article
                            .published_at
                            .to_rfc3339_opts(SecondsFormat::Secs, true),
                        article.content,
                        article.country,
                        article.language,
                        article.category,
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn count_articles(&self, query: &ArticleQuery) -> Result<i64> {
        let country = query.country.clone();
        let search = query.search.as_deref().map(search_pattern);
        let count = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    &format!("SELECT COUNT(*) FROM articles a WHERE {ARTICLE_FILTER}"),
                    params![country, search],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Newest first, `limit` rows starting at `offset`.
    pub async fn list_articles(
        &self,
        query: &ArticleQuery,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Article>> {
        let country = query.country.clone();
        let search = query.search.as_deref().map(search_pattern);
        let articles = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    r#"SELECT a.id, s.name, d.name, a.author, a.title, a.description, a.url,
                              a.url_to_image, a.published_at, a.content, a.country, a.language,
                              a.category
                       FROM articles a
                       JOIN sources s ON a.source_id = s.id
                       JOIN domains d ON a.domain_id = d.id
                       WHERE {ARTICLE_FILTER}
                       ORDER BY a.published_at DESC, a.id DESC
                       LIMIT ?3 OFFSET ?4"#
                ))?;
                let articles = stmt
                    .query_map(params![country, search, limit, offset], article_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(articles)
            })
            .await?;
        Ok(articles)
    }

    // Favourite domains

    pub async fn favourite_domains(&self) -> Result<Vec<Domain>> {
        self.domains_where(true).await
    }

    pub async fn non_favourite_domains(&self) -> Result<Vec<Domain>> {
        self.domains_where(false).await
    }

    async fn domains_where(&self, favourite: bool) -> Result<Vec<Domain>> {
        let domains = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, favourite FROM domains WHERE favourite = ?1 ORDER BY name ASC",
                )?;
                let domains = stmt
                    .query_map(params![favourite], domain_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(domains)
            })
            .await?;
        Ok(domains)
    }

    pub async fn count_domains(&self, favourite: bool) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count = conn.query_row(
                    "SELECT COUNT(*) FROM domains WHERE favourite = ?1",
                    params![favourite],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    /// Flags the named domains as favourites. Unknown names are ignored.
    pub async fn set_favourites(&self, names: Vec<String>) -> Result<usize> {
        if names.is_empty() {
            return Ok(0);
        }
        let updated = self
            .conn
            .call(move |conn| Ok(mark_favourites(conn, &names)?))
            .await?;
        Ok(updated)
    }

    pub async fn reset_favourites(&self) -> Result<usize> {
        let updated = self
            .conn
            .call(|conn| Ok(conn.execute("UPDATE domains SET favourite = 0 WHERE favourite = 1", [])?))
            .await?;
        Ok(updated)
    }

    /// Makes `names` the complete favourite set in one transaction.
    pub async fn replace_favourites(&self, names: Vec<String>) -> Result<usize> {
        let updated = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("UPDATE domains SET favourite = 0 WHERE favourite = 1", [])?;
                let updated = if names.is_empty() {
                    0
                } else {
                    mark_favourites(&tx, &names)?
                };
                tx.commit()?;
                Ok(updated)
            })
            .await?;
        Ok(updated)
    }
}

fn mark_favourites(conn: &rusqlite::Connection, names: &[String]) -> rusqlite::Result<usize> {
    let placeholders = vec!["?"; names.len()].join(", ");
    conn.execute(
        &format!("UPDATE domains SET favourite = 1 WHERE name IN ({placeholders})"),
        params_from_iter(names.iter()),
    )
}

/// SQLite's `lower()` and `LIKE` only fold ASCII.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "lower_unicode",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| Ok(ctx.get::<Option<String>>(0)?.map(|s| s.to_lowercase())),
    )
}

fn search_pattern(search: &str) -> String {
    escape_like(&search.to_lowercase())
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn article_from_row(row: &Row) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        source: row.get(1)?,
        domain: row.get(2)?,
        author: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        url: row.get(6)?,
        url_to_image: row.get(7)?,
        published_at: parse_datetime(&row.get::<_, String>(8)?).unwrap_or_default(),
        content: row.get(9)?,
        country: row.get(10)?,
        language: row.get(11)?,
        category: row.get(12)?,
    })
}

fn domain_from_row(row: &Row) -> rusqlite::Result<Domain> {
    Ok(Domain {
        id: row.get(0)?,
        name: row.get(1)?,
        favourite: row.get::<_, i64>(2)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn temp_repo() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("news.db");
        let repo = Repository::connect(path.to_str().unwrap(), 1).await.unwrap();
        (dir, repo)
    }

    fn article(source_id: i64, domain_id: i64, title: &str, country: &str, hour: u32) -> NewArticle {
        NewArticle {
            source_id,
            domain_id,
            author: String::new(),
            title: title.to_string(),
            description: format!("about {title}"),
            url: format!("https://example.com/{hour}"),
            url_to_image: String::new(),
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
            content: String::new(),
            country: country.to_string(),
            language: String::new(),
            category: String::new(),
        }
    }

    #[tokio::test]
    async fn insert_or_get_returns_the_same_id() {
        let (_dir, repo) = temp_repo().await;

        let first = repo.insert_or_get(NamedTable::Sources, "Reuters").await.unwrap();
        let second = repo.insert_or_get(NamedTable::Sources, "Reuters").await.unwrap();
        let other = repo.insert_or_get(NamedTable::Sources, "reuters").await.unwrap();

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(repo.lookup_by_name(NamedTable::Sources, "Reuters").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn insert_named_rejects_duplicates() {
        let (_dir, repo) = temp_repo().await;

        let id = repo.insert_named(NamedTable::Domains, "ansa.it").await.unwrap();
        assert!(repo.insert_named(NamedTable::Domains, "ansa.it").await.is_err());

        let rows = repo.lookup_by_name(NamedTable::Domains, "ansa.it").await.unwrap();
        assert_eq!(rows, vec![NamedRow { id, name: "ansa.it".to_string() }]);
        assert_eq!(repo.domain_id("ansa.it").await.unwrap(), Some(id));
        assert_eq!(repo.domain_id("rainews.it").await.unwrap(), None);
    }

    #[tokio::test]
    async fn upsert_keeps_the_favourite_flag() {
        let (_dir, repo) = temp_repo().await;

        let id = repo.insert_or_get(NamedTable::Domains, "corriere.it").await.unwrap();
        repo.set_favourites(vec!["corriere.it".to_string()]).await.unwrap();
        assert_eq!(repo.insert_or_get(NamedTable::Domains, "corriere.it").await.unwrap(), id);

        let favourites = repo.favourite_domains().await.unwrap();
        assert_eq!(favourites.len(), 1);
        assert!(favourites[0].favourite);
    }

    #[tokio::test]
    async fn articles_filter_by_country_and_search() {
        let (_dir, repo) = temp_repo().await;
        let source = repo.insert_or_get(NamedTable::Sources, "Ansa").await.unwrap();
        let domain = repo.insert_or_get(NamedTable::Domains, "ansa.it").await.unwrap();

        repo.insert_article(article(source, domain, "Elezioni a Roma", "Italy", 8)).await.unwrap();
        repo.insert_article(article(source, domain, "Bushfire update", "Australia", 9)).await.unwrap();
        repo.insert_article(article(source, domain, "ROMA derby", "Italy", 10)).await.unwrap();

        let all = ArticleQuery::default();
        assert_eq!(repo.count_articles(&all).await.unwrap(), 3);

        let listed = repo.list_articles(&all, 10, 0).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["ROMA derby", "Bushfire update", "Elezioni a Roma"]);
        assert_eq!(listed[0].source, "Ansa");
        assert_eq!(listed[0].domain, "ansa.it");

        let italy = ArticleQuery::new(Some("Italy".to_string()), None);
        assert_eq!(repo.count_articles(&italy).await.unwrap(), 2);

        let roma = ArticleQuery::new(None, Some("roma".to_string()));
        assert_eq!(repo.count_articles(&roma).await.unwrap(), 2);

        let by_description = ArticleQuery::new(Some("Australia".to_string()), Some("ABOUT".to_string()));
        assert_eq!(repo.count_articles(&by_description).await.unwrap(), 1);

        let page = repo.list_articles(&all, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "Bushfire update");
    }

    #[tokio::test]
    async fn search_treats_wildcards_literally() {
        let (_dir, repo) = temp_repo().await;
        let source = repo.insert_or_get(NamedTable::Sources, "Ansa").await.unwrap();
        let domain = repo.insert_or_get(NamedTable::Domains, "ansa.it").await.unwrap();
        repo.insert_article(article(source, domain, "Inflation at 5%", "Italy", 8)).await.unwrap();
        repo.insert_article(article(source, domain, "Inflation falls", "Italy", 9)).await.unwrap();

        let query = ArticleQuery::new(None, Some("5%".to_string()));
        assert_eq!(repo.count_articles(&query).await.unwrap(), 1);

        let query = ArticleQuery::new(None, Some("%".to_string()));
        assert_eq!(repo.count_articles(&query).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_folds_accented_letters() {
        let (_dir, repo) = temp_repo().await;
        let source = repo.insert_or_get(NamedTable::Sources, "Ansa").await.unwrap();
        let domain = repo.insert_or_get(NamedTable::Domains, "ansa.it").await.unwrap();
        repo.insert_article(article(source, domain, "Perché la città è chiusa", "Italy", 8))
            .await
            .unwrap();
        repo.insert_article(article(source, domain, "ÉLECTIONS À PARIS", "France", 9))
            .await
            .unwrap();

        for needle in ["città", "CITTÀ", "Città", "perché"] {
            let query = ArticleQuery::new(None, Some(needle.to_string()));
            assert_eq!(repo.count_articles(&query).await.unwrap(), 1, "{needle}");
        }

        let query = ArticleQuery::new(None, Some("élections à".to_string()));
        let found = repo.list_articles(&query, 10, 0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].country, "France");
    }

    #[tokio::test]
    async fn favourites_are_replaced_atomically() {
        let (_dir, repo) = temp_repo().await;
        for name in ["ansa.it", "corriere.it", "rainews.it"] {
            repo.insert_or_get(NamedTable::Domains, name).await.unwrap();
        }

        let marked = repo
            .set_favourites(vec!["ansa.it".to_string(), "unknown.org".to_string()])
            .await
            .unwrap();
        assert_eq!(marked, 1);
        assert_eq!(repo.count_domains(true).await.unwrap(), 1);

        let marked = repo
            .replace_favourites(vec!["corriere.it".to_string(), "rainews.it".to_string()])
            .await
            .unwrap();
        assert_eq!(marked, 2);

        let names: Vec<_> = repo
            .favourite_domains()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["corriere.it", "rainews.it"]);
        assert_eq!(repo.non_favourite_domains().await.unwrap()[0].name, "ansa.it");

        assert_eq!(repo.reset_favourites().await.unwrap(), 2);
        assert_eq!(repo.count_domains(true).await.unwrap(), 0);
        assert_eq!(repo.count_domains(false).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn favourite_names_are_bound_not_interpolated() {
        let (_dir, repo) = temp_repo().await;
        repo.insert_or_get(NamedTable::Domains, "ansa.it").await.unwrap();

        let hostile = "x') OR 1=1 --".to_string();
        assert_eq!(repo.set_favourites(vec![hostile]).await.unwrap(), 0);
        assert_eq!(repo.count_domains(true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn connect_gives_up_after_the_retry_budget() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("news.db");

        let err = Repository::connect_with_delay(path.to_str().unwrap(), 2, Duration::from_millis(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Connection { attempts: 2, .. }));
        assert!(err.is_storage());
    }
}

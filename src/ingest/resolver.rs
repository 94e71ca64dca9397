use std::sync::Arc;

use crate::db::{NamedTable, Repository};
use crate::error::Result;

/// Maps source and domain names to their stable row ids, creating rows on
/// first sighting.
#[derive(Clone)]
pub struct Resolver {
    repository: Arc<Repository>,
}

impl Resolver {
    pub fn new(repository: Arc<Repository>) -> Self {
        Self { repository }
    }

    pub async fn resolve_source(&self, name: &str) -> Result<i64> {
        self.resolve(NamedTable::Sources, name).await
    }

    pub async fn resolve_domain(&self, name: &str) -> Result<i64> {
        self.resolve(NamedTable::Domains, name).await
    }

    // Exact, case-sensitive match on the name. The lookup serves the common
    // case; the upsert covers first sightings and concurrent writers.
    async fn resolve(&self, table: NamedTable, name: &str) -> Result<i64> {
        if let Some(row) = self.repository.lookup_by_name(table, name).await?.first() {
            tracing::trace!(?table, id = row.id, name = %row.name, "Known identifier");
            return Ok(row.id);
        }
        let id = self.repository.insert_or_get(table, name).await?;
        tracing::debug!(?table, name, id, "New identifier");
        Ok(id)
    }
}

/// Ledger context and dependency injection
use crate::{
    attachments::{ActorManager, EvidenceManager},
    case_file::CaseFileManager,
    config::LedgerConfig,
    db,
    entry::{EntryStore, DEFAULT_PAGE_SIZE},
    error::LedgerResult,
    punishment::PunishmentManager,
    relations::RelationManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Context holding the pool and every manager over it
#[derive(Clone)]
pub struct LedgerContext {
    pub db: SqlitePool,
    pub entries: Arc<EntryStore>,
    pub actors: Arc<ActorManager>,
    pub evidence: Arc<EvidenceManager>,
    pub relations: Arc<RelationManager>,
    pub punishments: Arc<PunishmentManager>,
    pub case_files: Arc<CaseFileManager>,
}

impl LedgerContext {
    /// Open the configured database, migrate it and wire up the managers
    pub async fn new(config: &LedgerConfig) -> LedgerResult<Self> {
        // Validate configuration
        config.validate()?;

        let pool = db::create_pool(&config.storage.ledger_db, config.database_options()).await?;

        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Ok(Self::build(pool, config.query.page_size))
    }

    /// Wrap an already migrated pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self::build(pool, DEFAULT_PAGE_SIZE)
    }

    /// Private in-memory ledger, migrated and ready
    pub async fn in_memory() -> LedgerResult<Self> {
        let pool = db::create_memory_pool().await?;
        db::run_migrations(&pool).await?;

        Ok(Self::from_pool(pool))
    }

    fn build(pool: SqlitePool, page_size: usize) -> Self {
        Self {
            entries: Arc::new(EntryStore::new(pool.clone()).with_page_size(page_size)),
            actors: Arc::new(ActorManager::new(pool.clone())),
            evidence: Arc::new(EvidenceManager::new(pool.clone())),
            relations: Arc::new(RelationManager::new(pool.clone())),
            punishments: Arc::new(PunishmentManager::new(pool.clone())),
            case_files: Arc::new(CaseFileManager::new(pool.clone())),
            db: pool,
        }
    }

    /// Entry counts per variant, for startup summaries
    pub async fn variant_counts(&self) -> LedgerResult<Vec<(String, i64)>> {
        let counts: Vec<(String, i64)> = sqlx::query_as(
            "SELECT variant, COUNT(*) FROM moderation_entries GROUP BY variant ORDER BY variant",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::entry::{EntryDraft, Extension};
    use crate::registry::Variant;
    use crate::types::PlayerId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_file_backed_context() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("nested").join("ledger.sqlite");
        let db_location = db_path.to_string_lossy().to_string();

        let config = LedgerConfig::from_lookup(|key| match key {
            "LEDGER_DB_LOCATION" => Some(db_location.clone()),
            _ => None,
        })
        .unwrap();

        let ctx = LedgerContext::new(&config).await.unwrap();
        ctx.entries
            .create(Variant::Commendation, EntryDraft::new(PlayerId(1), Utc::now()), Extension::Remark)
            .await
            .unwrap();

        assert!(db_path.exists());
        assert_eq!(
            ctx.variant_counts().await.unwrap(),
            vec![("commendation".to_string(), 1)]
        );
    }
}

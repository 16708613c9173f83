/// Actor attribution
use crate::{
    audit::{self, AuditAction},
    db,
    error::{LedgerError, LedgerResult},
    types::{EntryId, PlayerId},
    validation::{Checker, MAX_ROLE_LEN},
};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

/// A participant in a case and the role they played
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorAttribution {
    pub index: i64,
    pub actor: PlayerId,
    pub role: String,
    /// Acted as staff rather than as a regular player
    pub as_admin: bool,
}

/// Actor manager
#[derive(Clone)]
pub struct ActorManager {
    db: SqlitePool,
}

impl ActorManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append an actor to an entry. Returns the ordinal assigned.
    pub async fn add_actor(
        &self,
        entry_id: EntryId,
        actor: PlayerId,
        role: &str,
        as_admin: bool,
    ) -> LedgerResult<i64> {
        let mut check = Checker::new();
        check.non_empty("role", role, MAX_ROLE_LEN);
        check.into_ledger_result()?;

        let mut tx = db::begin_write(&self.db).await?;

        // Existence check first so a missing entry is NotFound, not a FK error
        audit::touch(
            &mut tx,
            entry_id,
            AuditAction::ActorAdded,
            Some(actor),
            Some(role),
        )
        .await?;

        let index: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO entry_actors (entry_id, idx, actor_id, role, as_admin)
            SELECT ?, COALESCE(MAX(idx) + 1, 0), ?, ?, ?
            FROM entry_actors
            WHERE entry_id = ?
            RETURNING idx
            "#,
        )
        .bind(entry_id.0)
        .bind(actor.to_db())
        .bind(role)
        .bind(as_admin)
        .bind(entry_id.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LedgerError::from_insert(e, "Actor ordinal"))?;

        tx.commit().await?;

        tracing::debug!("Actor {} added to entry {} as {} (#{})", actor, entry_id, role, index);

        Ok(index)
    }

    /// Actors of an entry in ordinal order
    pub async fn list_actors(&self, entry_id: EntryId) -> LedgerResult<Vec<ActorAttribution>> {
        let rows = sqlx::query(
            r#"
            SELECT idx, actor_id, role, as_admin
            FROM entry_actors
            WHERE entry_id = ?
            ORDER BY idx
            "#,
        )
        .bind(entry_id.0)
        .fetch_all(&self.db)
        .await?;

        let mut actors = Vec::with_capacity(rows.len());
        for row in rows {
            actors.push(ActorAttribution {
                index: row.try_get("idx")?,
                actor: PlayerId::from_db(row.try_get("actor_id")?),
                role: row.try_get("role")?,
                as_admin: row.try_get("as_admin")?,
            });
        }

        Ok(actors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::entry::{EntryDraft, EntryStore, Extension};
    use crate::registry::Variant;
    use chrono::Utc;

    #[tokio::test]
    async fn test_actors_keep_insertion_order() {
        let pool = test_pool().await;
        let entries = EntryStore::new(pool.clone());
        let actors = ActorManager::new(pool);

        let id = entries
            .create(Variant::Note, EntryDraft::new(PlayerId(1), Utc::now()), Extension::Remark)
            .await
            .unwrap();

        assert_eq!(actors.add_actor(id, PlayerId(10), "reporter", false).await.unwrap(), 0);
        assert_eq!(actors.add_actor(id, PlayerId(11), "moderator", true).await.unwrap(), 1);
        assert_eq!(actors.add_actor(id, PlayerId(10), "witness", false).await.unwrap(), 2);

        let listed = actors.list_actors(id).await.unwrap();
        let roles: Vec<_> = listed.iter().map(|a| a.role.as_str()).collect();
        assert_eq!(roles, vec!["reporter", "moderator", "witness"]);
        assert!(listed[1].as_admin);

        assert_eq!(entries.get(id).await.unwrap().base.version, 3);
    }

    #[tokio::test]
    async fn test_add_actor_to_missing_entry() {
        let actors = ActorManager::new(test_pool().await);

        let err = actors
            .add_actor(EntryId(77), PlayerId(1), "moderator", true)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_role_is_validated() {
        let actors = ActorManager::new(test_pool().await);

        let err = actors
            .add_actor(EntryId(1), PlayerId(1), &"r".repeat(65), false)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }
}

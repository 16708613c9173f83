/// Relation graph between entries
///
/// Four edge kinds, each in its own link table. `related_entries` is
/// undirected and stored once with the smaller id first; the other three are
/// directed. Traversals work from either end.
use crate::{
    audit::{self, AuditAction},
    db,
    entry::store::expect_variant,
    error::{LedgerError, LedgerResult},
    registry::{LinkKind, Variant},
    types::{EntryId, PlayerId},
};
use sqlx::{SqliteConnection, SqlitePool};

/// Relation manager
#[derive(Clone)]
pub struct RelationManager {
    db: SqlitePool,
}

impl RelationManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Mark two entries as related. Symmetric and idempotent.
    pub async fn link_related(&self, a: EntryId, b: EntryId) -> LedgerResult<bool> {
        if a == b {
            return Err(LedgerError::Validation(format!(
                "Entry {} cannot be related to itself",
                a
            )));
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };

        self.link(LinkKind::Related, lo, hi, |_| true, |_| true).await
    }

    /// Link an appeal to the entry it concerns
    pub async fn link_appeal(&self, entry: EntryId, appeal: EntryId) -> LedgerResult<bool> {
        self.link(LinkKind::Appeal, entry, appeal, |_| true, |v| v == Variant::Appeal)
            .await
    }

    /// Link a report to the entry it led to
    pub async fn link_report(&self, entry: EntryId, report: EntryId) -> LedgerResult<bool> {
        self.link(LinkKind::Report, entry, report, |_| true, |v| v.is_report())
            .await
    }

    /// Record that an appeal covers a punishment
    pub async fn link_appeal_punishment(
        &self,
        appeal: EntryId,
        punishment: EntryId,
    ) -> LedgerResult<bool> {
        self.link(
            LinkKind::AppealPunishment,
            appeal,
            punishment,
            |v| v == Variant::Appeal,
            |v| v.is_punishment(),
        )
        .await
    }

    pub async fn unlink_related(&self, a: EntryId, b: EntryId) -> LedgerResult<bool> {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.unlink(LinkKind::Related, lo, hi).await
    }

    pub async fn unlink_appeal(&self, entry: EntryId, appeal: EntryId) -> LedgerResult<bool> {
        self.unlink(LinkKind::Appeal, entry, appeal).await
    }

    pub async fn unlink_report(&self, entry: EntryId, report: EntryId) -> LedgerResult<bool> {
        self.unlink(LinkKind::Report, entry, report).await
    }

    pub async fn unlink_appeal_punishment(
        &self,
        appeal: EntryId,
        punishment: EntryId,
    ) -> LedgerResult<bool> {
        self.unlink(LinkKind::AppealPunishment, appeal, punishment).await
    }

    /// Entries related to `id`, from either side of the stored pair
    pub async fn related_of(&self, id: EntryId) -> LedgerResult<Vec<EntryId>> {
        let ids: Vec<i64> = sqlx::query_scalar(
            r#"
            SELECT entry_b AS other FROM related_entries WHERE entry_a = ?
            UNION
            SELECT entry_a AS other FROM related_entries WHERE entry_b = ?
            ORDER BY other
            "#,
        )
        .bind(id.0)
        .bind(id.0)
        .fetch_all(&self.db)
        .await?;

        Ok(ids.into_iter().map(EntryId).collect())
    }

    /// Appeals linked to an entry
    pub async fn appeals_of(&self, entry: EntryId) -> LedgerResult<Vec<EntryId>> {
        self.targets(LinkKind::Appeal, entry).await
    }

    /// Reports linked to an entry
    pub async fn reports_of(&self, entry: EntryId) -> LedgerResult<Vec<EntryId>> {
        self.targets(LinkKind::Report, entry).await
    }

    /// Punishments an appeal covers
    pub async fn punishments_of(&self, appeal: EntryId) -> LedgerResult<Vec<EntryId>> {
        self.targets(LinkKind::AppealPunishment, appeal).await
    }

    /// Appeals covering a punishment
    pub async fn appeals_covering(&self, punishment: EntryId) -> LedgerResult<Vec<EntryId>> {
        self.sources(LinkKind::AppealPunishment, punishment).await
    }

    async fn link(
        &self,
        kind: LinkKind,
        source: EntryId,
        target: EntryId,
        source_ok: impl Fn(Variant) -> bool,
        target_ok: impl Fn(Variant) -> bool,
    ) -> LedgerResult<bool> {
        let mut tx = db::begin_write(&self.db).await?;

        expect_variant(&mut tx, source, expected_source(kind), source_ok).await?;
        expect_variant(&mut tx, target, expected_target(kind), target_ok).await?;

        let (src_col, dst_col) = kind.columns();
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
            kind.table(),
            src_col,
            dst_col
        );
        let inserted = sqlx::query(&sql)
            .bind(source.0)
            .bind(target.0)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if inserted {
            let detail = format!("{} {} -> {}", kind.as_str(), source, target);
            audit::touch(&mut tx, source, AuditAction::Linked, None, Some(&detail)).await?;
            audit::touch(&mut tx, target, AuditAction::Linked, None, Some(&detail)).await?;
        }

        tx.commit().await?;

        if inserted {
            tracing::debug!("Linked {} {} -> {}", kind.as_str(), source, target);
        }

        Ok(inserted)
    }

    async fn unlink(&self, kind: LinkKind, source: EntryId, target: EntryId) -> LedgerResult<bool> {
        let mut tx = db::begin_write(&self.db).await?;

        let (src_col, dst_col) = kind.columns();
        let sql = format!(
            "DELETE FROM {} WHERE {} = ? AND {} = ?",
            kind.table(),
            src_col,
            dst_col
        );
        let removed = sqlx::query(&sql)
            .bind(source.0)
            .bind(target.0)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if removed {
            let detail = format!("{} {} -> {}", kind.as_str(), source, target);
            audit::touch(&mut tx, source, AuditAction::Unlinked, None, Some(&detail)).await?;
            audit::touch(&mut tx, target, AuditAction::Unlinked, None, Some(&detail)).await?;
        }

        tx.commit().await?;

        Ok(removed)
    }

    async fn targets(&self, kind: LinkKind, source: EntryId) -> LedgerResult<Vec<EntryId>> {
        let (src_col, dst_col) = kind.columns();
        let sql = format!(
            "SELECT {dst} FROM {table} WHERE {src} = ? ORDER BY {dst}",
            dst = dst_col,
            src = src_col,
            table = kind.table()
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(source.0)
            .fetch_all(&self.db)
            .await?;

        Ok(ids.into_iter().map(EntryId).collect())
    }

    async fn sources(&self, kind: LinkKind, target: EntryId) -> LedgerResult<Vec<EntryId>> {
        let (src_col, dst_col) = kind.columns();
        let sql = format!(
            "SELECT {src} FROM {table} WHERE {dst} = ? ORDER BY {src}",
            dst = dst_col,
            src = src_col,
            table = kind.table()
        );
        let ids: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(target.0)
            .fetch_all(&self.db)
            .await?;

        Ok(ids.into_iter().map(EntryId).collect())
    }
}

fn expected_source(kind: LinkKind) -> &'static str {
    match kind {
        LinkKind::AppealPunishment => "appeal",
        _ => "entry",
    }
}

fn expected_target(kind: LinkKind) -> &'static str {
    match kind {
        LinkKind::Related => "entry",
        LinkKind::Appeal => "appeal",
        LinkKind::Report => "report",
        LinkKind::AppealPunishment => "punishment",
    }
}

/// Remove every edge mentioning `id`, on either end, for link kinds that
/// cascade. Runs inside the caller's delete transaction. Returns the number
/// of edges removed.
pub(crate) async fn cascade_links(
    conn: &mut SqliteConnection,
    id: EntryId,
    actor: PlayerId,
) -> LedgerResult<u64> {
    let mut removed = 0;

    for kind in LinkKind::ALL {
        let (src_col, dst_col) = kind.columns();

        if !kind.cascades_on_delete() {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ? OR {} = ?",
                kind.table(),
                src_col,
                dst_col
            );
            let remaining: i64 = sqlx::query_scalar(&sql)
                .bind(id.0)
                .bind(id.0)
                .fetch_one(&mut *conn)
                .await?;
            if remaining > 0 {
                return Err(LedgerError::Conflict(format!(
                    "Entry {} still has {} {} link(s)",
                    id,
                    remaining,
                    kind.as_str()
                )));
            }
            continue;
        }

        let sql = format!(
            "DELETE FROM {table} WHERE {src} = ? OR {dst} = ? RETURNING {src}, {dst}",
            table = kind.table(),
            src = src_col,
            dst = dst_col
        );
        let edges: Vec<(i64, i64)> = sqlx::query_as(&sql)
            .bind(id.0)
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await?;

        // surviving endpoints lose the edge too
        for (source, target) in edges {
            let (source, target) = (EntryId(source), EntryId(target));
            let partner = if source == id { target } else { source };
            if partner != id {
                let detail = format!("{} {} -> {} (entry {} deleted)", kind.as_str(), source, target, id);
                audit::touch(&mut *conn, partner, AuditAction::Unlinked, Some(actor), Some(&detail))
                    .await?;
            }
            removed += 1;
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::entry::{AppealExt, DurationPunishment, EntryDraft, EntryStore, Extension, ReportExt};
    use chrono::Utc;

    struct Fixture {
        entries: EntryStore,
        relations: RelationManager,
    }

    impl Fixture {
        async fn new() -> Self {
            let pool = test_pool().await;
            Self {
                entries: EntryStore::new(pool.clone()),
                relations: RelationManager::new(pool),
            }
        }

        async fn create(&self, variant: Variant, extension: Extension) -> EntryId {
            self.entries
                .create(variant, EntryDraft::new(PlayerId(42), Utc::now()), extension)
                .await
                .unwrap()
        }

        async fn note(&self) -> EntryId {
            self.create(Variant::Note, Extension::Remark).await
        }

        async fn ban(&self) -> EntryId {
            self.create(Variant::Ban, Extension::Duration(DurationPunishment::new(3600)))
                .await
        }

        async fn appeal(&self) -> EntryId {
            self.create(Variant::Appeal, Extension::Appeal(AppealExt::pending("ticket-1")))
                .await
        }
    }

    #[tokio::test]
    async fn test_related_is_symmetric_and_idempotent() {
        let f = Fixture::new().await;
        let a = f.note().await;
        let b = f.note().await;

        assert!(f.relations.link_related(b, a).await.unwrap());
        assert!(!f.relations.link_related(a, b).await.unwrap());

        assert_eq!(f.relations.related_of(a).await.unwrap(), vec![b]);
        assert_eq!(f.relations.related_of(b).await.unwrap(), vec![a]);

        let stored: (i64, i64) = sqlx::query_as("SELECT entry_a, entry_b FROM related_entries")
            .fetch_one(&f.relations.db)
            .await
            .unwrap();
        assert_eq!(stored, (a.0, b.0));
    }

    #[tokio::test]
    async fn test_self_link_rejected() {
        let f = Fixture::new().await;
        let a = f.note().await;

        assert!(matches!(
            f.relations.link_related(a, a).await.unwrap_err(),
            LedgerError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn test_appeal_punishment_traversal_both_ways() {
        let f = Fixture::new().await;
        let ban = f.ban().await;
        let appeal = f.appeal().await;

        f.relations.link_appeal_punishment(appeal, ban).await.unwrap();

        assert_eq!(f.relations.punishments_of(appeal).await.unwrap(), vec![ban]);
        assert_eq!(f.relations.appeals_covering(ban).await.unwrap(), vec![appeal]);
    }

    #[tokio::test]
    async fn test_link_kind_checks() {
        let f = Fixture::new().await;
        let note = f.note().await;
        let ban = f.ban().await;
        let appeal = f.appeal().await;

        assert!(matches!(
            f.relations.link_appeal(ban, note).await.unwrap_err(),
            LedgerError::WrongEntryKind { expected: "appeal", .. }
        ));
        assert!(matches!(
            f.relations.link_report(ban, appeal).await.unwrap_err(),
            LedgerError::WrongEntryKind { expected: "report", .. }
        ));
        assert!(matches!(
            f.relations.link_appeal_punishment(appeal, note).await.unwrap_err(),
            LedgerError::WrongEntryKind { expected: "punishment", .. }
        ));
        assert!(matches!(
            f.relations.link_appeal_punishment(ban, ban).await.unwrap_err(),
            LedgerError::WrongEntryKind { expected: "appeal", .. }
        ));
        assert!(matches!(
            f.relations.link_appeal(ban, EntryId(999)).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unlink_is_idempotent() {
        let f = Fixture::new().await;
        let ban = f.ban().await;
        let report = f
            .create(Variant::ChatAbuseReport, Extension::Report(ReportExt::default()))
            .await;

        f.relations.link_report(ban, report).await.unwrap();
        assert_eq!(f.relations.reports_of(ban).await.unwrap(), vec![report]);

        assert!(f.relations.unlink_report(ban, report).await.unwrap());
        assert!(!f.relations.unlink_report(ban, report).await.unwrap());
        assert!(f.relations.reports_of(ban).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_every_link() {
        let f = Fixture::new().await;
        let ban = f.ban().await;
        let appeal = f.appeal().await;
        let other = f.note().await;

        f.relations.link_appeal(ban, appeal).await.unwrap();
        f.relations.link_appeal_punishment(appeal, ban).await.unwrap();
        f.relations.link_related(ban, other).await.unwrap();

        let summary = f.entries.delete(ban, PlayerId(1)).await.unwrap();
        assert_eq!(summary.links_removed, 3);

        assert!(f.relations.related_of(other).await.unwrap().is_empty());
        assert!(f.relations.punishments_of(appeal).await.unwrap().is_empty());

        for kind in LinkKind::ALL {
            let (src, dst) = kind.columns();
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = ? OR {} = ?",
                kind.table(),
                src,
                dst
            );
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(ban.0)
                .bind(ban.0)
                .fetch_one(&f.relations.db)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} links remain", kind.as_str());
        }
    }

    #[tokio::test]
    async fn test_delete_audits_surviving_endpoints() {
        let f = Fixture::new().await;
        let ban = f.ban().await;
        let appeal = f.appeal().await;
        let other = f.note().await;

        f.relations.link_appeal(ban, appeal).await.unwrap();
        f.relations.link_appeal_punishment(appeal, ban).await.unwrap();
        f.relations.link_related(ban, other).await.unwrap();
        let appeal_version = f.entries.get(appeal).await.unwrap().base.version;
        let other_version = f.entries.get(other).await.unwrap().base.version;

        f.entries.delete(ban, PlayerId(9)).await.unwrap();

        // one bump per removed edge
        assert_eq!(f.entries.get(appeal).await.unwrap().base.version, appeal_version + 2);
        assert_eq!(f.entries.get(other).await.unwrap().base.version, other_version + 1);

        let history = f.entries.history(other).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.action, AuditAction::Unlinked);
        assert_eq!(last.actor, Some(PlayerId(9)));
        assert_eq!(last.version, other_version + 1);
    }
}

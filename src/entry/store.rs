/// Entry Store - base rows plus their polymorphic extension
use crate::{
    audit::{self, AuditAction, AuditRecord},
    db::{self, encode_ts},
    entry::{
        extension::{self, AppealOutcome, Extension},
        model::{EntryBase, EntryDraft, ModerationEntry, BASE_COLUMNS},
        query::{page_query, Cursor, EntryFilter, PageState, DEFAULT_PAGE_SIZE},
    },
    error::{LedgerError, LedgerResult},
    registry::Variant,
    relations,
    types::{EntryId, PlayerId},
    validation::{validate_draft, validate_extension, validation_errors_to_ledger_error},
};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

/// Optional references to other entries, cleared by `ON DELETE SET NULL`.
/// An accepted report whose report is deleted keeps its own record with no
/// report link.
const NULLABLE_REFERENCES: [(&str, &str); 3] = [
    ("ext_accepted_report", "accepted_report_id"),
    ("report_teamkills", "teamkill_entry_id"),
    ("report_vehicle_teamkills", "vehicle_teamkill_entry_id"),
];

/// Outcome of a hard delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub entry_id: EntryId,
    pub variant: Variant,
    pub links_removed: u64,
}

/// Entry store
#[derive(Clone)]
pub struct EntryStore {
    db: SqlitePool,
    page_size: usize,
}

impl EntryStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Persist a new entry and its extension in one transaction
    pub async fn create(
        &self,
        variant: Variant,
        draft: EntryDraft,
        extension: Extension,
    ) -> LedgerResult<EntryId> {
        if extension.shape() != variant.shape() {
            return Err(LedgerError::VariantMismatch {
                variant,
                shape: extension.shape().name(),
            });
        }

        let mut errors = Vec::new();
        if let Err(mut e) = validate_draft(&draft) {
            errors.append(&mut e);
        }
        if let Err(mut e) = validate_extension(&extension) {
            errors.append(&mut e);
        }
        if !errors.is_empty() {
            return Err(validation_errors_to_ledger_error(errors));
        }

        let (Some(subject), Some(issued_at)) = (draft.subject, draft.issued_at) else {
            return Err(LedgerError::Validation(
                "subject and issued_at are required".to_string(),
            ));
        };

        let mut tx = db::begin_write(&self.db).await?;

        if let Extension::AcceptedReport(accepted) = &extension {
            if let Some(report_id) = accepted.accepted_report {
                let target = variant_of(&mut tx, report_id).await?;
                if !target.is_report() {
                    return Err(LedgerError::WrongEntryKind {
                        entry_id: report_id,
                        expected: "report",
                        found: target,
                    });
                }
            }
        }

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO moderation_entries
            (subject_id, variant, message, is_legacy, legacy_id, issued_at, resolved_at,
             pending_reputation, reputation, relevant_logs_begin, relevant_logs_end, message_ref)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(subject.to_db())
        .bind(variant.as_str())
        .bind(&draft.message)
        .bind(draft.is_legacy)
        .bind(draft.legacy_id)
        .bind(encode_ts(&issued_at))
        .bind(draft.resolved_at.as_ref().map(encode_ts))
        .bind(draft.pending_reputation)
        .bind(draft.reputation)
        .bind(draft.relevant_logs.as_ref().map(|w| encode_ts(&w.begin)))
        .bind(draft.relevant_logs.as_ref().map(|w| encode_ts(&w.end)))
        .bind(draft.message_ref.map(|r| r as i64))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LedgerError::from_insert(e, "Legacy entry"))?;

        let entry_id = EntryId(id);
        extension::insert(&mut tx, entry_id, &extension).await?;
        audit::append(&mut tx, entry_id, 0, AuditAction::Created, None, None).await?;

        tx.commit().await?;

        tracing::info!("Created {} entry {} for subject {}", variant, entry_id, subject);

        Ok(entry_id)
    }

    /// Load an entry, resolving its variant from the base row
    pub async fn get(&self, id: EntryId) -> LedgerResult<ModerationEntry> {
        self.find(id)
            .await?
            .ok_or_else(|| LedgerError::entry_not_found(id))
    }

    pub async fn find(&self, id: EntryId) -> LedgerResult<Option<ModerationEntry>> {
        let mut tx = self.db.begin().await?;
        let entry = load_entry(&mut tx, id).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Lazily page through matching entries.
    ///
    /// Pages are fetched on demand using keyset pagination, each inside its own
    /// read transaction. Calling again restarts from the beginning.
    pub fn get_many(&self, filter: EntryFilter) -> BoxStream<'static, LedgerResult<ModerationEntry>> {
        let store = self.clone();
        let page_size = self.page_size;

        stream::try_unfold(PageState::Start, move |state| {
            let store = store.clone();
            let filter = filter.clone();
            async move {
                let after = match state {
                    PageState::Done => return Ok::<_, LedgerError>(None),
                    PageState::Start => None,
                    PageState::After(cursor) => Some(cursor),
                };

                let page = store.fetch_page(&filter, after.as_ref(), page_size).await?;
                let next = match page.last() {
                    None => return Ok(None),
                    Some(_) if page.len() < page_size => PageState::Done,
                    Some(last) => PageState::After(Cursor::after(last)),
                };

                Ok(Some((stream::iter(page.into_iter().map(Ok::<_, LedgerError>)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    /// Collect up to `limit` matching entries
    pub async fn list(&self, filter: EntryFilter, limit: usize) -> LedgerResult<Vec<ModerationEntry>> {
        self.get_many(filter).take(limit).try_collect().await
    }

    async fn fetch_page(
        &self,
        filter: &EntryFilter,
        after: Option<&Cursor>,
        limit: usize,
    ) -> LedgerResult<Vec<ModerationEntry>> {
        let mut tx = self.db.begin().await?;

        let rows = page_query(filter, after, limit)
            .build()
            .fetch_all(&mut *tx)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let base = EntryBase::from_row(&row)?;
            let extension = extension::load(&mut tx, base.id, base.variant.shape()).await?;
            entries.push(ModerationEntry { base, extension });
        }

        tx.commit().await?;

        Ok(entries)
    }

    /// Soft-remove an entry. Returns false when it was already removed.
    pub async fn update_removal(
        &self,
        id: EntryId,
        removed_by: PlayerId,
        reason: Option<&str>,
    ) -> LedgerResult<bool> {
        if let Some(reason) = reason {
            if reason.chars().count() > crate::validation::MAX_REASON_LEN {
                return Err(LedgerError::Validation(
                    "Removal reason exceeds maximum length".to_string(),
                ));
            }
        }

        let mut tx = db::begin_write(&self.db).await?;

        let result = sqlx::query(
            r#"
            UPDATE moderation_entries
            SET removed = 1,
                removed_by = ?,
                removed_at = ?,
                removed_reason = ?
            WHERE id = ? AND removed = 0
            "#,
        )
        .bind(removed_by.to_db())
        .bind(encode_ts(&Utc::now()))
        .bind(reason)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Either missing or already removed; the latter is a no-op
            variant_of(&mut tx, id).await?;
            return Ok(false);
        }

        audit::touch(&mut tx, id, AuditAction::Removed, Some(removed_by), reason).await?;
        tx.commit().await?;

        tracing::info!("Entry {} removed by {}", id, removed_by);

        Ok(true)
    }

    /// Replace the free-text message if the entry is still at
    /// `expected_version`. Returns the new version.
    pub async fn update_message(
        &self,
        id: EntryId,
        message: Option<&str>,
        expected_version: i64,
        edited_by: PlayerId,
    ) -> LedgerResult<i64> {
        if let Some(message) = message {
            if message.chars().count() > crate::validation::MAX_MESSAGE_LEN {
                return Err(LedgerError::Validation(
                    "Message exceeds maximum length".to_string(),
                ));
            }
        }

        let mut tx = db::begin_write(&self.db).await?;

        let result = sqlx::query("UPDATE moderation_entries SET message = ? WHERE id = ? AND version = ?")
            .bind(message)
            .bind(id.0)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM moderation_entries WHERE id = ?")
                    .bind(id.0)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match actual {
                None => LedgerError::entry_not_found(id),
                Some(actual) => LedgerError::VersionConflict {
                    entry_id: id,
                    expected: expected_version,
                    actual,
                },
            });
        }

        let version = audit::touch(&mut tx, id, AuditAction::MessageEdited, Some(edited_by), None).await?;
        tx.commit().await?;

        Ok(version)
    }

    /// Record when a warned player saw their warning. Only the first
    /// acknowledgement is kept; returns false on repeats.
    pub async fn acknowledge_warning(&self, id: EntryId, at: DateTime<Utc>) -> LedgerResult<bool> {
        let mut tx = db::begin_write(&self.db).await?;
        expect_variant(&mut tx, id, "warning", |v| v == Variant::Warning).await?;

        let result = sqlx::query(
            "UPDATE ext_warning SET displayed_at = ? WHERE entry_id = ? AND displayed_at IS NULL",
        )
        .bind(encode_ts(&at))
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        audit::touch(&mut tx, id, AuditAction::WarningAcknowledged, None, None).await?;
        tx.commit().await?;

        Ok(true)
    }

    /// Set an appeal's outcome; accepted/rejected also stamp `resolved_at`
    pub async fn resolve_appeal(
        &self,
        id: EntryId,
        outcome: AppealOutcome,
        resolved_by: PlayerId,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let mut tx = db::begin_write(&self.db).await?;
        expect_variant(&mut tx, id, "appeal", |v| v == Variant::Appeal).await?;

        sqlx::query("UPDATE ext_appeal SET outcome = ? WHERE entry_id = ?")
            .bind(outcome.as_str())
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        let resolved_at = match outcome {
            AppealOutcome::Pending => None,
            AppealOutcome::Accepted | AppealOutcome::Rejected => Some(encode_ts(&at)),
        };
        sqlx::query("UPDATE moderation_entries SET resolved_at = ? WHERE id = ?")
            .bind(resolved_at)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        audit::touch(
            &mut tx,
            id,
            AuditAction::AppealResolved,
            Some(resolved_by),
            Some(outcome.as_str()),
        )
        .await?;
        tx.commit().await?;

        tracing::info!("Appeal {} resolved as {}", id, outcome.as_str());

        Ok(())
    }

    /// Hard delete: extension, attachments, report records and every link
    /// mentioning the entry go in one transaction.
    pub async fn delete(&self, id: EntryId, deleted_by: PlayerId) -> LedgerResult<DeleteSummary> {
        let mut tx = db::begin_write(&self.db).await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM moderation_entries WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let version = version.ok_or_else(|| LedgerError::entry_not_found(id))?;
        let variant = variant_of(&mut tx, id).await?;

        let links_removed = relations::cascade_links(&mut tx, id, deleted_by).await?;
        clear_references(&mut tx, id, deleted_by).await?;

        // Extension, actors, evidence and report records cascade via foreign keys
        sqlx::query("DELETE FROM moderation_entries WHERE id = ?")
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        audit::append(
            &mut tx,
            id,
            version + 1,
            AuditAction::Deleted,
            Some(deleted_by),
            Some(variant.as_str()),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Deleted {} entry {} ({} links removed)",
            variant,
            id,
            links_removed
        );

        Ok(DeleteSummary {
            entry_id: id,
            variant,
            links_removed,
        })
    }

    /// Audit trail of an entry, oldest first. Survives hard deletes.
    pub async fn history(&self, id: EntryId) -> LedgerResult<Vec<AuditRecord>> {
        let mut conn = self.db.acquire().await?;
        audit::history(&mut conn, id).await
    }
}

/// Record on every holder of a nullable reference to `id` that the
/// reference is about to be cleared.
async fn clear_references(conn: &mut SqliteConnection, id: EntryId, actor: PlayerId) -> LedgerResult<()> {
    for (table, column) in NULLABLE_REFERENCES {
        let sql = format!("SELECT DISTINCT entry_id FROM {} WHERE {} = ?", table, column);
        let holders: Vec<i64> = sqlx::query_scalar(&sql)
            .bind(id.0)
            .fetch_all(&mut *conn)
            .await?;

        let detail = format!("{} {} deleted", column, id);
        for holder in holders.into_iter().map(EntryId).filter(|h| *h != id) {
            audit::touch(
                &mut *conn,
                holder,
                AuditAction::ReferenceCleared,
                Some(actor),
                Some(&detail),
            )
            .await?;
        }
    }

    Ok(())
}

pub(crate) async fn load_entry(
    conn: &mut SqliteConnection,
    id: EntryId,
) -> LedgerResult<Option<ModerationEntry>> {
    let sql = format!("SELECT {} FROM moderation_entries WHERE id = ?", BASE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let base = EntryBase::from_row(&row)?;
    let extension = extension::load(conn, base.id, base.variant.shape()).await?;

    Ok(Some(ModerationEntry { base, extension }))
}

/// Variant tag of an existing entry
pub(crate) async fn variant_of(conn: &mut SqliteConnection, id: EntryId) -> LedgerResult<Variant> {
    let tag: Option<String> = sqlx::query_scalar("SELECT variant FROM moderation_entries WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;

    match tag {
        Some(tag) => Variant::from_str(&tag),
        None => Err(LedgerError::entry_not_found(id)),
    }
}

/// Variant of `id`, or `WrongEntryKind` if `accept` rejects it
pub(crate) async fn expect_variant(
    conn: &mut SqliteConnection,
    id: EntryId,
    expected: &'static str,
    accept: impl Fn(Variant) -> bool,
) -> LedgerResult<Variant> {
    let found = variant_of(conn, id).await?;
    if accept(found) {
        Ok(found)
    } else {
        Err(LedgerError::WrongEntryKind {
            entry_id: id,
            expected,
            found,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::entry::{
        AcceptedReportExt, AppealExt, AssetBanExt, DurationPunishment, MuteExt, MuteType,
        PresetType, ReportExt, TeamkillExt, WarningExt,
    };
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 18, 30, 0).unwrap()
    }

    async fn store() -> EntryStore {
        EntryStore::new(test_pool().await)
    }

    #[tokio::test]
    async fn test_create_get_round_trip_per_shape() {
        let store = store().await;
        let player = PlayerId(76561198000000001);

        let cases = vec![
            (Variant::Note, Extension::Remark),
            (
                Variant::Warning,
                Extension::Warning(WarningExt { displayed_at: None }),
            ),
            (
                Variant::Ban,
                Extension::Duration(
                    DurationPunishment::new(86_400).with_preset(PresetType::Griefing, 2),
                ),
            ),
            (
                Variant::Mute,
                Extension::Mute(MuteExt {
                    punishment: DurationPunishment::permanent(),
                    mute_type: MuteType::Both,
                }),
            ),
            (
                Variant::AssetBan,
                Extension::AssetBan(AssetBanExt {
                    punishment: DurationPunishment::new(3600),
                    vehicle_type_filter: vec!["jet".to_string(), "helicopter".to_string()],
                }),
            ),
            (
                Variant::Teamkill,
                Extension::Teamkill(TeamkillExt {
                    asset_id: Some("0b7e1a".to_string()),
                    asset_name: Some("Maplestrike".to_string()),
                    death_cause: Some("gun".to_string()),
                    limb: Some("skull".to_string()),
                    distance: Some(42.5),
                }),
            ),
            (
                Variant::Appeal,
                Extension::Appeal(AppealExt {
                    ticket_id: "ticket-1182".to_string(),
                    outcome: AppealOutcome::Pending,
                    discord_id: Some(u64::MAX - 1),
                }),
            ),
            (
                Variant::CheatingReport,
                Extension::Report(ReportExt {
                    evidence_blob: Some(vec![0xff, 0xd8, 0xff, 0xe0]),
                }),
            ),
        ];

        for (variant, extension) in cases {
            let draft = EntryDraft::new(player, t0())
                .with_message("case notes")
                .with_pending_reputation(-12.5)
                .with_relevant_logs(t0() - Duration::minutes(10), t0())
                .with_message_ref(1_200_000_000_000_000_000);

            let id = store.create(variant, draft, extension.clone()).await.unwrap();
            let entry = store.get(id).await.unwrap();

            assert_eq!(entry.variant(), variant);
            assert_eq!(entry.subject(), player);
            assert_eq!(entry.base.issued_at, t0());
            assert_eq!(entry.base.message.as_deref(), Some("case notes"));
            assert_eq!(entry.base.pending_reputation, -12.5);
            assert_eq!(entry.base.reputation, None);
            assert_eq!(entry.base.message_ref, Some(1_200_000_000_000_000_000));
            assert_eq!(
                entry.base.relevant_logs.map(|w| w.begin),
                Some(t0() - Duration::minutes(10))
            );
            assert_eq!(entry.base.version, 0);
            assert_eq!(entry.extension, extension);
        }
    }

    #[tokio::test]
    async fn test_variant_mismatch_persists_nothing() {
        let store = store().await;

        let err = store
            .create(
                Variant::Ban,
                EntryDraft::new(PlayerId(1), t0()),
                Extension::Warning(WarningExt::default()),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::VariantMismatch { variant: Variant::Ban, .. }));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM moderation_entries")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_missing_required_fields() {
        let store = store().await;

        let err = store
            .create(Variant::Note, EntryDraft::default(), Extension::Remark)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = store().await;
        assert!(matches!(
            store.get(EntryId(404)).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));
        assert!(store.find(EntryId(404)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_legacy_import_conflicts() {
        let store = store().await;
        let draft = EntryDraft::new(PlayerId(3), t0()).with_legacy_id(17);

        store
            .create(Variant::Kick, draft.clone(), Extension::Duration(DurationPunishment::new(0)))
            .await
            .unwrap();
        let err = store
            .create(Variant::Kick, draft, Extension::Duration(DurationPunishment::new(0)))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_accepted_report_must_point_at_report() {
        let store = store().await;
        let note = store
            .create(Variant::Note, EntryDraft::new(PlayerId(1), t0()), Extension::Remark)
            .await
            .unwrap();

        let err = store
            .create(
                Variant::PlayerReportAccepted,
                EntryDraft::new(PlayerId(2), t0()),
                Extension::AcceptedReport(AcceptedReportExt {
                    accepted_report: Some(note),
                    issue_reference: None,
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::WrongEntryKind { expected: "report", .. }));
    }

    #[tokio::test]
    async fn test_removal_is_idempotent() {
        let store = store().await;
        let id = store
            .create(Variant::Note, EntryDraft::new(PlayerId(1), t0()), Extension::Remark)
            .await
            .unwrap();

        assert!(store.update_removal(id, PlayerId(9), Some("duplicate")).await.unwrap());
        assert!(!store.update_removal(id, PlayerId(10), Some("again")).await.unwrap());

        let entry = store.get(id).await.unwrap();
        let removal = entry.base.removal.unwrap();
        assert_eq!(removal.removed_by, Some(PlayerId(9)));
        assert_eq!(removal.reason.as_deref(), Some("duplicate"));
        assert_eq!(entry.base.version, 1);

        assert!(matches!(
            store.update_removal(EntryId(999), PlayerId(9), None).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_update_message_detects_stale_version() {
        let store = store().await;
        let id = store
            .create(Variant::Note, EntryDraft::new(PlayerId(1), t0()), Extension::Remark)
            .await
            .unwrap();

        let v1 = store.update_message(id, Some("first"), 0, PlayerId(2)).await.unwrap();
        assert_eq!(v1, 1);

        let err = store
            .update_message(id, Some("second"), 0, PlayerId(3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::VersionConflict { expected: 0, actual: 1, .. }
        ));
        assert_eq!(store.get(id).await.unwrap().base.message.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_acknowledge_warning_once() {
        let store = store().await;
        let id = store
            .create(
                Variant::Warning,
                EntryDraft::new(PlayerId(1), t0()),
                Extension::Warning(WarningExt::default()),
            )
            .await
            .unwrap();

        let seen = t0() + Duration::minutes(3);
        assert!(store.acknowledge_warning(id, seen).await.unwrap());
        assert!(!store
            .acknowledge_warning(id, seen + Duration::hours(1))
            .await
            .unwrap());

        match store.get(id).await.unwrap().extension {
            Extension::Warning(w) => assert_eq!(w.displayed_at, Some(seen)),
            other => panic!("unexpected extension {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_appeal_sets_resolved_at() {
        let store = store().await;
        let id = store
            .create(
                Variant::Appeal,
                EntryDraft::new(PlayerId(1), t0()),
                Extension::Appeal(AppealExt::pending("ticket-7")),
            )
            .await
            .unwrap();

        let at = t0() + Duration::days(2);
        store
            .resolve_appeal(id, AppealOutcome::Accepted, PlayerId(4), at)
            .await
            .unwrap();

        let entry = store.get(id).await.unwrap();
        assert_eq!(entry.base.resolved_at, Some(at));
        match entry.extension {
            Extension::Appeal(a) => assert_eq!(a.outcome, AppealOutcome::Accepted),
            other => panic!("unexpected extension {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_many_pages_and_filters() {
        let store = store().await.with_page_size(2);
        let subject = PlayerId(11);

        for i in 0..5 {
            store
                .create(
                    Variant::Kick,
                    EntryDraft::new(subject, t0() + Duration::minutes(i)),
                    Extension::Duration(DurationPunishment::new(0)),
                )
                .await
                .unwrap();
        }
        store
            .create(Variant::Note, EntryDraft::new(subject, t0()), Extension::Remark)
            .await
            .unwrap();
        store
            .create(Variant::Kick, EntryDraft::new(PlayerId(12), t0()), Extension::Duration(DurationPunishment::new(0)))
            .await
            .unwrap();

        let filter = EntryFilter::for_subject(subject).with_variants([Variant::Kick]);
        let newest: Vec<_> = store.get_many(filter.clone()).try_collect().await.unwrap();
        let times: Vec<_> = newest.iter().map(|e| e.base.issued_at).collect();
        assert_eq!(times.len(), 5);
        assert!(times.windows(2).all(|w| w[0] > w[1]));

        // restartable
        let again: Vec<_> = store.get_many(filter.clone()).try_collect().await.unwrap();
        assert_eq!(again.len(), 5);

        let oldest = store.list(filter.oldest_first(), 2).await.unwrap();
        assert_eq!(oldest[0].base.issued_at, t0());
        assert_eq!(oldest.len(), 2);

        let in_window = store
            .list(
                EntryFilter::new().issued_between(t0() + Duration::minutes(1), t0() + Duration::minutes(3)),
                100,
            )
            .await
            .unwrap();
        assert_eq!(in_window.len(), 2);
    }

    #[tokio::test]
    async fn test_removed_filter() {
        let store = store().await;
        let a = store
            .create(Variant::Note, EntryDraft::new(PlayerId(1), t0()), Extension::Remark)
            .await
            .unwrap();
        store
            .create(Variant::Note, EntryDraft::new(PlayerId(1), t0()), Extension::Remark)
            .await
            .unwrap();
        store.update_removal(a, PlayerId(2), None).await.unwrap();

        let removed = store.list(EntryFilter::new().removed(true), 10).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), a);
        let kept = store.list(EntryFilter::new().removed(false), 10).await.unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn test_history_records_mutations() {
        let store = store().await;
        let id = store
            .create(Variant::Note, EntryDraft::new(PlayerId(1), t0()), Extension::Remark)
            .await
            .unwrap();
        store.update_removal(id, PlayerId(2), Some("spam")).await.unwrap();
        store.delete(id, PlayerId(3)).await.unwrap();

        let actions: Vec<_> = store
            .history(id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.action, r.version))
            .collect();
        assert_eq!(
            actions,
            vec![
                (AuditAction::Created, 0),
                (AuditAction::Removed, 1),
                (AuditAction::Deleted, 2)
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_cascades_extension() {
        let store = store().await;
        let id = store
            .create(
                Variant::Ban,
                EntryDraft::new(PlayerId(1), t0()),
                Extension::Duration(DurationPunishment::permanent()),
            )
            .await
            .unwrap();

        let summary = store.delete(id, PlayerId(5)).await.unwrap();
        assert_eq!(summary.variant, Variant::Ban);
        assert!(matches!(store.get(id).await.unwrap_err(), LedgerError::NotFound(_)));

        let orphans: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ext_duration")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(orphans, 0);

        assert!(matches!(
            store.delete(id, PlayerId(5)).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }
}

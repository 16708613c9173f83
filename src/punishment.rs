/// Punishment lifecycle and reputation
///
/// Duration punishments (kick, ban, mute, asset ban) move from Active to
/// either Forgiven or Expired. Only forgiveness is stored; expiry is derived
/// from the issue time and duration whenever it is asked for. Removal is a
/// separate flag on the base row and suppresses activity without changing
/// the lifecycle state.
use crate::{
    audit::{self, AuditAction},
    db::{self, encode_ts},
    entry::{
        store::{expect_variant, load_entry},
        DurationPunishment, ModerationEntry, PresetType,
    },
    error::{LedgerError, LedgerResult},
    registry::{ExtensionShape, Variant},
    types::{EntryId, PlayerId},
    validation::{Checker, MAX_REASON_LEN},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Derived lifecycle state of a duration punishment at some instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PunishmentState {
    Active,
    Forgiven,
    Expired,
}

impl PunishmentState {
    /// State of `punishment` issued at `issued_at`, as seen at `as_of`.
    ///
    /// Forgiveness only counts from the moment it was granted, so asking
    /// about an earlier instant still reports the punishment as it was.
    pub fn at(
        issued_at: DateTime<Utc>,
        punishment: &DurationPunishment,
        as_of: DateTime<Utc>,
    ) -> Self {
        if let Some(forgiveness) = &punishment.forgiveness {
            if forgiveness.forgiven_at <= as_of {
                return PunishmentState::Forgiven;
            }
        }

        match punishment.expires_at(issued_at) {
            Some(expiry) if expiry <= as_of => PunishmentState::Expired,
            _ => PunishmentState::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PunishmentState::Active => "active",
            PunishmentState::Forgiven => "forgiven",
            PunishmentState::Expired => "expired",
        }
    }
}

/// Reputation totals for one subject over non-removed entries
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub finalized: f64,
    pub pending: f64,
}

impl ReputationSummary {
    pub fn total(&self) -> f64 {
        self.finalized + self.pending
    }
}

/// Punishment manager
#[derive(Clone)]
pub struct PunishmentManager {
    db: SqlitePool,
}

impl PunishmentManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Forgive an active punishment.
    ///
    /// A second call fails with `AlreadyForgiven` and leaves the recorded
    /// forgiver, reason and timestamp untouched. Expired or removed
    /// punishments fail with `NotActive`.
    pub async fn forgive(
        &self,
        id: EntryId,
        forgiven_by: PlayerId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let mut check = Checker::new();
        check.max_len("reason", reason, MAX_REASON_LEN);
        check.into_ledger_result()?;

        let mut tx = db::begin_write(&self.db).await?;

        let entry = load_duration_entry(&mut tx, id).await?;
        let Some(punishment) = entry.duration_punishment() else {
            return Err(LedgerError::Internal(format!(
                "Entry {} has no duration extension",
                id
            )));
        };

        if punishment.is_forgiven() {
            return Err(LedgerError::AlreadyForgiven(id));
        }
        if entry.is_removed()
            || PunishmentState::at(entry.base.issued_at, punishment, at) != PunishmentState::Active
        {
            return Err(LedgerError::NotActive(id));
        }

        let sql = format!(
            r#"
            UPDATE {}
            SET forgiven = 1, forgiven_by = ?, forgiven_at = ?, forgive_reason = ?
            WHERE entry_id = ? AND forgiven = 0
            "#,
            entry.variant().shape().table()
        );
        let result = sqlx::query(&sql)
            .bind(forgiven_by.to_db())
            .bind(encode_ts(&at))
            .bind(reason)
            .bind(id.0)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LedgerError::AlreadyForgiven(id));
        }

        audit::touch(&mut tx, id, AuditAction::Forgiven, Some(forgiven_by), reason).await?;
        tx.commit().await?;

        tracing::info!("{} {} forgiven by {}", entry.variant(), id, forgiven_by);

        Ok(())
    }

    /// Lifecycle state at `as_of`, ignoring removal
    pub async fn state(&self, id: EntryId, as_of: DateTime<Utc>) -> LedgerResult<PunishmentState> {
        let mut tx = self.db.begin().await?;
        let entry = load_duration_entry(&mut tx, id).await?;
        tx.commit().await?;

        entry
            .duration_punishment()
            .map(|p| PunishmentState::at(entry.base.issued_at, p, as_of))
            .ok_or_else(|| LedgerError::Internal(format!("Entry {} has no duration extension", id)))
    }

    /// Whether the punishment is in force at `as_of`: not forgiven, not
    /// removed, and either permanent or not yet expired.
    pub async fn is_active(&self, id: EntryId, as_of: DateTime<Utc>) -> LedgerResult<bool> {
        let mut tx = self.db.begin().await?;
        let entry = load_duration_entry(&mut tx, id).await?;
        tx.commit().await?;

        Ok(is_in_force(&entry, as_of))
    }

    /// Duration punishments of `subject` in force at `as_of`, newest first
    pub async fn active_punishments(
        &self,
        subject: PlayerId,
        as_of: DateTime<Utc>,
    ) -> LedgerResult<Vec<ModerationEntry>> {
        let mut tx = self.db.begin().await?;

        let candidates: Vec<i64> = sqlx::query_scalar(&format!(
            r#"
            SELECT e.id FROM moderation_entries e
            WHERE e.subject_id = ? AND e.removed = 0
              AND e.id IN ({})
            ORDER BY e.issued_at DESC, e.id DESC
            "#,
            duration_entry_ids("forgiven = 0 OR forgiven_at > ?")
        ))
        .bind(subject.to_db())
        .bind(encode_ts(&as_of))
        .bind(encode_ts(&as_of))
        .bind(encode_ts(&as_of))
        .fetch_all(&mut *tx)
        .await?;

        let mut active = Vec::new();
        for id in candidates {
            if let Some(entry) = load_entry(&mut tx, EntryId(id)).await? {
                if is_in_force(&entry, as_of) {
                    active.push(entry);
                }
            }
        }

        tx.commit().await?;

        Ok(active)
    }

    /// Escalation level for the next punishment of `subject` in a preset
    /// category: one above the highest level among their non-removed,
    /// non-forgiven punishments with that preset, or 1 when there are none.
    pub async fn next_preset_level(&self, subject: PlayerId, preset: PresetType) -> LedgerResult<i32> {
        let mut conn = self.db.acquire().await?;

        let mut highest: Option<i32> = None;
        for shape in duration_shapes() {
            let sql = format!(
                r#"
                SELECT MAX(x.preset_level) FROM {} x
                JOIN moderation_entries e ON e.id = x.entry_id
                WHERE e.subject_id = ? AND e.removed = 0
                  AND x.forgiven = 0 AND x.preset_type = ?
                "#,
                shape.table()
            );
            let level: Option<i32> = sqlx::query_scalar(&sql)
                .bind(subject.to_db())
                .bind(preset.as_str())
                .fetch_one(&mut *conn)
                .await?;
            highest = highest.max(level);
        }

        Ok(highest.map_or(1, |level| level + 1))
    }

    /// Set the finalized reputation of an entry and clear its pending delta.
    /// Happens at most once per entry.
    pub async fn finalize(&self, id: EntryId, value: f64) -> LedgerResult<()> {
        if !value.is_finite() {
            return Err(LedgerError::Validation(
                "Reputation must be a finite number".to_string(),
            ));
        }

        let mut tx = db::begin_write(&self.db).await?;

        let result = sqlx::query(
            r#"
            UPDATE moderation_entries
            SET reputation = ?, pending_reputation = 0
            WHERE id = ? AND reputation IS NULL
            "#,
        )
        .bind(value)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM moderation_entries WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => LedgerError::AlreadyFinalized(id),
                None => LedgerError::entry_not_found(id),
            });
        }

        let detail = value.to_string();
        audit::touch(&mut tx, id, AuditAction::ReputationFinalized, None, Some(&detail)).await?;
        tx.commit().await?;

        tracing::info!("Reputation for entry {} finalized at {}", id, value);

        Ok(())
    }

    /// Reputation of `subject` summed over their non-removed entries
    pub async fn reputation_of(&self, subject: PlayerId) -> LedgerResult<ReputationSummary> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(reputation), 0.0) AS finalized,
                   COALESCE(SUM(pending_reputation), 0.0) AS pending
            FROM moderation_entries
            WHERE subject_id = ? AND removed = 0
            "#,
        )
        .bind(subject.to_db())
        .fetch_one(&self.db)
        .await?;

        Ok(ReputationSummary {
            finalized: row.try_get("finalized")?,
            pending: row.try_get("pending")?,
        })
    }
}

fn is_in_force(entry: &ModerationEntry, as_of: DateTime<Utc>) -> bool {
    !entry.is_removed()
        && entry
            .duration_punishment()
            .map(|p| PunishmentState::at(entry.base.issued_at, p, as_of) == PunishmentState::Active)
            .unwrap_or(false)
}

fn duration_shapes() -> impl Iterator<Item = ExtensionShape> {
    [ExtensionShape::Duration, ExtensionShape::Mute, ExtensionShape::AssetBan].into_iter()
}

/// Union of entry ids across the duration tables matching `condition`.
/// `condition` may hold one placeholder, bound once per table.
fn duration_entry_ids(condition: &str) -> String {
    duration_shapes()
        .map(|shape| format!("SELECT entry_id FROM {} WHERE {}", shape.table(), condition))
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

async fn load_duration_entry(conn: &mut SqliteConnection, id: EntryId) -> LedgerResult<ModerationEntry> {
    expect_variant(conn, id, "duration punishment", |v: Variant| v.is_duration_punishment()).await?;

    load_entry(conn, id)
        .await?
        .ok_or_else(|| LedgerError::entry_not_found(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::entry::{EntryDraft, EntryStore, Extension, MuteExt, MuteType, WarningExt};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 14, 20, 0, 0).unwrap()
    }

    async fn setup() -> (EntryStore, PunishmentManager) {
        let pool = test_pool().await;
        (EntryStore::new(pool.clone()), PunishmentManager::new(pool))
    }

    async fn ban(entries: &EntryStore, subject: PlayerId, punishment: DurationPunishment) -> EntryId {
        entries
            .create(Variant::Ban, EntryDraft::new(subject, t0()), Extension::Duration(punishment))
            .await
            .unwrap()
    }

    #[test]
    fn test_state_derivation() {
        let day = DurationPunishment::new(86_400);
        assert_eq!(PunishmentState::at(t0(), &day, t0()), PunishmentState::Active);
        assert_eq!(
            PunishmentState::at(t0(), &day, t0() + Duration::seconds(86_400)),
            PunishmentState::Expired
        );
        assert_eq!(
            PunishmentState::at(t0(), &DurationPunishment::permanent(), t0() + Duration::days(3650)),
            PunishmentState::Active
        );
        assert_eq!(
            PunishmentState::at(t0(), &DurationPunishment::new(0), t0()),
            PunishmentState::Expired
        );
    }

    #[tokio::test]
    async fn test_ban_expiry_and_forgiveness() {
        let (entries, punishments) = setup().await;
        let id = ban(&entries, PlayerId(7), DurationPunishment::new(86_400)).await;

        assert!(punishments.is_active(id, t0() + Duration::seconds(3600)).await.unwrap());
        assert!(!punishments.is_active(id, t0() + Duration::seconds(90_000)).await.unwrap());

        punishments
            .forgive(id, PlayerId(99), Some("appeal accepted"), t0() + Duration::seconds(1000))
            .await
            .unwrap();

        assert!(!punishments.is_active(id, t0() + Duration::seconds(3600)).await.unwrap());
        assert_eq!(
            punishments.state(id, t0() + Duration::seconds(3600)).await.unwrap(),
            PunishmentState::Forgiven
        );
        // before forgiveness was granted it was still in force
        assert!(punishments.is_active(id, t0() + Duration::seconds(500)).await.unwrap());
    }

    #[tokio::test]
    async fn test_oversized_duration_stays_in_force() {
        let (entries, punishments) = setup().await;
        let subject = PlayerId(8);
        let id = ban(&entries, subject, DurationPunishment::new(i64::MAX)).await;

        let later = t0() + Duration::days(365 * 100);
        assert!(punishments.is_active(id, later).await.unwrap());
        assert_eq!(punishments.state(id, later).await.unwrap(), PunishmentState::Active);

        let active = punishments.active_punishments(subject, later).await.unwrap();
        assert_eq!(active.iter().map(|e| e.id()).collect::<Vec<_>>(), vec![id]);

        punishments.forgive(id, PlayerId(1), None, later).await.unwrap();
        assert_eq!(punishments.state(id, later).await.unwrap(), PunishmentState::Forgiven);
    }

    #[tokio::test]
    async fn test_second_forgive_keeps_original() {
        let (entries, punishments) = setup().await;
        let id = ban(&entries, PlayerId(7), DurationPunishment::permanent()).await;

        punishments
            .forgive(id, PlayerId(1), Some("first"), t0() + Duration::hours(1))
            .await
            .unwrap();
        let err = punishments
            .forgive(id, PlayerId(2), Some("second"), t0() + Duration::hours(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyForgiven(_)));
        assert!(err.is_idempotent_replay());

        let entry = entries.get(id).await.unwrap();
        let forgiveness = entry.duration_punishment().unwrap().forgiveness.clone().unwrap();
        assert_eq!(forgiveness.forgiven_by, PlayerId(1));
        assert_eq!(forgiveness.reason.as_deref(), Some("first"));
        assert_eq!(forgiveness.forgiven_at, t0() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_forgive_rejects_expired_and_wrong_kind() {
        let (entries, punishments) = setup().await;
        let id = ban(&entries, PlayerId(7), DurationPunishment::new(60)).await;

        assert!(matches!(
            punishments
                .forgive(id, PlayerId(1), None, t0() + Duration::hours(1))
                .await
                .unwrap_err(),
            LedgerError::NotActive(_)
        ));

        let warning = entries
            .create(
                Variant::Warning,
                EntryDraft::new(PlayerId(7), t0()),
                Extension::Warning(WarningExt::default()),
            )
            .await
            .unwrap();
        assert!(matches!(
            punishments.forgive(warning, PlayerId(1), None, t0()).await.unwrap_err(),
            LedgerError::WrongEntryKind { .. }
        ));
        assert!(matches!(
            punishments.is_active(EntryId(404), t0()).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_removed_punishment_is_inactive() {
        let (entries, punishments) = setup().await;
        let id = ban(&entries, PlayerId(7), DurationPunishment::permanent()).await;

        entries.update_removal(id, PlayerId(2), Some("wrong player")).await.unwrap();

        assert!(!punishments.is_active(id, t0()).await.unwrap());
        assert_eq!(punishments.state(id, t0()).await.unwrap(), PunishmentState::Active);
    }

    #[tokio::test]
    async fn test_forgive_mute() {
        let (entries, punishments) = setup().await;
        let id = entries
            .create(
                Variant::Mute,
                EntryDraft::new(PlayerId(7), t0()),
                Extension::Mute(MuteExt {
                    punishment: DurationPunishment::new(600),
                    mute_type: MuteType::Voice,
                }),
            )
            .await
            .unwrap();

        punishments.forgive(id, PlayerId(1), None, t0()).await.unwrap();
        assert!(!punishments.is_active(id, t0() + Duration::seconds(1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_finalize_once() {
        let (entries, punishments) = setup().await;
        let id = entries
            .create(
                Variant::Note,
                EntryDraft::new(PlayerId(7), t0()).with_pending_reputation(-4.0),
                Extension::Remark,
            )
            .await
            .unwrap();

        punishments.finalize(id, -5.0).await.unwrap();
        let err = punishments.finalize(id, -6.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyFinalized(_)));
        assert!(matches!(
            punishments.finalize(EntryId(404), 1.0).await.unwrap_err(),
            LedgerError::NotFound(_)
        ));

        let entry = entries.get(id).await.unwrap();
        assert_eq!(entry.base.reputation, Some(-5.0));
        assert_eq!(entry.base.pending_reputation, 0.0);
    }

    #[tokio::test]
    async fn test_reputation_of_skips_removed() {
        let (entries, punishments) = setup().await;
        let subject = PlayerId(8);

        let a = entries
            .create(Variant::Note, EntryDraft::new(subject, t0()).with_pending_reputation(-3.0), Extension::Remark)
            .await
            .unwrap();
        entries
            .create(
                Variant::Commendation,
                EntryDraft::new(subject, t0()).with_pending_reputation(2.5),
                Extension::Remark,
            )
            .await
            .unwrap();
        let removed = entries
            .create(Variant::Note, EntryDraft::new(subject, t0()).with_pending_reputation(-100.0), Extension::Remark)
            .await
            .unwrap();

        punishments.finalize(a, -10.0).await.unwrap();
        entries.update_removal(removed, PlayerId(1), None).await.unwrap();

        let summary = punishments.reputation_of(subject).await.unwrap();
        assert_eq!(summary.finalized, -10.0);
        assert_eq!(summary.pending, 2.5);
        assert_eq!(summary.total(), -7.5);

        assert_eq!(punishments.reputation_of(PlayerId(9)).await.unwrap(), ReputationSummary::default());
    }

    #[tokio::test]
    async fn test_next_preset_level() {
        let (entries, punishments) = setup().await;
        let subject = PlayerId(5);

        assert_eq!(punishments.next_preset_level(subject, PresetType::Griefing).await.unwrap(), 1);

        ban(&entries, subject, DurationPunishment::new(3600).with_preset(PresetType::Griefing, 1)).await;
        let second = ban(&entries, subject, DurationPunishment::new(7200).with_preset(PresetType::Griefing, 2)).await;
        entries
            .create(
                Variant::Mute,
                EntryDraft::new(subject, t0()),
                Extension::Mute(MuteExt {
                    punishment: DurationPunishment::new(600).with_preset(PresetType::ChatRacism, 3),
                    mute_type: MuteType::Text,
                }),
            )
            .await
            .unwrap();

        assert_eq!(punishments.next_preset_level(subject, PresetType::Griefing).await.unwrap(), 3);
        assert_eq!(punishments.next_preset_level(subject, PresetType::ChatRacism).await.unwrap(), 4);

        punishments.forgive(second, PlayerId(1), None, t0()).await.unwrap();
        assert_eq!(punishments.next_preset_level(subject, PresetType::Griefing).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_active_punishments() {
        let (entries, punishments) = setup().await;
        let subject = PlayerId(6);

        let perm = ban(&entries, subject, DurationPunishment::permanent()).await;
        ban(&entries, subject, DurationPunishment::new(60)).await;
        let forgiven = ban(&entries, subject, DurationPunishment::new(86_400)).await;
        punishments.forgive(forgiven, PlayerId(1), None, t0()).await.unwrap();
        entries
            .create(Variant::Note, EntryDraft::new(subject, t0()), Extension::Remark)
            .await
            .unwrap();

        let active = punishments
            .active_punishments(subject, t0() + Duration::hours(1))
            .await
            .unwrap();
        let ids: Vec<_> = active.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![perm]);
    }
}

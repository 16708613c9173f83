/// Report case files
///
/// A report entry owns six append-only child collections. The case file is
/// the read-only composite of the entry, its report extension and all of
/// those records.
pub mod records;

pub use records::{
    ChatRecord, ReportTeamkillRecord, ReportVehicleTeamkillRecord, ShotRecord,
    StructureDamageRecord, VehicleRequestRecord,
};

use crate::{
    audit::{self, AuditAction},
    db::{self, encode_ts},
    entry::{
        store::{expect_variant, load_entry},
        Extension, ModerationEntry, ReportExt,
    },
    error::{LedgerError, LedgerResult},
    registry::Variant,
    types::{EntryId, PlayerId},
    validation::{Checker, MAX_CHAT_MESSAGE_LEN},
};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};

/// Assembled view of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    pub entry: ModerationEntry,
    pub report: ReportExt,
    /// Ordered by ordinal
    pub chat: Vec<ChatRecord>,
    pub structure_damage: Vec<StructureDamageRecord>,
    pub teamkills: Vec<ReportTeamkillRecord>,
    pub vehicle_teamkills: Vec<ReportVehicleTeamkillRecord>,
    pub vehicle_requests: Vec<VehicleRequestRecord>,
    pub shots: Vec<ShotRecord>,
}

/// Case file manager
#[derive(Clone)]
pub struct CaseFileManager {
    db: SqlitePool,
}

impl CaseFileManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append a chat line at an explicit ordinal. A taken ordinal is a
    /// `Conflict`.
    pub async fn add_chat_record(&self, entry_id: EntryId, record: &ChatRecord) -> LedgerResult<()> {
        let mut check = Checker::new();
        if record.index < 0 {
            check.fail("index", "Ordinals start at 0");
        }
        check.non_empty("channel", &record.channel, MAX_CHAT_MESSAGE_LEN);
        check.max_len("message", Some(record.message.as_str()), MAX_CHAT_MESSAGE_LEN);
        check.into_ledger_result()?;

        let mut tx = self.begin_append(entry_id).await?;

        sqlx::query(
            r#"
            INSERT INTO report_chat_records (entry_id, idx, sent_at, channel, message)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.0)
        .bind(record.index)
        .bind(encode_ts(&record.sent_at))
        .bind(&record.channel)
        .bind(&record.message)
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::from_insert(e, &format!("Chat record #{}", record.index)))?;

        finish_append(tx, entry_id, "chat").await
    }

    pub async fn add_structure_damage_record(
        &self,
        entry_id: EntryId,
        record: &StructureDamageRecord,
    ) -> LedgerResult<()> {
        let mut tx = self.begin_append(entry_id).await?;

        sqlx::query(
            r#"
            INSERT INTO report_structure_damage
            (entry_id, structure_asset_id, structure_name, instance_id, damage, damage_origin, destroyed, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.0)
        .bind(&record.structure_asset_id)
        .bind(&record.structure_name)
        .bind(record.instance_id)
        .bind(record.damage)
        .bind(&record.damage_origin)
        .bind(record.destroyed)
        .bind(encode_ts(&record.occurred_at))
        .execute(&mut *tx)
        .await?;

        finish_append(tx, entry_id, "structure_damage").await
    }

    /// Append a teamkill line. If it references a teamkill entry, that entry
    /// must exist and be a teamkill.
    pub async fn add_teamkill_record(
        &self,
        entry_id: EntryId,
        record: &ReportTeamkillRecord,
    ) -> LedgerResult<()> {
        let mut tx = self.begin_append(entry_id).await?;

        if let Some(teamkill) = record.teamkill_entry {
            expect_variant(&mut tx, teamkill, "teamkill", |v| v == Variant::Teamkill).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO report_teamkills
            (entry_id, teamkill_entry_id, victim_id, asset_id, asset_name, death_cause, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.0)
        .bind(record.teamkill_entry.map(|id| id.0))
        .bind(record.victim.to_db())
        .bind(&record.asset_id)
        .bind(&record.asset_name)
        .bind(&record.death_cause)
        .bind(encode_ts(&record.occurred_at))
        .execute(&mut *tx)
        .await?;

        finish_append(tx, entry_id, "teamkill").await
    }

    pub async fn add_vehicle_teamkill_record(
        &self,
        entry_id: EntryId,
        record: &ReportVehicleTeamkillRecord,
    ) -> LedgerResult<()> {
        let mut tx = self.begin_append(entry_id).await?;

        if let Some(teamkill) = record.vehicle_teamkill_entry {
            expect_variant(&mut tx, teamkill, "vehicle teamkill", |v| {
                v == Variant::VehicleTeamkill
            })
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO report_vehicle_teamkills
            (entry_id, vehicle_teamkill_entry_id, victim_id, vehicle_asset_id, vehicle_name, damage_origin, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.0)
        .bind(record.vehicle_teamkill_entry.map(|id| id.0))
        .bind(record.victim.to_db())
        .bind(&record.vehicle_asset_id)
        .bind(&record.vehicle_name)
        .bind(&record.damage_origin)
        .bind(encode_ts(&record.occurred_at))
        .execute(&mut *tx)
        .await?;

        finish_append(tx, entry_id, "vehicle_teamkill").await
    }

    pub async fn add_vehicle_request_record(
        &self,
        entry_id: EntryId,
        record: &VehicleRequestRecord,
    ) -> LedgerResult<()> {
        let mut tx = self.begin_append(entry_id).await?;

        sqlx::query(
            r#"
            INSERT INTO report_vehicle_requests
            (entry_id, vehicle_asset_id, vehicle_name, requested_at, destroyed_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.0)
        .bind(&record.vehicle_asset_id)
        .bind(&record.vehicle_name)
        .bind(encode_ts(&record.requested_at))
        .bind(record.destroyed_at.as_ref().map(encode_ts))
        .execute(&mut *tx)
        .await?;

        finish_append(tx, entry_id, "vehicle_request").await
    }

    pub async fn add_shot_record(&self, entry_id: EntryId, record: &ShotRecord) -> LedgerResult<()> {
        if matches!(record.distance, Some(d) if !(d.is_finite() && d >= 0.0)) {
            return Err(LedgerError::Validation(
                "distance: Must be a non-negative finite number".to_string(),
            ));
        }

        let mut tx = self.begin_append(entry_id).await?;

        sqlx::query(
            r#"
            INSERT INTO report_shots
            (entry_id, weapon_asset_id, weapon_name, ammo_asset_id, ammo_name, damage_origin,
             hit_limb, hit_player_id, hit_asset_id, distance, fired_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry_id.0)
        .bind(&record.weapon_asset_id)
        .bind(&record.weapon_name)
        .bind(&record.ammo_asset_id)
        .bind(&record.ammo_name)
        .bind(&record.damage_origin)
        .bind(&record.hit_limb)
        .bind(record.hit_player.map(PlayerId::to_db))
        .bind(&record.hit_asset_id)
        .bind(record.distance)
        .bind(encode_ts(&record.fired_at))
        .execute(&mut *tx)
        .await?;

        finish_append(tx, entry_id, "shot").await
    }

    /// Assemble the case file of a report entry in one read transaction
    pub async fn case_file(&self, entry_id: EntryId) -> LedgerResult<CaseFile> {
        let mut tx = self.db.begin().await?;

        expect_variant(&mut tx, entry_id, "report", |v| v.is_report()).await?;
        let entry = load_entry(&mut tx, entry_id)
            .await?
            .ok_or_else(|| LedgerError::entry_not_found(entry_id))?;
        let report = match &entry.extension {
            Extension::Report(report) => report.clone(),
            other => {
                return Err(LedgerError::Internal(format!(
                    "Report {} carries a {} extension",
                    entry_id,
                    other.shape().name()
                )))
            }
        };

        let chat = load_children(
            &mut tx,
            "SELECT idx, sent_at, channel, message FROM report_chat_records WHERE entry_id = ? ORDER BY idx",
            entry_id,
            ChatRecord::from_row,
        )
        .await?;
        let structure_damage = load_children(
            &mut tx,
            "SELECT * FROM report_structure_damage WHERE entry_id = ? ORDER BY occurred_at, id",
            entry_id,
            StructureDamageRecord::from_row,
        )
        .await?;
        let teamkills = load_children(
            &mut tx,
            "SELECT * FROM report_teamkills WHERE entry_id = ? ORDER BY occurred_at, id",
            entry_id,
            ReportTeamkillRecord::from_row,
        )
        .await?;
        let vehicle_teamkills = load_children(
            &mut tx,
            "SELECT * FROM report_vehicle_teamkills WHERE entry_id = ? ORDER BY occurred_at, id",
            entry_id,
            ReportVehicleTeamkillRecord::from_row,
        )
        .await?;
        let vehicle_requests = load_children(
            &mut tx,
            "SELECT * FROM report_vehicle_requests WHERE entry_id = ? ORDER BY requested_at, id",
            entry_id,
            VehicleRequestRecord::from_row,
        )
        .await?;
        let shots = load_children(
            &mut tx,
            "SELECT * FROM report_shots WHERE entry_id = ? ORDER BY fired_at, id",
            entry_id,
            ShotRecord::from_row,
        )
        .await?;

        tx.commit().await?;

        Ok(CaseFile {
            entry,
            report,
            chat,
            structure_damage,
            teamkills,
            vehicle_teamkills,
            vehicle_requests,
            shots,
        })
    }

    async fn begin_append(&self, entry_id: EntryId) -> LedgerResult<Transaction<'static, Sqlite>> {
        let mut tx = db::begin_write(&self.db).await?;
        expect_variant(&mut tx, entry_id, "report", |v| v.is_report()).await?;
        Ok(tx)
    }
}

async fn finish_append(
    mut tx: Transaction<'static, Sqlite>,
    entry_id: EntryId,
    kind: &str,
) -> LedgerResult<()> {
    audit::touch(&mut tx, entry_id, AuditAction::RecordAppended, None, Some(kind)).await?;
    tx.commit().await?;

    tracing::debug!("Appended {} record to report {}", kind, entry_id);

    Ok(())
}

async fn load_children<T>(
    conn: &mut SqliteConnection,
    sql: &str,
    entry_id: EntryId,
    parse: fn(&sqlx::sqlite::SqliteRow) -> LedgerResult<T>,
) -> LedgerResult<Vec<T>> {
    let rows = sqlx::query(sql)
        .bind(entry_id.0)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter().map(parse).collect()
}

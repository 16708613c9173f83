/// Child evidentiary records of a report
use crate::{
    db::{decode_opt_ts, decode_ts},
    error::LedgerResult,
    types::{EntryId, PlayerId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// One chat line, positioned by an explicit ordinal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub index: i64,
    pub sent_at: DateTime<Utc>,
    pub channel: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureDamageRecord {
    pub structure_asset_id: String,
    pub structure_name: Option<String>,
    /// In-game instance of the structure
    pub instance_id: i64,
    pub damage: i64,
    pub damage_origin: Option<String>,
    pub destroyed: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTeamkillRecord {
    /// Teamkill entry this record was promoted to, if any
    pub teamkill_entry: Option<EntryId>,
    pub victim: PlayerId,
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub death_cause: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVehicleTeamkillRecord {
    pub vehicle_teamkill_entry: Option<EntryId>,
    pub victim: PlayerId,
    pub vehicle_asset_id: Option<String>,
    pub vehicle_name: Option<String>,
    pub damage_origin: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleRequestRecord {
    pub vehicle_asset_id: String,
    pub vehicle_name: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub destroyed_at: Option<DateTime<Utc>>,
}

/// A fired shot. `hit_limb` and `damage_origin` are independent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotRecord {
    pub weapon_asset_id: String,
    pub weapon_name: Option<String>,
    pub ammo_asset_id: Option<String>,
    pub ammo_name: Option<String>,
    pub damage_origin: Option<String>,
    pub hit_limb: Option<String>,
    pub hit_player: Option<PlayerId>,
    pub hit_asset_id: Option<String>,
    pub distance: Option<f64>,
    pub fired_at: DateTime<Utc>,
}

impl ChatRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(ChatRecord {
            index: row.try_get("idx")?,
            sent_at: decode_ts(row.try_get::<&str, _>("sent_at")?)?,
            channel: row.try_get("channel")?,
            message: row.try_get("message")?,
        })
    }
}

impl StructureDamageRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(StructureDamageRecord {
            structure_asset_id: row.try_get("structure_asset_id")?,
            structure_name: row.try_get("structure_name")?,
            instance_id: row.try_get("instance_id")?,
            damage: row.try_get("damage")?,
            damage_origin: row.try_get("damage_origin")?,
            destroyed: row.try_get("destroyed")?,
            occurred_at: decode_ts(row.try_get::<&str, _>("occurred_at")?)?,
        })
    }
}

impl ReportTeamkillRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(ReportTeamkillRecord {
            teamkill_entry: row
                .try_get::<Option<i64>, _>("teamkill_entry_id")?
                .map(EntryId),
            victim: PlayerId::from_db(row.try_get("victim_id")?),
            asset_id: row.try_get("asset_id")?,
            asset_name: row.try_get("asset_name")?,
            death_cause: row.try_get("death_cause")?,
            occurred_at: decode_ts(row.try_get::<&str, _>("occurred_at")?)?,
        })
    }
}

impl ReportVehicleTeamkillRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(ReportVehicleTeamkillRecord {
            vehicle_teamkill_entry: row
                .try_get::<Option<i64>, _>("vehicle_teamkill_entry_id")?
                .map(EntryId),
            victim: PlayerId::from_db(row.try_get("victim_id")?),
            vehicle_asset_id: row.try_get("vehicle_asset_id")?,
            vehicle_name: row.try_get("vehicle_name")?,
            damage_origin: row.try_get("damage_origin")?,
            occurred_at: decode_ts(row.try_get::<&str, _>("occurred_at")?)?,
        })
    }
}

impl VehicleRequestRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(VehicleRequestRecord {
            vehicle_asset_id: row.try_get("vehicle_asset_id")?,
            vehicle_name: row.try_get("vehicle_name")?,
            requested_at: decode_ts(row.try_get::<&str, _>("requested_at")?)?,
            destroyed_at: decode_opt_ts(row.try_get("destroyed_at")?)?,
        })
    }
}

impl ShotRecord {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(ShotRecord {
            weapon_asset_id: row.try_get("weapon_asset_id")?,
            weapon_name: row.try_get("weapon_name")?,
            ammo_asset_id: row.try_get("ammo_asset_id")?,
            ammo_name: row.try_get("ammo_name")?,
            damage_origin: row.try_get("damage_origin")?,
            hit_limb: row.try_get("hit_limb")?,
            hit_player: row
                .try_get::<Option<i64>, _>("hit_player_id")?
                .map(PlayerId::from_db),
            hit_asset_id: row.try_get("hit_asset_id")?,
            distance: row.try_get("distance")?,
            fired_at: decode_ts(row.try_get::<&str, _>("fired_at")?)?,
        })
    }
}

/// Variant extension records and their storage
///
/// Each extension shape owns one table keyed by `entry_id`. The three
/// duration-bearing shapes (duration, mute, asset ban) share the same
/// duration/forgiveness column set so lifecycle code can address them
/// uniformly through `ExtensionShape::table()`.
use crate::{
    db::{decode_opt_ts, encode_ts},
    error::{LedgerError, LedgerResult},
    registry::ExtensionShape,
    types::{EntryId, PlayerId},
};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

/// Duration value meaning "never expires"
pub const PERMANENT: i64 = -1;

/// Punishment preset category used for escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetType {
    Griefing,
    Toxicity,
    Soloing,
    AssetWaste,
    IntentionalTeamkilling,
    TargetingLeader,
    VoiceSexism,
    VoiceRacism,
    ChatSexism,
    ChatRacism,
    Cheating,
}

impl PresetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetType::Griefing => "griefing",
            PresetType::Toxicity => "toxicity",
            PresetType::Soloing => "soloing",
            PresetType::AssetWaste => "asset_waste",
            PresetType::IntentionalTeamkilling => "intentional_teamkilling",
            PresetType::TargetingLeader => "targeting_leader",
            PresetType::VoiceSexism => "voice_sexism",
            PresetType::VoiceRacism => "voice_racism",
            PresetType::ChatSexism => "chat_sexism",
            PresetType::ChatRacism => "chat_racism",
            PresetType::Cheating => "cheating",
        }
    }

    pub fn from_str(s: &str) -> LedgerResult<Self> {
        match s {
            "griefing" => Ok(PresetType::Griefing),
            "toxicity" => Ok(PresetType::Toxicity),
            "soloing" => Ok(PresetType::Soloing),
            "asset_waste" => Ok(PresetType::AssetWaste),
            "intentional_teamkilling" => Ok(PresetType::IntentionalTeamkilling),
            "targeting_leader" => Ok(PresetType::TargetingLeader),
            "voice_sexism" => Ok(PresetType::VoiceSexism),
            "voice_racism" => Ok(PresetType::VoiceRacism),
            "chat_sexism" => Ok(PresetType::ChatSexism),
            "chat_racism" => Ok(PresetType::ChatRacism),
            "cheating" => Ok(PresetType::Cheating),
            _ => Err(LedgerError::Internal(format!("Invalid preset type: {}", s))),
        }
    }
}

/// Preset category and escalation level of a punishment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PunishmentPreset {
    pub kind: PresetType,
    pub level: i32,
}

/// Administrative early termination of a punishment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forgiveness {
    pub forgiven_by: PlayerId,
    pub forgiven_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Time-bounded sanction with forgiveness state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationPunishment {
    /// Seconds; `PERMANENT` (any negative value) never expires
    pub duration_secs: i64,
    pub forgiveness: Option<Forgiveness>,
    pub preset: Option<PunishmentPreset>,
}

impl DurationPunishment {
    pub fn new(duration_secs: i64) -> Self {
        Self {
            duration_secs,
            forgiveness: None,
            preset: None,
        }
    }

    pub fn permanent() -> Self {
        Self::new(PERMANENT)
    }

    pub fn with_preset(mut self, kind: PresetType, level: i32) -> Self {
        self.preset = Some(PunishmentPreset { kind, level });
        self
    }

    pub fn is_permanent(&self) -> bool {
        self.duration_secs < 0
    }

    pub fn is_forgiven(&self) -> bool {
        self.forgiveness.is_some()
    }

    /// Expiry instant for an entry issued at `issued_at`.
    ///
    /// `None` if permanent, or if the duration runs past the representable
    /// calendar, in which case it never expires either.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_permanent() {
            return None;
        }
        TimeDelta::try_seconds(self.duration_secs).and_then(|d| issued_at.checked_add_signed(d))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WarningExt {
    /// When the warned player acknowledged the warning
    pub displayed_at: Option<DateTime<Utc>>,
}

/// Channel scope of a mute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MuteType {
    Voice,
    Text,
    Both,
}

impl MuteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MuteType::Voice => "voice",
            MuteType::Text => "text",
            MuteType::Both => "both",
        }
    }

    pub fn from_str(s: &str) -> LedgerResult<Self> {
        match s {
            "voice" => Ok(MuteType::Voice),
            "text" => Ok(MuteType::Text),
            "both" => Ok(MuteType::Both),
            _ => Err(LedgerError::Internal(format!("Invalid mute type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuteExt {
    pub punishment: DurationPunishment,
    pub mute_type: MuteType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetBanExt {
    pub punishment: DurationPunishment,
    /// Vehicle types covered; empty means every asset
    pub vehicle_type_filter: Vec<String>,
}

impl AssetBanExt {
    pub fn covers(&self, vehicle_type: &str) -> bool {
        self.vehicle_type_filter.is_empty()
            || self
                .vehicle_type_filter
                .iter()
                .any(|t| t.eq_ignore_ascii_case(vehicle_type))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AntiCheatKickExt {
    pub kick_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TeamkillExt {
    pub asset_id: Option<String>,
    pub asset_name: Option<String>,
    pub death_cause: Option<String>,
    pub limb: Option<String>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VehicleTeamkillExt {
    pub vehicle_asset_id: Option<String>,
    pub vehicle_name: Option<String>,
    pub damage_origin: Option<String>,
}

/// Tri-state appeal outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealOutcome {
    Pending,
    Accepted,
    Rejected,
}

impl AppealOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealOutcome::Pending => "pending",
            AppealOutcome::Accepted => "accepted",
            AppealOutcome::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> LedgerResult<Self> {
        match s {
            "pending" => Ok(AppealOutcome::Pending),
            "accepted" => Ok(AppealOutcome::Accepted),
            "rejected" => Ok(AppealOutcome::Rejected),
            _ => Err(LedgerError::Internal(format!("Invalid appeal outcome: {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealExt {
    pub ticket_id: String,
    pub outcome: AppealOutcome,
    pub discord_id: Option<u64>,
}

impl AppealExt {
    pub fn pending(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            outcome: AppealOutcome::Pending,
            discord_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportExt {
    /// Opaque attachment (typically a screenshot)
    pub evidence_blob: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AcceptedReportExt {
    pub accepted_report: Option<EntryId>,
    /// External issue or commit reference
    pub issue_reference: Option<String>,
}

/// Variant-specific extension of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Extension {
    Remark,
    Warning(WarningExt),
    Duration(DurationPunishment),
    Mute(MuteExt),
    AssetBan(AssetBanExt),
    AntiCheatKick(AntiCheatKickExt),
    Teamkill(TeamkillExt),
    VehicleTeamkill(VehicleTeamkillExt),
    Appeal(AppealExt),
    Report(ReportExt),
    AcceptedReport(AcceptedReportExt),
}

impl Extension {
    pub fn shape(&self) -> ExtensionShape {
        match self {
            Extension::Remark => ExtensionShape::Remark,
            Extension::Warning(_) => ExtensionShape::Warning,
            Extension::Duration(_) => ExtensionShape::Duration,
            Extension::Mute(_) => ExtensionShape::Mute,
            Extension::AssetBan(_) => ExtensionShape::AssetBan,
            Extension::AntiCheatKick(_) => ExtensionShape::AntiCheatKick,
            Extension::Teamkill(_) => ExtensionShape::Teamkill,
            Extension::VehicleTeamkill(_) => ExtensionShape::VehicleTeamkill,
            Extension::Appeal(_) => ExtensionShape::Appeal,
            Extension::Report(_) => ExtensionShape::Report,
            Extension::AcceptedReport(_) => ExtensionShape::AcceptedReport,
        }
    }

    pub fn duration(&self) -> Option<&DurationPunishment> {
        match self {
            Extension::Duration(p) => Some(p),
            Extension::Mute(m) => Some(&m.punishment),
            Extension::AssetBan(a) => Some(&a.punishment),
            _ => None,
        }
    }
}

/// Write the extension row for a freshly inserted entry
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    entry_id: EntryId,
    extension: &Extension,
) -> LedgerResult<()> {
    let table = extension.shape().table();

    match extension {
        Extension::Remark => {
            sqlx::query("INSERT INTO ext_remark (entry_id) VALUES (?)")
                .bind(entry_id.0)
                .execute(&mut *conn)
                .await?;
        }
        Extension::Warning(w) => {
            sqlx::query("INSERT INTO ext_warning (entry_id, displayed_at) VALUES (?, ?)")
                .bind(entry_id.0)
                .bind(w.displayed_at.as_ref().map(encode_ts))
                .execute(&mut *conn)
                .await?;
        }
        Extension::Duration(p) => {
            insert_duration(conn, table, entry_id, p, None).await?;
        }
        Extension::Mute(m) => {
            insert_duration(
                conn,
                table,
                entry_id,
                &m.punishment,
                Some(("mute_type", m.mute_type.as_str().to_string())),
            )
            .await?;
        }
        Extension::AssetBan(a) => {
            let filter = serde_json::to_string(&a.vehicle_type_filter)
                .map_err(|e| LedgerError::Internal(format!("Failed to encode filter: {}", e)))?;
            insert_duration(
                conn,
                table,
                entry_id,
                &a.punishment,
                Some(("vehicle_type_filter", filter)),
            )
            .await?;
        }
        Extension::AntiCheatKick(k) => {
            sqlx::query("INSERT INTO ext_anticheat_kick (entry_id, kick_message) VALUES (?, ?)")
                .bind(entry_id.0)
                .bind(&k.kick_message)
                .execute(&mut *conn)
                .await?;
        }
        Extension::Teamkill(t) => {
            sqlx::query(
                r#"
                INSERT INTO ext_teamkill (entry_id, asset_id, asset_name, death_cause, limb, distance)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry_id.0)
            .bind(&t.asset_id)
            .bind(&t.asset_name)
            .bind(&t.death_cause)
            .bind(&t.limb)
            .bind(t.distance)
            .execute(&mut *conn)
            .await?;
        }
        Extension::VehicleTeamkill(v) => {
            sqlx::query(
                r#"
                INSERT INTO ext_vehicle_teamkill (entry_id, vehicle_asset_id, vehicle_name, damage_origin)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(entry_id.0)
            .bind(&v.vehicle_asset_id)
            .bind(&v.vehicle_name)
            .bind(&v.damage_origin)
            .execute(&mut *conn)
            .await?;
        }
        Extension::Appeal(a) => {
            sqlx::query(
                "INSERT INTO ext_appeal (entry_id, ticket_id, outcome, discord_id) VALUES (?, ?, ?, ?)",
            )
            .bind(entry_id.0)
            .bind(&a.ticket_id)
            .bind(a.outcome.as_str())
            .bind(a.discord_id.map(|id| id as i64))
            .execute(&mut *conn)
            .await?;
        }
        Extension::Report(r) => {
            sqlx::query("INSERT INTO ext_report (entry_id, evidence_blob) VALUES (?, ?)")
                .bind(entry_id.0)
                .bind(&r.evidence_blob)
                .execute(&mut *conn)
                .await?;
        }
        Extension::AcceptedReport(a) => {
            sqlx::query(
                "INSERT INTO ext_accepted_report (entry_id, accepted_report_id, issue_reference) VALUES (?, ?, ?)",
            )
            .bind(entry_id.0)
            .bind(a.accepted_report.map(|id| id.0))
            .bind(&a.issue_reference)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

async fn insert_duration(
    conn: &mut SqliteConnection,
    table: &'static str,
    entry_id: EntryId,
    punishment: &DurationPunishment,
    extra: Option<(&'static str, String)>,
) -> LedgerResult<()> {
    let (extra_column, extra_value) = match &extra {
        Some((column, value)) => (format!(", {}", column), Some(value.as_str())),
        None => (String::new(), None),
    };
    let extra_placeholder = if extra.is_some() { ", ?" } else { "" };

    let sql = format!(
        "INSERT INTO {} (entry_id, duration_secs, forgiven, forgiven_by, forgiven_at, \
         forgive_reason, preset_type, preset_level{}) VALUES (?, ?, ?, ?, ?, ?, ?, ?{})",
        table, extra_column, extra_placeholder
    );

    let forgiveness = punishment.forgiveness.as_ref();
    let mut query = sqlx::query(&sql)
        .bind(entry_id.0)
        .bind(punishment.duration_secs)
        .bind(forgiveness.is_some())
        .bind(forgiveness.map(|f| f.forgiven_by.to_db()))
        .bind(forgiveness.map(|f| encode_ts(&f.forgiven_at)))
        .bind(forgiveness.and_then(|f| f.reason.clone()))
        .bind(punishment.preset.map(|p| p.kind.as_str()))
        .bind(punishment.preset.map(|p| p.level));
    if let Some(value) = extra_value {
        query = query.bind(value);
    }

    query.execute(&mut *conn).await?;

    Ok(())
}

/// Load the extension row of an entry whose variant resolved to `shape`
pub(crate) async fn load(
    conn: &mut SqliteConnection,
    entry_id: EntryId,
    shape: ExtensionShape,
) -> LedgerResult<Extension> {
    let sql = format!("SELECT * FROM {} WHERE entry_id = ?", shape.table());
    let row = sqlx::query(&sql)
        .bind(entry_id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| {
            LedgerError::NotFound(format!(
                "{} extension for entry {} not found",
                shape.name(),
                entry_id
            ))
        })?;

    parse(&row, shape)
}

fn parse(row: &SqliteRow, shape: ExtensionShape) -> LedgerResult<Extension> {
    let extension = match shape {
        ExtensionShape::Remark => Extension::Remark,
        ExtensionShape::Warning => Extension::Warning(WarningExt {
            displayed_at: decode_opt_ts(row.try_get("displayed_at")?)?,
        }),
        ExtensionShape::Duration => Extension::Duration(parse_duration(row)?),
        ExtensionShape::Mute => Extension::Mute(MuteExt {
            punishment: parse_duration(row)?,
            mute_type: MuteType::from_str(row.try_get::<&str, _>("mute_type")?)?,
        }),
        ExtensionShape::AssetBan => {
            let raw: &str = row.try_get("vehicle_type_filter")?;
            let vehicle_type_filter = serde_json::from_str(raw)
                .map_err(|e| LedgerError::Internal(format!("Invalid vehicle filter: {}", e)))?;
            Extension::AssetBan(AssetBanExt {
                punishment: parse_duration(row)?,
                vehicle_type_filter,
            })
        }
        ExtensionShape::AntiCheatKick => Extension::AntiCheatKick(AntiCheatKickExt {
            kick_message: row.try_get("kick_message")?,
        }),
        ExtensionShape::Teamkill => Extension::Teamkill(TeamkillExt {
            asset_id: row.try_get("asset_id")?,
            asset_name: row.try_get("asset_name")?,
            death_cause: row.try_get("death_cause")?,
            limb: row.try_get("limb")?,
            distance: row.try_get("distance")?,
        }),
        ExtensionShape::VehicleTeamkill => Extension::VehicleTeamkill(VehicleTeamkillExt {
            vehicle_asset_id: row.try_get("vehicle_asset_id")?,
            vehicle_name: row.try_get("vehicle_name")?,
            damage_origin: row.try_get("damage_origin")?,
        }),
        ExtensionShape::Appeal => Extension::Appeal(AppealExt {
            ticket_id: row.try_get("ticket_id")?,
            outcome: AppealOutcome::from_str(row.try_get::<&str, _>("outcome")?)?,
            discord_id: row
                .try_get::<Option<i64>, _>("discord_id")?
                .map(|id| id as u64),
        }),
        ExtensionShape::Report => Extension::Report(ReportExt {
            evidence_blob: row.try_get("evidence_blob")?,
        }),
        ExtensionShape::AcceptedReport => Extension::AcceptedReport(AcceptedReportExt {
            accepted_report: row
                .try_get::<Option<i64>, _>("accepted_report_id")?
                .map(EntryId),
            issue_reference: row.try_get("issue_reference")?,
        }),
    };

    Ok(extension)
}

/// Read the shared duration/forgiveness columns
pub(crate) fn parse_duration(row: &SqliteRow) -> LedgerResult<DurationPunishment> {
    let forgiveness = if row.try_get::<bool, _>("forgiven")? {
        let forgiven_by: Option<i64> = row.try_get("forgiven_by")?;
        let forgiven_at = decode_opt_ts(row.try_get("forgiven_at")?)?;
        match (forgiven_by, forgiven_at) {
            (Some(by), Some(at)) => Some(Forgiveness {
                forgiven_by: PlayerId::from_db(by),
                forgiven_at: at,
                reason: row.try_get("forgive_reason")?,
            }),
            _ => {
                return Err(LedgerError::Internal(
                    "Forgiven punishment is missing forgiver or timestamp".to_string(),
                ))
            }
        }
    } else {
        None
    };

    let preset_type: Option<&str> = row.try_get("preset_type")?;
    let preset_level: Option<i32> = row.try_get("preset_level")?;
    let preset = match (preset_type, preset_level) {
        (Some(kind), Some(level)) => Some(PunishmentPreset {
            kind: PresetType::from_str(kind)?,
            level,
        }),
        _ => None,
    };

    Ok(DurationPunishment {
        duration_secs: row.try_get("duration_secs")?,
        forgiveness,
        preset,
    })
}

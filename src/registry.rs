/// Variant registry
///
/// The closed set of moderation entry variants, the extension shape each one
/// stores, and the link kinds between entries together with their delete
/// policy. Everything that needs to know "what table holds the rest of this
/// entry" goes through here.
use crate::error::{LedgerError, LedgerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Moderation entry variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Note,
    Commendation,
    Warning,
    Kick,
    Ban,
    Mute,
    AssetBan,
    AntiCheatKick,
    Teamkill,
    VehicleTeamkill,
    Appeal,
    Report,
    GriefingReport,
    ChatAbuseReport,
    VoiceChatAbuseReport,
    CheatingReport,
    PlayerReportAccepted,
    BugReportAccepted,
}

/// Physical layout of an extension row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionShape {
    Remark,
    Warning,
    Duration,
    Mute,
    AssetBan,
    AntiCheatKick,
    Teamkill,
    VehicleTeamkill,
    Appeal,
    Report,
    AcceptedReport,
}

/// Registry row for one variant
#[derive(Debug, Clone, Copy)]
pub struct VariantInfo {
    pub variant: Variant,
    pub shape: ExtensionShape,
    /// Counts as a punishment for appeal coverage and preset escalation
    pub punishment: bool,
    /// Member of the report family (owns a case file)
    pub report: bool,
}

const fn info(variant: Variant, shape: ExtensionShape, punishment: bool, report: bool) -> VariantInfo {
    VariantInfo {
        variant,
        shape,
        punishment,
        report,
    }
}

// Indexed by `Variant as usize`; keep in declaration order.
static REGISTRY: [VariantInfo; 18] = [
    info(Variant::Note, ExtensionShape::Remark, false, false),
    info(Variant::Commendation, ExtensionShape::Remark, false, false),
    info(Variant::Warning, ExtensionShape::Warning, true, false),
    info(Variant::Kick, ExtensionShape::Duration, true, false),
    info(Variant::Ban, ExtensionShape::Duration, true, false),
    info(Variant::Mute, ExtensionShape::Mute, true, false),
    info(Variant::AssetBan, ExtensionShape::AssetBan, true, false),
    info(Variant::AntiCheatKick, ExtensionShape::AntiCheatKick, true, false),
    info(Variant::Teamkill, ExtensionShape::Teamkill, false, false),
    info(Variant::VehicleTeamkill, ExtensionShape::VehicleTeamkill, false, false),
    info(Variant::Appeal, ExtensionShape::Appeal, false, false),
    info(Variant::Report, ExtensionShape::Report, false, true),
    info(Variant::GriefingReport, ExtensionShape::Report, false, true),
    info(Variant::ChatAbuseReport, ExtensionShape::Report, false, true),
    info(Variant::VoiceChatAbuseReport, ExtensionShape::Report, false, true),
    info(Variant::CheatingReport, ExtensionShape::Report, false, true),
    info(Variant::PlayerReportAccepted, ExtensionShape::AcceptedReport, false, false),
    info(Variant::BugReportAccepted, ExtensionShape::AcceptedReport, false, false),
];

impl Variant {
    pub const ALL: [Variant; 18] = [
        Variant::Note,
        Variant::Commendation,
        Variant::Warning,
        Variant::Kick,
        Variant::Ban,
        Variant::Mute,
        Variant::AssetBan,
        Variant::AntiCheatKick,
        Variant::Teamkill,
        Variant::VehicleTeamkill,
        Variant::Appeal,
        Variant::Report,
        Variant::GriefingReport,
        Variant::ChatAbuseReport,
        Variant::VoiceChatAbuseReport,
        Variant::CheatingReport,
        Variant::PlayerReportAccepted,
        Variant::BugReportAccepted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Note => "note",
            Variant::Commendation => "commendation",
            Variant::Warning => "warning",
            Variant::Kick => "kick",
            Variant::Ban => "ban",
            Variant::Mute => "mute",
            Variant::AssetBan => "asset_ban",
            Variant::AntiCheatKick => "anti_cheat_kick",
            Variant::Teamkill => "teamkill",
            Variant::VehicleTeamkill => "vehicle_teamkill",
            Variant::Appeal => "appeal",
            Variant::Report => "report",
            Variant::GriefingReport => "griefing_report",
            Variant::ChatAbuseReport => "chat_abuse_report",
            Variant::VoiceChatAbuseReport => "voice_chat_abuse_report",
            Variant::CheatingReport => "cheating_report",
            Variant::PlayerReportAccepted => "player_report_accepted",
            Variant::BugReportAccepted => "bug_report_accepted",
        }
    }

    pub fn from_str(s: &str) -> LedgerResult<Self> {
        Variant::ALL
            .iter()
            .copied()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| LedgerError::Internal(format!("Unknown entry variant: {}", s)))
    }

    pub fn info(&self) -> &'static VariantInfo {
        &REGISTRY[*self as usize]
    }

    pub fn shape(&self) -> ExtensionShape {
        self.info().shape
    }

    pub fn is_punishment(&self) -> bool {
        self.info().punishment
    }

    pub fn is_report(&self) -> bool {
        self.info().report
    }

    /// Variants whose extension carries duration and forgiveness state
    pub fn is_duration_punishment(&self) -> bool {
        self.shape().carries_duration()
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExtensionShape {
    pub fn name(&self) -> &'static str {
        match self {
            ExtensionShape::Remark => "remark",
            ExtensionShape::Warning => "warning",
            ExtensionShape::Duration => "duration",
            ExtensionShape::Mute => "mute",
            ExtensionShape::AssetBan => "asset ban",
            ExtensionShape::AntiCheatKick => "anti-cheat kick",
            ExtensionShape::Teamkill => "teamkill",
            ExtensionShape::VehicleTeamkill => "vehicle teamkill",
            ExtensionShape::Appeal => "appeal",
            ExtensionShape::Report => "report",
            ExtensionShape::AcceptedReport => "accepted report",
        }
    }

    /// Extension table, keyed by `entry_id`
    pub fn table(&self) -> &'static str {
        match self {
            ExtensionShape::Remark => "ext_remark",
            ExtensionShape::Warning => "ext_warning",
            ExtensionShape::Duration => "ext_duration",
            ExtensionShape::Mute => "ext_mute",
            ExtensionShape::AssetBan => "ext_asset_ban",
            ExtensionShape::AntiCheatKick => "ext_anticheat_kick",
            ExtensionShape::Teamkill => "ext_teamkill",
            ExtensionShape::VehicleTeamkill => "ext_vehicle_teamkill",
            ExtensionShape::Appeal => "ext_appeal",
            ExtensionShape::Report => "ext_report",
            ExtensionShape::AcceptedReport => "ext_accepted_report",
        }
    }

    /// Shapes sharing the duration/forgiveness column set
    pub fn carries_duration(&self) -> bool {
        matches!(
            self,
            ExtensionShape::Duration | ExtensionShape::Mute | ExtensionShape::AssetBan
        )
    }
}

/// Stored edge kinds between entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Related,
    Appeal,
    Report,
    AppealPunishment,
}

impl LinkKind {
    pub const ALL: [LinkKind; 4] = [
        LinkKind::Related,
        LinkKind::Appeal,
        LinkKind::Report,
        LinkKind::AppealPunishment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Related => "related",
            LinkKind::Appeal => "appeal",
            LinkKind::Report => "report",
            LinkKind::AppealPunishment => "appeal_punishment",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            LinkKind::Related => "related_entries",
            LinkKind::Appeal => "linked_appeals",
            LinkKind::Report => "linked_reports",
            LinkKind::AppealPunishment => "appeal_punishments",
        }
    }

    /// (source, target) column names
    pub fn columns(&self) -> (&'static str, &'static str) {
        match self {
            LinkKind::Related => ("entry_a", "entry_b"),
            LinkKind::Appeal => ("entry_id", "appeal_id"),
            LinkKind::Report => ("entry_id", "report_id"),
            LinkKind::AppealPunishment => ("appeal_id", "punishment_id"),
        }
    }

    /// Whether hard-deleting either endpoint drops the edge. A kind returning
    /// false makes `delete` fail with `Conflict` while edges remain.
    pub fn cascades_on_delete(&self) -> bool {
        match self {
            LinkKind::Related
            | LinkKind::Appeal
            | LinkKind::Report
            | LinkKind::AppealPunishment => true,
        }
    }
}

/// Moderation entries
///
/// Base rows, their per-variant extensions, filtered paging and the store
/// that ties them together.
pub mod extension;
pub mod model;
pub mod query;
pub mod store;

pub use extension::{
    AcceptedReportExt, AntiCheatKickExt, AppealExt, AppealOutcome, AssetBanExt, DurationPunishment,
    Extension, Forgiveness, MuteExt, MuteType, PresetType, PunishmentPreset, ReportExt,
    TeamkillExt, VehicleTeamkillExt, WarningExt, PERMANENT,
};
pub use model::{EntryBase, EntryDraft, LogWindow, ModerationEntry, Removal};
pub use query::{EntryFilter, SortOrder, DEFAULT_PAGE_SIZE};
pub use store::{DeleteSummary, EntryStore};

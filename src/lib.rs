/// Moderation Ledger
///
/// Polymorphic case-record store for game-server moderation: entries with
/// per-variant extensions, actor and evidence attachments, a relation graph
/// between entries, the punishment/forgiveness lifecycle and report case
/// files, all persisted in SQLite.
pub mod attachments;
pub mod audit;
pub mod case_file;
pub mod config;
pub mod context;
pub mod db;
pub mod entry;
pub mod error;
pub mod punishment;
pub mod registry;
pub mod relations;
pub mod types;
pub mod validation;

pub use attachments::{ActorAttribution, ActorManager, Evidence, EvidenceManager, NewEvidence};
pub use audit::{AuditAction, AuditRecord};
pub use case_file::{CaseFile, CaseFileManager};
pub use config::LedgerConfig;
pub use context::LedgerContext;
pub use entry::{EntryDraft, EntryFilter, EntryStore, Extension, ModerationEntry};
pub use error::{LedgerError, LedgerResult};
pub use punishment::{PunishmentManager, PunishmentState, ReputationSummary};
pub use registry::{ExtensionShape, LinkKind, Variant};
pub use relations::RelationManager;
pub use types::{EntryId, EvidenceId, PlayerId};

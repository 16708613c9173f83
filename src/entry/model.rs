/// Base entry models
use crate::{
    db::{decode_opt_ts, decode_ts},
    entry::extension::{DurationPunishment, Extension},
    error::LedgerResult,
    registry::Variant,
    types::{EntryId, PlayerId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};

/// Time window of server logs relevant to a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogWindow {
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Soft retraction of an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Removal {
    pub removed_by: Option<PlayerId>,
    pub removed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Producer-supplied base fields for a new entry.
///
/// Subject and issue time are optional here so that incomplete payloads are
/// rejected by validation rather than by the type system at the call site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryDraft {
    pub subject: Option<PlayerId>,
    pub issued_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub is_legacy: bool,
    pub legacy_id: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub pending_reputation: f64,
    pub reputation: Option<f64>,
    pub relevant_logs: Option<LogWindow>,
    pub message_ref: Option<u64>,
}

impl EntryDraft {
    pub fn new(subject: PlayerId, issued_at: DateTime<Utc>) -> Self {
        Self {
            subject: Some(subject),
            issued_at: Some(issued_at),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_pending_reputation(mut self, delta: f64) -> Self {
        self.pending_reputation = delta;
        self
    }

    pub fn with_relevant_logs(mut self, begin: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.relevant_logs = Some(LogWindow { begin, end });
        self
    }

    pub fn with_legacy_id(mut self, legacy_id: i64) -> Self {
        self.is_legacy = true;
        self.legacy_id = Some(legacy_id);
        self
    }

    pub fn with_message_ref(mut self, message_ref: u64) -> Self {
        self.message_ref = Some(message_ref);
        self
    }
}

/// Persisted base row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryBase {
    pub id: EntryId,
    pub subject: PlayerId,
    pub variant: Variant,
    pub message: Option<String>,
    pub is_legacy: bool,
    pub legacy_id: Option<i64>,
    pub issued_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub pending_reputation: f64,
    pub reputation: Option<f64>,
    pub relevant_logs: Option<LogWindow>,
    pub removal: Option<Removal>,
    pub message_ref: Option<u64>,
    pub version: i64,
}

pub(crate) const BASE_COLUMNS: &str = "id, subject_id, variant, message, is_legacy, legacy_id, \
     issued_at, resolved_at, pending_reputation, reputation, relevant_logs_begin, \
     relevant_logs_end, removed, removed_by, removed_at, removed_reason, message_ref, version";

impl EntryBase {
    pub(crate) fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        let variant = Variant::from_str(row.try_get::<&str, _>("variant")?)?;
        let issued_at = decode_ts(row.try_get::<&str, _>("issued_at")?)?;

        let begin = decode_opt_ts(row.try_get("relevant_logs_begin")?)?;
        let end = decode_opt_ts(row.try_get("relevant_logs_end")?)?;
        let relevant_logs = match (begin, end) {
            (Some(begin), Some(end)) => Some(LogWindow { begin, end }),
            _ => None,
        };

        let removal = if row.try_get::<bool, _>("removed")? {
            let removed_at = decode_opt_ts(row.try_get("removed_at")?)?.unwrap_or(issued_at);
            Some(Removal {
                removed_by: row
                    .try_get::<Option<i64>, _>("removed_by")?
                    .map(PlayerId::from_db),
                removed_at,
                reason: row.try_get("removed_reason")?,
            })
        } else {
            None
        };

        Ok(EntryBase {
            id: EntryId(row.try_get("id")?),
            subject: PlayerId::from_db(row.try_get("subject_id")?),
            variant,
            message: row.try_get("message")?,
            is_legacy: row.try_get("is_legacy")?,
            legacy_id: row.try_get("legacy_id")?,
            issued_at,
            resolved_at: decode_opt_ts(row.try_get("resolved_at")?)?,
            pending_reputation: row.try_get("pending_reputation")?,
            reputation: row.try_get("reputation")?,
            relevant_logs,
            removal,
            message_ref: row
                .try_get::<Option<i64>, _>("message_ref")?
                .map(|v| v as u64),
            version: row.try_get("version")?,
        })
    }
}

/// A moderation entry: base row plus its variant extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationEntry {
    pub base: EntryBase,
    pub extension: Extension,
}

impl ModerationEntry {
    pub fn id(&self) -> EntryId {
        self.base.id
    }

    pub fn variant(&self) -> Variant {
        self.base.variant
    }

    pub fn subject(&self) -> PlayerId {
        self.base.subject
    }

    pub fn is_removed(&self) -> bool {
        self.base.removal.is_some()
    }

    /// Duration and forgiveness state, for kick/ban/mute/asset-ban entries
    pub fn duration_punishment(&self) -> Option<&DurationPunishment> {
        self.extension.duration()
    }
}

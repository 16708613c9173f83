/// Entry audit trail
///
/// Every mutation of an entry bumps its `version` and appends one row here in
/// the same transaction. Rows outlive hard deletes.
use crate::{
    db::{decode_ts, encode_ts},
    error::{LedgerError, LedgerResult},
    types::{EntryId, PlayerId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqliteConnection};

/// Kinds of audited mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Removed,
    MessageEdited,
    WarningAcknowledged,
    AppealResolved,
    Forgiven,
    ReputationFinalized,
    ActorAdded,
    EvidenceAttached,
    EvidenceDetached,
    Linked,
    Unlinked,
    ReferenceCleared,
    RecordAppended,
    Deleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Created => "created",
            AuditAction::Removed => "removed",
            AuditAction::MessageEdited => "message_edited",
            AuditAction::WarningAcknowledged => "warning_acknowledged",
            AuditAction::AppealResolved => "appeal_resolved",
            AuditAction::Forgiven => "forgiven",
            AuditAction::ReputationFinalized => "reputation_finalized",
            AuditAction::ActorAdded => "actor_added",
            AuditAction::EvidenceAttached => "evidence_attached",
            AuditAction::EvidenceDetached => "evidence_detached",
            AuditAction::Linked => "linked",
            AuditAction::Unlinked => "unlinked",
            AuditAction::ReferenceCleared => "reference_cleared",
            AuditAction::RecordAppended => "record_appended",
            AuditAction::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> LedgerResult<Self> {
        let action = match s {
            "created" => AuditAction::Created,
            "removed" => AuditAction::Removed,
            "message_edited" => AuditAction::MessageEdited,
            "warning_acknowledged" => AuditAction::WarningAcknowledged,
            "appeal_resolved" => AuditAction::AppealResolved,
            "forgiven" => AuditAction::Forgiven,
            "reputation_finalized" => AuditAction::ReputationFinalized,
            "actor_added" => AuditAction::ActorAdded,
            "evidence_attached" => AuditAction::EvidenceAttached,
            "evidence_detached" => AuditAction::EvidenceDetached,
            "linked" => AuditAction::Linked,
            "unlinked" => AuditAction::Unlinked,
            "reference_cleared" => AuditAction::ReferenceCleared,
            "record_appended" => AuditAction::RecordAppended,
            "deleted" => AuditAction::Deleted,
            _ => return Err(LedgerError::Internal(format!("Invalid audit action: {}", s))),
        };
        Ok(action)
    }
}

/// One audited mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub entry_id: EntryId,
    /// Entry version after the mutation
    pub version: i64,
    pub action: AuditAction,
    pub actor: Option<PlayerId>,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Bump the entry version and log the mutation. Doubles as the existence
/// check for writes that target an entry: a missing entry yields `NotFound`.
pub(crate) async fn touch(
    conn: &mut SqliteConnection,
    entry_id: EntryId,
    action: AuditAction,
    actor: Option<PlayerId>,
    detail: Option<&str>,
) -> LedgerResult<i64> {
    let version: i64 = sqlx::query_scalar(
        "UPDATE moderation_entries SET version = version + 1 WHERE id = ? RETURNING version",
    )
    .bind(entry_id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| LedgerError::entry_not_found(entry_id))?;

    append(conn, entry_id, version, action, actor, detail).await?;

    Ok(version)
}

/// Log a mutation at an explicit version without touching the entry row
pub(crate) async fn append(
    conn: &mut SqliteConnection,
    entry_id: EntryId,
    version: i64,
    action: AuditAction,
    actor: Option<PlayerId>,
    detail: Option<&str>,
) -> LedgerResult<()> {
    sqlx::query(
        r#"
        INSERT INTO entry_audit (entry_id, version, action, actor_id, detail, recorded_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry_id.0)
    .bind(version)
    .bind(action.as_str())
    .bind(actor.map(PlayerId::to_db))
    .bind(detail)
    .bind(encode_ts(&Utc::now()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Audit rows for an entry, oldest first
pub(crate) async fn history(
    conn: &mut SqliteConnection,
    entry_id: EntryId,
) -> LedgerResult<Vec<AuditRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, entry_id, version, action, actor_id, detail, recorded_at
        FROM entry_audit
        WHERE entry_id = ?
        ORDER BY id
        "#,
    )
    .bind(entry_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(AuditRecord {
            id: row.try_get("id")?,
            entry_id: EntryId(row.try_get("entry_id")?),
            version: row.try_get("version")?,
            action: AuditAction::from_str(row.try_get::<&str, _>("action")?)?,
            actor: row
                .try_get::<Option<i64>, _>("actor_id")?
                .map(PlayerId::from_db),
            detail: row.try_get("detail")?,
            recorded_at: decode_ts(row.try_get::<&str, _>("recorded_at")?)?,
        });
    }

    Ok(records)
}

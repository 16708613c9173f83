/// Evidence items
///
/// Evidence can be captured before the case it belongs to exists. Such items
/// sit unattached until a moderator assigns them to exactly one entry.
use crate::{
    audit::{self, AuditAction},
    db::{self, decode_ts, encode_ts},
    error::{LedgerError, LedgerResult},
    types::{EntryId, EvidenceId, PlayerId},
    validation::{Checker, MAX_MESSAGE_LEN, MAX_URL_LEN},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

/// Producer payload for a new evidence item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvidence {
    pub url: String,
    pub saved_location: Option<String>,
    pub is_image: bool,
    pub captured_at: DateTime<Utc>,
    pub actor: Option<PlayerId>,
    pub note: Option<String>,
}

impl NewEvidence {
    pub fn new(url: impl Into<String>, captured_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            saved_location: None,
            is_image: false,
            captured_at,
            actor: None,
            note: None,
        }
    }

    pub fn image(mut self) -> Self {
        self.is_image = true;
        self
    }

    pub fn captured_by(mut self, actor: PlayerId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn saved_at(mut self, location: impl Into<String>) -> Self {
        self.saved_location = Some(location.into());
        self
    }
}

/// Stored evidence item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EvidenceId,
    pub entry_id: Option<EntryId>,
    pub url: String,
    pub saved_location: Option<String>,
    pub is_image: bool,
    pub captured_at: DateTime<Utc>,
    pub actor: Option<PlayerId>,
    pub note: Option<String>,
}

impl Evidence {
    fn from_row(row: &SqliteRow) -> LedgerResult<Self> {
        Ok(Evidence {
            id: EvidenceId(row.try_get("id")?),
            entry_id: row.try_get::<Option<i64>, _>("entry_id")?.map(EntryId),
            url: row.try_get("url")?,
            saved_location: row.try_get("saved_location")?,
            is_image: row.try_get("is_image")?,
            captured_at: decode_ts(row.try_get::<&str, _>("captured_at")?)?,
            actor: row
                .try_get::<Option<i64>, _>("actor_id")?
                .map(PlayerId::from_db),
            note: row.try_get("note")?,
        })
    }
}

const EVIDENCE_COLUMNS: &str =
    "id, entry_id, url, saved_location, is_image, captured_at, actor_id, note";

/// Evidence manager
#[derive(Clone)]
pub struct EvidenceManager {
    db: SqlitePool,
}

impl EvidenceManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Store an evidence item, optionally attached to an entry right away
    pub async fn add_evidence(
        &self,
        entry_id: Option<EntryId>,
        evidence: NewEvidence,
    ) -> LedgerResult<EvidenceId> {
        let mut check = Checker::new();
        check.non_empty("url", &evidence.url, MAX_URL_LEN);
        check.max_len("note", evidence.note.as_deref(), MAX_MESSAGE_LEN);
        check.into_ledger_result()?;

        let mut tx = db::begin_write(&self.db).await?;

        if let Some(entry_id) = entry_id {
            audit::touch(
                &mut tx,
                entry_id,
                AuditAction::EvidenceAttached,
                evidence.actor,
                Some(&evidence.url),
            )
            .await?;
        }

        let id = insert(&mut tx, entry_id, &evidence).await?;

        tx.commit().await?;

        tracing::debug!("Stored evidence {} ({})", id, evidence.url);

        Ok(id)
    }

    /// Assign an evidence item to an entry.
    ///
    /// An item belongs to at most one case: attaching it elsewhere moves it,
    /// and the previous owner records the detachment. Attaching it to its
    /// current owner changes nothing.
    pub async fn attach_evidence(&self, evidence_id: EvidenceId, entry_id: EntryId) -> LedgerResult<()> {
        let mut tx = db::begin_write(&self.db).await?;

        let current: Option<Option<i64>> =
            sqlx::query_scalar("SELECT entry_id FROM evidence WHERE id = ?")
                .bind(evidence_id.0)
                .fetch_optional(&mut *tx)
                .await?;

        let previous = match current {
            None => {
                return Err(LedgerError::NotFound(format!(
                    "Evidence {} not found",
                    evidence_id
                )))
            }
            Some(Some(owner)) if owner == entry_id.0 => return Ok(()),
            Some(owner) => owner.map(EntryId),
        };

        let detail = evidence_id.to_string();
        audit::touch(&mut tx, entry_id, AuditAction::EvidenceAttached, None, Some(&detail)).await?;
        if let Some(owner) = previous {
            audit::touch(&mut tx, owner, AuditAction::EvidenceDetached, None, Some(&detail)).await?;
        }

        sqlx::query("UPDATE evidence SET entry_id = ? WHERE id = ?")
            .bind(entry_id.0)
            .bind(evidence_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        match previous {
            Some(owner) => tracing::debug!(
                "Evidence {} moved from entry {} to entry {}",
                evidence_id,
                owner,
                entry_id
            ),
            None => tracing::debug!("Evidence {} attached to entry {}", evidence_id, entry_id),
        }

        Ok(())
    }

    /// Evidence of an entry in capture order
    pub async fn list_evidence(&self, entry_id: EntryId) -> LedgerResult<Vec<Evidence>> {
        let sql = format!(
            "SELECT {} FROM evidence WHERE entry_id = ? ORDER BY captured_at, id",
            EVIDENCE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(entry_id.0)
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(Evidence::from_row).collect()
    }

    /// Evidence waiting to be classified, oldest first
    pub async fn list_unattached_evidence(&self) -> LedgerResult<Vec<Evidence>> {
        let sql = format!(
            "SELECT {} FROM evidence WHERE entry_id IS NULL ORDER BY captured_at, id",
            EVIDENCE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.db).await?;

        rows.iter().map(Evidence::from_row).collect()
    }
}

async fn insert(
    conn: &mut SqliteConnection,
    entry_id: Option<EntryId>,
    evidence: &NewEvidence,
) -> LedgerResult<EvidenceId> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO evidence (entry_id, url, saved_location, is_image, captured_at, actor_id, note)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(entry_id.map(|id| id.0))
    .bind(&evidence.url)
    .bind(&evidence.saved_location)
    .bind(evidence.is_image)
    .bind(encode_ts(&evidence.captured_at))
    .bind(evidence.actor.map(PlayerId::to_db))
    .bind(&evidence.note)
    .fetch_one(&mut *conn)
    .await?;

    Ok(EvidenceId(id))
}

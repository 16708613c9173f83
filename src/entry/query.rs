/// Entry filters and keyset paging
use crate::{
    db::encode_ts,
    entry::model::{ModerationEntry, BASE_COLUMNS},
    registry::Variant,
    types::PlayerId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

/// Default number of entries fetched per page
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Sort order over `issued_at` (ties broken by id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

/// Filter for `EntryStore::get_many`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryFilter {
    pub subject: Option<PlayerId>,
    /// Empty matches every variant
    pub variants: Vec<Variant>,
    /// Inclusive lower bound
    pub issued_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub issued_until: Option<DateTime<Utc>>,
    pub removed: Option<bool>,
    pub order: SortOrder,
}

impl EntryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_subject(subject: PlayerId) -> Self {
        Self {
            subject: Some(subject),
            ..Self::default()
        }
    }

    pub fn with_variants(mut self, variants: impl IntoIterator<Item = Variant>) -> Self {
        self.variants = variants.into_iter().collect();
        self
    }

    pub fn issued_between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.issued_from = Some(from);
        self.issued_until = Some(until);
        self
    }

    pub fn removed(mut self, removed: bool) -> Self {
        self.removed = Some(removed);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.order = SortOrder::OldestFirst;
        self
    }
}

/// Position after the last entry of a page
#[derive(Debug, Clone)]
pub(crate) struct Cursor {
    issued_at: String,
    id: i64,
}

impl Cursor {
    pub(crate) fn after(entry: &ModerationEntry) -> Self {
        Self {
            issued_at: encode_ts(&entry.base.issued_at),
            id: entry.id().0,
        }
    }
}

pub(crate) enum PageState {
    Start,
    After(Cursor),
    Done,
}

/// Build the base-row query for one page
pub(crate) fn page_query<'a>(
    filter: &'a EntryFilter,
    after: Option<&'a Cursor>,
    limit: usize,
) -> QueryBuilder<'a, Sqlite> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {} FROM moderation_entries WHERE 1 = 1",
        BASE_COLUMNS
    ));

    if let Some(subject) = filter.subject {
        qb.push(" AND subject_id = ").push_bind(subject.to_db());
    }

    if !filter.variants.is_empty() {
        qb.push(" AND variant IN (");
        let mut separated = qb.separated(", ");
        for variant in &filter.variants {
            separated.push_bind(variant.as_str());
        }
        separated.push_unseparated(")");
    }

    if let Some(from) = &filter.issued_from {
        qb.push(" AND issued_at >= ").push_bind(encode_ts(from));
    }
    if let Some(until) = &filter.issued_until {
        qb.push(" AND issued_at < ").push_bind(encode_ts(until));
    }
    if let Some(removed) = filter.removed {
        qb.push(" AND removed = ").push_bind(removed);
    }

    let (cmp, dir) = match filter.order {
        SortOrder::NewestFirst => ("<", "DESC"),
        SortOrder::OldestFirst => (">", "ASC"),
    };

    if let Some(cursor) = after {
        qb.push(format!(" AND (issued_at {} ", cmp))
            .push_bind(cursor.issued_at.as_str())
            .push(" OR (issued_at = ")
            .push_bind(cursor.issued_at.as_str())
            .push(format!(" AND id {} ", cmp))
            .push_bind(cursor.id)
            .push("))");
    }

    qb.push(format!(" ORDER BY issued_at {dir}, id {dir} LIMIT "))
        .push_bind(limit as i64);

    qb
}

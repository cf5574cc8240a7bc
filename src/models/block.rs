use chrono::{DateTime, Duration, Utc};

/// Category reference as stored on a block.
///
/// Rows written before categories existed have no category; the migration
/// that introduces the column backfills them, so `Unassigned` only shows up
/// when reading a database mid-history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCategory {
    Assigned(i64),
    Unassigned,
}

impl BlockCategory {
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Assigned(id) => Some(*id),
            Self::Unassigned => None,
        }
    }
}

impl From<Option<i64>> for BlockCategory {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::Unassigned, Self::Assigned)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: Option<i64>,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub category: BlockCategory,
}

impl Block {
    pub fn new(title: String, start: DateTime<Utc>, end: DateTime<Utc>, category_id: i64) -> Self {
        Self {
            id: None,
            title,
            start,
            end,
            category: BlockCategory::Assigned(category_id),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Hours of this block that fall inside `[from, to)`.
    pub fn hours_within(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
        let start = self.start.max(from);
        let end = self.end.min(to);
        if end <= start {
            return 0.0;
        }
        (end - start).num_seconds() as f64 / 3600.0
    }
}

/// Hours spent in one category over a day.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTotal {
    pub category_id: i64,
    pub name: String,
    pub color: String,
    pub hours: f64,
}

//! Owner-scoped list predicate shared by every entity query.
//!
//! An [`EntityFilter`] can only be built from an owner id, so there is no way
//! to construct a list query that forgets the ownership predicate.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::{LOOKBACK_HOURS, MAX_TAGS_PER_REQUEST, PAGE_LIMIT, PAGE_LIMIT_MAX, PAGE_OFFSET};
use crate::error::{Error, Result};
use crate::normalize::normalize_name;

/// Closed time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Default window: the last 24 hours ending at `now`.
    pub fn lookback(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::hours(LOOKBACK_HOURS),
            end: now,
        }
    }

    /// Fill missing bounds from the default window; reject inverted ranges.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or(end - Duration::hours(LOOKBACK_HOURS));
        if start > end {
            return Err(Error::InvalidInput(format!(
                "start ({start}) must not be after end ({end})"
            )));
        }
        Ok(Self { start, end })
    }
}

/// Offset/limit pair, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: PAGE_OFFSET,
            limit: PAGE_LIMIT,
        }
    }
}

impl Page {
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Result<Self> {
        let offset = offset.unwrap_or(PAGE_OFFSET);
        let limit = limit.unwrap_or(PAGE_LIMIT);
        if offset < 0 {
            return Err(Error::InvalidInput("offset must be >= 0".into()));
        }
        if !(1..=PAGE_LIMIT_MAX).contains(&limit) {
            return Err(Error::InvalidInput(format!(
                "limit must be within 1..={PAGE_LIMIT_MAX}"
            )));
        }
        Ok(Self { offset, limit })
    }
}

/// List predicate: `{owner_id, id?, parent_id?, time_range, tag_names?, text?}`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFilter {
    owner_id: i64,
    pub id: Option<i64>,
    pub parent_id: Option<i64>,
    pub time_range: TimeRange,
    /// Normalized tag (or metric) names, OR'd.
    pub tag_names: Vec<String>,
    pub text: Option<String>,
    pub page: Page,
}

impl EntityFilter {
    pub fn for_owner(owner_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            id: None,
            parent_id: None,
            time_range: TimeRange::lookback(now),
            tag_names: Vec::new(),
            text: None,
            page: Page::default(),
        }
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_time_range(mut self, range: TimeRange) -> Self {
        self.time_range = range;
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }

    /// Set a free-text match; blank input clears it.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim();
        self.text = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    /// Set tag names, normalizing each and dropping empties.
    pub fn with_tags<I, S>(mut self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: Vec<String> = names
            .into_iter()
            .filter_map(|n| normalize_name(n.as_ref()))
            .collect();
        tags.sort();
        tags.dedup();
        if tags.len() > MAX_TAGS_PER_REQUEST {
            return Err(Error::InvalidInput(format!(
                "at most {MAX_TAGS_PER_REQUEST} tags per request"
            )));
        }
        self.tag_names = tags;
        Ok(self)
    }

    /// A fetch by id ignores every other predicate except ownership.
    pub fn is_by_id(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_default_window_is_last_24h() {
        let f = EntityFilter::for_owner(7, now());
        assert_eq!(f.owner_id(), 7);
        assert_eq!(f.time_range.end, now());
        assert_eq!(f.time_range.start, now() - Duration::hours(24));
        assert_eq!(f.page, Page { offset: 0, limit: 100 });
    }

    #[test]
    fn test_resolve_partial_range() {
        let start = now() - Duration::days(3);
        let r = TimeRange::resolve(Some(start), None, now()).unwrap();
        assert_eq!(r.start, start);
        assert_eq!(r.end, now());

        let end = now() - Duration::days(1);
        let r = TimeRange::resolve(None, Some(end), now()).unwrap();
        assert_eq!(r.start, end - Duration::hours(24));
    }

    #[test]
    fn test_resolve_rejects_inverted_range() {
        let err = TimeRange::resolve(Some(now()), Some(now() - Duration::hours(1)), now());
        assert!(err.is_err());
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(Page::new(None, None).unwrap(), Page::default());
        assert_eq!(
            Page::new(Some(4), Some(100)).unwrap(),
            Page { offset: 4, limit: 100 }
        );
        assert!(Page::new(Some(-1), None).is_err());
        assert!(Page::new(None, Some(0)).is_err());
        assert!(Page::new(None, Some(1001)).is_err());
    }

    #[test]
    fn test_tags_are_normalized_and_deduped() {
        let f = EntityFilter::for_owner(1, now())
            .with_tags(["Health", "health", " Fitness ", "!!"])
            .unwrap();
        assert_eq!(f.tag_names, vec!["fitness", "health"]);
    }

    #[test]
    fn test_blank_text_is_ignored() {
        let f = EntityFilter::for_owner(1, now()).with_text("   ");
        assert_eq!(f.text, None);
        let f = EntityFilter::for_owner(1, now()).with_text(" Heart ");
        assert_eq!(f.text.as_deref(), Some("Heart"));
    }
}

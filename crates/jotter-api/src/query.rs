//! List query parameters.
//!
//! Every list endpoint accepts the same parameters:
//! `id`, `note_id`, `start`, `end`, `tag` (repeatable or comma-separated),
//! `q`, `offset`, `limit`. Unknown parameters are ignored.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use jotter_core::{EntityFilter, Page, TimeRange};

use crate::ApiError;

/// Parsed list parameters, before they are bound to an owner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListParams {
    pub id: Option<i64>,
    pub note_id: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub q: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

impl ListParams {
    /// Parse raw `(key, value)` pairs; times are resolved against `now`.
    pub fn from_pairs(pairs: Vec<(String, String)>, now: DateTime<Utc>) -> Result<Self, ApiError> {
        let mut params = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "id" => params.id = Some(parse_int(&key, &value)?),
                "note_id" => params.note_id = Some(parse_int(&key, &value)?),
                "start" => params.start = Some(parse_time(&value, now)?),
                "end" => params.end = Some(parse_time(&value, now)?),
                "tag" | "tags" => params.tags.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                ),
                "q" => params.q = Some(value),
                "offset" => params.offset = Some(parse_int(&key, &value)?),
                "limit" => params.limit = Some(parse_int(&key, &value)?),
                _ => {}
            }
        }
        Ok(params)
    }

    pub fn time_range(&self, now: DateTime<Utc>) -> Result<TimeRange, ApiError> {
        Ok(TimeRange::resolve(self.start, self.end, now)?)
    }

    /// Owner-scoped filter for `owner_id`; `note_id` becomes the parent predicate.
    pub fn filter(&self, owner_id: i64, now: DateTime<Utc>) -> Result<EntityFilter, ApiError> {
        let mut filter = EntityFilter::for_owner(owner_id, now)
            .with_time_range(self.time_range(now)?)
            .with_page(Page::new(self.offset, self.limit)?)
            .with_tags(&self.tags)?;
        if let Some(id) = self.id {
            filter = filter.with_id(id);
        }
        if let Some(note_id) = self.note_id {
            filter = filter.with_parent(note_id);
        }
        if let Some(q) = &self.q {
            filter = filter.with_text(q.as_str());
        }
        Ok(filter)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ListParams
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state).await?;
        ListParams::from_pairs(pairs, Utc::now())
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, ApiError> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("{key} must be an integer, got '{value}'")))
}

/// Parse a timestamp query value.
///
/// Accepts:
/// - RFC 3339: `2026-01-15T10:30:00Z`, `2026-01-15T10:30:00+02:00`
/// - ISO 8601 without timezone (assumes UTC): `2026-01-15T10:30:00`
/// - Date only (midnight UTC): `2026-01-15`
/// - Unix seconds: `1768473000`
/// - `now`, or a relative shorthand counted back from now: `30min`, `2h`, `7d`, `1w`
pub fn parse_time(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ApiError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(ApiError::BadRequest(
            "time value cannot be empty; expected RFC 3339 (e.g. '2026-01-15T10:30:00Z')".into(),
        ));
    }
    if s.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Some(back) = parse_relative_shorthand(&s.to_ascii_lowercase()) {
        return now
            .checked_sub_signed(back)
            .ok_or_else(|| ApiError::BadRequest(format!("time '{s}' reaches too far back")));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }
    if let Ok(secs) = s.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(secs, 0) {
            return Ok(dt);
        }
    }
    Err(ApiError::BadRequest(format!(
        "invalid time '{s}'; expected RFC 3339 (e.g. '2026-01-15T10:30:00Z'), a date, unix seconds, 'now' or a shorthand like '7d'"
    )))
}

/// `<n><unit>` with unit one of `min`, `h`, `d`, `w`.
fn parse_relative_shorthand(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    if split == 0 {
        return None;
    }
    let (digits, unit) = s.split_at(split);
    let n: i64 = digits.parse().ok()?;
    match unit {
        "min" | "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => None,
    }
}

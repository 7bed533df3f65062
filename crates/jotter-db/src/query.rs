//! Owner-scoped WHERE clause generation for list queries.
//!
//! Every entity list goes through [`build_where`]: the owner predicate is
//! always `$1`, followed by whichever optional predicates the
//! [`EntityFilter`] carries. Parameters are returned in placeholder order and
//! bound in the same order.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Transaction};

use jotter_core::{EntityFilter, Error, Result};

use crate::escape_like;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    BigInt(i64),
    Timestamp(DateTime<Utc>),
    String(String),
    StringArray(Vec<String>),
}

/// Describes where an entity keeps the columns a list filter touches.
#[derive(Debug, Clone, Copy)]
pub struct EntityShape {
    /// `FROM` clause including any join needed to reach the owner column.
    pub from: &'static str,
    pub id_column: &'static str,
    pub owner_column: &'static str,
    pub parent_column: Option<&'static str>,
    /// Timestamp column the window applies to; `None` disables time filtering.
    pub time_column: Option<&'static str>,
    pub text_columns: &'static [&'static str],
    /// `(join table, join table's entity column)` for tag filtering.
    pub tag_join: Option<(&'static str, &'static str)>,
    /// Column used by name filters (metric lookups by tag name).
    pub name_column: Option<&'static str>,
}

impl EntityShape {
    /// `ORDER BY` clause: newest first, id as tiebreaker.
    pub fn order_by(&self) -> String {
        match self.time_column {
            Some(time) => format!("{time} DESC, {} DESC", self.id_column),
            None => format!("{} DESC", self.id_column),
        }
    }
}

/// Generated predicate plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl WhereClause {
    /// Index of the next free placeholder.
    pub fn next_placeholder(&self) -> usize {
        self.params.len() + 1
    }
}

/// Build the WHERE clause for `filter` against `shape`.
pub fn build_where(shape: &EntityShape, filter: &EntityFilter) -> WhereClause {
    let mut clauses = vec![format!("{} = $1", shape.owner_column)];
    let mut params = vec![QueryParam::BigInt(filter.owner_id())];

    // Fetch by id ignores every other predicate.
    if let Some(id) = filter.id {
        params.push(QueryParam::BigInt(id));
        clauses.push(format!("{} = ${}", shape.id_column, params.len()));
        return WhereClause {
            sql: clauses.join(" AND "),
            params,
        };
    }

    if let (Some(parent_id), Some(column)) = (filter.parent_id, shape.parent_column) {
        params.push(QueryParam::BigInt(parent_id));
        clauses.push(format!("{column} = ${}", params.len()));
    }

    if let Some(column) = shape.time_column {
        params.push(QueryParam::Timestamp(filter.time_range.start));
        clauses.push(format!("{column} >= ${}", params.len()));
        params.push(QueryParam::Timestamp(filter.time_range.end));
        clauses.push(format!("{column} <= ${}", params.len()));
    }

    if !filter.tag_names.is_empty() {
        params.push(QueryParam::StringArray(filter.tag_names.clone()));
        let idx = params.len();
        let mut alternatives = Vec::new();
        if let Some((table, column)) = shape.tag_join {
            alternatives.push(format!(
                "EXISTS (SELECT 1 FROM {table} jt JOIN tag tg ON tg.id = jt.tag_id \
                 WHERE jt.{column} = {} AND tg.name = ANY(${idx}))",
                shape.id_column
            ));
        }
        if let Some(name) = shape.name_column {
            alternatives.push(format!("{name} = ANY(${idx})"));
        }
        if alternatives.is_empty() {
            clauses.push("FALSE".to_string());
        } else {
            clauses.push(format!("({})", alternatives.join(" OR ")));
        }
    }

    if let Some(text) = &filter.text {
        if !shape.text_columns.is_empty() {
            params.push(QueryParam::String(format!("%{}%", escape_like(text))));
            let idx = params.len();
            let matches: Vec<String> = shape
                .text_columns
                .iter()
                .map(|col| format!("{col} ILIKE ${idx}"))
                .collect();
            clauses.push(format!("({})", matches.join(" OR ")));
        }
    }

    WhereClause {
        sql: clauses.join(" AND "),
        params,
    }
}

/// Bind a slice of [`QueryParam`]s onto a sqlx query in order.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut q = $query;
        for param in $params {
            q = match param {
                $crate::query::QueryParam::BigInt(v) => q.bind(*v),
                $crate::query::QueryParam::Timestamp(ts) => q.bind(*ts),
                $crate::query::QueryParam::String(s) => q.bind(s.as_str()),
                $crate::query::QueryParam::StringArray(arr) => q.bind(arr.as_slice()),
            };
        }
        q
    }};
}
pub(crate) use bind_params;

/// Run a filtered, paginated list query and its COUNT.
///
/// Returns the page of rows plus the total number of matches.
pub(crate) async fn fetch_page<T>(
    tx: &mut Transaction<'_, Postgres>,
    shape: &EntityShape,
    columns: &str,
    filter: &EntityFilter,
) -> Result<(Vec<T>, i64)>
where
    T: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin,
{
    let clause = build_where(shape, filter);

    let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", shape.from, clause.sql);
    let total: i64 = bind_params!(sqlx::query_scalar::<_, i64>(&count_sql), &clause.params)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

    let n = clause.next_placeholder();
    let sql = format!(
        "SELECT {columns} FROM {} WHERE {} ORDER BY {} LIMIT ${} OFFSET ${}",
        shape.from,
        clause.sql,
        shape.order_by(),
        n,
        n + 1
    );
    let rows = bind_params!(sqlx::query_as::<_, T>(&sql), &clause.params)
        .bind(filter.page.limit)
        .bind(filter.page.offset)
        .fetch_all(&mut **tx)
        .await
        .map_err(Error::Database)?;

    Ok((rows, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SHAPE: EntityShape = EntityShape {
        from: "task t",
        id_column: "t.id",
        owner_column: "t.user_id",
        parent_column: Some("t.note_id"),
        time_column: Some("t.created_at"),
        text_columns: &["t.summary", "t.description"],
        tag_join: Some(("task_tag", "task_id")),
        name_column: None,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_owner_predicate_always_first() {
        let w = build_where(&SHAPE, &EntityFilter::for_owner(42, now()));
        assert!(w.sql.starts_with("t.user_id = $1"));
        assert_eq!(w.params[0], QueryParam::BigInt(42));
        // owner + window
        assert_eq!(w.params.len(), 3);
        assert_eq!(w.next_placeholder(), 4);
    }

    #[test]
    fn test_by_id_ignores_other_predicates() {
        let filter = EntityFilter::for_owner(1, now())
            .with_id(9)
            .with_parent(3)
            .with_text("milk");
        let w = build_where(&SHAPE, &filter);
        assert_eq!(w.sql, "t.user_id = $1 AND t.id = $2");
        assert_eq!(w.params, vec![QueryParam::BigInt(1), QueryParam::BigInt(9)]);
    }

    #[test]
    fn test_all_predicates_numbered_in_order() {
        let filter = EntityFilter::for_owner(1, now())
            .with_parent(3)
            .with_text("50%")
            .with_tags(["Health"])
            .unwrap();
        let w = build_where(&SHAPE, &filter);
        assert!(w.sql.contains("t.note_id = $2"));
        assert!(w.sql.contains("t.created_at >= $3"));
        assert!(w.sql.contains("t.created_at <= $4"));
        assert!(w.sql.contains("tg.name = ANY($5)"));
        assert!(w.sql.contains("t.summary ILIKE $6 OR t.description ILIKE $6"));
        assert_eq!(
            w.params[4],
            QueryParam::StringArray(vec!["health".to_string()])
        );
        assert_eq!(w.params[5], QueryParam::String("%50\\%%".to_string()));
    }

    #[test]
    fn test_untimed_shape_skips_window() {
        let shape = EntityShape {
            time_column: None,
            ..SHAPE
        };
        let w = build_where(&shape, &EntityFilter::for_owner(1, now()));
        assert_eq!(w.sql, "t.user_id = $1");
        assert_eq!(shape.order_by(), "t.id DESC");
        assert_eq!(SHAPE.order_by(), "t.created_at DESC, t.id DESC");
    }

    #[test]
    fn test_name_column_joins_tag_alternative() {
        let shape = EntityShape {
            name_column: Some("m.name"),
            ..SHAPE
        };
        let filter = EntityFilter::for_owner(1, now())
            .with_tags(["heart rate"])
            .unwrap();
        let w = build_where(&shape, &filter);
        assert!(w.sql.contains("OR m.name = ANY($4)"));
    }
}

//! Membership queries
//!
//! A consumer describes which rows belong to a view with one WHERE
//! fragment, a display ORDER BY, and an optional limit. The same
//! condition feeds both paths: cache reloads collect keys in display
//! order, and the synchronizer re-sorts the collected keys ascending by
//! primary key before merging.

use rusqlite::params;

use crate::db::{statement_error, Database};
use crate::error::Result;

/// Limit applied while collecting member keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewLimit {
    /// At most this many rows
    Rows(u64),

    /// Stop once the running total of an integer column would pass the
    /// threshold; a row is admitted only while the total stays within it
    RunningTotal {
        /// Column summed while collecting
        column: String,

        /// Inclusive budget for the running total
        threshold: i64,
    },
}

/// Query describing a view's membership and display order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewQuery {
    condition: Option<String>,
    display_order: Option<String>,
    limit: Option<ViewLimit>,
}

impl ViewQuery {
    /// Query matching every row, in natural order
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict membership with a WHERE fragment over the backing table
    pub fn with_condition(mut self, fragment: impl Into<String>) -> Self {
        self.condition = Some(fragment.into());
        self
    }

    /// Order materialized rows with an ORDER BY fragment
    pub fn with_order(mut self, fragment: impl Into<String>) -> Self {
        self.display_order = Some(fragment.into());
        self
    }

    /// Bound the collected membership
    pub fn with_limit(mut self, limit: ViewLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The WHERE fragment, when one was set
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// The display ORDER BY fragment, when one was set
    pub fn display_order(&self) -> Option<&str> {
        self.display_order.as_deref()
    }

    /// SELECT statement yielding candidate keys in display order.
    ///
    /// A running-total limit also selects its weight column so the
    /// collection loop can accumulate it.
    pub(crate) fn member_sql(&self, table: &str, pk: &str) -> String {
        let mut sql = match &self.limit {
            Some(ViewLimit::RunningTotal { column, .. }) => {
                format!("SELECT {}, {} FROM {}", pk, column, table)
            }
            _ => format!("SELECT {} FROM {}", pk, table),
        };
        if let Some(condition) = &self.condition {
            sql.push_str(" WHERE ");
            sql.push_str(condition);
        }
        if let Some(order) = &self.display_order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(ViewLimit::Rows(count)) = &self.limit {
            sql.push_str(&format!(" LIMIT {}", count));
        }
        sql
    }
}

/// Collect member keys in display order, honoring the query's limit.
///
/// A running-total limit short-circuits the scan; rows never reached are
/// simply absent from the result.
pub fn collect_members(
    db: &Database,
    table: &str,
    pk: &str,
    query: &ViewQuery,
) -> Result<Vec<i64>> {
    let sql = query.member_sql(table, pk);
    db.with_connection(|conn| {
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| statement_error(&sql, e))?;
        let mut rows = stmt.query(params![]).map_err(|e| statement_error(&sql, e))?;

        let mut keys = Vec::new();
        match &query.limit {
            Some(ViewLimit::RunningTotal { threshold, .. }) => {
                let mut total: i64 = 0;
                while let Some(row) = rows.next().map_err(|e| statement_error(&sql, e))? {
                    let key: i64 = row.get(0).map_err(|e| statement_error(&sql, e))?;
                    let weight: i64 = row.get(1).map_err(|e| statement_error(&sql, e))?;
                    if total + weight > *threshold {
                        break;
                    }
                    total += weight;
                    keys.push(key);
                }
            }
            _ => {
                while let Some(row) = rows.next().map_err(|e| statement_error(&sql, e))? {
                    keys.push(row.get(0).map_err(|e| statement_error(&sql, e))?);
                }
            }
        }
        Ok(keys)
    })
}

//! Query builders for readings and summaries.
//!
//! Both [`ReadingQuery`] and [`SummaryQuery`] follow the builder pattern and
//! return results newest first unless told otherwise.
//!
//! # Example
//!
//! ```
//! use airguard_store::{ReadingQuery, Store, SummaryQuery};
//! use airguard_types::SummaryKind;
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let hour_ago = OffsetDateTime::now_utc() - Duration::hours(1);
//!
//! let readings = store.query_readings(&ReadingQuery::new().since(hour_ago).limit(50))?;
//! let daily = store.query_summaries(&SummaryQuery::new().kind(SummaryKind::Daily))?;
//! # assert!(readings.is_empty() && daily.is_empty());
//! # Ok::<(), airguard_store::Error>(())
//! ```

use airguard_types::SummaryKind;
use time::OffsetDateTime;

use crate::store::to_millis;

/// Fluent query builder for raw readings.
///
/// Use this with [`Store::query_readings`](crate::Store::query_readings).
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter by device ID.
    pub device_id: Option<String>,
    /// Filter readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Filter readings at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by created_at descending.
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query: all devices, no time range, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by device ID.
    pub fn device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    /// Filter to readings created at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings created at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("created_at >= ?");
            params.push(Box::new(to_millis(since)));
        }

        if let Some(until) = self.until {
            conditions.push("created_at <= ?");
            params.push(Box::new(to_millis(until)));
        }

        (where_clause(&conditions), params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_id, created_at, temperature, humidity, tvoc, air_quality \
             FROM readings {} ORDER BY created_at {}, id {}",
            where_clause, order, order
        );
        push_paging(&mut sql, self.limit, self.offset);
        sql
    }
}

/// Fluent query builder for summaries.
///
/// Use this with [`Store::query_summaries`](crate::Store::query_summaries).
#[derive(Debug, Default, Clone)]
pub struct SummaryQuery {
    pub device_id: Option<String>,
    pub kind: Option<SummaryKind>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub newest_first: bool,
}

impl SummaryQuery {
    /// Create a new query: all devices and kinds, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    pub fn device(mut self, device_id: &str) -> Self {
        self.device_id = Some(device_id.to_string());
        self
    }

    /// Only include summaries of this kind.
    pub fn kind(mut self, kind: SummaryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_id) = self.device_id {
            conditions.push("device_id = ?");
            params.push(Box::new(device_id.clone()));
        }

        if let Some(kind) = self.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str()));
        }

        (where_clause(&conditions), params)
    }

    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_id, kind, created_at, avg_temperature, avg_humidity, \
             avg_tvoc, air_quality FROM summaries {} ORDER BY created_at {}, id {}",
            where_clause, order, order
        );
        push_paging(&mut sql, self.limit, self.offset);
        sql
    }
}

fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

fn push_paging(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    match (limit, offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        // SQLite needs a LIMIT before OFFSET
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    // ==================== ReadingQuery Tests ====================

    #[test]
    fn test_reading_query_new_defaults() {
        let query = ReadingQuery::new();
        assert!(query.device_id.is_none());
        assert!(query.since.is_none());
        assert!(query.until.is_none());
        assert!(query.limit.is_none());
        assert!(query.offset.is_none());
        assert!(query.newest_first);
    }

    #[test]
    fn test_reading_query_chaining() {
        let since = datetime!(2025-03-01 00:00:00 UTC);
        let until = datetime!(2025-03-01 01:00:00 UTC);

        let query = ReadingQuery::new()
            .device("dev")
            .since(since)
            .until(until)
            .limit(10)
            .offset(5)
            .oldest_first();

        assert_eq!(query.device_id.as_deref(), Some("dev"));
        assert_eq!(query.since, Some(since));
        assert_eq!(query.until, Some(until));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, Some(5));
        assert!(!query.newest_first);
    }

    #[test]
    fn test_reading_query_build_where_empty() {
        let (clause, params) = ReadingQuery::new().build_where();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_reading_query_build_where_all_filters() {
        let query = ReadingQuery::new()
            .device("dev")
            .since(datetime!(2025-03-01 00:00:00 UTC))
            .until(datetime!(2025-03-02 00:00:00 UTC));
        let (clause, params) = query.build_where();

        assert_eq!(
            clause,
            "WHERE device_id = ? AND created_at >= ? AND created_at <= ?"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_reading_query_build_sql() {
        let sql = ReadingQuery::new().device("dev").limit(1).build_sql();
        assert!(sql.contains("FROM readings WHERE device_id = ?"));
        assert!(sql.contains("ORDER BY created_at DESC, id DESC"));
        assert!(sql.ends_with(" LIMIT 1"));

        let sql = ReadingQuery::new().oldest_first().offset(3).build_sql();
        assert!(sql.contains("ORDER BY created_at ASC"));
        assert!(sql.ends_with(" LIMIT -1 OFFSET 3"));
    }

    // ==================== SummaryQuery Tests ====================

    #[test]
    fn test_summary_query_kind_filter() {
        let query = SummaryQuery::new().device("dev").kind(SummaryKind::Hourly);
        let (clause, params) = query.build_where();

        assert_eq!(clause, "WHERE device_id = ? AND kind = ?");
        assert_eq!(params.len(), 2);
        assert!(query.build_sql().contains("FROM summaries WHERE"));
    }

    #[test]
    fn test_summary_query_paging() {
        let sql = SummaryQuery::new().limit(20).offset(40).build_sql();
        assert!(sql.ends_with(" LIMIT 20 OFFSET 40"));
    }
}

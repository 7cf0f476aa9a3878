//! Query access for validation rules, the auth resolver and handlers.
//!
//! Everything above this module talks to the database through the
//! [`DataSource`] trait: positional parameters in, rows of [`ContextValue`]s
//! out. [`PgDataSource`] is the production implementation; tests substitute
//! in-memory fakes.

mod postgres;

pub use postgres::*;

use {
    crate::{ContextMap, ContextValue, Result},
    async_trait::async_trait,
    std::fmt,
};

/// A fetched row: column name to value.
pub type Row = ContextMap;

/// A positional query parameter (`$1`, `$2`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlParam::Null => write!(f, "NULL"),
            SqlParam::Bool(b) => write!(f, "{b}"),
            SqlParam::Int(i) => write!(f, "{i}"),
            SqlParam::Text(s) => write!(f, "'{s}'"),
        }
    }
}

impl From<bool> for SqlParam {
    fn from(value: bool) -> Self {
        SqlParam::Bool(value)
    }
}

impl From<i32> for SqlParam {
    fn from(value: i32) -> Self {
        SqlParam::Int(value.into())
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

impl From<SqlParam> for ContextValue {
    fn from(value: SqlParam) -> Self {
        match value {
            SqlParam::Null => ContextValue::Null,
            SqlParam::Bool(b) => ContextValue::Bool(b),
            SqlParam::Int(i) => ContextValue::Int(i),
            SqlParam::Text(s) => ContextValue::Text(s),
        }
    }
}

/// Generic "execute query, get rows" access to the relational store.
///
/// Failures surface as [`ErrorKind::Database`](crate::ErrorKind::Database)
/// and are never retried here.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Runs a query and returns every row.
    async fn fetch_rows(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>>;

    /// Runs a query and returns the first column of the first row as an integer.
    async fn fetch_scalar(&self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;

    /// Runs a query and returns its first row, if any.
    async fn fetch_one(&self, sql: &str, params: &[SqlParam]) -> Result<Option<Row>> {
        Ok(self.fetch_rows(sql, params).await?.into_iter().next())
    }
}

use {
    super::{DataSource, Row, SqlParam},
    crate::{ContextValue, Error, Result},
    async_trait::async_trait,
    rust_decimal::Decimal,
    sqlx::{Column, Row as _, TypeInfo, query::Query},
    sqlx_postgres::{PgArguments, PgPool, PgRow, Postgres},
    time::{Date, OffsetDateTime, PrimitiveDateTime},
    uuid::Uuid,
};

/// A transaction on the application database. Rolled back when dropped
/// without `commit()`.
pub type PgTransaction = sqlx::Transaction<'static, Postgres>;

/// [`DataSource`] over a sqlx Postgres pool.
///
/// Cloning is cheap; every clone shares the same pool.
#[derive(Debug, Clone)]
pub struct PgDataSource {
    pool: PgPool,
}

impl PgDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Starts a transaction for statements that must apply atomically, such
    /// as inserting a user together with its profile rows.
    pub async fn begin(&self) -> Result<PgTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Runs a statement inside `tx` and returns the number of affected rows.
    pub async fn execute_in(
        tx: &mut PgTransaction,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<u64> {
        let result = bind_params(sqlx::query::<Postgres>(sql), params)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }

    /// Runs a query inside `tx` and returns every row.
    pub async fn fetch_rows_in(
        tx: &mut PgTransaction,
        sql: &str,
        params: &[SqlParam],
    ) -> Result<Vec<Row>> {
        let rows = bind_params(sqlx::query::<Postgres>(sql), params)
            .fetch_all(&mut **tx)
            .await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl DataSource for PgDataSource {
    async fn fetch_rows(&self, sql: &str, params: &[SqlParam]) -> Result<Vec<Row>> {
        tracing::trace!(sql, params = params.len(), "fetch_rows");
        let rows = bind_params(sqlx::query::<Postgres>(sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn fetch_scalar(&self, sql: &str, params: &[SqlParam]) -> Result<Option<i64>> {
        tracing::trace!(sql, params = params.len(), "fetch_scalar");
        let row = bind_params(sqlx::query::<Postgres>(sql), params)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        if row.columns().is_empty() {
            return Ok(None);
        }
        match row.try_get::<Option<i64>, _>(0) {
            Ok(value) => Ok(value),
            Err(_) => Ok(row.try_get::<Option<i32>, _>(0)?.map(i64::from)),
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        tracing::trace!(sql, params = params.len(), "execute");
        let result = bind_params(sqlx::query::<Postgres>(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(Option::<String>::None),
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::Text(s) => query.bind(s.clone()),
        };
    }
    query
}

/// How a column's value is read, by Postgres type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Date,
    Timestamp,
    TimestampTz,
    Json,
    Uuid,
    Text,
}

impl ColumnKind {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOL" => Self::Bool,
            "INT2" => Self::Int2,
            "INT4" => Self::Int4,
            "INT8" => Self::Int8,
            "FLOAT4" => Self::Float4,
            "FLOAT8" => Self::Float8,
            "NUMERIC" => Self::Numeric,
            "DATE" => Self::Date,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "JSON" | "JSONB" => Self::Json,
            "UUID" => Self::Uuid,
            _ => Self::Text,
        }
    }
}

fn column_error(column: &str, err: sqlx::Error) -> Error {
    Error::database(format!("cannot decode column '{column}': {err}"))
}

fn get<'r, T>(row: &'r PgRow, index: usize) -> std::result::Result<Option<T>, sqlx::Error>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
}

/// Decodes every column of `row` by its Postgres type name. Types without a
/// dedicated mapping must decode as text; anything else is a database error.
fn decode_row(row: &PgRow) -> Result<Row> {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let decoded: std::result::Result<ContextValue, sqlx::Error> =
                match ColumnKind::of(column.type_info().name()) {
                    ColumnKind::Bool => get::<bool>(row, index).map(Into::into),
                    ColumnKind::Int2 => {
                        get::<i16>(row, index).map(|v| v.map(i64::from).into())
                    }
                    ColumnKind::Int4 => get::<i32>(row, index).map(Into::into),
                    ColumnKind::Int8 => get::<i64>(row, index).map(Into::into),
                    ColumnKind::Float4 => {
                        get::<f32>(row, index).map(|v| v.map(f64::from).into())
                    }
                    ColumnKind::Float8 => get::<f64>(row, index).map(Into::into),
                    ColumnKind::Numeric => get::<Decimal>(row, index).map(Into::into),
                    ColumnKind::Date => get::<Date>(row, index).map(Into::into),
                    ColumnKind::Timestamp => get::<PrimitiveDateTime>(row, index).map(Into::into),
                    ColumnKind::TimestampTz => get::<OffsetDateTime>(row, index).map(Into::into),
                    ColumnKind::Json => get::<serde_json::Value>(row, index).map(Into::into),
                    ColumnKind::Uuid => {
                        get::<Uuid>(row, index).map(|v| v.map(|id| id.to_string()).into())
                    }
                    ColumnKind::Text => get::<String>(row, index).map(Into::into),
                };
            decoded
                .map(|value| (column.name().to_string(), value))
                .map_err(|e| column_error(column.name(), e))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn type_names_map_to_decoders() {
        assert_eq!(ColumnKind::of("UUID"), ColumnKind::Uuid);
        assert_eq!(ColumnKind::of("JSONB"), ColumnKind::Json);
        assert_eq!(ColumnKind::of("TIMESTAMPTZ"), ColumnKind::TimestampTz);
        assert_eq!(ColumnKind::of("VARCHAR"), ColumnKind::Text);
        assert_eq!(ColumnKind::of("INTERVAL"), ColumnKind::Text);
    }

    #[test]
    fn decode_failures_are_database_errors() {
        let err = column_error(
            "duracion",
            sqlx::Error::ColumnNotFound("duracion".to_string()),
        );
        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(err.to_string().contains("duracion"));
    }
}

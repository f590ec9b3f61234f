use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat};
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use parking_lot::Mutex;
use serde_json::{Map, Number, Value as Json};

use fathom_error::{ErrorCode, FathomError};

use crate::executor::QueryExecutor;

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Executor backed by the single process-wide DuckDB database.
///
/// Every call runs on its own connection to the same database, cloned from
/// the bootstrap handle, inside `spawn_blocking`.
#[derive(Clone, Debug)]
pub struct DuckDbExecutor {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbExecutor {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn open_in_memory() -> fathom_error::Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    fn connection(&self) -> fathom_error::Result<Connection> {
        Ok(self.conn.lock().try_clone()?)
    }
}

#[async_trait]
impl QueryExecutor for DuckDbExecutor {
    async fn execute(&self, query: &str) -> fathom_error::Result<Json> {
        let conn = self.connection()?;
        let sql = query.to_string();

        tokio::task::spawn_blocking(move || run_query(&conn, &sql))
            .await
            .map_err(|e| FathomError::new(ErrorCode::ExecutorJoin, e.to_string()))?
            .map_err(|e| e.for_query(query))
    }
}

fn run_query(conn: &Connection, sql: &str) -> fathom_error::Result<Json> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let mut columns: Option<Vec<String>> = None;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let names = columns.get_or_insert_with(|| row.as_ref().column_names());
        let mut object = Map::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let value: Value = row.get(i)?;
            object.insert(name.clone(), value_to_json(value));
        }
        out.push(Json::Object(object));
    }

    Ok(Json::Array(out))
}

fn value_to_json(value: Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => b.into(),
        Value::TinyInt(i) => i.into(),
        Value::SmallInt(i) => i.into(),
        Value::Int(i) => i.into(),
        Value::BigInt(i) => i.into(),
        Value::HugeInt(i) => i64::try_from(i)
            .map(Json::from)
            .unwrap_or_else(|_| Json::String(i.to_string())),
        Value::UTinyInt(i) => i.into(),
        Value::USmallInt(i) => i.into(),
        Value::UInt(i) => i.into(),
        Value::UBigInt(i) => i.into(),
        Value::Float(f) => float_to_json(f as f64),
        Value::Double(f) => float_to_json(f),
        Value::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(float_to_json)
            .unwrap_or_else(|_| Json::String(d.to_string())),
        Value::Text(s) => Json::String(s),
        Value::Enum(s) => Json::String(s),
        Value::Blob(bytes) => Json::Array(bytes.into_iter().map(Json::from).collect()),
        Value::Timestamp(unit, raw) => timestamp_to_json(unit, raw),
        Value::Date32(days) => date_to_json(days),
        Value::List(items) => Json::Array(items.into_iter().map(value_to_json).collect()),
        other => Json::String(format!("{:?}", other)),
    }
}

fn float_to_json(f: f64) -> Json {
    Number::from_f64(f).map(Json::Number).unwrap_or(Json::Null)
}

fn timestamp_to_json(unit: TimeUnit, raw: i64) -> Json {
    let micros = match unit {
        TimeUnit::Second => raw.saturating_mul(1_000_000),
        TimeUnit::Millisecond => raw.saturating_mul(1_000),
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    };
    match DateTime::from_timestamp_micros(micros) {
        Some(ts) => Json::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => Json::from(raw),
    }
}

fn date_to_json(days: i32) -> Json {
    match days
        .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
    {
        Some(date) => Json::String(date.format("%Y-%m-%d").to_string()),
        None => Json::from(days),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn executor_with_trips() -> DuckDbExecutor {
        let executor = DuckDbExecutor::open_in_memory().unwrap();
        executor
            .connection()
            .unwrap()
            .execute_batch(
                "CREATE TABLE trips (duration INT, start_time TIMESTAMP, user_type VARCHAR, birth_year INT);
                 INSERT INTO trips VALUES
                    (300, TIMESTAMP '2019-01-01 08:15:00', 'Subscriber', 1985),
                    (900, TIMESTAMP '2019-01-02 17:45:00', 'Customer', NULL),
                    (450, TIMESTAMP '2019-01-02 18:00:00', 'Subscriber', 1990);",
            )
            .unwrap();
        executor
    }

    #[tokio::test]
    async fn test_rows_are_objects_keyed_by_column() {
        let executor = executor_with_trips();
        let rows = executor
            .execute("SELECT user_type, count(*) AS n FROM trips GROUP BY user_type ORDER BY user_type")
            .await
            .unwrap();

        assert_eq!(
            rows,
            json!([
                { "user_type": "Customer", "n": 1 },
                { "user_type": "Subscriber", "n": 2 }
            ])
        );
    }

    #[tokio::test]
    async fn test_aggregate_column_names_match_engine() {
        let executor = executor_with_trips();
        let rows = executor.execute("SELECT count(*) FROM trips").await.unwrap();
        assert_eq!(rows, json!([{ "count_star()": 3 }]));
    }

    #[tokio::test]
    async fn test_timestamps_nulls_and_dates() {
        let executor = executor_with_trips();
        let rows = executor
            .execute(
                "SELECT min(start_time) AS first, max(birth_year) FILTER (WHERE user_type = 'Customer') AS missing, DATE '2019-01-02' AS d FROM trips",
            )
            .await
            .unwrap();

        assert_eq!(rows[0]["first"], "2019-01-01T08:15:00.000Z");
        assert_eq!(rows[0]["missing"], Json::Null);
        assert_eq!(rows[0]["d"], "2019-01-02");
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_array() {
        let executor = executor_with_trips();
        let rows = executor
            .execute("SELECT * FROM trips WHERE duration < 0")
            .await
            .unwrap();
        assert_eq!(rows, json!([]));
    }

    #[tokio::test]
    async fn test_failures_carry_query_context() {
        let executor = executor_with_trips();
        let err = executor.execute("SELECT * FROM nope").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::TableNotFound);
        match err.context {
            Some(fathom_error::ErrorContext::Query { query }) => {
                assert_eq!(query, "SELECT * FROM nope")
            }
            _ => panic!("Expected query context"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_database() {
        let executor = executor_with_trips();
        let (a, b) = tokio::join!(
            executor.execute("SELECT sum(duration) AS total FROM trips"),
            executor.execute("SELECT count(*) AS n FROM trips WHERE user_type = 'Subscriber'"),
        );
        assert_eq!(a.unwrap(), json!([{ "total": 1650 }]));
        assert_eq!(b.unwrap(), json!([{ "n": 2 }]));
    }
}

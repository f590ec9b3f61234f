use crate::{ErrorCode, ErrorContext, FathomError};

impl From<duckdb::Error> for FathomError {
    fn from(err: duckdb::Error) -> Self {
        let message = err.to_string();
        // DuckDB reports binder failures as "Catalog Error: Table with name x does not exist!"
        if message.contains("Catalog Error") && message.contains("does not exist") {
            return FathomError::new(ErrorCode::TableNotFound, message)
                .with_hint("Queries run against the table created at bootstrap");
        }
        match err {
            duckdb::Error::FromSqlConversionFailure(..)
            | duckdb::Error::IntegralValueOutOfRange(..)
            | duckdb::Error::InvalidColumnType(..) => {
                FathomError::new(ErrorCode::ResultConversion, message)
            }
            _ => FathomError::new(ErrorCode::QueryFailed, message),
        }
    }
}

impl From<std::io::Error> for FathomError {
    fn from(err: std::io::Error) -> Self {
        FathomError::new(ErrorCode::Io, err.to_string())
    }
}

impl From<serde_json::Error> for FathomError {
    fn from(err: serde_json::Error) -> Self {
        FathomError::new(ErrorCode::SerializationFailed, err.to_string())
    }
}

impl FathomError {
    /// Tag a query-category error with the query text that produced it.
    pub fn for_query(self, query: &str) -> Self {
        self.with_context(ErrorContext::Query {
            query: query.to_string(),
        })
    }
}

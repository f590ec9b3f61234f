//! # Error Contexts
//!
//! Structured metadata attached to errors for logs and API responses.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for FATHOM-1001/1002
    Dataset {
        source: String,
        local_path: String,
    },

    /// Context for FATHOM-1003
    TableCreation { table: String, parquet_path: String },

    /// Context for FATHOM-2001/2002
    Query { query: String },

    /// Context for FATHOM-3001/3002
    Config {
        file_path: Option<String>,
        field: Option<String>,
    },

    /// Context for FATHOM-4001
    Frame { raw: String },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_context_serde_roundtrip() {
        let ctx = ErrorContext::Dataset {
            source: "https://example.com/trips.parquet".to_string(),
            local_path: "db/trips.parquet".to_string(),
        };

        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"type\":\"dataset\""));

        let de: ErrorContext = serde_json::from_str(&json).unwrap();
        match de {
            ErrorContext::Dataset { local_path, .. } => {
                assert_eq!(local_path, "db/trips.parquet");
            }
            _ => panic!("Wrong variant"),
        }
    }
}

use fathom_error::{ErrorCode, ErrorContext, FathomError};
use serde_json::Value;

#[test]
fn test_json_serialization() {
    let error = FathomError::new(ErrorCode::TableNotFound, "Table with name trips does not exist")
        .with_context(ErrorContext::Query {
            query: "SELECT count(*) FROM trips".to_string(),
        })
        .with_hint("Queries run against the table created at bootstrap");

    let json = error.to_json();
    let v: Value = serde_json::from_str(&json).expect("valid json");

    assert_eq!(v["code"], "FATHOM-2002");
    assert_eq!(v["message"], "Table with name trips does not exist");
    assert_eq!(v["context"]["type"], "query");
    assert_eq!(v["context"]["query"], "SELECT count(*) FROM trips");
    assert!(v.get("trace_id").is_none());
}

#[test]
fn test_error_code_parsing() {
    let code: ErrorCode = "FATHOM-4001".to_string().try_into().unwrap();
    assert_eq!(code, ErrorCode::MalformedMessage);
}

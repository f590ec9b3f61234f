use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following FATHOM-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Dataset bootstrap errors (fatal)
/// - **2000-2999**: Query execution errors
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Transport/session errors
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions (semver contract).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Bootstrap Errors (1000-1999) ===
    /// FATHOM-1001: Dataset file missing and source is not downloadable
    DatasetUnavailable = 1001,
    /// FATHOM-1002: Dataset download failed
    DatasetDownloadFailed = 1002,
    /// FATHOM-1003: Creating the backing table failed
    TableCreationFailed = 1003,
    /// FATHOM-1004: Switching the engine to read-only or reading settings failed
    EngineConfigFailed = 1004,

    // === Query Errors (2000-2999) ===
    /// FATHOM-2001: Engine rejected or failed the query
    QueryFailed = 2001,
    /// FATHOM-2002: Table referenced by the query does not exist
    TableNotFound = 2002,
    /// FATHOM-2003: Engine returned a value that could not be converted
    ResultConversion = 2003,

    // === Configuration Errors (3000-3999) ===
    /// FATHOM-3001: Configuration could not be parsed
    InvalidConfig = 3001,
    /// FATHOM-3002: Required field missing
    MissingRequiredField = 3002,

    // === Transport Errors (4000-4999) ===
    /// FATHOM-4001: Client frame could not be decoded
    MalformedMessage = 4001,
    /// FATHOM-4002: Session already closed
    SessionClosed = 4002,

    // === Internal Errors (5000-5999) ===
    /// FATHOM-5001: Blocking executor task failed to join
    ExecutorJoin = 5001,
    /// FATHOM-5002: Serialization/deserialization failed
    SerializationFailed = 5002,
    /// FATHOM-5003: Unexpected internal state
    InternalPanic = 5003,
    /// FATHOM-5004: I/O failure
    Io = 5004,

    /// FATHOM-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "FATHOM-2001")
    pub fn as_str(&self) -> String {
        format!("FATHOM-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Bootstrap,
            2000..=2999 => ErrorCategory::Query,
            3000..=3999 => ErrorCategory::Config,
            4000..=4999 => ErrorCategory::Transport,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("FATHOM-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::DatasetUnavailable),
            1002 => Ok(Self::DatasetDownloadFailed),
            1003 => Ok(Self::TableCreationFailed),
            1004 => Ok(Self::EngineConfigFailed),
            2001 => Ok(Self::QueryFailed),
            2002 => Ok(Self::TableNotFound),
            2003 => Ok(Self::ResultConversion),
            3001 => Ok(Self::InvalidConfig),
            3002 => Ok(Self::MissingRequiredField),
            4001 => Ok(Self::MalformedMessage),
            4002 => Ok(Self::SessionClosed),
            5001 => Ok(Self::ExecutorJoin),
            5002 => Ok(Self::SerializationFailed),
            5003 => Ok(Self::InternalPanic),
            5004 => Ok(Self::Io),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCategory {
    Bootstrap,
    Query,
    Config,
    Transport,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_formatting() {
        assert_eq!(ErrorCode::DatasetUnavailable.as_str(), "FATHOM-1001");
        assert_eq!(ErrorCode::QueryFailed.as_str(), "FATHOM-2001");
        assert_eq!(ErrorCode::Unknown.as_str(), "FATHOM-9999");
    }

    #[test]
    fn test_error_code_parsing() {
        assert_eq!(
            ErrorCode::try_from("FATHOM-1003".to_string()).unwrap(),
            ErrorCode::TableCreationFailed
        );
        assert_eq!(
            ErrorCode::try_from("FATHOM-9999".to_string()).unwrap(),
            ErrorCode::Unknown
        );
    }

    #[test]
    fn test_error_code_parsing_errors() {
        assert!(ErrorCode::try_from("INVALID".to_string()).is_err());
        assert!(ErrorCode::try_from("FATHOM-0000".to_string()).is_err());
        assert!(ErrorCode::try_from("ACME-1001".to_string()).is_err());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            ErrorCode::DatasetDownloadFailed.category(),
            ErrorCategory::Bootstrap
        );
        assert_eq!(ErrorCode::TableNotFound.category(), ErrorCategory::Query);
        assert_eq!(ErrorCode::InvalidConfig.category(), ErrorCategory::Config);
        assert_eq!(
            ErrorCode::MalformedMessage.category(),
            ErrorCategory::Transport
        );
        assert_eq!(ErrorCode::Io.category(), ErrorCategory::Internal);
        assert_eq!(ErrorCode::Unknown.category(), ErrorCategory::Internal);
    }
}

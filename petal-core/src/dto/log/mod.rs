//! Log DTOs for inter-service communication

use serde::{Deserialize, Serialize};

/// Subscribe to the log output of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLogsRequest {
    pub run_id: i64,
    /// Only deliver lines with a cursor greater than this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
}

impl StreamLogsRequest {
    pub fn new(run_id: i64) -> Self {
        Self {
            run_id,
            after: None,
        }
    }

    pub fn resume(run_id: i64, after: Option<i64>) -> Self {
        Self { run_id, after }
    }
}

/// One chunk of log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLogsResponse {
    pub log_output: String,
    /// Cursor of the last line included in `log_output`
    #[serde(default)]
    pub cursor: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_without_cursor_omits_after() {
        let json = serde_json::to_string(&StreamLogsRequest::new(7)).unwrap();
        assert_eq!(json, r#"{"run_id":7}"#);

        let parsed: StreamLogsRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.after, None);
    }

    #[test]
    fn test_response_cursor_defaults_to_zero() {
        let parsed: StreamLogsResponse =
            serde_json::from_str(r#"{"log_output":"hello\n"}"#).unwrap();
        assert_eq!(parsed.cursor, 0);
        assert_eq!(parsed.log_output, "hello\n");
    }
}

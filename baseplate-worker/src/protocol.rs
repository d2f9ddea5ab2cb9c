//! JSON shapes that cross the worker boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkerError;
use crate::runtime::ActionOutcome;

/// An action addressed by name, with its JSON input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub input: Value,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, input: Value) -> Self {
        Self {
            action: action.into(),
            input,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One log line emitted by an action while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
}

/// Terminal result of an action run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<LogRecord>,
}

impl ActionResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            logs: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
            logs: Vec::new(),
        }
    }

    /// Unwrap into the data value, turning `ok: false` into an error message.
    pub fn into_data(self) -> Result<Value, String> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| "unknown worker error".to_string()))
        }
    }
}

impl From<Result<ActionOutcome, WorkerError>> for ActionResponse {
    fn from(result: Result<ActionOutcome, WorkerError>) -> Self {
        match result {
            Ok(outcome) => Self {
                logs: outcome.logs,
                ..Self::ok(outcome.data)
            },
            Err(err) => Self::error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_input_defaults_to_null() {
        let request: ActionRequest = serde_json::from_str(r#"{"action":"snapshot-show"}"#).unwrap();
        assert_eq!(request.input, Value::Null);
    }

    #[test]
    fn response_omits_empty_fields() {
        let encoded = serde_json::to_value(ActionResponse::ok(json!({"n": 1}))).unwrap();
        assert_eq!(encoded, json!({"ok": true, "data": {"n": 1}}));

        let failed = ActionResponse::error("boom");
        assert_eq!(failed.clone().into_data().unwrap_err(), "boom");
        assert_eq!(serde_json::to_value(failed).unwrap(), json!({"ok": false, "error": "boom"}));
    }
}

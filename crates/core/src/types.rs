// crates/core/src/types.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Version number of a stored capability module. Version 1 is the first.
pub type Version = u32;

/// JSON-Schema-shaped declaration of a capability, stored as `<name>.json`.
///
/// This is also the shape the conversational layer declares as a callable
/// function, so it must stay a valid function definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
    /// Anything else the generator put in the document.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CapabilitySpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            extra: Map::new(),
        }
    }
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Severity of a captured console line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// One line a capability wrote to its console during a sandboxed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Whatever a capability threw, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl Fault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// `name: message` followed by the stack when one was captured.
    pub fn describe(&self) -> String {
        match &self.stack {
            Some(stack) => format!("{}\n{}", self, stack),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// Result of one sandboxed run.
///
/// Logs are captured whatever happened; the return value and the fault live
/// in one `Result` so they can never both be present.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub logs: Vec<LogLine>,
    pub result: Result<Option<Value>, Fault>,
}

impl ExecutionOutcome {
    pub fn succeeded(value: Option<Value>, logs: Vec<LogLine>) -> Self {
        Self {
            logs,
            result: Ok(value),
        }
    }

    pub fn faulted(fault: Fault, logs: Vec<LogLine>) -> Self {
        Self {
            logs,
            result: Err(fault),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.result.as_ref().ok().and_then(|v| v.as_ref())
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.result.as_ref().err()
    }

    /// Console output as `[level] message` lines, the way it is shown to the
    /// generator when asking for a fix.
    pub fn console_output(&self) -> String {
        self.logs
            .iter()
            .map(|l| format!("[{}] {}", l.level, l.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

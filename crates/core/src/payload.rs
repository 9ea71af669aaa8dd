// crates/core/src/payload.rs

//! Pulls structured payloads out of free-form generator replies.
//!
//! The prompts ask for every payload between two lines consisting of `---`.
//! Models often wrap the payload in a Markdown fence as well, and now and
//! then use only the fence; both are accepted.

use serde_json::Value;

use crate::error::{Error, Result};

const DELIMITER: &str = "---";
const FENCE: &str = "```";

/// Drop a leading and a trailing Markdown fence line, if present.
pub fn trim_backticks(content: &str) -> String {
    let mut lines: Vec<&str> = content.trim().lines().collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with(FENCE)) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim_start().starts_with(FENCE)) {
        lines.pop();
    }
    lines.join("\n")
}

/// Every delimited section in `text`, in order, fences stripped.
///
/// Falls back to fenced blocks when no `---` delimiters are present. A
/// section left open at the end of the text still counts.
pub fn sections(text: &str) -> Vec<String> {
    collect_sections(text, true)
}

/// Like [`sections`], but only sections delimited at both ends count.
pub fn closed_sections(text: &str) -> Vec<String> {
    collect_sections(text, false)
}

fn collect_sections(text: &str, allow_open: bool) -> Vec<String> {
    let delimited = split_on(text, allow_open, |l| l.trim() == DELIMITER);
    let raw = if delimited.is_empty() {
        split_on(text, allow_open, |l| l.trim_start().starts_with(FENCE))
    } else {
        delimited
    };

    raw.iter()
        .map(|s| trim_backticks(s).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_on(text: &str, allow_open: bool, is_marker: impl Fn(&str) -> bool) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        if is_marker(line) {
            match current.take() {
                Some(lines) => out.push(lines.join("\n")),
                None => current = Some(Vec::new()),
            }
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current.filter(|_| allow_open) {
        if lines.iter().any(|l| !l.trim().is_empty()) {
            out.push(lines.join("\n"));
        }
    }
    out
}

/// The first delimited payload, or a protocol error naming what was
/// `expected`.
pub fn extract_payload(text: &str, expected: &str) -> Result<String> {
    sections(text)
        .into_iter()
        .next()
        .ok_or_else(|| Error::protocol(format!("{} between --- delimiters", expected)))
}

/// Extract and parse a JSON payload.
pub fn extract_json<T: serde::de::DeserializeOwned>(text: &str, expected: &str) -> Result<T> {
    let payload = extract_payload(text, expected)?;
    serde_json::from_str(&payload).map_err(|e| Error::protocol(format!("{} as valid JSON ({})", expected, e)))
}

/// What a reply to a repair request asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepairPlan {
    /// A complete replacement module.
    pub code: Option<String>,
    /// Different input to retry the unchanged module with.
    pub arguments: Option<Value>,
}

impl RepairPlan {
    /// Neither a fix nor new input: the reply is a final answer.
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.arguments.is_none()
    }
}

/// Sort the sections of a repair reply: a JSON object is revised input,
/// anything else is replacement code. The first of each kind wins.
///
/// Only closed sections count here, so prose with a Markdown rule in it
/// stays a final answer.
pub fn parse_repair(text: &str) -> RepairPlan {
    let mut plan = RepairPlan::default();
    for section in closed_sections(text) {
        match serde_json::from_str::<Value>(&section) {
            Ok(value @ Value::Object(_)) => {
                if plan.arguments.is_none() {
                    plan.arguments = Some(value);
                }
            }
            _ => {
                if plan.code.is_none() {
                    plan.code = Some(section);
                }
            }
        }
    }
    plan
}

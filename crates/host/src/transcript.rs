// crates/host/src/transcript.rs

//! Append-only HTML record of a session: questions, generator traffic and
//! errors.

use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use serde_json::Value;

use dyncap_core::ai_client::{AiClient, ChatRequest, ChatResponse};

pub const FILE_NAME: &str = "log.html";

const HEADER: &str = "<style>\n\
pre { white-space: pre-wrap; word-wrap: break-word; }\n\
.ts { color: #888; font-size: small; }\n\
</style>\n";

pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    /// Start a fresh transcript at `path`, replacing any previous one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::write(&path, HEADER).with_context(|| format!("failed to create {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self, message: impl Display) {
        self.append(&format!("<br><pre>{}</pre>", escape(&message.to_string())));
    }

    pub fn error(&self, error: impl Display) {
        self.append(&format!(
            "<h2>Error</h2><br><pre>{}</pre><br><hr>",
            escape(&error.to_string())
        ));
    }

    pub fn request(&self, model: &str, request: &ChatRequest) {
        let messages = request
            .messages
            .iter()
            .map(|m| {
                let role = m["role"].as_str().unwrap_or("?");
                let content = match &m["content"] {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                format!("- {}: <pre>{}</pre>", escape(role), escape(&content))
            })
            .collect::<Vec<_>>()
            .join("<br>");
        let tools = if request.tools.is_empty() {
            "None".to_string()
        } else {
            serde_json::to_string_pretty(&request.tools).unwrap_or_default()
        };

        self.append(&format!(
            "<h1>Request</h1><br>\n<b>Model</b>: {}<br>\n<b>Messages</b>:<br>\n{}<br><br>\n<b>Functions</b>:<br><pre>{}</pre><br><hr>",
            escape(model),
            messages,
            escape(&tools)
        ));
    }

    pub fn response(&self, response: &ChatResponse) {
        let Some(choice) = response.choices.first() else {
            self.append("<h1>Response</h1><br><pre>(no choices)</pre><hr>");
            return;
        };

        let mut calls = String::new();
        for call in choice.message.tool_calls() {
            let arguments = serde_json::from_str::<Value>(&call.function.arguments)
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|_| call.function.arguments.clone());
            calls.push_str(&format!(
                "<b>Function Call</b>:<br><b>Name</b>: {}<br><b>Arguments</b>: <pre>{}</pre><br>",
                escape(&call.function.name),
                escape(&arguments)
            ));
        }

        self.append(&format!(
            "<h1>Response</h1><br>\n<b>Message Content</b>:<br><pre>{}</pre><br>\n{}<b>Finish Reason</b>: {}<br><hr>",
            escape(choice.message.content.as_deref().unwrap_or("")),
            calls,
            escape(choice.finish_reason.as_deref().unwrap_or("")),
        ));
    }

    fn append(&self, html: &str) {
        let stamped = format!(
            "<div class=\"ts\">{}</div>{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            html
        );
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(stamped.as_bytes()));
        if let Err(err) = written {
            tracing::warn!(path = %self.path.display(), "failed to write transcript: {}", err);
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Records every request and response of the wrapped client.
pub struct TranscriptClient<'t, C: AiClient> {
    inner: C,
    transcript: &'t Transcript,
    model: String,
}

impl<'t, C: AiClient> TranscriptClient<'t, C> {
    pub fn new(inner: C, transcript: &'t Transcript, model: &str) -> Self {
        Self {
            inner,
            transcript,
            model: model.to_string(),
        }
    }
}

impl<C: AiClient> AiClient for TranscriptClient<'_, C> {
    fn chat(&self, request: ChatRequest) -> anyhow::Result<ChatResponse> {
        self.transcript.request(&self.model, &request);
        match self.inner.chat(request) {
            Ok(response) => {
                self.transcript.response(&response);
                Ok(response)
            }
            Err(err) => {
                self.transcript.error(format!("{:#}", err));
                Err(err)
            }
        }
    }
}

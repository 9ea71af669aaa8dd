// crates/core/src/ai_client.rs

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Abstract AI/LLM client for chat completions with tool support.
///
/// This is the external generator: it writes capability code and specs,
/// proposes fixes, and drives the conversation. Implementations can use
/// OpenAI, Azure, Ollama, or a scripted double in tests.
pub trait AiClient {
    /// Send a chat completion request with optional tools.
    fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;
}

impl<C: AiClient + ?Sized> AiClient for &C {
    fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        (**self).chat(request)
    }
}

/// A chat completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Value>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self.tool_choice = Some("auto".to_string());
        self
    }
}

/// Message helpers in the chat-completions wire shape.
pub mod message {
    use serde_json::{json, Value};

    pub fn system(content: &str) -> Value {
        json!({ "role": "system", "content": content })
    }

    pub fn user(content: &str) -> Value {
        json!({ "role": "user", "content": content })
    }

    pub fn assistant(content: &str) -> Value {
        json!({ "role": "assistant", "content": content })
    }

    pub fn tool(call_id: &str, name: &str, content: &str) -> Value {
        json!({
            "role": "tool",
            "tool_call_id": call_id,
            "name": name,
            "content": content,
        })
    }
}

/// A chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// The first choice's message, if the response has any choice.
    pub fn into_message(self) -> Option<ChatMessage> {
        self.choices.into_iter().next().map(|c| c.message)
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

impl ChatMessage {
    /// Text content, treating an empty string as no content.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }

    pub fn tool_calls(&self) -> &[ChatToolCall] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }

    /// This message as it goes back into the conversation history.
    pub fn to_history(&self) -> Value {
        let mut msg = json!({
            "role": self.role,
            "content": self.content,
        });
        if !self.tool_calls().is_empty() {
            msg["tool_calls"] = self
                .tool_calls()
                .iter()
                .map(|tc| {
                    json!({
                        "id": tc.id,
                        "type": tc.call_type,
                        "function": {
                            "name": tc.function.name,
                            "arguments": tc.function.arguments,
                        }
                    })
                })
                .collect();
        }
        msg
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: ChatToolFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatToolFunction {
    pub name: String,
    /// Raw JSON string of the arguments.
    pub arguments: String,
}

/// Wrap a capability spec as a tool definition.
pub fn tool_definition(spec: &crate::types::CapabilitySpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": spec.name,
            "description": spec.description,
            "parameters": spec.parameters,
        }
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Replies from a script and records every request.
    pub(crate) struct ScriptedClient {
        replies: RefCell<Vec<Value>>,
        pub(crate) requests: RefCell<Vec<ChatRequest>>,
    }

    impl ScriptedClient {
        /// Each reply is an assistant message object.
        pub(crate) fn new(replies: Vec<Value>) -> Self {
            Self {
                replies: RefCell::new(replies.into_iter().rev().collect()),
                requests: RefCell::new(Vec::new()),
            }
        }

        pub(crate) fn texts(replies: &[&str]) -> Self {
            Self::new(
                replies
                    .iter()
                    .map(|r| json!({"role": "assistant", "content": r}))
                    .collect(),
            )
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.borrow().len()
        }
    }

    impl AiClient for ScriptedClient {
        fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
            self.requests.borrow_mut().push(request);
            let message = self
                .replies
                .borrow_mut()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))?;
            Ok(serde_json::from_value(json!({
                "choices": [{"message": message, "finish_reason": "stop"}]
            }))?)
        }
    }

    #[test]
    fn tool_call_message_round_trips_into_history() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "addNumbers", "arguments": "{\"a\":1}"}
            }]
        }))
        .unwrap();

        assert_eq!(msg.text(), None);
        let history = msg.to_history();
        assert_eq!(history["tool_calls"][0]["function"]["name"], "addNumbers");
        assert_eq!(history["content"], Value::Null);
    }

    #[test]
    fn request_serializes_tools_only_when_present() {
        let plain = serde_json::to_value(ChatRequest::new(vec![message::user("hi")])).unwrap();
        assert!(plain.get("tools").is_none());

        let spec = crate::types::CapabilitySpec::new("ping", "Ping", json!({"type": "object"}));
        let with_tools = serde_json::to_value(
            ChatRequest::new(vec![message::user("hi")]).with_tools(vec![tool_definition(&spec)]),
        )
        .unwrap();
        assert_eq!(with_tools["tools"][0]["function"]["name"], "ping");
        assert_eq!(with_tools["tool_choice"], "auto");
    }
}

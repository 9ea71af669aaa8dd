// crates/host/src/agent/mod.rs

//! Conversational agent that requests, runs and repairs capabilities.

mod prompts;
mod tool_defs;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use dyncap_core::ai_client::{message, tool_definition, AiClient, ChatRequest, ChatToolCall};
use dyncap_core::generation::CapabilityFactory;
use dyncap_core::quarantine::{Approver, QuarantineGate};
use dyncap_core::repair::{Invocation, SelfHealingExecutor};
use dyncap_core::sandbox::{ModuleLoader, Sandbox};
use dyncap_core::store::CapabilityStore;
use dyncap_core::types::CapabilitySpec;

use crate::ui::Console;

use tool_defs::REQUEST_FUNCTION;

const DEFAULT_MAX_STEPS: usize = 24;

#[derive(Deserialize)]
struct RequestFunctionArgs {
    name: String,
    description: String,
}

/// Keeps one conversation going across user turns. Declared functions and
/// history survive between questions.
pub struct Agent<'a, A: Approver, L: ModuleLoader, C: AiClient> {
    store: &'a CapabilityStore,
    gate: &'a QuarantineGate<A>,
    sandbox: &'a Sandbox<L>,
    client: &'a C,
    console: &'a Console<'a>,
    messages: Vec<Value>,
    tools: Vec<Value>,
    max_steps: usize,
}

impl<'a, A: Approver, L: ModuleLoader, C: AiClient> Agent<'a, A, L, C> {
    /// Declares `requestFunction` plus every capability already in the store.
    pub fn new(
        store: &'a CapabilityStore,
        gate: &'a QuarantineGate<A>,
        sandbox: &'a Sandbox<L>,
        client: &'a C,
        console: &'a Console<'a>,
    ) -> Result<Self> {
        let mut tools = vec![tool_defs::request_function_tool()];
        tools.extend(store.specs()?.iter().map(tool_definition));

        Ok(Self {
            store,
            gate,
            sandbox,
            client,
            console,
            messages: vec![message::system(prompts::MAIN_SYSTEM_MESSAGE)],
            tools,
            max_steps: DEFAULT_MAX_STEPS,
        })
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Names of the functions currently declared to the generator.
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.tools
            .iter()
            .filter_map(|t| t["function"]["name"].as_str())
    }

    #[cfg(test)]
    pub fn messages(&self) -> &[Value] {
        &self.messages
    }

    /// Answer `question`, creating and running capabilities on the way.
    pub fn ask(&mut self, question: &str) -> Result<String> {
        self.messages.push(message::user(question));

        for step in 0..self.max_steps {
            tracing::debug!(step = step + 1, history = self.messages.len(), "agent step");

            let request = ChatRequest::new(self.messages.clone()).with_tools(self.tools.clone());
            let response = self.client.chat(request)?;
            let msg = response
                .into_message()
                .context("no choices in chat response")?;
            self.messages.push(msg.to_history());

            let calls = msg.tool_calls();
            if calls.is_empty() {
                return Ok(msg.text().unwrap_or("<no content>").to_string());
            }

            for (i, call) in calls.iter().enumerate() {
                self.console.tool_call(&call.function.name, &call.function.arguments);
                match self.handle_tool_call(call) {
                    Ok(result) => {
                        self.console.tool_result(&call.function.name, &result, false);
                        self.reply(call, &result);
                    }
                    Err(err) => {
                        let text = format!("ERROR: {:#}", err);
                        self.console.tool_result(&call.function.name, &text, true);
                        // Every call needs a reply or the history is rejected
                        // on the next turn.
                        for pending in &calls[i..] {
                            self.reply(pending, &text);
                        }
                        return Err(err);
                    }
                }
            }
        }

        anyhow::bail!("no final answer after {} steps", self.max_steps)
    }

    fn reply(&mut self, call: &ChatToolCall, content: &str) {
        self.messages
            .push(message::tool(&call.id, &call.function.name, content));
    }

    fn handle_tool_call(&mut self, call: &ChatToolCall) -> Result<String> {
        if call.function.name == REQUEST_FUNCTION {
            let args: RequestFunctionArgs = match serde_json::from_str(&call.function.arguments) {
                Ok(args) => args,
                Err(e) => return Ok(format!("ERROR: invalid {} arguments: {}", REQUEST_FUNCTION, e)),
            };
            let spec = self.request_function(&args.name, &args.description)?;
            self.declare(spec);
            return Ok("Function created successfully.".to_string());
        }

        let args: Value = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.function.arguments) {
                Ok(args) => args,
                Err(e) => return Ok(format!("ERROR: arguments are not valid JSON: {}", e)),
            }
        };
        self.run_function(&call.function.name, &args)
    }

    fn request_function(&self, name: &str, description: &str) -> Result<CapabilitySpec> {
        self.console.step(format!("Generating function {}", name));
        let generated = CapabilityFactory::new(self.store, self.gate, self.client)
            .generate(name, description);
        match generated {
            Ok(spec) => {
                self.console.step_done();
                Ok(spec)
            }
            Err(err) => {
                self.console.step_failed();
                Err(err).with_context(|| format!("failed to create function {}", name))
            }
        }
    }

    fn run_function(&self, name: &str, args: &Value) -> Result<String> {
        self.console.step(format!("Executing function {}", name));
        let executor = SelfHealingExecutor::new(self.store, self.gate, self.sandbox, self.client);
        let invocation = match executor.invoke(name, args) {
            Ok(invocation) => {
                self.console.step_done();
                invocation
            }
            Err(err) => {
                self.console.step_failed();
                return Err(err).with_context(|| format!("failed to execute function {}", name));
            }
        };

        Ok(match invocation {
            Invocation::Succeeded(outcome) => {
                for line in &outcome.logs {
                    self.console.write(format!("[{}] {}", line.level, line.message));
                }
                match outcome.return_value() {
                    Some(value) => value.to_string(),
                    None => "Function executed successfully but returned no value.".to_string(),
                }
            }
            Invocation::Answered(text) => text,
        })
    }

    /// Add `spec` to the declared functions, replacing an older declaration.
    fn declare(&mut self, spec: CapabilitySpec) {
        let tool = tool_definition(&spec);
        match self
            .tools
            .iter_mut()
            .find(|t| t["function"]["name"] == spec.name.as_str())
        {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
    }
}

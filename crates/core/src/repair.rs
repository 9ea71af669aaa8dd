// crates/core/src/repair.rs

//! Runs a capability and, when it faults, asks the generator to fix it.
//!
//! Each fault counts against the attempt budget, whether the previous repair
//! replaced the code or only the input. The loop ends when the capability
//! succeeds, the budget is spent, the reviewer declines a fix, or the
//! generator answers without proposing one.

use serde_json::Value;

use crate::ai_client::{message, AiClient, ChatRequest};
use crate::error::{Error, Result};
use crate::payload::parse_repair;
use crate::prompts::{build_debug_prompt, DebugContext, DEBUG_SYSTEM_PROMPT};
use crate::quarantine::{Approver, QuarantineGate};
use crate::sandbox::{ModuleLoader, Sandbox};
use crate::store::CapabilityStore;
use crate::types::{ExecutionOutcome, Fault};

pub const MAX_ATTEMPTS: u32 = 3;

/// How an invocation ended, short of an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// The capability ran without a fault.
    Succeeded(ExecutionOutcome),
    /// The generator replied with neither code nor input; its text is the
    /// final answer for this call.
    Answered(String),
}

pub struct SelfHealingExecutor<'a, A: Approver, L: ModuleLoader, C: AiClient> {
    store: &'a CapabilityStore,
    gate: &'a QuarantineGate<A>,
    sandbox: &'a Sandbox<L>,
    client: &'a C,
    max_attempts: u32,
}

impl<'a, A: Approver, L: ModuleLoader, C: AiClient> SelfHealingExecutor<'a, A, L, C> {
    pub fn new(
        store: &'a CapabilityStore,
        gate: &'a QuarantineGate<A>,
        sandbox: &'a Sandbox<L>,
        client: &'a C,
    ) -> Self {
        Self {
            store,
            gate,
            sandbox,
            client,
            max_attempts: MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Execute `name` with `args`, repairing it on faults.
    pub fn invoke(&self, name: &str, args: &Value) -> Result<Invocation> {
        let mut args = args.clone();
        let mut attempts = 0;

        loop {
            let outcome = self.sandbox.execute(self.store, name, &args)?;
            let fault = match outcome.fault() {
                None => return Ok(Invocation::Succeeded(outcome)),
                Some(fault) => fault.clone(),
            };

            attempts += 1;
            if attempts >= self.max_attempts {
                tracing::warn!(capability = name, attempts, %fault, "repair budget exhausted");
                return Err(Error::RepairExhausted {
                    name: name.to_string(),
                    attempts,
                    last_fault: fault,
                });
            }

            tracing::info!(capability = name, attempt = attempts, %fault, "requesting repair");
            let reply = self.request_repair(name, &args, &outcome, &fault)?;
            let plan = parse_repair(&reply);

            if plan.is_empty() {
                tracing::info!(capability = name, "generator answered without a fix");
                return Ok(Invocation::Answered(reply));
            }

            if let Some(code) = plan.code {
                let approved = self.gate.stage(self.store, name, &code)?;
                let version = self.store.put(name, &approved)?;
                tracing::info!(capability = name, version, "repaired module committed");
            }
            if let Some(revised) = plan.arguments {
                tracing::info!(capability = name, args = %revised, "retrying with revised input");
                args = revised;
            }
        }
    }

    fn request_repair(
        &self,
        name: &str,
        args: &Value,
        outcome: &ExecutionOutcome,
        fault: &Fault,
    ) -> Result<String> {
        let module_code = self.store.read(name)?;
        let spec = match self.store.read_spec(name)? {
            Some(spec) => serde_json::to_string_pretty(&spec)
                .map_err(|e| Error::json(self.store.spec_path(name), e))?,
            None => "No spec recorded.".to_string(),
        };
        let input = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
        let console_output = outcome.console_output();
        let error = fault.describe();

        let prompt = build_debug_prompt(&DebugContext {
            name,
            spec: &spec,
            module_code: &module_code,
            input: &input,
            console_output: &console_output,
            error: &error,
        });

        let request = ChatRequest::new(vec![
            message::system(DEBUG_SYSTEM_PROMPT),
            message::user(&prompt),
        ]);
        let response = self.client.chat(request).map_err(Error::Generator)?;

        response
            .into_message()
            .and_then(|m| m.content)
            .ok_or_else(|| Error::protocol("repair response"))
    }
}

// crates/core/src/generation.rs

use crate::ai_client::{message, AiClient, ChatRequest};
use crate::error::{Error, Result};
use crate::payload::{extract_json, extract_payload};
use crate::prompts::{build_implementation_prompt, build_spec_prompt, CODER_SYSTEM_PROMPT};
use crate::quarantine::{Approver, QuarantineGate};
use crate::store::{validate_name, CapabilityStore};
use crate::types::CapabilitySpec;

/// Writes brand-new capabilities: code first, then a spec describing it.
pub struct CapabilityFactory<'a, A: Approver, C: AiClient> {
    store: &'a CapabilityStore,
    gate: &'a QuarantineGate<A>,
    client: &'a C,
}

impl<'a, A: Approver, C: AiClient> CapabilityFactory<'a, A, C> {
    pub fn new(store: &'a CapabilityStore, gate: &'a QuarantineGate<A>, client: &'a C) -> Self {
        Self {
            store,
            gate,
            client,
        }
    }

    /// Generate, review and store a capability called `name`.
    ///
    /// The module is committed as soon as it is approved; the spec is
    /// requested afterwards in the same conversation so the generator can
    /// describe the code it actually wrote.
    pub fn generate(&self, name: &str, description: &str) -> Result<CapabilitySpec> {
        validate_name(name)?;
        tracing::info!(capability = name, "generating capability");

        let mut messages = vec![
            message::system(CODER_SYSTEM_PROMPT),
            message::user(&build_implementation_prompt(name, description)),
        ];
        let code_reply = self.ask(&messages, "module")?;
        let code = extract_payload(&code_reply, "module")?;

        let approved = self.gate.stage(self.store, name, &code)?;
        let version = self.store.put(name, &approved)?;

        messages.push(message::assistant(&code_reply));
        messages.push(message::user(&build_spec_prompt()));
        let spec_reply = self.ask(&messages, "function spec")?;
        let mut spec: CapabilitySpec = extract_json(&spec_reply, "function spec")?;
        spec.name = name.to_string();

        self.store.put_spec(name, &spec)?;
        tracing::info!(capability = name, version, "capability generated");
        Ok(spec)
    }

    fn ask(&self, messages: &[serde_json::Value], expected: &str) -> Result<String> {
        let response = self
            .client
            .chat(ChatRequest::new(messages.to_vec()))
            .map_err(Error::Generator)?;
        response
            .into_message()
            .and_then(|m| m.content)
            .ok_or_else(|| Error::protocol(expected))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::ai_client::tests::ScriptedClient;
    use crate::manifest::SkipInstall;
    use crate::quarantine::tests::ScriptedApprover;
    use serde_json::json;
    use tempfile::TempDir;

    const CODE_REPLY: &str = "Here you go:\n---\n```javascript\nexport async function getWeather({ city }) {\n  return { city, temp: 20 };\n}\n```\n---";
    const SPEC_REPLY: &str = "---\n{\n  \"name\": \"weather\",\n  \"description\": \"Get the current weather for a city\",\n  \"parameters\": {\"type\": \"object\", \"properties\": {\"city\": {\"type\": \"string\"}}, \"required\": [\"city\"]}\n}\n---";

    fn setup(answers: &[&str]) -> (TempDir, CapabilityStore, QuarantineGate<ScriptedApprover>) {
        let dir = TempDir::new().unwrap();
        let store = CapabilityStore::with_installer(dir.path().join("code"), SkipInstall);
        let gate = QuarantineGate::new(
            dir.path().join("quarantine"),
            ScriptedApprover::answering(answers),
        );
        (dir, store, gate)
    }

    #[test]
    fn writes_module_and_spec() {
        let (_dir, store, gate) = setup(&["y"]);
        let client = ScriptedClient::texts(&[CODE_REPLY, SPEC_REPLY]);

        let spec = CapabilityFactory::new(&store, &gate, &client)
            .generate("getWeather", "Get the current weather for a city")
            .unwrap();

        assert_eq!(spec.name, "getWeather");
        assert_eq!(spec.parameters["required"], json!(["city"]));
        assert_eq!(store.read_spec("getWeather").unwrap(), Some(spec));
        assert!(store.read("getWeather").unwrap().starts_with("export async function getWeather"));

        let requests = client.requests.borrow();
        assert_eq!(requests[0].messages[0]["content"], CODER_SYSTEM_PROMPT);
        assert!(requests[0].messages[1]["content"]
            .as_str()
            .unwrap()
            .contains("Write a JavaScript function named getWeather"));
        assert_eq!(requests[1].messages.len(), 4);
        assert_eq!(requests[1].messages[2]["content"], CODE_REPLY);
    }

    #[test]
    fn reply_without_module_is_a_protocol_error() {
        let (_dir, store, gate) = setup(&["y"]);
        let client = ScriptedClient::texts(&["Sorry, I can't write that."]);

        let err = CapabilityFactory::new(&store, &gate, &client)
            .generate("getWeather", "Get the weather")
            .unwrap_err();

        assert!(matches!(err, Error::GeneratorProtocol { .. }));
        assert_eq!(store.latest_version("getWeather").unwrap(), None);
    }

    #[test]
    fn invalid_spec_keeps_approved_module() {
        let (_dir, store, gate) = setup(&["y"]);
        let client = ScriptedClient::texts(&[CODE_REPLY, "---\n{not json\n---"]);

        let err = CapabilityFactory::new(&store, &gate, &client)
            .generate("getWeather", "Get the weather")
            .unwrap_err();

        assert!(matches!(err, Error::GeneratorProtocol { .. }));
        assert_eq!(store.latest_version("getWeather").unwrap(), Some(1));
        assert_eq!(store.read_spec("getWeather").unwrap(), None);
    }

    #[test]
    fn declined_candidate_never_reaches_the_store() {
        let (_dir, store, gate) = setup(&["n"]);
        store.put("getWeather", "export default () => 'v1'").unwrap();
        let client = ScriptedClient::texts(&[CODE_REPLY, SPEC_REPLY]);

        let err = CapabilityFactory::new(&store, &gate, &client)
            .generate("getWeather", "Get the weather")
            .unwrap_err();

        assert!(matches!(err, Error::Declined { ref name } if name == "getWeather"));
        assert_eq!(fs::read_dir(gate.dir()).unwrap().count(), 0);
        assert_eq!(store.latest_version("getWeather").unwrap(), Some(1));
        assert_eq!(client.request_count(), 1);
    }

    #[test]
    fn bad_names_are_rejected_before_asking() {
        let (_dir, store, gate) = setup(&[]);
        let client = ScriptedClient::texts(&[]);

        let err = CapabilityFactory::new(&store, &gate, &client)
            .generate("weather2", "Get the weather")
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(client.request_count(), 0);
    }
}

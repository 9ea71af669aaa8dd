mod agent;
mod config;
mod transcript;
mod ui;

use std::io;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use dyncap_core::manifest::SkipInstall;
use dyncap_core::node::NodeLoader;
use dyncap_core::openai::OpenAiClient;
use dyncap_core::quarantine::QuarantineGate;
use dyncap_core::sandbox::Sandbox;
use dyncap_core::store::CapabilityStore;

use agent::Agent;
use config::HostConfig;
use transcript::{Transcript, TranscriptClient};
use ui::{Console, ConsoleApprover, Tone};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let config = HostConfig::from_env()?;
    let transcript = Transcript::create(transcript::FILE_NAME)?;
    let console = Console::new(Some(&transcript));

    // Initialize services
    let store = if config.skip_install {
        CapabilityStore::with_installer(config.code_dir(), SkipInstall)
    } else {
        CapabilityStore::new(config.code_dir())
    };
    let approver = ConsoleApprover::new(&console);
    let gate = QuarantineGate::new(config.quarantine_dir(), approver);
    let loader = NodeLoader::with_program(&config.node_binary);
    if !loader.is_available() {
        console.warn(format!(
            "{} not found; generated functions cannot run until Node.js is installed",
            config.node_binary.display()
        ));
    }
    let sandbox = Sandbox::new(config.sandbox_dir(), loader);
    let client = TranscriptClient::new(
        OpenAiClient::new(&config.base_url, &config.api_key, &config.model),
        &transcript,
        &config.model,
    );

    let mut agent = Agent::new(&store, &gate, &sandbox, &client, &console)?.with_max_steps(config.max_steps);
    let known = agent.declared().count().saturating_sub(1);
    console.write(format!(
        "Loaded {} functions from {} (model: {}, transcript: {}).",
        known,
        store.root().display(),
        config.model,
        transcript.path().display()
    ));

    loop {
        let question = match console.ask("What would you like to ask? (Type 'exit' to quit)") {
            Ok(q) => q,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        console.remove_previous_line();

        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") {
            console.text_box(Tone::Failure, "Exiting...");
            break;
        }

        console.text_box(Tone::User, &format!("You: {}", question));
        match agent.ask(question) {
            Ok(answer) => console.text_box(Tone::Assistant, &format!("Assistant: {}", answer)),
            Err(e) => {
                console.error(format!("{:#}", e));
                console.text_box(Tone::Failure, &format!("An error occurred: {:#}", e));
            }
        }
    }

    Ok(())
}

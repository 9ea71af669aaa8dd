// crates/host/src/config.rs

use std::path::PathBuf;

use anyhow::{Context, Result};

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OUTPUT: &str = "../output";
const DEFAULT_MAX_STEPS: usize = 24;

#[derive(Debug, Clone, PartialEq)]
pub struct HostConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Root for generated code, staged candidates and the sandbox.
    pub output_dir: PathBuf,
    pub max_steps: usize,
    pub skip_install: bool,
    pub node_binary: PathBuf,
}

impl HostConfig {
    /// Read `.env` (if any) and the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err).context("failed to load .env");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |keys: &[&str]| {
            keys.iter()
                .filter_map(|k| lookup(*k))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let api_key = var(&["OPENAI_API_KEY", "OPENAI_KEY"]).context("OPENAI_API_KEY not set")?;
        let model = var(&["OPENAI_MODEL", "MODEL"]).unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = var(&["OPENAI_BASE_URL"]).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let output_dir = PathBuf::from(var(&["DYNCAP_OUTPUT"]).unwrap_or_else(|| DEFAULT_OUTPUT.to_string()));
        let max_steps = match var(&["DYNCAP_MAX_STEPS"]) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DYNCAP_MAX_STEPS must be a number, got '{}'", raw))?,
            None => DEFAULT_MAX_STEPS,
        };
        let skip_install = var(&["DYNCAP_SKIP_INSTALL"])
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let node_binary = PathBuf::from(var(&["NODE_BINARY"]).unwrap_or_else(|| "node".to_string()));

        Ok(Self {
            api_key,
            model,
            base_url,
            output_dir,
            max_steps,
            skip_install,
            node_binary,
        })
    }

    pub fn code_dir(&self) -> PathBuf {
        self.output_dir.join("code")
    }

    pub fn quarantine_dir(&self) -> PathBuf {
        self.output_dir.join("quarantine")
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.output_dir.join("sandbox")
    }
}

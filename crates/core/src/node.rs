// crates/core/src/node.rs

//! Runs capability modules with a Node.js child process.
//!
//! Every call gets a fresh `node` process whose working directory is the
//! sandbox directory. A small runner script (passed with `-e`) takes over
//! the console, imports the module and calls its export with the JSON read
//! from stdin. Each console call is written straight away as its own
//! `@@log <json>` line, so output survives a crash. The run ends with a
//! single `@@outcome <json>` line:
//!
//! ```text
//! @@log {"level": "info", "message": "..."}
//! @@outcome {"returnValue": ...}
//! @@outcome {"fault": {"name": "Error", "message": "...", "stack": "..."}}
//! ```
//!
//! Exceptions thrown from detached callbacks, unhandled rejections and
//! early exits are reported as faults too.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use serde::Deserialize;
use serde_json::Value;

use crate::sandbox::{ExecutionContext, LoadedModule, ModuleLoader};
use crate::types::{Fault, LogLevel, LogLine};

const OUTCOME_MARKER: &str = "@@outcome ";
const LOG_MARKER: &str = "@@log ";
const MODULE_ENV: &str = "DYNCAP_MODULE";
const ENTRY_ENV: &str = "DYNCAP_ENTRY";

const RUNNER: &str = r#"
import { writeSync } from 'node:fs';
import { pathToFileURL } from 'node:url';
import { inspect } from 'node:util';

const emit = (marker, payload) => {
  let pending = Buffer.from(`\n${marker}${JSON.stringify(payload)}\n`);
  while (pending.length > 0) {
    try {
      pending = pending.subarray(writeSync(1, pending));
    } catch (e) {
      if (e.code !== 'EAGAIN') throw e;
    }
  }
};

const render = (args) =>
  args.map((a) => (typeof a === 'string' ? a : inspect(a, { depth: 4 }))).join(' ');
const capture = (level) => (...args) => emit('@@log ', { level, message: render(args) });
console.log = capture('info');
console.info = capture('info');
console.debug = capture('info');
console.warn = capture('warn');
console.error = capture('error');

const describe = (thrown) => {
  if (thrown instanceof Error) {
    return { name: thrown.name, message: thrown.message, stack: thrown.stack };
  }
  let rendered;
  try {
    rendered = JSON.stringify(thrown);
  } catch {
    rendered = String(thrown);
  }
  return { name: 'NonErrorThrown', message: `Non-Error value thrown: ${rendered}` };
};

let reported = false;
const report = (outcome) => {
  if (reported) return;
  reported = true;
  emit('@@outcome ', outcome);
  process.exit(0);
};

process.on('uncaughtException', (thrown) => report({ fault: describe(thrown) }));
process.on('unhandledRejection', (thrown) => report({ fault: describe(thrown) }));
process.on('exit', (code) => {
  if (reported) return;
  reported = true;
  emit('@@outcome ', {
    fault: {
      name: 'ProcessExited',
      message: `process exited with code ${code} before the function returned`,
    },
  });
});

let input = '';
process.stdin.setEncoding('utf8');
for await (const chunk of process.stdin) input += chunk;

try {
  const args = JSON.parse(input);
  const mod = await import(pathToFileURL(process.env.DYNCAP_MODULE).href);
  const entry = process.env.DYNCAP_ENTRY;
  const fn = typeof mod[entry] === 'function' ? mod[entry] : mod.default;
  if (typeof fn !== 'function') {
    throw new TypeError(`module exports neither ${entry} nor a default function`);
  }
  const returnValue = await fn(args);
  report({ returnValue });
} catch (thrown) {
  report({ fault: describe(thrown) });
}
"#;

/// What the runner script prints after the outcome marker.
#[derive(Debug, Deserialize)]
struct RunnerReport {
    #[serde(default, rename = "returnValue")]
    return_value: Option<Value>,
    #[serde(default)]
    fault: Option<Fault>,
}

/// Loads `.mjs` capability modules into Node.js child processes.
#[derive(Debug, Clone)]
pub struct NodeLoader {
    program: PathBuf,
}

impl NodeLoader {
    /// Use `node` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("node")
    }

    pub fn with_program<P: AsRef<Path>>(program: P) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
        }
    }

    /// True if the configured executable can be started.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl Default for NodeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for NodeLoader {
    fn load(&self, module: &Path, entry: &str) -> Result<Box<dyn LoadedModule + '_>, Fault> {
        // The child runs in another directory, so the path must be absolute.
        let path = module.canonicalize().map_err(|e| {
            Fault::new(
                "LoaderError",
                format!("cannot load module {}: {}", module.display(), e),
            )
        })?;

        Ok(Box::new(NodeModule {
            program: &self.program,
            path,
            entry: entry.to_string(),
        }))
    }
}

struct NodeModule<'a> {
    program: &'a Path,
    path: PathBuf,
    entry: String,
}

impl LoadedModule for NodeModule<'_> {
    fn call(&self, ctx: &mut ExecutionContext, args: &Value) -> Result<Option<Value>, Fault> {
        let input = serde_json::to_string(args)
            .map_err(|e| Fault::new("LoaderError", format!("cannot encode arguments: {}", e)))?;

        let mut child = Command::new(self.program)
            .args(["--input-type=module", "-e", RUNNER])
            .env(MODULE_ENV, &self.path)
            .env(ENTRY_ENV, &self.entry)
            .current_dir(ctx.working_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                Fault::new(
                    "LoaderError",
                    format!("failed to start {}: {}", self.program.display(), e),
                )
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(input.as_bytes());
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Fault::new("LoaderError", format!("failed to wait for node: {}", e)))?;

        collect_outcome(
            ctx,
            &String::from_utf8_lossy(&output.stdout),
            &String::from_utf8_lossy(&output.stderr),
            output.status,
        )
    }
}

/// Split the child's output into console lines and the reported outcome.
///
/// Console lines keep their stdout order. Marker lines that do not parse
/// are kept as plain output. The last readable outcome wins.
fn collect_outcome(
    ctx: &mut ExecutionContext,
    stdout: &str,
    stderr: &str,
    status: ExitStatus,
) -> Result<Option<Value>, Fault> {
    let mut report = None;

    for line in stdout.lines() {
        if let Some(json) = line.strip_prefix(OUTCOME_MARKER) {
            match serde_json::from_str::<RunnerReport>(json) {
                Ok(parsed) => {
                    report = Some(parsed);
                    continue;
                }
                Err(e) => tracing::debug!(error = %e, "unreadable outcome line kept as output"),
            }
        } else if let Some(json) = line.strip_prefix(LOG_MARKER) {
            if let Ok(log) = serde_json::from_str::<LogLine>(json) {
                ctx.log(log.level, log.message);
                continue;
            }
        }
        if !line.trim().is_empty() {
            ctx.log(LogLevel::Info, line);
        }
    }
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        ctx.log(LogLevel::Error, line);
    }

    match report {
        Some(RunnerReport { fault: Some(fault), .. }) => Err(fault),
        Some(r) => Ok(r.return_value),
        None => Err(Fault::new(
            "ProcessExited",
            format!("node exited with {} without reporting an outcome", status),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::manifest::SkipInstall;
    use crate::sandbox::Sandbox;
    use crate::store::CapabilityStore;
    use serde_json::json;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }

    #[test]
    fn parses_successful_report() {
        let mut ctx = ExecutionContext::new(".");
        let stdout = "\n@@log {\"level\":\"warn\",\"message\":\"slow\"}\npartial write\n@@outcome {\"returnValue\":{\"sum\":5}}\n";
        let result = collect_outcome(&mut ctx, stdout, "", exit_status(0));

        assert_eq!(result, Ok(Some(json!({"sum": 5}))));
        assert_eq!(
            ctx.logs(),
            &[
                LogLine::new(LogLevel::Warn, "slow"),
                LogLine::new(LogLevel::Info, "partial write"),
            ]
        );
    }

    #[test]
    fn parses_fault_report() {
        let mut ctx = ExecutionContext::new(".");
        let stdout = "@@outcome {\"fault\":{\"name\":\"Error\",\"message\":\"boom\",\"stack\":\"Error: boom\\n    at x\"}}";
        let result = collect_outcome(&mut ctx, stdout, "(node:1) ExperimentalWarning\n", exit_status(0));

        let fault = result.unwrap_err();
        assert_eq!(fault.to_string(), "Error: boom");
        assert!(fault.stack.unwrap().contains("at x"));
        assert_eq!(ctx.logs(), &[LogLine::new(LogLevel::Error, "(node:1) ExperimentalWarning")]);
    }

    #[test]
    fn missing_report_is_a_fault() {
        let mut ctx = ExecutionContext::new(".");
        let result = collect_outcome(&mut ctx, "", "killed\n", exit_status(3));
        assert_eq!(result.unwrap_err().name, "ProcessExited");
        assert_eq!(ctx.logs().len(), 1);
    }

    #[test]
    fn logs_survive_a_missing_report() {
        let mut ctx = ExecutionContext::new(".");
        let stdout = "@@log {\"level\":\"info\",\"message\":\"step one\"}\n@@log {\"level\":\"error\",\"message\":\"step two\"}\n";
        let result = collect_outcome(&mut ctx, stdout, "", exit_status(1));

        assert_eq!(result.unwrap_err().name, "ProcessExited");
        assert_eq!(
            ctx.logs(),
            &[
                LogLine::new(LogLevel::Info, "step one"),
                LogLine::new(LogLevel::Error, "step two"),
            ]
        );
    }

    #[test]
    fn unreadable_marker_lines_are_plain_output() {
        let mut ctx = ExecutionContext::new(".");
        let stdout = "@@outcome {\"returnValue\":7}\n@@outcome not json\n@@log {broken\n";
        let result = collect_outcome(&mut ctx, stdout, "warning\n", exit_status(0));

        assert_eq!(result, Ok(Some(json!(7))));
        assert_eq!(
            ctx.logs(),
            &[
                LogLine::new(LogLevel::Info, "@@outcome not json"),
                LogLine::new(LogLevel::Info, "@@log {broken"),
                LogLine::new(LogLevel::Error, "warning"),
            ]
        );
    }

    #[test]
    fn missing_node_binary_is_a_fault() {
        let dir = TempDir::new().unwrap();
        let store = CapabilityStore::with_installer(dir.path().join("code"), SkipInstall);
        store.put("answer", "export default () => 42;").unwrap();
        let sandbox = Sandbox::new(
            dir.path().join("sandbox"),
            NodeLoader::with_program(dir.path().join("no-such-node")),
        );

        let outcome = sandbox.execute(&store, "answer", &json!({})).unwrap();
        assert_eq!(outcome.fault().unwrap().name, "LoaderError");
    }

    /// Node-backed tests run only where `node` is installed.
    fn node() -> Option<NodeLoader> {
        let loader = NodeLoader::new();
        if loader.is_available() {
            Some(loader)
        } else {
            eprintln!("node not found on PATH, skipping");
            None
        }
    }

    fn node_setup(loader: NodeLoader) -> (TempDir, CapabilityStore, Sandbox<NodeLoader>) {
        let dir = TempDir::new().unwrap();
        let store = CapabilityStore::with_installer(dir.path().join("code"), SkipInstall);
        let sandbox = Sandbox::new(dir.path().join("sandbox"), loader);
        (dir, store, sandbox)
    }

    #[test]
    fn node_adds_numbers() {
        let Some(loader) = node() else { return };
        let (_dir, store, sandbox) = node_setup(loader);
        store
            .put(
                "addNumbers",
                "export function addNumbers({ a, b }) {\n  console.log('adding', a, b);\n  return a + b;\n}\n",
            )
            .unwrap();

        let outcome = sandbox
            .execute(&store, "addNumbers", &json!({"a": 2, "b": 3}))
            .unwrap();

        assert_eq!(outcome.return_value(), Some(&json!(5)));
        assert!(outcome.fault().is_none());
        assert_eq!(outcome.logs, vec![LogLine::new(LogLevel::Info, "adding 2 3")]);
    }

    #[test]
    fn node_falls_back_to_default_export_and_awaits() {
        let Some(loader) = node() else { return };
        let (_dir, store, sandbox) = node_setup(loader);
        store
            .put(
                "greet",
                "export default async ({ who }) => {\n  await new Promise((r) => setTimeout(r, 5));\n  return `hello ${who}`;\n};\n",
            )
            .unwrap();

        let outcome = sandbox.execute(&store, "greet", &json!({"who": "ada"})).unwrap();
        assert_eq!(outcome.return_value(), Some(&json!("hello ada")));
    }

    #[test]
    fn node_captures_sync_and_async_throws() {
        let Some(loader) = node() else { return };
        let (_dir, store, sandbox) = node_setup(loader);
        store
            .put(
                "explode",
                "export function explode() {\n  console.error('about to fail');\n  throw new Error('boom');\n}\n",
            )
            .unwrap();
        store
            .put(
                "rejectLater",
                "export async function rejectLater() {\n  await null;\n  throw 'plain string';\n}\n",
            )
            .unwrap();

        let cwd = std::env::current_dir().unwrap();

        let sync = sandbox.execute(&store, "explode", &json!({})).unwrap();
        let fault = sync.fault().unwrap();
        assert_eq!(fault.to_string(), "Error: boom");
        assert_eq!(sync.logs[0], LogLine::new(LogLevel::Error, "about to fail"));
        assert_eq!(std::env::current_dir().unwrap(), cwd);

        let not_error = sandbox.execute(&store, "rejectLater", &json!({})).unwrap();
        let fault = not_error.fault().unwrap();
        assert_eq!(fault.name, "NonErrorThrown");
        assert!(fault.message.contains("plain string"));
        assert_eq!(std::env::current_dir().unwrap(), cwd);
    }

    #[test]
    fn node_reports_throws_from_detached_callbacks() {
        let Some(loader) = node() else { return };
        let (_dir, store, sandbox) = node_setup(loader);
        store
            .put(
                "lateBoom",
                "export async function lateBoom() {\n  console.log('step one');\n  await new Promise(() => {\n    setTimeout(() => {\n      throw new Error('late failure');\n    }, 5);\n  });\n}\n",
            )
            .unwrap();
        store
            .put(
                "lateReject",
                "export function lateReject() {\n  console.warn('queued');\n  Promise.reject(new RangeError('nobody caught this'));\n  return new Promise((r) => setTimeout(r, 50));\n}\n",
            )
            .unwrap();

        let thrown = sandbox.execute(&store, "lateBoom", &json!({})).unwrap();
        assert_eq!(thrown.fault().unwrap().to_string(), "Error: late failure");
        assert_eq!(thrown.logs[0], LogLine::new(LogLevel::Info, "step one"));

        let rejected = sandbox.execute(&store, "lateReject", &json!({})).unwrap();
        assert_eq!(rejected.fault().unwrap().to_string(), "RangeError: nobody caught this");
        assert_eq!(rejected.logs[0], LogLine::new(LogLevel::Warn, "queued"));
    }

    #[test]
    fn node_keeps_logs_when_the_function_ends_the_process() {
        let Some(loader) = node() else { return };
        let (_dir, store, sandbox) = node_setup(loader);
        store
            .put(
                "exiter",
                "export function exiter() {\n  console.log('before exit');\n  process.exit(1);\n}\n",
            )
            .unwrap();
        store
            .put(
                "neverSettles",
                "export default () => {\n  console.log('waiting');\n  return new Promise(() => {});\n};\n",
            )
            .unwrap();

        let exited = sandbox.execute(&store, "exiter", &json!({})).unwrap();
        let fault = exited.fault().unwrap();
        assert_eq!(fault.name, "ProcessExited");
        assert!(fault.message.contains("code 1"));
        assert_eq!(exited.logs[0], LogLine::new(LogLevel::Info, "before exit"));

        let stalled = sandbox.execute(&store, "neverSettles", &json!({})).unwrap();
        assert_eq!(stalled.fault().unwrap().name, "ProcessExited");
        assert_eq!(stalled.logs[0], LogLine::new(LogLevel::Info, "waiting"));
    }

    #[test]
    fn node_writes_into_sandbox_directory() {
        let Some(loader) = node() else { return };
        let (dir, store, sandbox) = node_setup(loader);
        store
            .put(
                "saveNote",
                "import { writeFileSync } from 'node:fs';\nexport function saveNote({ text }) {\n  writeFileSync('note.txt', text);\n}\n",
            )
            .unwrap();

        let outcome = sandbox
            .execute(&store, "saveNote", &json!({"text": "remember"}))
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.return_value(), None);
        assert_eq!(
            fs::read_to_string(dir.path().join("sandbox/note.txt")).unwrap(),
            "remember"
        );
    }
}

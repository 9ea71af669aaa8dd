// crates/core/src/resolver.rs

//! Static import scanning for generated modules.
//!
//! Nothing here executes the source. The result is a set, so the order in
//! which imports appear in the text never matters.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Node.js core modules. Importable without installing anything.
const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*//.*$").unwrap());

static FROM_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|export)\s[^'";]*?\bfrom\s*['"]([^'"\n]+)['"]"#).unwrap()
});
static BARE_IMPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*import\s*['"]([^'"\n]+)['"]"#).unwrap());
static CALL_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|require)\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap()
});

/// Package names imported by `source` that have to be installed.
pub fn imported_modules(source: &str) -> BTreeSet<String> {
    let without_blocks = BLOCK_COMMENT.replace_all(source, "");
    let code = LINE_COMMENT.replace_all(&without_blocks, "");

    [&*FROM_CLAUSE, &*BARE_IMPORT, &*CALL_IMPORT]
        .iter()
        .flat_map(|re| re.captures_iter(&code))
        .filter_map(|caps| package_name(&caps[1]))
        .filter(|name| !is_builtin(name))
        .collect()
}

/// True for Node.js core modules, with or without the `node:` scheme and
/// including their sub-paths (`fs/promises`).
pub fn is_builtin(specifier: &str) -> bool {
    if specifier.starts_with("node:") {
        return true;
    }
    let root = specifier.split('/').next().unwrap_or(specifier);
    BUILTIN_MODULES.contains(&root)
}

/// The installable package an import specifier refers to, if any.
///
/// Relative paths and URL-like specifiers (`node:`, `file:`, `https:`) are
/// not packages.
fn package_name(specifier: &str) -> Option<String> {
    let specifier = specifier.trim();
    if specifier.is_empty()
        || specifier.starts_with('.')
        || specifier.starts_with('/')
        || specifier.contains(':')
    {
        return None;
    }

    let mut parts = specifier.split('/');
    let first = parts.next()?;
    if first.starts_with('@') {
        let second = parts.next().filter(|s| !s.is_empty())?;
        Some(format!("{}/{}", first, second))
    } else {
        Some(first.to_string())
    }
}

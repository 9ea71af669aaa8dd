// crates/host/src/ui.rs

//! Colored terminal output and prompts.

use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::Path;

use dyncap_core::error::{Error, Result as CoreResult};
use dyncap_core::quarantine::Approver;

use crate::transcript::Transcript;

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

/// Box border colors.
#[derive(Clone, Copy)]
pub enum Tone {
    User,
    Assistant,
    Failure,
}

impl Tone {
    fn colors(self) -> (&'static str, &'static str) {
        match self {
            Tone::User => (GREEN, CYAN),
            Tone::Assistant => (MAGENTA, CYAN),
            Tone::Failure => (RED, WHITE),
        }
    }
}

/// Terminal handle. Everything shown is mirrored into the transcript when
/// there is one.
pub struct Console<'t> {
    transcript: Option<&'t Transcript>,
}

impl<'t> Console<'t> {
    pub fn new(transcript: Option<&'t Transcript>) -> Self {
        Self { transcript }
    }

    fn record(&self, message: impl Display) {
        if let Some(t) = self.transcript {
            t.info(message);
        }
    }

    /// Print `question` and read one line from stdin.
    pub fn ask(&self, question: &str) -> io::Result<String> {
        self.record(format!("Asking user: {}", question));
        print!("{} ", question);
        io::stdout().flush()?;

        let mut answer = String::new();
        let read = io::stdin().lock().read_line(&mut answer)?;
        if read == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
        }
        let answer = answer.trim_end_matches(&['\r', '\n'][..]).to_string();
        self.record(format!("Got answer: {}", answer));
        Ok(answer)
    }

    /// Clear the line the cursor just left.
    pub fn remove_previous_line(&self) {
        print!("\x1b[1A\x1b[2K");
        let _ = io::stdout().flush();
    }

    pub fn text_box(&self, tone: Tone, text: &str) {
        self.record(text);
        println!("{}", boxed(tone, text));
    }

    /// Progress line for a long-running step.
    pub fn step(&self, message: impl Display) {
        self.record(&message);
        eprintln!("{CYAN}{BOLD}⠿{RESET} {}", message);
    }

    pub fn step_done(&self) {
        self.record("Succeeded!");
        eprintln!("{GREEN}✓{RESET}");
    }

    pub fn step_failed(&self) {
        self.record("Failed!");
        eprintln!("{RED}✗{RESET}");
    }

    /// Log a tool call.
    pub fn tool_call(&self, name: &str, args: &str) {
        self.record(format!("Calling {} with {}", name, args));
        eprintln!("{CYAN}→ {}{RESET} {DIM}{}{RESET}", name, truncate(args, 100));
    }

    /// Log a tool result.
    pub fn tool_result(&self, name: &str, result: &str, is_error: bool) {
        self.record(format!("{} returned {}", name, result));
        let (symbol, color) = if is_error { ("✗", RED) } else { ("✓", GREEN) };
        eprintln!(
            "{color}{symbol} {}{RESET}: {DIM}{}{RESET}",
            name,
            truncate(result, 150)
        );
    }

    pub fn write(&self, message: impl Display) {
        self.record(&message);
        println!("{DIM}{}{RESET}", message);
    }

    pub fn warn(&self, message: impl Display) {
        self.record(&message);
        eprintln!("{YELLOW}[warn]{RESET} {}", message);
    }

    pub fn error(&self, message: impl Display) {
        if let Some(t) = self.transcript {
            t.error(&message);
        }
        eprintln!("{RED}{BOLD}✗ Error:{RESET} {}", message);
    }
}

/// Asks on the terminal whether a staged candidate may be installed.
pub struct ConsoleApprover<'c, 't> {
    console: &'c Console<'t>,
}

impl<'c, 't> ConsoleApprover<'c, 't> {
    pub fn new(console: &'c Console<'t>) -> Self {
        Self { console }
    }
}

impl Approver for ConsoleApprover<'_, '_> {
    fn review(&self, name: &str, staged: &Path) -> CoreResult<String> {
        let url = file_url(staged);
        let question = format!(
            "{RED}Do you trust this generated code?\n{}\n{DIM}{}{RESET}{RED}\n(y/n){RESET}",
            hyperlink(name, &url),
            url
        );
        self.console.ask(&question).map_err(|source| Error::Io {
            path: staged.to_path_buf(),
            source,
        })
    }
}

/// `file://` URL for `path`, each segment percent-encoded.
pub fn file_url(path: &Path) -> String {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let raw = absolute.to_string_lossy().replace('\\', "/");
    let encoded = raw
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    if encoded.starts_with('/') {
        format!("file://{}", encoded)
    } else {
        format!("file:///{}", encoded)
    }
}

/// OSC 8 terminal hyperlink.
fn hyperlink(text: &str, url: &str) -> String {
    format!("\x1b]8;;{}\x1b\\{}\x1b]8;;\x1b\\", url, text)
}

fn boxed(tone: Tone, text: &str) -> String {
    let (border, fg) = tone.colors();
    let lines: Vec<&str> = text.lines().collect();
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let bar = "─".repeat(width + 4);

    let mut out = format!("{border}╭{bar}╮{RESET}\n");
    let blank = format!("{border}│{RESET}{}{border}│{RESET}\n", " ".repeat(width + 4));
    out.push_str(&blank);
    for line in &lines {
        let pad = width - line.chars().count();
        out.push_str(&format!(
            "{border}│{RESET}  {fg}{}{RESET}{}  {border}│{RESET}\n",
            line,
            " ".repeat(pad)
        ));
    }
    out.push_str(&blank);
    out.push_str(&format!("{border}╰{bar}╯{RESET}"));
    out
}

/// Truncate and clean string for display.
fn truncate(s: &str, max: usize) -> String {
    let clean: String = s
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect();
    let trimmed = clean.trim();
    match trimmed.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &trimmed[..i]),
        None => trimmed.to_string(),
    }
}

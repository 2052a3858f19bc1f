//! LLDB command vocabulary used by the bridge.
//!
//! Every command is rendered into the exact text typed into the LLDB REPL. Multi-line
//! commands (separated by `\n`) are written as several physical lines but answered as one
//! logical reply, see [`crate::debugger::correlator`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use strum_macros::{Display as StrumDisplay, EnumString};

/// LLDB idle prompt token.
pub const PROMPT: &str = "(lldb)";
/// Token LLDB prefixes every failed command reply with.
pub const ERROR_TOKEN: &str = "error:";

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("valid regex"));

/// Kind of single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString)]
pub enum StepKind {
    #[strum(serialize = "next")]
    Over,
    #[strum(serialize = "step")]
    Into,
    #[strum(serialize = "finish")]
    Out,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TargetCreate(PathBuf),
    BreakpointSet { file: PathBuf, line: u32 },
    BreakpointList,
    BreakpointDelete(u32),
    ProcessLaunch { stop_at_entry: bool, args: Vec<String> },
    Continue,
    Step(StepKind),
    Interrupt,
    Backtrace { thread: u32 },
    FrameVariables { frame: u32 },
    Evaluate(String),
    Quit,
}

fn quote(raw: &str) -> String {
    format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
}

fn quoted(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::TargetCreate(path) => write!(f, "target create {}", quoted(path)),
            Command::BreakpointSet { file, line } => {
                write!(f, "breakpoint set --file {} --line {line}", quoted(file))
            }
            Command::BreakpointList => f.write_str("breakpoint list"),
            Command::BreakpointDelete(id) => write!(f, "breakpoint delete {id}"),
            Command::ProcessLaunch {
                stop_at_entry,
                args,
            } => {
                f.write_str("process launch")?;
                if *stop_at_entry {
                    f.write_str(" --stop-at-entry")?;
                }
                if !args.is_empty() {
                    f.write_str(" --")?;
                    for arg in args {
                        write!(f, " {}", quote(arg))?;
                    }
                }
                Ok(())
            }
            Command::Continue => f.write_str("continue"),
            Command::Step(kind) => write!(f, "{kind}"),
            Command::Interrupt => f.write_str("process interrupt"),
            Command::Backtrace { thread } => write!(f, "thread backtrace {thread}"),
            Command::FrameVariables { frame } => {
                write!(f, "frame select {frame}\nframe variable")
            }
            Command::Evaluate(expression) => f.write_str(&expression_command(expression)),
            Command::Quit => f.write_str("quit"),
        }
    }
}

/// Translate a user expression into an LLDB command.
///
/// `p`/`print`/`expr`/`expression` commands pass through, plain identifiers are read with
/// `frame variable`, anything else goes through the expression evaluator.
pub fn expression_command(expression: &str) -> String {
    let expression = expression.trim();
    let passthrough = ["p ", "print ", "expr ", "expression "];
    if passthrough.iter().any(|p| expression.starts_with(p)) {
        expression.to_string()
    } else if IDENTIFIER_RE.is_match(expression) {
        format!("frame variable {expression}")
    } else {
        format!("expr {expression}")
    }
}

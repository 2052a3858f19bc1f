//! Text to struct transformations of LLDB output.
//!
//! Parsers are tolerant: unknown lines are skipped, nothing here panics or fails except
//! [`parse_evaluation`], which reports an `error:` reply or an empty result.

pub mod frame;
pub mod variable;

pub use frame::{parse_backtrace, StackFrame};
pub use variable::{parse_variables, Variable, VariableSnapshot, UNKNOWN_TYPE};

use crate::debugger::command::{ERROR_TOKEN, PROMPT};
use crate::debugger::error::Error;
use once_cell::sync::Lazy;
use regex::Regex;

static SOURCE_LISTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(->\s*)?\d+(\s|$)").expect("valid regex"));

/// Lines that never carry a value: prompts, lifecycle messages, stop headers and source
/// listing.
pub(crate) fn is_boilerplate(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line.starts_with(PROMPT)
        || line.starts_with("Process ")
        || line.starts_with("thread #")
        || line.starts_with('*')
        || line.starts_with("frame #")
        || line.starts_with("->")
        || SOURCE_LISTING_RE.is_match(line)
}

/// Parse the reply of an expression command into one variable named after `expression`.
pub fn parse_evaluation(
    expression: &str,
    lines: &[String],
    snapshot: &mut VariableSnapshot,
) -> Result<Variable, Error> {
    if let Some(line) = lines.iter().find(|l| l.contains(ERROR_TOKEN)) {
        let message = line
            .split_once(ERROR_TOKEN)
            .map(|(_, msg)| msg.trim())
            .unwrap_or_default();
        return Err(Error::Evaluation(message.to_string()));
    }

    let text = lines.join("\n");
    let mut variables = parse_variables(&text, snapshot);
    if variables.is_empty() {
        return Err(Error::Evaluation(format!("no result for `{expression}`")));
    }

    let mut result = variables.swap_remove(0);
    result.name = expression.trim().to_string();
    Ok(result)
}

use crate::debugger::position::PositionResolver;
use std::path::PathBuf;

/// One frame of a thread backtrace.
#[derive(Debug, Clone, PartialEq)]
pub struct StackFrame {
    /// Frame number, 0 is the innermost frame.
    pub id: u32,
    pub function: String,
    pub file: PathBuf,
    /// 1-based line.
    pub line: u32,
    /// 0 when unknown.
    pub column: u32,
}

/// Parse `thread backtrace` output. Frames without a source location are skipped.
pub fn parse_backtrace(text: &str, resolver: &PositionResolver) -> Vec<StackFrame> {
    text.lines()
        .filter_map(|line| parse_frame_line(line, resolver))
        .collect()
}

/// Parse a single `frame #N: <addr> <module>`<function> at <file>:<line>[:<col>]` line.
pub fn parse_frame_line(line: &str, resolver: &PositionResolver) -> Option<StackFrame> {
    let line = line.trim().trim_start_matches('*').trim();
    let rest = line.strip_prefix("frame #")?;

    let id_end = rest.find(|c: char| !c.is_ascii_digit())?;
    let id = rest[..id_end].parse().ok()?;

    let at = rest.rfind(" at ")?;
    let (file, line, column) = split_location(location(&rest[at + 4..]))?;

    Some(StackFrame {
        id,
        function: function_name(&rest[..at]),
        file: resolver.resolve_path(file),
        line,
        column,
    })
}

/// Location clause without trailing annotations like `[opt]`.
fn location(clause: &str) -> &str {
    let clause = clause.trim();
    match clause.find(" [") {
        Some(idx) => &clause[..idx],
        None => clause,
    }
}

fn split_location(location: &str) -> Option<(&str, u32, u32)> {
    let (head, last) = location.rsplit_once(':')?;
    let last = last.trim().parse().ok()?;
    if let Some((file, line)) = head.rsplit_once(':') {
        if let Ok(line) = line.trim().parse() {
            return Some((file, line, last));
        }
    }
    Some((head, last, 0))
}

fn function_name(head: &str) -> String {
    let name = match head.rfind('`') {
        Some(idx) => head[idx + 1..].trim(),
        None => head.split_whitespace().last().unwrap_or_default(),
    };

    if name.is_empty() || name.starts_with("0x") || name.ends_with(':') {
        "unknown".to_string()
    } else {
        name.to_string()
    }
}

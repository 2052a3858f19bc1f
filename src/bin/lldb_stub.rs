//! Scripted stand-in for the LLDB REPL.
//!
//! Speaks the subset of LLDB's line protocol the bridge uses: every command is echoed
//! after the prompt, followed by its reply and a bare idle prompt. The debugee is
//! simulated: `continue` runs to the next breakpoint that was not hit yet, or to the
//! program exit. Breakpoints on lines above 9999 are rejected. Like LLDB, error
//! messages go to stderr.

use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

const PROMPT: &str = "(lldb)";
const PID: u32 = 4242;
const MAX_LINE: u32 = 9999;

#[derive(Clone)]
struct Location {
    file: String,
    line: u32,
}

struct Stub<W: Write, E: Write> {
    out: W,
    err: E,
    target: Option<String>,
    breakpoints: BTreeMap<u32, Location>,
    next_breakpoint: u32,
    /// Ids of breakpoints already hit in this run.
    hit: Vec<u32>,
    launched: bool,
    /// Location of the last stop, `None` at the entry point.
    location: Option<Location>,
    stop_reason: String,
    next_result: u32,
}

impl<W: Write, E: Write> Stub<W, E> {
    fn new(out: W, err: E) -> Self {
        Self {
            out,
            err,
            target: None,
            breakpoints: BTreeMap::new(),
            next_breakpoint: 1,
            hit: vec![],
            launched: false,
            location: None,
            stop_reason: String::new(),
            next_result: 0,
        }
    }

    fn say(&mut self, line: impl AsRef<str>) -> io::Result<()> {
        let line = line.as_ref();
        if line.starts_with("error:") {
            writeln!(self.err, "{line}")?;
            return self.err.flush();
        }
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }

    /// Handle one input line, returns `false` when the stub must exit.
    fn handle(&mut self, input: &str) -> io::Result<bool> {
        let input = input.trim();
        if input == "quit" {
            return Ok(false);
        }

        self.say(format!("{PROMPT} {input}"))?;
        let (keyword, rest) = input.split_once(' ').unwrap_or((input, ""));
        match keyword {
            "target" => self.target_create(rest)?,
            "breakpoint" => self.breakpoint(rest)?,
            "process" => self.process(rest)?,
            "continue" => return self.resume(),
            "next" => self.step("step over", 1)?,
            "step" => self.step("step in", 1)?,
            "finish" => self.step("step out", 2)?,
            "thread" => self.backtrace(rest)?,
            "frame" => self.frame(rest)?,
            "expr" | "p" | "print" | "expression" => self.evaluate(rest)?,
            _ => self.say(format!("error: '{keyword}' is not a valid command."))?,
        }
        self.say(PROMPT)?;
        Ok(true)
    }

    fn target_create(&mut self, rest: &str) -> io::Result<()> {
        let path = unquote(rest.trim_start_matches("create").trim());
        if Path::new(&path).exists() {
            self.say(format!("Current executable set to '{path}' (x86_64)."))?;
            self.target = Some(path);
        } else {
            self.say(format!(
                "error: unable to find executable for '{path}'"
            ))?;
        }
        Ok(())
    }

    fn breakpoint(&mut self, rest: &str) -> io::Result<()> {
        let (sub, args) = rest.split_once(' ').unwrap_or((rest, ""));
        match sub {
            "set" => {
                let Some((file, line)) = parse_set_args(args) else {
                    return self.say("error: invalid breakpoint arguments");
                };
                if line > MAX_LINE {
                    return self.say(format!("error: no line {line} in file {file}"));
                }
                let id = self.next_breakpoint;
                self.next_breakpoint += 1;
                let base = Path::new(&file)
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| file.clone());
                self.say(format!(
                    "Breakpoint {id}: where = a.out`main + {} at {base}:{line}:5, address = 0x00000001000{:05x}",
                    id * 4,
                    0x3f00 + id
                ))?;
                self.breakpoints.insert(id, Location { file, line });
            }
            "list" => {
                if self.breakpoints.is_empty() {
                    return self.say("No breakpoints currently set.");
                }
                self.say("Current breakpoints:")?;
                let entries: Vec<_> = self
                    .breakpoints
                    .iter()
                    .map(|(id, loc)| (*id, loc.clone()))
                    .collect();
                for (id, loc) in entries {
                    self.say(format!(
                        "{id}: file = '{}', line = {}, exact_match = 0, locations = 1",
                        loc.file, loc.line
                    ))?;
                    self.say(format!("  {id}.1: where = a.out`main at {}:{}:5, resolved, hit count = 0", loc.file, loc.line))?;
                    self.say("")?;
                }
            }
            "delete" => match args.trim().parse::<u32>() {
                Ok(id) if self.breakpoints.remove(&id).is_some() => {
                    self.say("1 breakpoints deleted; 0 breakpoint locations disabled.")?;
                }
                _ => self.say(format!("error: '{}' is not a valid breakpoint ID.", args.trim()))?,
            },
            _ => self.say(format!("error: 'breakpoint {sub}' is not a valid command."))?,
        }
        Ok(())
    }

    fn process(&mut self, rest: &str) -> io::Result<()> {
        if rest.starts_with("launch") {
            let Some(target) = self.target.clone() else {
                return self.say(
                    "error: invalid target, create a target using the 'target create' command",
                );
            };
            self.launched = true;
            self.hit.clear();
            self.location = None;
            self.stop_reason = "signal SIGSTOP".to_string();
            self.say(format!("Process {PID} stopped"))?;
            self.say("* thread #1, name = 'a.out', stop reason = signal SIGSTOP")?;
            self.say("    frame #0: 0x00007ffff7fe3290 ld-linux-x86-64.so.2`_start")?;
            self.say("ld-linux-x86-64.so.2`_start:")?;
            self.say("->  0x7ffff7fe3290 <+0>: movq   %rsp, %rdi")?;
            return self.say(format!("Process {PID} launched: '{target}' (x86_64)"));
        }
        if rest.starts_with("interrupt") {
            return self.say("error: Process is not running.");
        }
        self.say(format!("error: 'process {rest}' is not a valid command."))
    }

    /// `continue` answers before the stop is reported, like LLDB in asynchronous mode.
    fn resume(&mut self) -> io::Result<bool> {
        if !self.launched {
            self.say("error: invalid process")?;
            self.say(PROMPT)?;
            return Ok(true);
        }
        self.say(format!("Process {PID} resuming"))?;
        self.say(PROMPT)?;

        let next = self
            .breakpoints
            .iter()
            .find(|(id, _)| !self.hit.contains(*id))
            .map(|(id, loc)| (*id, loc.clone()));
        match next {
            Some((id, loc)) => {
                self.hit.push(id);
                self.say("hello from debugee")?;
                self.report_stop(&format!("breakpoint {id}.1"), loc)?;
            }
            None => {
                self.say("bye from debugee")?;
                self.launched = false;
                self.location = None;
                self.say(format!("Process {PID} exited with status = 0 (0x00000000)"))?;
            }
        }
        Ok(true)
    }

    fn step(&mut self, reason: &str, lines: u32) -> io::Result<()> {
        if !self.launched {
            return self.say("error: invalid process");
        }
        let Some(mut loc) = self.location.clone() else {
            return self.say("error: no source location to step from");
        };
        loc.line += lines;
        self.report_stop(reason, loc)
    }

    fn report_stop(&mut self, reason: &str, loc: Location) -> io::Result<()> {
        self.say(format!("Process {PID} stopped"))?;
        self.say(format!(
            "* thread #1, name = 'a.out', stop reason = {reason}"
        ))?;
        self.say(format!(
            "    frame #0: 0x0000555555555131 a.out`main at {}:{}:5",
            loc.file, loc.line
        ))?;
        self.say(format!("   {}  \tint before = 0;", loc.line.saturating_sub(1)))?;
        self.say(format!("-> {}  \tint count = 3;", loc.line))?;
        self.stop_reason = reason.to_string();
        self.location = Some(loc);
        Ok(())
    }

    fn backtrace(&mut self, rest: &str) -> io::Result<()> {
        if !self.launched {
            return self.say("error: invalid process");
        }
        let thread = rest.trim_start_matches("backtrace").trim();
        if thread != "1" {
            return self.say(format!("error: no thread with index: \"{thread}\""));
        }
        self.say(format!(
            "* thread #1, name = 'a.out', stop reason = {}",
            self.stop_reason
        ))?;
        match self.location.clone() {
            Some(loc) => {
                self.say(format!(
                    "  * frame #0: 0x0000555555555131 a.out`main at {}:{}:5",
                    loc.file, loc.line
                ))?;
                self.say("    frame #1: 0x00007ffff7de70b3 libc.so.6`__libc_start_main + 243")?;
                self.say("    frame #2: 0x000055555555504e a.out`_start + 46")
            }
            None => self.say("  * frame #0: 0x00007ffff7fe3290 ld-linux-x86-64.so.2`_start"),
        }
    }

    fn frame(&mut self, rest: &str) -> io::Result<()> {
        if !self.launched {
            return self.say("error: invalid process");
        }
        let (sub, args) = rest.split_once(' ').unwrap_or((rest, ""));
        match sub {
            "select" => match args.trim().parse::<u32>() {
                Ok(0) => self.say("frame #0: 0x0000555555555131 a.out`main at main.c:6:5"),
                Ok(1) => self.say("frame #1: 0x00007ffff7de70b3 libc.so.6`__libc_start_main + 243"),
                _ => self.say(format!("error: Frame index ({}) out of range.", args.trim())),
            },
            "variable" => {
                let vars = [
                    ("count", vec!["(int) count = 3"]),
                    (
                        "origin",
                        vec!["(Point) origin = {", "  x = 1", "  y = 2", "}"],
                    ),
                    (
                        "name",
                        vec!["(const char *) name = 0x0000555555556004 \"bridge\""],
                    ),
                ];
                let wanted = args.trim();
                let selected: Vec<_> = vars
                    .iter()
                    .filter(|(name, _)| wanted.is_empty() || *name == wanted)
                    .flat_map(|(_, lines)| lines.iter())
                    .collect();
                if selected.is_empty() {
                    return self.say(format!(
                        "error: no variable named '{wanted}' found in this frame"
                    ));
                }
                for line in selected {
                    self.say(line)?;
                }
                Ok(())
            }
            _ => self.say(format!("error: 'frame {sub}' is not a valid command.")),
        }
    }

    fn evaluate(&mut self, expression: &str) -> io::Result<()> {
        if !self.launched {
            return self.say("error: invalid process");
        }
        if let Some(unknown) = expression
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .find(|word| word.starts_with("undefined"))
        {
            return self.say(format!(
                "error: use of undeclared identifier '{unknown}'"
            ));
        }
        let result = self.next_result;
        self.next_result += 1;
        self.say(format!("(int) ${result} = 42"))
    }
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .unwrap_or(raw);
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Parse `--file "<path>" --line <n>`.
fn parse_set_args(args: &str) -> Option<(String, u32)> {
    let rest = args.trim().strip_prefix("--file")?.trim();
    let (file, line) = rest.rsplit_once("--line")?;
    Some((unquote(file), line.trim().parse().ok()?))
}

fn main() -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stub = Stub::new(io::stdout(), io::stderr());
    for line in stdin.lock().lines() {
        if !stub.handle(&line?)? {
            break;
        }
    }
    Ok(())
}

//! Console commands and their parser.

use std::path::PathBuf;

pub const BREAK_COMMAND: &str = "break";
pub const BREAK_COMMAND_SHORT: &str = "b";
pub const DELETE_COMMAND: &str = "delete";
pub const DELETE_COMMAND_SHORT: &str = "d";
pub const BREAKPOINTS_COMMAND: &str = "breakpoints";
pub const CONTINUE_COMMAND: &str = "continue";
pub const CONTINUE_COMMAND_SHORT: &str = "c";
pub const NEXT_COMMAND: &str = "next";
pub const NEXT_COMMAND_SHORT: &str = "n";
pub const STEP_COMMAND: &str = "step";
pub const STEP_COMMAND_SHORT: &str = "s";
pub const FINISH_COMMAND: &str = "finish";
pub const PAUSE_COMMAND: &str = "pause";
pub const BACKTRACE_COMMAND: &str = "backtrace";
pub const BACKTRACE_COMMAND_SHORT: &str = "bt";
pub const VARS_COMMAND: &str = "vars";
pub const EXPAND_COMMAND: &str = "expand";
pub const PRINT_COMMAND: &str = "print";
pub const PRINT_COMMAND_SHORT: &str = "p";
pub const HELP_COMMAND: &str = "help";
pub const HELP_COMMAND_SHORT: &str = "h";
pub const QUIT_COMMAND: &str = "quit";
pub const QUIT_COMMAND_SHORT: &str = "q";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("malformed command: {0}")]
    Parsing(String),
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),
}

/// Commands typed into the console.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Break { file: PathBuf, line: u32 },
    Delete { file: PathBuf, line: u32 },
    Breakpoints,
    Continue,
    Next,
    Step,
    Finish,
    Pause,
    Backtrace,
    Vars(u32),
    Expand(u32),
    Print(String),
    Help,
    Quit,
    SkipInput,
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, CommandError> {
        let input = input.trim();
        let (keyword, rest) = match input.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (input, ""),
        };

        let no_args = |command: Command| {
            if rest.is_empty() {
                Ok(command)
            } else {
                Err(CommandError::Parsing(format!(
                    "`{keyword}` takes no arguments"
                )))
            }
        };

        match keyword {
            "" => Ok(Command::SkipInput),
            BREAK_COMMAND | BREAK_COMMAND_SHORT => {
                let (file, line) = parse_location(rest)?;
                Ok(Command::Break { file, line })
            }
            DELETE_COMMAND | DELETE_COMMAND_SHORT => {
                let (file, line) = parse_location(rest)?;
                Ok(Command::Delete { file, line })
            }
            BREAKPOINTS_COMMAND => no_args(Command::Breakpoints),
            CONTINUE_COMMAND | CONTINUE_COMMAND_SHORT => no_args(Command::Continue),
            NEXT_COMMAND | NEXT_COMMAND_SHORT => no_args(Command::Next),
            STEP_COMMAND | STEP_COMMAND_SHORT => no_args(Command::Step),
            FINISH_COMMAND => no_args(Command::Finish),
            PAUSE_COMMAND => no_args(Command::Pause),
            BACKTRACE_COMMAND | BACKTRACE_COMMAND_SHORT => no_args(Command::Backtrace),
            VARS_COMMAND => {
                if rest.is_empty() {
                    Ok(Command::Vars(0))
                } else {
                    Ok(Command::Vars(parse_number(rest, "frame number")?))
                }
            }
            EXPAND_COMMAND => Ok(Command::Expand(parse_number(rest, "variable reference")?)),
            PRINT_COMMAND | PRINT_COMMAND_SHORT => {
                if rest.is_empty() {
                    return Err(CommandError::Parsing("expression expected".to_string()));
                }
                Ok(Command::Print(rest.to_string()))
            }
            HELP_COMMAND | HELP_COMMAND_SHORT => Ok(Command::Help),
            QUIT_COMMAND | QUIT_COMMAND_SHORT => no_args(Command::Quit),
            _ => Err(CommandError::Unknown(keyword.to_string())),
        }
    }
}

fn parse_number(input: &str, what: &str) -> Result<u32, CommandError> {
    input
        .parse()
        .map_err(|_| CommandError::Parsing(format!("{what} expected, got `{input}`")))
}

/// Parse `file:line`, line numbers start at 1.
fn parse_location(input: &str) -> Result<(PathBuf, u32), CommandError> {
    let malformed = || CommandError::Parsing(format!("`file:line` expected, got `{input}`"));

    let (file, line) = input.rsplit_once(':').ok_or_else(malformed)?;
    if file.is_empty() {
        return Err(malformed());
    }
    let line: u32 = line.parse().map_err(|_| malformed())?;
    if line == 0 {
        return Err(CommandError::Parsing("line numbers start at 1".to_string()));
    }
    Ok((PathBuf::from(file), line))
}

use crate::debugger::process::DEFAULT_LLDB_CANDIDATES;
use crate::debugger::SessionOptions;
use crate::{muted_error, weak_error};
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Bridge configuration, read from `~/.config/lldb-bridge/config.toml` unless another
/// file is given. Missing keys take default values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// LLDB executables to try, in order.
    pub lldb_candidates: Vec<PathBuf>,
    /// Extra arguments for LLDB.
    pub lldb_args: Vec<String>,
    /// Delay between the lines of a multi-line command, milliseconds.
    pub settle_delay_ms: u64,
    /// Time LLDB gets to quit before it is killed, milliseconds.
    pub quit_grace_ms: u64,
    /// Root used to resolve source file names reported by LLDB.
    pub project_root: Option<PathBuf>,
    /// Stop at the program entry point instead of running to the first breakpoint.
    pub stop_at_entry: bool,
    /// Read LLDB stderr together with stdout.
    pub merge_stderr: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            lldb_candidates: DEFAULT_LLDB_CANDIDATES.iter().map(PathBuf::from).collect(),
            lldb_args: vec![],
            settle_delay_ms: 100,
            quit_grace_ms: 1000,
            project_root: None,
            stop_at_entry: false,
            merge_stderr: true,
        }
    }
}

impl BridgeConfig {
    const DEFAULT_PATH: &'static str = ".config/lldb-bridge/config.toml";

    /// Load config from a file, fall back to defaults on any error.
    pub fn from_file(path: Option<&Path>) -> Self {
        Self::load(path).unwrap_or_default()
    }

    fn load(path: Option<&Path>) -> Option<Self> {
        let data = match path {
            None => {
                let path = home::home_dir()?.join(Self::DEFAULT_PATH);
                muted_error!(read_to_string(path))?
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    log::error!(target: "bridge", "Error while load config file {path:?}: {err}");
                    return None;
                }
            },
        };
        Self::parse(&data)
    }

    fn parse(data: &str) -> Option<Self> {
        weak_error!(toml::de::from_str(data), "malformed config:")
    }
}

impl From<&BridgeConfig> for SessionOptions {
    fn from(config: &BridgeConfig) -> Self {
        SessionOptions {
            lldb_candidates: config.lldb_candidates.clone(),
            lldb_args: config.lldb_args.clone(),
            settle_delay: Duration::from_millis(config.settle_delay_ms),
            quit_grace: Duration::from_millis(config.quit_grace_ms),
            project_root: config.project_root.clone(),
            stop_at_entry: config.stop_at_entry,
            merge_stderr: config.merge_stderr,
        }
    }
}

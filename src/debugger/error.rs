use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error("session already started")]
    AlreadyStarted,
    #[error("session is not started")]
    NotStarted,
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- debugger process errors -----------------------------------
    #[error("lldb executable not found, probed: {0:?}")]
    DebuggerNotFound(Vec<PathBuf>),
    #[error("spawn {0:?}: {1}")]
    Spawn(PathBuf, std::io::Error),
    #[error("write to lldb stdin: {0}")]
    Transport(std::io::Error),
    #[error("lldb process disconnected")]
    Disconnected,
    #[error("target load failed: {0}")]
    TargetLoad(String),
    #[error("process launch failed: {0}")]
    Launch(String),

    // --------------------------------- per-command errors ----------------------------------------
    #[error("empty command")]
    EmptyCommand,
    #[error("no reply after {0:?}")]
    Timeout(Duration),
    #[error("`{command}` failed: {message}")]
    Command { command: String, message: String },
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    // --------------------------------- thread control errors -------------------------------------
    #[error("thread #{0} is not suspended")]
    ThreadNotSuspended(u32),
    #[error("no thread in focus")]
    NoFocusThread,
    #[error("frame number {0} not found")]
    FrameNotFound(u32),
    #[error("variable reference {0} not found")]
    ReferenceNotFound(u32),

    // --------------------------------- third party errors ----------------------------------------
    #[error("hook: {0}")]
    Hook(anyhow::Error),
}

impl Error {
    /// Return a hint to an interface - continue debugging after error or stop whole session.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::AlreadyStarted => false,
            Error::NotStarted => false,
            Error::IO(_) => false,
            Error::EmptyCommand => false,
            Error::Timeout(_) => false,
            Error::Command { .. } => false,
            Error::Evaluation(_) => false,
            Error::ThreadNotSuspended(_) => false,
            Error::NoFocusThread => false,
            Error::FrameNotFound(_) => false,
            Error::ReferenceNotFound(_) => false,
            Error::Hook(_) => false,

            // session ending errors
            Error::DebuggerNotFound(_) => true,
            Error::Spawn(_, _) => true,
            Error::Transport(_) => true,
            Error::Disconnected => true,
            Error::TargetLoad(_) => true,
            Error::Launch(_) => true,
        }
    }
}

#[macro_export]
macro_rules! _error {
    ($log_fn: path, $res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "bridge", "{:#}", e);
                None
            }
        }
    };
    ($log_fn: path, $res: expr, $msg: tt) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                $log_fn!(target: "bridge", concat!($msg, " {:#}"), e);
                None
            }
        }
    };
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        $crate::_error!(log::warn, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::warn, $res, $msg)
    };
}

/// Transforms `Result` into `Option` and put error into debug logs if it occurs.
#[macro_export]
macro_rules! muted_error {
    ($res: expr) => {
        $crate::_error!(log::debug, $res)
    };
    ($res: expr, $msg: tt) => {
        $crate::_error!(log::debug, $res, $msg)
    };
}

use crate::debugger::error::Error;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default places to look for LLDB, the first existing one wins.
pub const DEFAULT_LLDB_CANDIDATES: [&str; 3] = [
    "/opt/homebrew/opt/llvm/bin/lldb",
    "/usr/local/opt/llvm/bin/lldb",
    "/usr/bin/lldb",
];

/// Find the LLDB executable.
///
/// Candidates with a directory part must exist on disk, bare names are looked up in
/// `PATH`. When nothing matches, `lldb` from `PATH` is the last resort.
pub fn resolve_executable(candidates: &[PathBuf]) -> Result<PathBuf, Error> {
    for candidate in candidates {
        let bare = candidate.components().count() == 1 && !candidate.is_absolute();
        if bare {
            if let Ok(found) = which::which(candidate) {
                return Ok(found);
            }
        } else if candidate.exists() {
            return Ok(candidate.clone());
        }
    }

    which::which("lldb").map_err(|_| Error::DebuggerNotFound(candidates.to_vec()))
}

/// Running LLDB subprocess together with its output reader threads.
pub struct DebuggerProcess {
    child: Child,
    readers: Vec<JoinHandle<()>>,
}

impl DebuggerProcess {
    /// Start LLDB. Returns the process, its stdin and a channel with every output line.
    ///
    /// With `merge_stderr` set, stdout and stderr share one pipe, so LLDB's `error:` lines
    /// keep their place relative to the prompt that closes their reply. Otherwise stderr
    /// lines are only logged.
    pub fn spawn(
        path: &Path,
        args: &[String],
        merge_stderr: bool,
    ) -> Result<(Self, ChildStdin, Receiver<String>), Error> {
        let spawn_err = |e: std::io::Error| Error::Spawn(path.to_path_buf(), e);

        let mut command = Command::new(path);
        command.args(args).stdin(Stdio::piped());
        let merged = if merge_stderr {
            let (reader, writer) = os_pipe::pipe().map_err(spawn_err)?;
            command
                .stdout(writer.try_clone().map_err(spawn_err)?)
                .stderr(writer);
            Some(reader)
        } else {
            command.stdout(Stdio::piped()).stderr(Stdio::piped());
            None
        };
        let mut child = command.spawn().map_err(spawn_err)?;
        // parent copies of the pipe writer must be closed, or the reader never sees EOF
        drop(command);
        log::info!(target: "bridge", "lldb started: {path:?}, pid {}", child.id());

        let broken_pipe = || spawn_err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        let stdin = child.stdin.take().ok_or_else(broken_pipe)?;

        let (tx, rx) = mpsc::channel();
        let readers = match merged {
            Some(reader) => vec![spawn_reader("lldb-output", reader, Some(tx))?],
            None => {
                let stdout = child.stdout.take().ok_or_else(broken_pipe)?;
                let stderr = child.stderr.take().ok_or_else(broken_pipe)?;
                vec![
                    spawn_reader("lldb-stdout", stdout, Some(tx))?,
                    spawn_reader("lldb-stderr", stderr, None)?,
                ]
            }
        };

        Ok((Self { child, readers }, stdin, rx))
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wait up to `grace` for the process to exit by itself.
    pub fn wait_exit(&mut self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    log::debug!(target: "bridge", "lldb exited: {status}");
                    return true;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
                Ok(None) => return false,
                Err(e) => {
                    log::warn!(target: "bridge", "wait lldb: {e}");
                    return false;
                }
            }
        }
    }

    pub fn kill(&mut self) {
        crate::muted_error!(self.child.kill(), "kill lldb:");
        crate::muted_error!(self.child.wait(), "reap lldb:");
    }

    /// Join output readers, they finish at the end of stream.
    pub fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            _ = reader.join();
        }
    }
}

fn spawn_reader(
    name: &str,
    stream: impl Read + Send + 'static,
    tx: Option<Sender<String>>,
) -> Result<JoinHandle<()>, Error> {
    let stream_name = name.to_string();
    let handle = thread::Builder::new().name(name.to_string()).spawn(move || {
        for line in BufReader::new(stream).lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!(target: "lldb", "{stream_name}: {e}");
                    break;
                }
            };
            match &tx {
                Some(tx) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                None => log::warn!(target: "lldb", "{line}"),
            }
        }
    })?;
    Ok(handle)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_resolve_executable() {
        let this = std::env::current_exe().unwrap();
        let missing = PathBuf::from("/definitely/not/here/lldb");

        assert_eq!(
            resolve_executable(&[missing.clone(), this.clone()]).unwrap(),
            this
        );
        assert_eq!(resolve_executable(&[PathBuf::from("sh")]).unwrap(), which::which("sh").unwrap());

        if which::which("lldb").is_err() {
            let err = resolve_executable(&[missing.clone()]).unwrap_err();
            assert!(matches!(err, Error::DebuggerNotFound(ref probed) if probed == &vec![missing]));
            assert!(err.is_fatal());
        }
    }

    fn collect(rx: Receiver<String>, mut process: DebuggerProcess) -> Vec<String> {
        let lines = rx.iter().collect();
        assert!(process.wait_exit(Duration::from_secs(5)));
        process.join_readers();
        lines
    }

    #[test]
    fn test_merged_stderr_keeps_order() {
        let script = "echo '(lldb) target create x'; echo 'error: no such file' 1>&2; echo '(lldb)'";
        let args = ["-c".to_string(), script.to_string()];

        let (process, _stdin, rx) =
            DebuggerProcess::spawn(&which::which("sh").unwrap(), &args, true).unwrap();
        assert_eq!(
            collect(rx, process),
            vec!["(lldb) target create x", "error: no such file", "(lldb)"]
        );

        let (process, _stdin, rx) =
            DebuggerProcess::spawn(&which::which("sh").unwrap(), &args, false).unwrap();
        assert_eq!(collect(rx, process), vec!["(lldb) target create x", "(lldb)"]);
    }

    #[test]
    fn test_spawn_missing_executable() {
        let err = DebuggerProcess::spawn(Path::new("/definitely/not/here/lldb"), &[], true)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Spawn(_, _)));
    }
}

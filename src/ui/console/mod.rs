pub mod command;
pub mod help;
pub mod hook;
pub mod print;
pub mod variable;

use crate::debugger::{self, BreakpointState, Session, SessionOptions};
use crate::ui::console::command::{Command, CommandError};
use crate::ui::console::help::HELP;
use crate::ui::console::hook::TerminalHook;
use crate::ui::console::print::style::{ErrorView, FilePathView, FunctionNameView, KeywordView};
use crate::ui::console::print::ExternalPrinter;
use crate::ui::console::variable::{render_variable, render_variables};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, Once, Weak};
use std::thread;

const WELCOME_TEXT: &str = r#"
lldb-bridge, type `help` for the list of commands
"#;

const PROMT: &str = "(bridge) ";

#[derive(thiserror::Error, Debug)]
pub enum HandlingError {
    #[error(transparent)]
    Parser(#[from] CommandError),
    #[error(transparent)]
    Debugger(#[from] debugger::Error),
}

enum Control {
    /// New command from user received
    Cmd(String),
    /// Terminate application
    Terminate,
}

/// Session that Ctrl-C pauses.
static CTRL_C_SESSION: Mutex<Option<Weak<Session>>> = Mutex::new(None);

fn pause_session() {
    let session = CTRL_C_SESSION
        .lock()
        .unwrap()
        .as_ref()
        .and_then(Weak::upgrade);
    if let Some(session) = session {
        if let Err(e) = session.pause() {
            log::warn!(target: "bridge", "pause: {e}");
        }
    }
}

pub struct AppBuilder {
    options: SessionOptions,
    breakpoints: Vec<(PathBuf, u32)>,
}

impl AppBuilder {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            breakpoints: vec![],
        }
    }

    /// Breakpoint to register before the session starts.
    pub fn breakpoint(mut self, file: impl Into<PathBuf>, line: u32) -> Self {
        self.breakpoints.push((file.into(), line));
        self
    }

    pub fn build(self) -> anyhow::Result<TerminalApplication> {
        let mut editor = DefaultEditor::new()?;
        let hook = TerminalHook::new(ExternalPrinter::for_editor(&mut editor));
        let session = Arc::new(Session::new(self.options, hook));
        for (file, line) in self.breakpoints {
            session.breakpoints().register(file, line)?;
        }

        let (control_tx, control_rx) = mpsc::sync_channel::<Control>(0);
        Ok(TerminalApplication {
            printer: ExternalPrinter::for_editor(&mut editor),
            session,
            editor,
            control_tx,
            control_rx,
        })
    }
}

pub struct TerminalApplication {
    session: Arc<Session>,
    editor: DefaultEditor,
    printer: ExternalPrinter,
    control_tx: SyncSender<Control>,
    control_rx: Receiver<Control>,
}

pub static LOGGER_ONCE: Once = Once::new();
pub static CTRL_C_ONCE: Once = Once::new();

impl TerminalApplication {
    /// Start the debugging session for `program` and serve console commands until quit.
    pub fn run(self, program: &Path, args: &[String]) -> anyhow::Result<()> {
        LOGGER_ONCE.call_once(|| {
            env_logger::init();
        });

        *CTRL_C_SESSION.lock().unwrap() = Some(Arc::downgrade(&self.session));
        CTRL_C_ONCE.call_once(|| {
            _ = ctrlc::set_handler(pause_session);
        });

        println!("{WELCOME_TEXT}");
        if let Err(e) = self.session.start(program, args) {
            if e.is_fatal() {
                self.printer.println(ErrorView::from(format!("fatal debugger error: {e:#}")));
                return Err(e.into());
            }
            self.printer.println(ErrorView::from(format!("debugger error: {e:#}")));
        }

        let mut editor = self.editor;
        {
            let control_tx = self.control_tx.clone();
            thread::spawn(move || loop {
                let line = editor.readline(PROMT);
                match line {
                    Ok(input) => {
                        let command = Command::parse(&input);
                        if matches!(command, Ok(Command::Quit)) {
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                        if !matches!(command, Ok(Command::SkipInput)) {
                            _ = editor.add_history_entry(&input);
                        }
                        if control_tx.send(Control::Cmd(input)).is_err() {
                            break;
                        }
                    }
                    Err(ReadlineError::Interrupted) => pause_session(),
                    Err(ReadlineError::Eof) => {
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                    Err(err) => {
                        println!("error: {:#}", err);
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                }
            });
        }

        let app_loop = AppLoop {
            session: self.session,
            control_rx: self.control_rx,
            printer: self.printer,
        };
        app_loop.run();

        Ok(())
    }
}

struct AppLoop {
    session: Arc<Session>,
    control_rx: Receiver<Control>,
    printer: ExternalPrinter,
}

impl AppLoop {
    fn focus_thread(&self) -> Result<u32, debugger::Error> {
        self.session
            .current_thread()
            .ok_or(debugger::Error::NoFocusThread)
    }

    fn handle_command(&self, cmd: &str) -> Result<(), HandlingError> {
        match Command::parse(cmd)? {
            Command::Break { file, line } => {
                let handle = self.session.breakpoints().register(file, line)?;
                self.printer.println(format!(
                    "New breakpoint {} at {}:{}",
                    handle.number,
                    FilePathView::from(handle.file.display()),
                    handle.line
                ));
            }
            Command::Delete { file, line } => {
                match self.session.breakpoints().unregister(&file, line)? {
                    Some(handle) => self
                        .printer
                        .println(format!("Removed breakpoint {}", handle.number)),
                    None => self.printer.println(ErrorView::from(format!(
                        "no breakpoint at {}:{line}",
                        file.display()
                    ))),
                }
            }
            Command::Breakpoints => {
                let views = self.session.breakpoints().snapshot()?;
                if views.is_empty() {
                    self.printer.println("No breakpoints");
                }
                for view in views {
                    let state = match &view.state {
                        BreakpointState::Pending => "pending".to_string(),
                        BreakpointState::Requested => "requested".to_string(),
                        BreakpointState::Verified => "verified".to_string(),
                        BreakpointState::Invalid(reason) => format!("invalid: {reason}"),
                        BreakpointState::Removed => "removing".to_string(),
                    };
                    let id = view
                        .debugger_id
                        .map(|id| format!(" (lldb #{id})"))
                        .unwrap_or_default();
                    self.printer.println(format!(
                        "{} {}:{} {}{id}",
                        view.handle.number,
                        FilePathView::from(view.handle.file.display()),
                        view.handle.line,
                        KeywordView::from(state),
                    ));
                }
            }
            Command::Continue => self.session.resume(self.focus_thread()?)?,
            Command::Next => self.session.step_over(self.focus_thread()?)?,
            Command::Step => self.session.step_into(self.focus_thread()?)?,
            Command::Finish => self.session.step_out(self.focus_thread()?)?,
            Command::Pause => self.session.pause()?,
            Command::Backtrace => {
                let frames = self.session.stack_trace(self.focus_thread()?)?;
                for frame in frames {
                    self.printer.println(format!(
                        "#{} {} at {}:{}",
                        frame.id,
                        FunctionNameView::from(&frame.function),
                        FilePathView::from(frame.file.display()),
                        frame.line
                    ));
                }
            }
            Command::Vars(frame) => {
                let vars = self.session.variables(frame)?;
                self.printer.println(render_variables(&vars));
            }
            Command::Expand(reference) => {
                let vars = self.session.children(reference)?;
                self.printer.println(render_variables(&vars));
            }
            Command::Print(expression) => {
                let var = self.session.evaluate(&expression)?;
                self.printer.println(render_variable(&var));
            }
            Command::Help => self.printer.println(HELP),
            Command::Quit | Command::SkipInput => {}
        }

        Ok(())
    }

    fn run(self) {
        loop {
            let Ok(action) = self.control_rx.recv() else {
                break;
            };

            match action {
                Control::Cmd(command) => {
                    if let Err(e) = self.handle_command(&command) {
                        match e {
                            HandlingError::Parser(_) => {
                                self.printer.println(ErrorView::from(e));
                            }
                            HandlingError::Debugger(ref err) if err.is_fatal() => {
                                self.printer.println(ErrorView::from("shutdown debugger"));
                                self.printer.println(ErrorView::from(format!(
                                    "fatal debugger error: {e:#}"
                                )));
                                break;
                            }
                            HandlingError::Debugger(_) => {
                                self.printer
                                    .println(ErrorView::from(format!("debugger error: {e:#}")));
                            }
                        }
                    }
                }
                Control::Terminate => {
                    break;
                }
            }
        }

        self.session.stop();
    }
}

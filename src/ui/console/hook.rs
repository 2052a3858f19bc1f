use crate::debugger::{BreakpointHandle, EventHook, StackFrame, StopReason};
use crate::ui::console::print::style::{ErrorView, FilePathView, FunctionNameView, KeywordView};
use crate::ui::console::print::ExternalPrinter;
use std::fs;
use std::path::Path;

/// Prints session notifications above the prompt.
pub struct TerminalHook {
    printer: ExternalPrinter,
}

impl TerminalHook {
    pub fn new(printer: ExternalPrinter) -> Self {
        Self { printer }
    }
}

impl EventHook for TerminalHook {
    fn on_output(&self, line: &str) {
        self.printer.println(line);
    }

    fn on_suspended(
        &self,
        thread: u32,
        reason: StopReason,
        frame: &StackFrame,
    ) -> anyhow::Result<()> {
        self.printer.println(format!(
            "Thread #{thread} stopped ({}) in {} at {}:{}",
            KeywordView::from(reason),
            FunctionNameView::from(&frame.function),
            FilePathView::from(frame.file.display()),
            frame.line
        ));
        if let Some(source) = render_source_line(&frame.file, frame.line) {
            self.printer.println(source);
        }
        Ok(())
    }

    fn on_resumed(&self) {
        log::debug!(target: "bridge", "debugee resumed");
    }

    fn on_terminated(&self, status: Option<i32>) {
        match status {
            Some(code) => self
                .printer
                .println(format!("Program exit with code: {code}")),
            None => self.printer.println("Debugger session closed"),
        }
    }

    fn on_breakpoint_verified(&self, handle: &BreakpointHandle) {
        self.printer.println(format!(
            "Breakpoint {} verified at {}:{}",
            handle.number,
            FilePathView::from(handle.file.display()),
            handle.line
        ));
    }

    fn on_breakpoint_invalid(&self, handle: &BreakpointHandle, reason: &str) {
        self.printer.println(ErrorView::from(format!(
            "Breakpoint {} at {}:{} is invalid: {reason}",
            handle.number,
            handle.file.display(),
            handle.line
        )));
    }
}

/// Source text of a 1-based line, `None` if the file is not readable.
fn render_source_line(file: &Path, line: u32) -> Option<String> {
    let text = fs::read_to_string(file).ok()?;
    let index = (line as usize).checked_sub(1)?;
    let source = text.lines().nth(index)?;
    Some(format!("{line:>4} {source}"))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_render_source_line() {
        let path = std::env::temp_dir().join(format!("lldb-bridge-hook-{}.c", std::process::id()));
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "int main() {{\n    return 0;\n}}").unwrap();

        assert_eq!(
            render_source_line(&path, 2).as_deref(),
            Some("   2     return 0;")
        );
        assert_eq!(render_source_line(&path, 0), None);
        assert_eq!(render_source_line(&path, 10), None);
        assert_eq!(render_source_line(Path::new("/definitely/not/here.c"), 1), None);

        fs::remove_file(path).unwrap();
    }
}

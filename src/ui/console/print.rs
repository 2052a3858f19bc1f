use rustyline::history::History;
use rustyline::{Editor, ExternalPrinter as RLExternalPrinter, Helper};
use std::fmt::Display;
use std::sync::Mutex;

/// [`ExternalPrinter`] safe print messages to stdout while the prompt is active.
///
/// Hooks print from session threads, so the rustyline printer is guarded by a mutex.
/// Without an editor (not a terminal, tests) messages go straight to stdout.
pub struct ExternalPrinter {
    printer: Option<Mutex<Box<dyn RLExternalPrinter + Send>>>,
}

impl ExternalPrinter {
    pub fn new<H: Helper, I: History>(editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        let external_p = editor.create_external_printer()?;
        Ok(Self {
            printer: Some(Mutex::new(Box::new(external_p))),
        })
    }

    pub fn stdout() -> Self {
        Self { printer: None }
    }

    /// Editor printer when the console is interactive, plain stdout otherwise.
    pub fn for_editor<H: Helper, I: History>(editor: &mut Editor<H, I>) -> Self {
        match Self::new(editor) {
            Ok(printer) => printer,
            Err(e) => {
                log::debug!(target: "bridge", "no external printer ({e}), print to stdout");
                Self::stdout()
            }
        }
    }

    pub fn print(&self, msg: impl Display) {
        let msg = msg.to_string();
        match &self.printer {
            None => {
                print!("{msg}")
            }
            Some(printer) => {
                if let Err(e) = printer.lock().unwrap().print(msg) {
                    log::warn!(target: "bridge", "external printer: {e}");
                }
            }
        }
    }

    pub fn println(&self, msg: impl Display) {
        let msg = format!("{msg}\n");
        self.print(msg)
    }
}

pub mod style {
    use crossterm::style::{Color, Stylize};
    use std::fmt::{Display, Formatter};

    const UNKNOWN_PLACEHOLDER: &str = "???";

    struct View<T: Display> {
        inner: Option<T>,
        color: Color,
    }

    impl<T: Display> Display for View<T> {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            let text = self
                .inner
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| UNKNOWN_PLACEHOLDER.to_string());

            if cfg!(test) {
                f.write_str(&text)
            } else {
                f.write_fmt(format_args!("{}", text.with(self.color)))
            }
        }
    }

    /// Construct structure declaration to display data of the same kind (file paths, types, etc.).
    /// Styles are not applied in tests.
    macro_rules! view_struct {
        ($name: ident, $color: expr) => {
            pub struct $name<T: Display>(View<T>);

            impl<T: Display> From<T> for $name<T> {
                fn from(value: T) -> Self {
                    Self(View {
                        inner: Some(value),
                        color: $color,
                    })
                }
            }

            impl<T: Display> From<Option<T>> for $name<T> {
                fn from(value: Option<T>) -> Self {
                    Self(View {
                        inner: value,
                        color: $color,
                    })
                }
            }

            impl<T: Display> Display for $name<T> {
                fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                    self.0.fmt(f)
                }
            }
        };
    }

    view_struct!(FilePathView, Color::Green);
    view_struct!(FunctionNameView, Color::Yellow);
    view_struct!(KeywordView, Color::Magenta);
    view_struct!(TypeView, Color::Blue);
    view_struct!(ErrorView, Color::Red);

    #[cfg(test)]
    mod test {
        use super::*;

        #[test]
        fn test_unknown_placeholder() {
            assert_eq!(FilePathView::from(None::<String>).to_string(), "???");
            assert_eq!(ErrorView::from("boom").to_string(), "boom");
        }
    }
}

use std::path::{Path, PathBuf};

/// Editor-side source position, line is 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub path: PathBuf,
    pub line: u32,
}

/// Maps file names reported by LLDB onto project files.
///
/// LLDB lines are 1-based, editor lines are 0-based.
#[derive(Debug, Clone, Default)]
pub struct PositionResolver {
    project_root: Option<PathBuf>,
}

impl PositionResolver {
    pub fn new(project_root: Option<PathBuf>) -> Self {
        Self { project_root }
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Map an LLDB file name and 1-based line into an editor position.
    pub fn resolve(&self, raw_path: &str, raw_line: u32) -> SourcePosition {
        SourcePosition {
            path: self.resolve_path(raw_path),
            line: raw_line.saturating_sub(1),
        }
    }

    /// Inverse of [`PositionResolver::resolve`] for the line number.
    pub fn to_debugger_line(&self, line: u32) -> u32 {
        line + 1
    }

    /// Find the project file LLDB means by `raw_path`.
    ///
    /// Candidates are probed in order: `<root>/<file name>`, `<root>/<raw>`,
    /// `<root>/src/<file name>`, `<root>/src/main/<file name>`. When none exists the path
    /// is returned as is if absolute, or joined to the project root.
    pub fn resolve_path(&self, raw_path: &str) -> PathBuf {
        let raw = Path::new(raw_path.trim());
        let Some(root) = self.project_root.as_deref() else {
            return raw.to_path_buf();
        };

        if let Some(name) = raw.file_name() {
            let candidates = [
                root.join(name),
                root.join(raw),
                root.join("src").join(name),
                root.join("src").join("main").join(name),
            ];
            if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
                return found;
            }
        }

        if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            root.join(raw)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn project() -> PathBuf {
        let root = std::env::temp_dir().join(format!("lldb-bridge-pos-{}", std::process::id()));
        fs::create_dir_all(root.join("src").join("main")).unwrap();
        fs::write(root.join("src").join("lib.c"), "").unwrap();
        fs::write(root.join("src").join("main").join("app.cpp"), "").unwrap();
        fs::write(root.join("top.c"), "").unwrap();
        root
    }

    #[test]
    fn test_resolve_path() {
        let root = project();
        let resolver = PositionResolver::new(Some(root.clone()));

        struct TestCase {
            raw: String,
            expected: PathBuf,
        }
        let cases = vec![
            TestCase {
                raw: "top.c".to_string(),
                expected: root.join("top.c"),
            },
            TestCase {
                raw: "/build/machine/top.c".to_string(),
                expected: root.join("top.c"),
            },
            TestCase {
                raw: "lib.c".to_string(),
                expected: root.join("src").join("lib.c"),
            },
            TestCase {
                raw: "app.cpp".to_string(),
                expected: root.join("src").join("main").join("app.cpp"),
            },
            TestCase {
                raw: "/usr/include/stdio.h".to_string(),
                expected: PathBuf::from("/usr/include/stdio.h"),
            },
            TestCase {
                raw: "missing.c".to_string(),
                expected: root.join("missing.c"),
            },
        ];

        for tc in cases {
            assert_eq!(resolver.resolve_path(&tc.raw), tc.expected, "raw: {}", tc.raw);
        }

        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_line_round_trip() {
        let resolver = PositionResolver::default();
        for raw_line in [1, 2, 17, 10_000] {
            let pos = resolver.resolve("/abs/main.c", raw_line);
            assert_eq!(pos.path, PathBuf::from("/abs/main.c"));
            assert_eq!(resolver.to_debugger_line(pos.line), raw_line);
        }
        assert_eq!(resolver.resolve("main.c", 0).line, 0);
    }
}

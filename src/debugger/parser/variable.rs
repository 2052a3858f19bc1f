use crate::debugger::parser::is_boilerplate;
use std::collections::HashMap;

/// Type name given to values whose type could not be recognized.
pub const UNKNOWN_TYPE: &str = "unknown";

/// A variable of one stop snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_name: String,
    /// Children reference in [`VariableSnapshot`], 0 for leaf values.
    pub reference: u32,
}

/// Children of compound variables of the current stop.
///
/// References are only meaningful until the next resume, then the snapshot is cleared.
#[derive(Debug)]
pub struct VariableSnapshot {
    next_ref: u32,
    children: HashMap<u32, Vec<Variable>>,
}

impl Default for VariableSnapshot {
    fn default() -> Self {
        Self {
            next_ref: 1,
            children: HashMap::new(),
        }
    }
}

impl VariableSnapshot {
    fn register(&mut self, children: Vec<Variable>) -> u32 {
        let reference = self.next_ref;
        self.next_ref += 1;
        self.children.insert(reference, children);
        reference
    }

    pub fn children(&self, reference: u32) -> Option<&[Variable]> {
        self.children.get(&reference).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.children.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Parsed {
    name: String,
    type_name: Option<String>,
    value: String,
    children: Vec<Parsed>,
}

impl Parsed {
    fn into_variable(self, snapshot: &mut VariableSnapshot) -> Variable {
        let reference = if self.children.is_empty() {
            0
        } else {
            let children = self
                .children
                .into_iter()
                .map(|child| child.into_variable(snapshot))
                .collect();
            snapshot.register(children)
        };
        Variable {
            name: self.name,
            value: self.value,
            type_name: self.type_name.unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
            reference,
        }
    }
}

/// Parse `frame variable` (or `p`/`expr`) output.
///
/// Falls back to a single opaque `output` variable holding every meaningful line when
/// no `(type) name = value` line is found.
pub fn parse_variables(text: &str, snapshot: &mut VariableSnapshot) -> Vec<Variable> {
    let lines: Vec<&str> = text.lines().collect();
    let parsed = parse_block(&lines, true);

    if parsed.is_empty() {
        let opaque: Vec<&str> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !is_boilerplate(l))
            .collect();
        if opaque.is_empty() {
            return vec![];
        }
        return vec![Variable {
            name: "output".to_string(),
            value: opaque.join("\n"),
            type_name: UNKNOWN_TYPE.to_string(),
            reference: 0,
        }];
    }

    parsed
        .into_iter()
        .map(|p| p.into_variable(snapshot))
        .collect()
}

fn parse_block(lines: &[&str], typed_only: bool) -> Vec<Parsed> {
    let mut result = vec![];
    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        idx += 1;
        if is_boilerplate(line) {
            continue;
        }
        let Some(mut parsed) = parse_assignment(line) else {
            continue;
        };
        if typed_only && parsed.type_name.is_none() {
            continue;
        }

        if parsed.value.ends_with('{') {
            let end = closing_line(lines, idx);
            parsed.children = parse_block(&lines[idx..end], false);
            parsed.value = summary(&parsed.value, &parsed.children);
            idx = (end + 1).min(lines.len());
        } else if let Some(inner) = aggregate_body(&parsed.value) {
            parsed.children = split_top_level(inner)
                .into_iter()
                .filter_map(parse_assignment)
                .collect();
        }
        result.push(parsed);
    }
    result
}

/// Index of the line closing a `{` block opened right before `start`.
fn closing_line(lines: &[&str], start: usize) -> usize {
    let mut depth = 1usize;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        let trimmed = line.trim();
        if trimmed.ends_with('{') {
            depth += 1;
        } else if trimmed.starts_with('}') {
            depth -= 1;
            if depth == 0 {
                return idx;
            }
        }
    }
    lines.len()
}

fn summary(opener: &str, children: &[Parsed]) -> String {
    let prefix = opener.trim_end_matches('{').trim();
    let body = children
        .iter()
        .map(|c| format!("{} = {}", c.name, c.value))
        .collect::<Vec<_>>()
        .join(", ");
    if prefix.is_empty() {
        format!("{{{body}}}")
    } else {
        format!("{prefix} {{{body}}}")
    }
}

/// Body of a one-line aggregate like `(x = 1, y = 2)`.
fn aggregate_body(value: &str) -> Option<&str> {
    let inner = value.strip_prefix('(')?.strip_suffix(')')?;
    if split_top_level(inner)
        .iter()
        .all(|part| parse_assignment(part).is_some())
    {
        Some(inner)
    } else {
        None
    }
}

/// Split on commas that are not nested inside brackets or string literals.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = vec![];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(text[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Parse `[(type)] name = value`.
fn parse_assignment(line: &str) -> Option<Parsed> {
    let line = line.trim();
    let (type_name, rest) = if line.starts_with('(') {
        let close = matching_paren(line)?;
        (Some(line[1..close].trim().to_string()), line[close + 1..].trim())
    } else {
        (None, line)
    };

    let (name, value) = rest.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }

    Some(Parsed {
        name: name.to_string(),
        type_name,
        value: value.trim().to_string(),
        children: vec![],
    })
}

fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 0;
    for (idx, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(name: &str, type_name: &str, value: &str) -> Variable {
        Variable {
            name: name.to_string(),
            value: value.to_string(),
            type_name: type_name.to_string(),
            reference: 0,
        }
    }

    #[test]
    fn test_parse_scalars() {
        struct TestCase {
            text: &'static str,
            expected: Vec<Variable>,
        }
        let cases = vec![
            TestCase {
                text: "(int) x = 42",
                expected: vec![leaf("x", "int", "42")],
            },
            TestCase {
                text: "(lldb) frame variable\n(double) ratio = 0.5\n(const char *) name = 0x0000000100003fa0 \"a = b\"\n(lldb)",
                expected: vec![
                    leaf("ratio", "double", "0.5"),
                    leaf("name", "const char *", "0x0000000100003fa0 \"a = b\""),
                ],
            },
            TestCase {
                text: "(void (*)(int)) callback = 0x0000000100003f00 (a.out`handler at main.c:3)",
                expected: vec![leaf(
                    "callback",
                    "void (*)(int)",
                    "0x0000000100003f00 (a.out`handler at main.c:3)",
                )],
            },
            TestCase {
                text: "(int) $0 = 7",
                expected: vec![leaf("$0", "int", "7")],
            },
            TestCase {
                text: "Process 4242 stopped\n* thread #1, stop reason = step over\nframe #0: 0x00 a.out`main at main.c:5\n   4   \n-> 5   int y = 2;\n",
                expected: vec![],
            },
            TestCase {
                text: "no variables in this frame\n",
                expected: vec![leaf("output", UNKNOWN_TYPE, "no variables in this frame")],
            },
        ];

        for tc in cases {
            let mut snapshot = VariableSnapshot::default();
            assert_eq!(parse_variables(tc.text, &mut snapshot), tc.expected, "{}", tc.text);
            assert!(snapshot.is_empty());
        }
    }

    #[test]
    fn test_parse_inline_aggregate() {
        let mut snapshot = VariableSnapshot::default();
        let vars = parse_variables(
            "(Point) p = (x = 1, y = 2)\n(int[3]) arr = ([0] = 1, [1] = 2, [2] = 3)\n(int) n = (3)",
            &mut snapshot,
        );

        assert_eq!(vars.len(), 3);
        assert_eq!(vars[0].name, "p");
        assert_ne!(vars[0].reference, 0);
        let children = snapshot.children(vars[0].reference).unwrap();
        assert_eq!(
            children,
            &[
                leaf("x", UNKNOWN_TYPE, "1"),
                leaf("y", UNKNOWN_TYPE, "2")
            ]
        );

        let arr = snapshot.children(vars[1].reference).unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[2].name, "[2]");

        assert_eq!(vars[2], leaf("n", "int", "(3)"));
    }

    #[test]
    fn test_parse_nested_block() {
        let text = "\
(Outer) o = {
  inner = {
    a = 1
    b = 2
  }
  count = 3
}
(int) after = 9";

        let mut snapshot = VariableSnapshot::default();
        let vars = parse_variables(text, &mut snapshot);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].value, "{inner = {a = 1, b = 2}, count = 3}");
        assert_eq!(vars[1], leaf("after", "int", "9"));

        let children = snapshot.children(vars[0].reference).unwrap().to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(children[1], leaf("count", UNKNOWN_TYPE, "3"));

        let inner = snapshot.children(children[0].reference).unwrap();
        assert_eq!(inner, &[leaf("a", UNKNOWN_TYPE, "1"), leaf("b", UNKNOWN_TYPE, "2")]);

        snapshot.clear();
        assert!(snapshot.children(vars[0].reference).is_none());
    }
}

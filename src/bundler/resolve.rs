//! Import discovery and module resolution.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

static IMPORT_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn import_patterns() -> &'static [Regex] {
    IMPORT_PATTERNS.get_or_init(|| {
        [
            // import x from './x'; import {a, b} from "./y"; import * as z from './z'
            r#"(?m)^\s*import\s+[\w$*{}\s,]+?\s+from\s+['"]([^'"]+)['"]"#,
            // import './side-effect'
            r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#,
            // export {a} from './a'; export * from './b'
            r#"(?m)^\s*export\s+[\w$*{}\s,]+?\s+from\s+['"]([^'"]+)['"]"#,
            // require('./x')
            r#"\brequire\(\s*['"]([^'"]+)['"]\s*\)"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Import specifiers in order of first appearance. Imports inside `//` and
/// `/* */` comments are ignored.
pub fn scan_imports(source: &str) -> Vec<String> {
    let code = blank_comments(source);
    let mut found: Vec<(usize, String)> = import_patterns()
        .iter()
        .flat_map(|re| re.captures_iter(&code))
        .filter_map(|caps| caps.get(1).map(|m| (m.start(), m.as_str().to_string())))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut specifiers: Vec<String> = Vec::new();
    for (_, spec) in found {
        if !specifiers.contains(&spec) {
            specifiers.push(spec);
        }
    }
    specifiers
}

/// Replace comment bodies with spaces, keeping newlines so `^` anchors and
/// offsets still line up. Quotes and template literals are skipped over so
/// a `//` inside a string is not taken for a comment.
fn blank_comments(source: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        Quoted(u8),
        Line,
        Block,
    }

    let bytes = source.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut state = State::Code;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = State::Line;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = State::Block;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                (b'\'' | b'"' | b'`', _) => {
                    state = State::Quoted(b);
                    out.push(b);
                }
                _ => out.push(b),
            },
            State::Quoted(quote) => {
                out.push(b);
                if b == b'\\' {
                    if let Some(escaped) = next {
                        out.push(escaped);
                        i += 2;
                        continue;
                    }
                } else if b == quote || (b == b'\n' && quote != b'`') {
                    state = State::Code;
                }
            }
            State::Line => {
                if b == b'\n' {
                    state = State::Code;
                    out.push(b);
                } else {
                    out.push(b' ');
                }
            }
            State::Block => {
                if b == b'*' && next == Some(b'/') {
                    state = State::Code;
                    out.extend_from_slice(b"  ");
                    i += 2;
                    continue;
                }
                out.push(if b == b'\n' { b'\n' } else { b' ' });
            }
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Result of resolving one specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A module inside the source root.
    Module(String),
    /// A bare specifier (package name); left to the runtime.
    External,
    /// A relative specifier that matches no file.
    NotFound,
}

/// Resolve `specifier` as imported by module `importer` (an identifier
/// relative to `root`). Tries the exact path, then `.js`, then `/index.js`.
pub fn resolve(root: &Path, importer: &str, specifier: &str) -> Resolution {
    if !(specifier.starts_with("./") || specifier.starts_with("../")) {
        return Resolution::External;
    }

    let base = Path::new(importer).parent().unwrap_or_else(|| Path::new(""));
    let Some(joined) = normalize(&base.join(specifier)) else {
        return Resolution::NotFound;
    };

    let candidates = [
        joined.clone(),
        with_suffix(&joined, ".js"),
        joined.join("index.js"),
    ];
    for candidate in candidates {
        if root.join(&candidate).is_file() {
            return Resolution::Module(to_id(&candidate));
        }
    }
    Resolution::NotFound
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Collapse `.` and `..` lexically. `None` if the path escapes the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop()?;
            }
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out.iter().collect())
}

fn to_id(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

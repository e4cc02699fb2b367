//! Line-oriented name scanner for Python source
//!
//! This is not a parser. It finds identifiers outside of strings and comments and
//! classifies each one by the syntax immediately around it, which is enough for the
//! built-in highlight, definition, hover and symbol plugins.

use rols_workspace::DocumentText;
use tower_lsp_server::lsp_types::Position;
use tower_lsp_server::lsp_types::Range;

const KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    Reference,
    Assignment,
    Function,
    Class,
    Import,
    LoopTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    pub text: String,
    pub range: Range,
    pub kind: NameKind,
    /// Indentation of the line the name is on, in characters.
    pub indent: u32,
}

impl Name {
    #[must_use]
    pub fn is_definition(&self) -> bool {
        self.kind != NameKind::Reference
    }

    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        self.range.start.line == position.line
            && self.range.start.character <= position.character
            && position.character <= self.range.end.character
    }
}

/// Every non-keyword identifier in `text`, in document order.
#[must_use]
pub fn scan(text: &DocumentText) -> Vec<Name> {
    let mut names = Vec::new();
    let mut open_docstring: Option<char> = None;

    for (line_number, line) in text.lines().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let line_number = to_u32(line_number);
        let indent = to_u32(chars.iter().take_while(|c| c.is_whitespace()).count());

        let mut i = 0;
        let mut depth = 0usize;
        let mut previous: Option<String> = None;
        let mut importing = false;

        while i < chars.len() {
            if let Some(quote) = open_docstring {
                if is_triple(&chars, i, quote) {
                    open_docstring = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }

            let c = chars[i];
            match c {
                '#' => break,
                '"' | '\'' if is_triple(&chars, i, c) => {
                    match find_triple(&chars, i + 3, c) {
                        Some(end) => i = end + 3,
                        None => {
                            open_docstring = Some(c);
                            i = chars.len();
                        }
                    }
                }
                '"' | '\'' => i = skip_string(&chars, i),
                '(' | '[' | '{' => {
                    depth += 1;
                    i += 1;
                }
                ')' | ']' | '}' => {
                    depth = depth.saturating_sub(1);
                    i += 1;
                }
                c if c.is_ascii_digit() => {
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '.') {
                        i += 1;
                    }
                }
                c if c.is_alphabetic() || c == '_' => {
                    let start = i;
                    while i < chars.len() && is_word_char(chars[i]) {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();

                    if is_string_prefix(&word) && matches!(chars.get(i), Some('"' | '\'')) {
                        continue;
                    }

                    if KEYWORDS.contains(&word.as_str()) {
                        importing |= word == "import";
                        previous = Some(word);
                        continue;
                    }

                    let kind = match previous.as_deref() {
                        Some("def") => NameKind::Function,
                        Some("class") => NameKind::Class,
                        Some("import" | "as") => NameKind::Import,
                        Some("for") => NameKind::LoopTarget,
                        _ if importing => NameKind::Import,
                        _ if depth == 0 && assigns(&chars, i) => NameKind::Assignment,
                        _ => NameKind::Reference,
                    };

                    names.push(Name {
                        text: word.clone(),
                        range: Range::new(
                            Position::new(line_number, to_u32(start)),
                            Position::new(line_number, to_u32(i)),
                        ),
                        kind,
                        indent,
                    });
                    previous = Some(word);
                }
                _ => i += 1,
            }
        }
    }

    names
}

/// The name under the cursor, if any.
#[must_use]
pub fn name_at(names: &[Name], position: Position) -> Option<&Name> {
    names.iter().find(|name| name.contains(position))
}

pub(crate) fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "b" | "f" | "u" | "rb" | "br" | "fr" | "rf"
    )
}

fn is_triple(chars: &[char], at: usize, quote: char) -> bool {
    chars.len() >= at + 3 && chars[at..at + 3].iter().all(|&c| c == quote)
}

pub(crate) fn find_triple(chars: &[char], from: usize, quote: char) -> Option<usize> {
    (from..chars.len()).find(|&at| is_triple(chars, at, quote))
}

fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

fn assigns(chars: &[char], end: usize) -> bool {
    let rest = &chars[end..];
    let mut rest = rest.iter().skip_while(|c| **c == ' ' || **c == '\t');
    rest.next() == Some(&'=') && rest.next() != Some(&'=')
}

pub(crate) fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

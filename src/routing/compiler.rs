//! Path template compilation and matching.
//!
//! # Responsibilities
//! - Expand optional groups into flat token sequences
//! - Compile sequences into one anchored, case-insensitive alternation
//! - Match request paths and extract percent-decoded parameters
//!
//! # Design Decisions
//! - Group expansion uses an explicit worklist, not recursion, so
//!   group-heavy templates cannot exhaust the stack
//! - Compiled matchers are immutable and shared read-only across tasks
//! - A dynamic token without delimiting literal text is rejected at compile
//!   time (ambiguous segment boundary)
//! - Match failure is a `None`, never a panic

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::routing::template::{self, TemplateError, Token};

/// What a capture group stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    /// `:name`: one segment, decoded as a single string.
    Segment,
    /// `*name`: one or more segments, split then decoded.
    Path,
}

/// One entry of the ordered key list, aligned with capture-group order
/// across the whole alternation.
#[derive(Debug, Clone)]
pub struct Key {
    pub name: String,
    pub kind: KeyKind,
}

/// A decoded parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Single(String),
    Segments(Vec<String>),
}

impl ParamValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            ParamValue::Single(s) => Some(s),
            ParamValue::Segments(_) => None,
        }
    }

    pub fn as_segments(&self) -> Option<&[String]> {
        match self {
            ParamValue::Single(_) => None,
            ParamValue::Segments(s) => Some(s),
        }
    }
}

/// Successful match: the path and its parameters in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub path: String,
    pub params: Vec<(String, ParamValue)>,
}

impl PathMatch {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Compiled path matcher. Built once at service-definition time, immutable,
/// safe for concurrent reuse.
#[derive(Debug, Clone)]
pub struct Matcher {
    template: String,
    regex: Regex,
    keys: Vec<Key>,
}

impl Matcher {
    /// Compile a template into a matcher. Errors are fatal at startup.
    pub fn compile(template: &str) -> Result<Self, TemplateError> {
        let tokens = template::parse(template)?;
        let sequences = flatten(&tokens);

        let mut keys = Vec::new();
        let mut alternatives = Vec::with_capacity(sequences.len());
        for sequence in &sequences {
            alternatives.push(compile_sequence(sequence, &mut keys)?);
        }

        // Single anchored alternation, case-insensitive, tolerating one
        // trailing delimiter before the end anchor.
        let pattern = format!("(?i)^(?:{})/?$", alternatives.join("|"));
        let regex = Regex::new(&pattern).map_err(|e| TemplateError::Regex(e.to_string()))?;

        Ok(Self {
            template: template.to_string(),
            regex,
            keys,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Match a request path. Captures are zipped against the key list in
    /// declaration order; only the winning alternative's groups are present.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let captures = self.regex.captures(path)?;
        let mut params = Vec::new();
        for (index, key) in self.keys.iter().enumerate() {
            let Some(capture) = captures.get(index + 1) else {
                continue;
            };
            let value = match key.kind {
                KeyKind::Segment => ParamValue::Single(decode(capture.as_str())),
                KeyKind::Path => ParamValue::Segments(
                    capture
                        .as_str()
                        .split('/')
                        .filter(|segment| !segment.is_empty())
                        .map(decode)
                        .collect(),
                ),
            };
            params.push((key.name.clone(), value));
        }
        Some(PathMatch {
            path: path.to_string(),
            params,
        })
    }
}

fn decode(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

/// Flattened scalar token (groups already expanded away).
#[derive(Debug, Clone)]
enum Flat {
    Text(String),
    Param(String),
    Wildcard(String),
}

/// Enumerate every included/omitted combination of groups.
///
/// Each worklist item carries a flat prefix plus a stack of `(tokens, next)`
/// frames; hitting a group forks the item into an included variant (descend)
/// and an omitted variant (skip).
fn flatten(tokens: &[Token]) -> Vec<Vec<Flat>> {
    struct Item<'a> {
        prefix: Vec<Flat>,
        frames: Vec<(&'a [Token], usize)>,
    }

    let mut sequences = Vec::new();
    let mut work = vec![Item {
        prefix: Vec::new(),
        frames: vec![(tokens, 0)],
    }];

    while let Some(mut item) = work.pop() {
        loop {
            let Some((frame, next)) = item.frames.last_mut() else {
                sequences.push(merge_text(item.prefix));
                break;
            };
            if *next >= frame.len() {
                item.frames.pop();
                continue;
            }
            let token = &frame[*next];
            *next += 1;
            match token {
                Token::Text(t) => item.prefix.push(Flat::Text(t.clone())),
                Token::Param(name) => item.prefix.push(Flat::Param(name.clone())),
                Token::Wildcard(name) => item.prefix.push(Flat::Wildcard(name.clone())),
                Token::Group(inner) => {
                    // Omitted variant resumes after the group; pushed first so
                    // the included variant stays ahead in alternation order.
                    work.push(Item {
                        prefix: item.prefix.clone(),
                        frames: item.frames.clone(),
                    });
                    item.frames.push((inner.as_slice(), 0));
                }
            }
        }
    }

    sequences
}

fn merge_text(flats: Vec<Flat>) -> Vec<Flat> {
    let mut merged: Vec<Flat> = Vec::with_capacity(flats.len());
    for flat in flats {
        match (merged.last_mut(), flat) {
            (Some(Flat::Text(tail)), Flat::Text(next)) => tail.push_str(&next),
            (_, flat) => merged.push(flat),
        }
    }
    merged
}

fn compile_sequence(sequence: &[Flat], keys: &mut Vec<Key>) -> Result<String, TemplateError> {
    let mut out = String::new();
    for (index, flat) in sequence.iter().enumerate() {
        match flat {
            Flat::Text(text) => out.push_str(&regex::escape(text)),
            Flat::Param(name) => {
                ensure_delimited(sequence, index, name)?;
                let mut class = String::from("/");
                if let Some(stop) = separator_head(sequence, index) {
                    if stop != '/' {
                        class_push(stop, &mut class);
                    }
                }
                out.push_str("([^");
                out.push_str(&class);
                out.push_str("]+)");
                keys.push(Key {
                    name: name.clone(),
                    kind: KeyKind::Segment,
                });
            }
            Flat::Wildcard(name) => {
                ensure_delimited(sequence, index, name)?;
                out.push_str("(.+)");
                keys.push(Key {
                    name: name.clone(),
                    kind: KeyKind::Path,
                });
            }
        }
    }
    Ok(out)
}

/// A dynamic token needs literal text immediately before it, otherwise the
/// segment boundary is ambiguous.
fn ensure_delimited(sequence: &[Flat], index: usize, name: &str) -> Result<(), TemplateError> {
    let delimited = index > 0 && matches!(sequence[index - 1], Flat::Text(_));
    if delimited {
        Ok(())
    } else {
        Err(TemplateError::AmbiguousDynamic {
            name: name.to_string(),
        })
    }
}

/// When a literal separates this dynamic token from the next one, its leading
/// character must be excluded from the capture class so the separator cannot
/// be swallowed.
fn separator_head(sequence: &[Flat], index: usize) -> Option<char> {
    match (sequence.get(index + 1), sequence.get(index + 2)) {
        (Some(Flat::Text(text)), Some(Flat::Param(_) | Flat::Wildcard(_))) => text.chars().next(),
        _ => None,
    }
}

fn class_push(c: char, class: &mut String) {
    if matches!(c, '\\' | ']' | '[' | '^' | '-' | '&' | '~') {
        class.push('\\');
    }
    class.push(c);
}

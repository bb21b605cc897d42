//! Path template tokenizer and parser.
//!
//! # Responsibilities
//! - Scan a template string into tokens (`:name`, `*name`, `{…}`, literals)
//! - Build a balanced token tree for the compiler
//! - Reject malformed templates at service-definition time
//!
//! # Design Decisions
//! - `\` escapes the next character into the current literal
//! - Param names may be quoted (`:"user id"`) with backslash escapes
//! - Groups are parsed with an explicit stack, not recursion
//! - All errors are fatal: a service with a bad template must not start

use thiserror::Error;

/// One element of a parsed path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text, matched verbatim (case-insensitively).
    Text(String),
    /// `:name`: matches a single path segment.
    Param(String),
    /// `*name`: matches one or more segments, delimiters included.
    Wildcard(String),
    /// `{…}`: optional group of tokens.
    Group(Vec<Token>),
}

/// Template errors. All of these abort service startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unterminated '{{' group in template")]
    UnterminatedGroup,
    #[error("unmatched '}}' at byte {at}")]
    UnbalancedGroupClose { at: usize },
    #[error("missing name after '{marker}' at byte {at}")]
    MissingName { marker: char, at: usize },
    #[error("unterminated quoted name starting at byte {at}")]
    UnterminatedQuote { at: usize },
    #[error("dynamic segment '{name}' has no literal text before it")]
    AmbiguousDynamic { name: String },
    #[error("pattern construction failed: {0}")]
    Regex(String),
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '\u{200c}' | '\u{200d}')
}

/// Parse a template into a token tree.
pub fn parse(template: &str) -> Result<Vec<Token>, TemplateError> {
    let mut chars = template.char_indices().peekable();
    // Group nesting handled with an explicit stack of partial token lists.
    let mut stack: Vec<Vec<Token>> = vec![Vec::new()];
    let mut literal = String::new();

    fn flush(literal: &mut String, frame: &mut Vec<Token>) {
        if !literal.is_empty() {
            frame.push(Token::Text(std::mem::take(literal)));
        }
    }

    while let Some((at, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => literal.push(escaped),
                None => literal.push('\\'),
            },
            '{' => {
                flush(&mut literal, stack.last_mut().unwrap_or_else(|| unreachable!()));
                stack.push(Vec::new());
            }
            '}' => {
                flush(&mut literal, stack.last_mut().unwrap_or_else(|| unreachable!()));
                if stack.len() == 1 {
                    return Err(TemplateError::UnbalancedGroupClose { at });
                }
                let group = stack.pop().unwrap_or_else(|| unreachable!());
                stack
                    .last_mut()
                    .unwrap_or_else(|| unreachable!())
                    .push(Token::Group(group));
            }
            ':' | '*' => {
                flush(&mut literal, stack.last_mut().unwrap_or_else(|| unreachable!()));
                let name = scan_name(&mut chars, c, at)?;
                let token = if c == ':' {
                    Token::Param(name)
                } else {
                    Token::Wildcard(name)
                };
                stack.last_mut().unwrap_or_else(|| unreachable!()).push(token);
            }
            other => literal.push(other),
        }
    }

    flush(&mut literal, stack.last_mut().unwrap_or_else(|| unreachable!()));
    if stack.len() > 1 {
        return Err(TemplateError::UnterminatedGroup);
    }
    Ok(stack.pop().unwrap_or_else(|| unreachable!()))
}

/// Scan the name following `:` or `*`: a bare identifier or a quoted string.
fn scan_name(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    marker: char,
    marker_at: usize,
) -> Result<String, TemplateError> {
    match chars.peek().copied() {
        Some((quote_at, '"')) => {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some((_, '"')) => break,
                    Some((_, '\\')) => match chars.next() {
                        Some((_, escaped)) => name.push(escaped),
                        None => return Err(TemplateError::UnterminatedQuote { at: quote_at }),
                    },
                    Some((_, c)) => name.push(c),
                    None => return Err(TemplateError::UnterminatedQuote { at: quote_at }),
                }
            }
            if name.is_empty() {
                return Err(TemplateError::MissingName {
                    marker,
                    at: marker_at,
                });
            }
            Ok(name)
        }
        Some((_, c)) if is_ident_start(c) => {
            let mut name = String::new();
            name.push(c);
            chars.next();
            while let Some((_, c)) = chars.peek().copied() {
                if is_ident_continue(c) {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            Ok(name)
        }
        _ => Err(TemplateError::MissingName {
            marker,
            at: marker_at,
        }),
    }
}

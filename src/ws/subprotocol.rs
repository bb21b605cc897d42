//! `Sec-WebSocket-Protocol` header parsing and contract checks.
//!
//! # Responsibilities
//! - Parse the comma-separated token list in a single pass
//! - Reject bad characters, misplaced commas, empty and duplicate tokens,
//!   each with the offending byte index
//! - Validate the parsed set against a per-route protocol contract
//!
//! # Design Decisions
//! - Token character class per RFC 6455 (letters, digits, and a fixed
//!   punctuation subset)
//! - Horizontal whitespace is only valid as padding around a comma
//! - Parse errors reject the upgrade with 400, citing the index

use thiserror::Error;

/// Parse failures, each carrying the offending byte index.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubprotocolError {
    #[error("invalid character {ch:?} at index {index} in Sec-WebSocket-Protocol")]
    InvalidChar { index: usize, ch: char },
    #[error("empty protocol token at index {index}")]
    EmptyToken { index: usize },
    #[error("duplicate protocol token {token:?} at index {index}")]
    Duplicate { index: usize, token: String },
    #[error("protocol list does not satisfy the route contract: {0}")]
    ContractViolation(String),
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '^' | '_' | '`' | '|' | '~'
        )
}

/// Ordered, duplicate-free set of protocol tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprotocolSet {
    tokens: Vec<String>,
}

impl SubprotocolSet {
    /// Parse a header value in a single pass.
    pub fn parse(header: &str) -> Result<Self, SubprotocolError> {
        enum State {
            BeforeToken,
            InToken,
            AfterToken,
        }

        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_start = 0;
        let mut state = State::BeforeToken;

        let mut push = |current: &mut String, start: usize, tokens: &mut Vec<String>| {
            let token = std::mem::take(current);
            if tokens.contains(&token) {
                return Err(SubprotocolError::Duplicate {
                    index: start,
                    token,
                });
            }
            tokens.push(token);
            Ok(())
        };

        for (index, ch) in header.char_indices() {
            match state {
                State::BeforeToken => match ch {
                    ' ' | '\t' => {}
                    ',' => return Err(SubprotocolError::EmptyToken { index }),
                    c if is_token_char(c) => {
                        current.push(c);
                        current_start = index;
                        state = State::InToken;
                    }
                    c => return Err(SubprotocolError::InvalidChar { index, ch: c }),
                },
                State::InToken => match ch {
                    c if is_token_char(c) => current.push(c),
                    ',' => {
                        push(&mut current, current_start, &mut tokens)?;
                        state = State::BeforeToken;
                    }
                    ' ' | '\t' => {
                        push(&mut current, current_start, &mut tokens)?;
                        state = State::AfterToken;
                    }
                    c => return Err(SubprotocolError::InvalidChar { index, ch: c }),
                },
                State::AfterToken => match ch {
                    ' ' | '\t' => {}
                    ',' => state = State::BeforeToken,
                    c => return Err(SubprotocolError::InvalidChar { index, ch: c }),
                },
            }
        }

        match state {
            State::InToken => push(&mut current, current_start, &mut tokens)?,
            State::BeforeToken => {
                return Err(SubprotocolError::EmptyToken {
                    index: header.len(),
                })
            }
            State::AfterToken => {}
        }

        Ok(Self { tokens })
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn first(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }
}

/// Per-route shape of the accepted protocol set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubprotocolContract {
    /// Anything the client offers.
    Any,
    /// Exactly this token list, in order.
    Exact(Vec<String>),
    /// One fixed literal token plus `free` free-form tokens.
    LiteralPlusFree { literal: String, free: usize },
}

impl SubprotocolContract {
    /// Check a parsed set against this contract.
    pub fn check(&self, set: &SubprotocolSet) -> Result<(), SubprotocolError> {
        match self {
            SubprotocolContract::Any => Ok(()),
            SubprotocolContract::Exact(expected) => {
                if set.tokens() == expected.as_slice() {
                    Ok(())
                } else {
                    Err(SubprotocolError::ContractViolation(format!(
                        "expected exactly {expected:?}, got {:?}",
                        set.tokens()
                    )))
                }
            }
            SubprotocolContract::LiteralPlusFree { literal, free } => {
                if !set.contains(literal) {
                    return Err(SubprotocolError::ContractViolation(format!(
                        "missing required token {literal:?}"
                    )));
                }
                let expected_len = 1 + free;
                if set.len() != expected_len {
                    return Err(SubprotocolError::ContractViolation(format!(
                        "expected {expected_len} tokens ({literal:?} plus {free} free-form), got {}",
                        set.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Pick the protocol to echo back to the caller.
    pub fn negotiate<'a>(&self, set: &'a SubprotocolSet) -> Option<&'a str> {
        match self {
            SubprotocolContract::LiteralPlusFree { literal, .. } => set
                .iter()
                .find(|token| *token == literal)
                .or_else(|| set.first()),
            _ => set.first(),
        }
    }
}

//! Brace matching over minified script source
//!
//! The scanner walks forward from an anchor and returns the text up to the
//! brace that closes the first top-level block. String, template and regex
//! literals as well as comments are skipped, so braces inside them do not
//! count. Scanning is linear and allocation is bounded by the nesting depth.

use thiserror::Error;

/// Keywords after which a `/` starts a regex literal rather than a division
const REGEX_PRECEDING_KEYWORDS: &[&str] = &[
    "return",
    "typeof",
    "instanceof",
    "in",
    "of",
    "new",
    "delete",
    "void",
    "throw",
    "case",
    "do",
    "else",
    "yield",
    "await",
];

/// Keywords whose parenthesised head may be followed by a regex literal
const CONTROL_KEYWORDS: &[&str] = &["if", "while", "for", "with"];

/// Scanner failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("Anchor `{0}` not found")]
    AnchorNotFound(String),

    #[error("Unterminated {kind} starting at byte {at}")]
    Unterminated { kind: &'static str, at: usize },

    #[error("Unbalanced `{found}` at byte {at}")]
    Unbalanced { found: char, at: usize },

    #[error("Statement ended at byte {at} before any block was opened")]
    NoBody { at: usize },

    #[error("Input ended before the block was closed")]
    UnexpectedEof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Brace,
    Paren,
    /// Parenthesised head of `if`, `while`, `for` or `with`
    ControlParen,
    Bracket,
    TemplateExpr,
}

/// Check if byte can be part of an identifier
pub fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}

/// Find `anchor` where it is not part of a longer identifier or a property access
pub fn find_anchor(text: &str, anchor: &str) -> Option<usize> {
    let first = anchor.chars().next()?;
    let last = anchor.bytes().last()?;
    let leading_boundary = first.is_ascii() && is_ident_byte(first as u8);
    let trailing_boundary = is_ident_byte(last);
    let bytes = text.as_bytes();

    let mut from = 0;
    while let Some(offset) = text[from..].find(anchor) {
        let start = from + offset;
        let end = start + anchor.len();
        let starts_clean = !leading_boundary
            || start == 0
            || !(is_ident_byte(bytes[start - 1]) || bytes[start - 1] == b'.');
        let ends_clean =
            !trailing_boundary || bytes.get(end).map_or(true, |next| !is_ident_byte(*next));
        if starts_clean && ends_clean {
            return Some(start);
        }
        from = start + first.len_utf8();
    }
    None
}

/// Text following `anchor` up to and including the brace closing the first block
///
/// For `anchor = "abc=function"` and input `abc=function(a){return a}` the
/// result is `(a){return a}`.
pub fn match_to_closing_brace<'a>(text: &'a str, anchor: &str) -> Result<&'a str, LexError> {
    let start = find_anchor(text, anchor)
        .ok_or_else(|| LexError::AnchorNotFound(anchor.to_string()))?
        + anchor.len();

    let end = Scanner::new(text.as_bytes(), start).scan_to_block_end()?;
    Ok(&text[start..=end])
}

struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    stack: Vec<(Frame, usize)>,
    regex_allowed: bool,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a [u8], pos: usize) -> Self {
        Self {
            src,
            pos,
            stack: Vec::new(),
            regex_allowed: true,
        }
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    /// Position of the `}` closing the first top-level block
    fn scan_to_block_end(&mut self) -> Result<usize, LexError> {
        while let Some(byte) = self.peek(0) {
            match byte {
                b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' => self.slash()?,
                b'"' | b'\'' => self.string(byte)?,
                b'`' => {
                    let start = self.pos;
                    self.pos += 1;
                    self.template(start)?;
                }
                b'{' => self.open(Frame::Brace),
                b'(' if self.follows_control_keyword() => self.open(Frame::ControlParen),
                b'(' => self.open(Frame::Paren),
                b'[' => self.open(Frame::Bracket),
                b'}' => {
                    let at = self.pos;
                    match self.stack.pop() {
                        Some((Frame::Brace, _)) => {
                            self.pos += 1;
                            self.regex_allowed = false;
                            if self.stack.is_empty() {
                                return Ok(at);
                            }
                        }
                        Some((Frame::TemplateExpr, _)) => {
                            self.pos += 1;
                            self.template(at)?;
                        }
                        _ => return Err(LexError::Unbalanced { found: '}', at }),
                    }
                }
                b')' => self.close_paren()?,
                b']' => self.close(Frame::Bracket, ']')?,
                b';' if self.stack.is_empty() => return Err(LexError::NoBody { at: self.pos }),
                b'0'..=b'9' => self.number(),
                b'.' if self.peek(1).is_some_and(|b| b.is_ascii_digit()) => self.number(),
                b if is_ident_byte(b) => self.word(),
                b'+' | b'-' if self.peek(1) == Some(byte) => {
                    // ++ and -- keep whatever the operand left behind
                    self.pos += 2;
                }
                _ => {
                    self.pos += 1;
                    self.regex_allowed = true;
                }
            }
        }

        Err(match self.stack.last() {
            Some((Frame::TemplateExpr, at)) => LexError::Unterminated {
                kind: "template literal",
                at: *at,
            },
            _ => LexError::UnexpectedEof,
        })
    }

    fn open(&mut self, frame: Frame) {
        self.stack.push((frame, self.pos));
        self.pos += 1;
        self.regex_allowed = true;
    }

    /// After a control head the next statement may start with a regex literal
    fn close_paren(&mut self) -> Result<(), LexError> {
        let at = self.pos;
        match self.stack.pop() {
            Some((open @ (Frame::Paren | Frame::ControlParen), _)) => {
                self.pos += 1;
                self.regex_allowed = open == Frame::ControlParen;
                Ok(())
            }
            _ => Err(LexError::Unbalanced { found: ')', at }),
        }
    }

    /// Check if the word before the current position is a control keyword
    fn follows_control_keyword(&self) -> bool {
        let mut end = self.pos;
        while end > 0 && self.src[end - 1].is_ascii_whitespace() {
            end -= 1;
        }
        let mut start = end;
        while start > 0 && is_ident_byte(self.src[start - 1]) {
            start -= 1;
        }
        if start > 0 && self.src[start - 1] == b'.' {
            return false;
        }
        CONTROL_KEYWORDS
            .iter()
            .any(|keyword| keyword.as_bytes() == &self.src[start..end])
    }

    fn close(&mut self, frame: Frame, found: char) -> Result<(), LexError> {
        let at = self.pos;
        match self.stack.pop() {
            Some((open, _)) if open == frame => {
                self.pos += 1;
                self.regex_allowed = false;
                Ok(())
            }
            _ => Err(LexError::Unbalanced { found, at }),
        }
    }

    fn slash(&mut self) -> Result<(), LexError> {
        match self.peek(1) {
            Some(b'/') => {
                while let Some(byte) = self.peek(0) {
                    if byte == b'\n' || byte == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
                Ok(())
            }
            Some(b'*') => {
                let start = self.pos;
                let rest = &self.src[self.pos + 2..];
                match rest.windows(2).position(|w| w == b"*/") {
                    Some(offset) => {
                        self.pos += 2 + offset + 2;
                        Ok(())
                    }
                    None => Err(LexError::Unterminated {
                        kind: "block comment",
                        at: start,
                    }),
                }
            }
            _ if self.regex_allowed => self.regex_literal(),
            _ => {
                self.pos += 1;
                self.regex_allowed = true;
                Ok(())
            }
        }
    }

    fn string(&mut self, quote: u8) -> Result<(), LexError> {
        let start = self.pos;
        self.pos += 1;
        while let Some(byte) = self.peek(0) {
            match byte {
                b'\\' => {
                    // \r\n line continuation spans three bytes
                    if self.peek(1) == Some(b'\r') && self.peek(2) == Some(b'\n') {
                        self.pos += 3;
                    } else {
                        self.pos += 2;
                    }
                }
                b'\n' | b'\r' => break,
                b if b == quote => {
                    self.pos += 1;
                    self.regex_allowed = false;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(LexError::Unterminated {
            kind: "string literal",
            at: start,
        })
    }

    /// Scan template text; stops after the closing backtick or after `${`
    fn template(&mut self, start: usize) -> Result<(), LexError> {
        while let Some(byte) = self.peek(0) {
            match byte {
                b'\\' => self.pos += 2,
                b'`' => {
                    self.pos += 1;
                    self.regex_allowed = false;
                    return Ok(());
                }
                b'$' if self.peek(1) == Some(b'{') => {
                    self.stack.push((Frame::TemplateExpr, self.pos));
                    self.pos += 2;
                    self.regex_allowed = true;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(LexError::Unterminated {
            kind: "template literal",
            at: start,
        })
    }

    fn regex_literal(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let mut in_class = false;
        self.pos += 1;
        while let Some(byte) = self.peek(0) {
            match byte {
                b'\\' => self.pos += 2,
                b'\n' | b'\r' => break,
                b'[' => {
                    in_class = true;
                    self.pos += 1;
                }
                b']' => {
                    in_class = false;
                    self.pos += 1;
                }
                b'/' if !in_class => {
                    self.pos += 1;
                    // flags
                    while self.peek(0).is_some_and(is_ident_byte) {
                        self.pos += 1;
                    }
                    self.regex_allowed = false;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        Err(LexError::Unterminated {
            kind: "regex literal",
            at: start,
        })
    }

    fn word(&mut self) {
        let start = self.pos;
        while self.peek(0).is_some_and(is_ident_byte) {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        self.regex_allowed = REGEX_PRECEDING_KEYWORDS
            .iter()
            .any(|keyword| keyword.as_bytes() == word);
    }

    fn number(&mut self) {
        while self
            .peek(0)
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            self.pos += 1;
        }
        self.regex_allowed = false;
    }
}

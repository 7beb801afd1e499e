//! Tokenizer for Verilog / SystemVerilog source text.
//!
//! This is the first lexical pass. It removes everything the structural
//! passes must never see (comments, string contents, attribute instances,
//! compiler directives) and produces a flat token list with 1-based line
//! numbers. Later passes work on tokens only, so a `module` keyword inside a
//! comment or a `;` inside a string can never confuse them.

use crate::error::DiagnosticKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Simple, system (`$clog2`), or escaped (`\bus[0] `) identifier.
    /// Escaped identifiers are stored without the leading backslash.
    Ident,
    Number,
    /// A string literal; the text is the raw content between the quotes.
    Str,
    /// A macro use such as `` `WIDTH ``, stored with the backtick.
    Macro,
    /// A single punctuation character.
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
}

impl Token {
    pub fn is_sym(&self, c: char) -> bool {
        self.kind == TokenKind::Symbol && self.text.len() == c.len_utf8() && self.text.starts_with(c)
    }

    pub fn is_ident(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }

    /// Identifier, number, macro, or string: anything that is not punctuation.
    pub fn is_word(&self) -> bool {
        self.kind != TokenKind::Symbol
    }
}

/// A recoverable anomaly found by one of the lexical passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: DiagnosticKind,
    pub line: u32,
    pub message: String,
}

/// Directives whose arguments run to the end of the line.
const LINE_DIRECTIVES: &[&str] = &[
    "define",
    "undef",
    "undefineall",
    "include",
    "timescale",
    "default_nettype",
    "line",
    "pragma",
    "begin_keywords",
    "unconnected_drive",
    "default_decay_time",
    "default_trireg_strength",
    "delay_mode_distributed",
    "delay_mode_path",
    "delay_mode_unit",
    "delay_mode_zero",
];

/// Directives taking exactly one identifier.
const NAME_DIRECTIVES: &[&str] = &["ifdef", "ifndef", "elsif"];

/// Directives with no argument.
const BARE_DIRECTIVES: &[&str] = &[
    "else",
    "endif",
    "celldefine",
    "endcelldefine",
    "resetall",
    "end_keywords",
    "nounconnected_drive",
];

struct Tokenizer<'a> {
    text: &'a str,
    input: &'a [u8],
    pos: usize,
    line: u32,
    tokens: Vec<Token>,
    issues: Vec<Issue>,
}

/// Tokenizes `text`, returning tokens and lexical issues.
pub fn tokenize(text: &str) -> (Vec<Token>, Vec<Issue>) {
    let mut t = Tokenizer {
        text,
        input: text.as_bytes(),
        pos: 0,
        line: 1,
        tokens: Vec::new(),
        issues: Vec::new(),
    };
    t.run();
    (t.tokens, t.issues)
}

impl<'a> Tokenizer<'a> {
    fn peek(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        if self.input.get(self.pos) == Some(&b'\n') {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn issue(&mut self, kind: DiagnosticKind, line: u32, message: impl Into<String>) {
        self.issues.push(Issue {
            kind,
            line,
            message: message.into(),
        });
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: u32) {
        let text = self.text.get(start..self.pos).unwrap_or_default().to_string();
        self.tokens.push(Token { kind, text, line });
    }

    fn run(&mut self) {
        while let Some(ch) = self.peek(0) {
            let line = self.line;
            match ch {
                c if c.is_ascii_whitespace() => self.bump(),
                b'/' if self.peek(1) == Some(b'/') => self.skip_line(),
                b'/' if self.peek(1) == Some(b'*') => {
                    self.skip_block("*/", DiagnosticKind::UnterminatedComment, "block comment")
                }
                // `(*` opens an attribute instance, except in `@(*)`.
                b'(' if self.peek(1) == Some(b'*') && self.peek(2) != Some(b')') => {
                    self.skip_block("*)", DiagnosticKind::UnterminatedComment, "attribute instance")
                }
                b'"' => self.string(),
                b'`' => self.directive(),
                b'\\' => self.escaped_ident(),
                c if c.is_ascii_alphabetic() || c == b'_' || c == b'$' => {
                    let start = self.pos;
                    self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'$');
                    self.push(TokenKind::Ident, start, line);
                }
                c if c.is_ascii_digit() => self.number(),
                b'\'' => self.tick(),
                c if c.is_ascii() => {
                    let start = self.pos;
                    self.bump();
                    self.push(TokenKind::Symbol, start, line);
                }
                _ => {
                    // Non-ASCII outside strings and comments: one symbol per char.
                    let start = self.pos;
                    let width = self
                        .text
                        .get(start..)
                        .and_then(|rest| rest.chars().next())
                        .map_or(1, char::len_utf8);
                    self.pos += width;
                    self.push(TokenKind::Symbol, start, line);
                }
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek(0) {
            if !pred(c) {
                break;
            }
            self.bump();
        }
    }

    fn skip_line(&mut self) {
        self.take_while(|c| c != b'\n');
    }

    fn skip_block(&mut self, close: &str, kind: DiagnosticKind, what: &str) {
        let line = self.line;
        self.pos += 2;
        let close = close.as_bytes();
        while self.pos < self.input.len() {
            if self.input[self.pos..].starts_with(close) {
                self.pos += close.len();
                return;
            }
            self.bump();
        }
        self.issue(kind, line, format!("unterminated {what}"));
    }

    fn string(&mut self) {
        let line = self.line;
        self.bump();
        let start = self.pos;
        loop {
            match self.peek(0) {
                None => {
                    self.issue(DiagnosticKind::UnterminatedString, line, "string literal reaches end of file");
                    break;
                }
                Some(b'\n') => {
                    self.issue(DiagnosticKind::UnterminatedString, line, "string literal not closed on its line");
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    if self.peek(0).is_some() {
                        self.bump();
                    }
                }
                Some(b'"') => break,
                Some(_) => self.bump(),
            }
        }
        let text = self.text.get(start..self.pos).unwrap_or_default().to_string();
        self.tokens.push(Token {
            kind: TokenKind::Str,
            text,
            line,
        });
        if self.peek(0) == Some(b'"') {
            self.bump();
        }
    }

    fn directive(&mut self) {
        let line = self.line;
        let start = self.pos;
        self.bump();
        let name_start = self.pos;
        self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        let name = self.text.get(name_start..self.pos).unwrap_or_default();

        if LINE_DIRECTIVES.contains(&name) {
            // `define bodies continue across lines ending in a backslash.
            loop {
                self.skip_line();
                let continued = self.pos > 0 && self.input.get(self.pos - 1) == Some(&b'\\');
                if continued && self.peek(0).is_some() {
                    self.bump();
                } else {
                    break;
                }
            }
        } else if NAME_DIRECTIVES.contains(&name) {
            self.take_while(|c| c == b' ' || c == b'\t');
            self.take_while(|c| c.is_ascii_alphanumeric() || c == b'_');
        } else if !name.is_empty() && !BARE_DIRECTIVES.contains(&name) {
            self.push(TokenKind::Macro, start, line);
        }
    }

    fn escaped_ident(&mut self) {
        let line = self.line;
        self.bump();
        let start = self.pos;
        self.take_while(|c| !c.is_ascii_whitespace());
        if self.pos > start {
            self.push(TokenKind::Ident, start, line);
        }
    }

    fn number(&mut self) {
        let line = self.line;
        let start = self.pos;
        self.take_while(|c| c.is_ascii_digit() || c == b'_');
        if self.peek(0) == Some(b'.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.take_while(|c| c.is_ascii_digit() || c == b'_');
        }
        if matches!(self.peek(0), Some(b'e' | b'E'))
            && (self.peek(1).is_some_and(|c| c.is_ascii_digit())
                || (matches!(self.peek(1), Some(b'+' | b'-'))
                    && self.peek(2).is_some_and(|c| c.is_ascii_digit())))
        {
            self.bump();
            self.bump();
            self.take_while(|c| c.is_ascii_digit());
        }
        if self.peek(0) == Some(b'\'') && self.based_suffix_len() > 0 {
            self.based_value();
        }
        self.push(TokenKind::Number, start, line);
    }

    /// Length of `'[sS]<base>` at the cursor, or 0.
    fn based_suffix_len(&self) -> usize {
        let mut n = 1;
        if matches!(self.peek(n), Some(b's' | b'S')) {
            n += 1;
        }
        match self.peek(n) {
            Some(b'b' | b'B' | b'o' | b'O' | b'd' | b'D' | b'h' | b'H') => n + 1,
            _ => 0,
        }
    }

    fn based_value(&mut self) {
        for _ in 0..self.based_suffix_len() {
            self.bump();
        }
        self.take_while(|c| c == b' ' || c == b'\t');
        self.take_while(|c| c.is_ascii_hexdigit() || matches!(c, b'_' | b'x' | b'X' | b'z' | b'Z' | b'?'));
    }

    fn tick(&mut self) {
        let line = self.line;
        let start = self.pos;
        if self.based_suffix_len() > 0 {
            self.based_value();
            self.push(TokenKind::Number, start, line);
        } else if matches!(self.peek(1), Some(b'0' | b'1' | b'x' | b'X' | b'z' | b'Z')) {
            self.bump();
            self.bump();
            self.push(TokenKind::Number, start, line);
        } else {
            self.bump();
            self.push(TokenKind::Symbol, start, line);
        }
    }
}

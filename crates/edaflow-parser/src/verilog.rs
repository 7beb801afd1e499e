//! Structural passes over the token stream.
//!
//! # Passes
//!
//! 1. [`module_spans`]: pairs each `module` / `macromodule` keyword with its
//!    `endmodule`. A module left open by EOF or by the next `module` keyword
//!    is skipped with a diagnostic.
//! 2. Header: optional `#( … )` parameter list, then an ANSI or non-ANSI
//!    port list.
//! 3. Body: a statement scanner. Direction declarations become ports, net and
//!    variable declarations become signals, and `type [#(…)] name [range] (…)`
//!    becomes one or more instances. Function, task, and procedural bodies are
//!    skipped as whole statements; generate regions are scanned in place.
//!
//! No pass builds a syntax tree. Anything the scanner does not recognise is
//! skipped up to the next `;`.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::error::{DiagnosticKind, ParseError};
use crate::lexer::{Issue, Token, TokenKind};

const DIRECTIONS: &[&str] = &["input", "output", "inout", "ref"];

/// Words that start a signal declaration.
const NET_TYPES: &[&str] = &[
    "wire", "reg", "logic", "tri", "tri0", "tri1", "triand", "trior", "trireg", "wand", "wor",
    "supply0", "supply1", "uwire", "integer", "int", "bit", "byte", "shortint", "longint",
    "real", "realtime", "shortreal", "time", "var", "string", "chandle", "event",
];

/// Declaration qualifiers that are neither a direction nor a type.
const MODIFIERS: &[&str] = &[
    "signed", "unsigned", "const", "static", "automatic", "rand", "randc", "var", "vectored",
    "scalared", "packed",
];

/// Statements skipped up to their terminating `;`.
const SKIP_STATEMENTS: &[&str] = &[
    "assign", "defparam", "genvar", "import", "export", "typedef", "specparam", "timeunit",
    "timeprecision", "alias", "bind", "let", "nettype", "localparam", "modport", "default",
    "assert", "assume", "cover", "restrict", "expect", "wait", "force", "release", "deassign",
];

/// Built-in gate and switch primitives; their instantiations are not module
/// instances.
const PRIMITIVES: &[&str] = &[
    "and", "nand", "or", "nor", "xor", "xnor", "buf", "not", "bufif0", "bufif1", "notif0",
    "notif1", "pullup", "pulldown", "nmos", "pmos", "rnmos", "rpmos", "cmos", "rcmos", "tran",
    "rtran", "tranif0", "tranif1", "rtranif0", "rtranif1",
];

/// Block constructs skipped as a whole, by their closing keyword.
const BLOCKS: &[(&str, &str)] = &[
    ("function", "endfunction"),
    ("task", "endtask"),
    ("specify", "endspecify"),
    ("class", "endclass"),
    ("covergroup", "endgroup"),
    ("property", "endproperty"),
    ("sequence", "endsequence"),
    ("clocking", "endclocking"),
    ("checker", "endchecker"),
    ("primitive", "endprimitive"),
    ("interface", "endinterface"),
    ("program", "endprogram"),
    ("config", "endconfig"),
    ("table", "endtable"),
];

const PROCEDURAL: &[&str] = &[
    "always",
    "always_ff",
    "always_comb",
    "always_latch",
    "initial",
    "final",
];

/// Single tokens that only delimit generate regions and blocks.
const DELIMITERS: &[&str] = &[
    "begin",
    "end",
    "generate",
    "endgenerate",
    "else",
    "endcase",
    "fork",
    "join",
    "join_any",
    "join_none",
];

/// Keywords that cannot name a module type.
const RESERVED: &[&str] = &[
    "module", "macromodule", "endmodule", "parameter", "if", "for", "case", "casex", "casez",
    "while", "repeat", "forever", "foreach", "do", "return", "break", "continue", "unique",
    "unique0", "priority", "posedge", "negedge", "edge", "or", "extern", "virtual", "pure",
    "struct", "union", "enum", "package", "endpackage",
];

fn is_keyword(word: &str) -> bool {
    DIRECTIONS.contains(&word)
        || NET_TYPES.contains(&word)
        || MODIFIERS.contains(&word)
        || SKIP_STATEMENTS.contains(&word)
        || PRIMITIVES.contains(&word)
        || PROCEDURAL.contains(&word)
        || DELIMITERS.contains(&word)
        || RESERVED.contains(&word)
        || BLOCKS.iter().any(|(open, close)| *open == word || *close == word)
}

// ---------------------------------------------------------------------------
// Declarations produced by the passes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Head {
    pub direction: Option<String>,
    pub net_type: Option<String>,
    /// Packed dimensions in source order, e.g. `["[7:0]"]`.
    pub packed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDecl {
    pub name: String,
    pub line: u32,
    pub head: Head,
    /// Position in the module header's port list.
    pub index: Option<usize>,
    declared: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalDecl {
    pub name: String,
    pub line: u32,
    pub head: Head,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    Named(String),
    Positional(usize),
    /// `.*`
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub port: PortRef,
    pub expr: String,
    /// The identifier when `expr` is a plain name, optionally bit-selected.
    pub base: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceDecl {
    pub name: String,
    pub line: u32,
    pub module_type: String,
    pub parameter_overrides: Option<String>,
    /// Instance array range, e.g. `[3:0]`.
    pub array: Option<String>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDecl {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub parameters: Vec<String>,
    pub ports: Vec<PortDecl>,
    pub signals: Vec<SignalDecl>,
    pub instances: Vec<InstanceDecl>,
}

/// Token range of one terminated module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSpan {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    /// Tokens after the module name, up to (excluding) `endmodule`.
    pub start: usize,
    pub end: usize,
}

// ---------------------------------------------------------------------------
// Pass 1: module spans
// ---------------------------------------------------------------------------

fn is_module_kw(t: &Token) -> bool {
    t.is_ident("module") || t.is_ident("macromodule")
}

/// Finds every terminated module. Unterminated modules are reported and
/// skipped; scanning resumes at the keyword that interrupted them.
pub fn module_spans(toks: &[Token]) -> (Vec<ModuleSpan>, Vec<Issue>) {
    let mut spans = Vec::new();
    let mut issues = Vec::new();
    let mut i = 0;

    while i < toks.len() {
        if !is_module_kw(&toks[i]) || (i > 0 && toks[i - 1].is_ident("extern")) {
            i += 1;
            continue;
        }
        let line_start = toks[i].line;
        let mut j = i + 1;
        while toks
            .get(j)
            .is_some_and(|t| t.is_ident("automatic") || t.is_ident("static"))
        {
            j += 1;
        }
        let Some(name) = toks.get(j).filter(|t| t.kind == TokenKind::Ident) else {
            i += 1;
            continue;
        };

        let mut k = j + 1;
        let mut closed = None;
        while k < toks.len() {
            if toks[k].is_ident("endmodule") {
                closed = Some(k);
                break;
            }
            if is_module_kw(&toks[k]) {
                break;
            }
            k += 1;
        }

        match closed {
            Some(end) => {
                spans.push(ModuleSpan {
                    name: name.text.clone(),
                    line_start,
                    line_end: toks[end].line,
                    start: j + 1,
                    end,
                });
                i = end + 1;
            }
            None => {
                issues.push(Issue {
                    kind: DiagnosticKind::UnterminatedModule,
                    line: line_start,
                    message: format!("module '{}' has no endmodule; skipped", name.text),
                });
                i = k;
            }
        }
    }

    (spans, issues)
}

// ---------------------------------------------------------------------------
// Token helpers
// ---------------------------------------------------------------------------

fn closer(open: &Token) -> Option<char> {
    if open.is_sym('(') {
        Some(')')
    } else if open.is_sym('[') {
        Some(']')
    } else if open.is_sym('{') {
        Some('}')
    } else {
        None
    }
}

/// Index of the delimiter closing the group opened at `open`.
fn close_of(toks: &[Token], open: usize) -> Option<usize> {
    let mut stack = vec![closer(toks.get(open)?)?];
    for (offset, t) in toks[open + 1..].iter().enumerate() {
        if let Some(c) = closer(t) {
            stack.push(c);
        } else if t.is_sym(')') || t.is_sym(']') || t.is_sym('}') {
            if stack.last().is_some_and(|&c| t.is_sym(c)) {
                stack.pop();
                if stack.is_empty() {
                    return Some(open + 1 + offset);
                }
            } else {
                return None;
            }
        }
    }
    None
}

/// Splits at commas outside any bracket.
fn split_commas(toks: &[Token]) -> Vec<&[Token]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, t) in toks.iter().enumerate() {
        if t.is_sym('(') || t.is_sym('[') || t.is_sym('{') {
            depth += 1;
        } else if t.is_sym(')') || t.is_sym(']') || t.is_sym('}') {
            depth -= 1;
        } else if depth == 0 && t.is_sym(',') {
            out.push(&toks[start..i]);
            start = i + 1;
        }
    }
    if start < toks.len() || !out.is_empty() {
        out.push(&toks[start..]);
    }
    out
}

/// Renders tokens back to compact text, keeping a space between words.
pub fn render(toks: &[Token]) -> String {
    let mut out = String::new();
    let mut prev_word = false;
    for t in toks {
        let word = t.is_word();
        if word && prev_word {
            out.push(' ');
        }
        if t.kind == TokenKind::Str {
            out.push('"');
            out.push_str(&t.text);
            out.push('"');
        } else {
            out.push_str(&t.text);
        }
        prev_word = word;
    }
    out
}

/// The identifier of `name` or `name[...]`, if that is all `toks` holds.
fn simple_base(toks: &[Token]) -> Option<String> {
    let first = toks.first().filter(|t| t.kind == TokenKind::Ident)?;
    match toks.len() {
        1 => Some(first.text.clone()),
        _ if toks[1].is_sym('[') && close_of(toks, 1) == Some(toks.len() - 1) => {
            Some(first.text.clone())
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Declaration lists
// ---------------------------------------------------------------------------

/// One comma-separated item of a declaration: head words, packed ranges, and
/// the declared name.
struct Item {
    words: Vec<String>,
    packed: Vec<String>,
    name: Option<(String, u32)>,
}

fn analyze(chunk: &[Token]) -> Item {
    enum Entry {
        Word(String, u32),
        Range(String),
    }
    let mut entries: Vec<Entry> = Vec::new();
    let mut i = 0;
    while i < chunk.len() {
        let t = &chunk[i];
        if t.is_sym('=') {
            break;
        }
        if t.is_sym('[') || t.is_sym('(') || t.is_sym('{') {
            let end = close_of(chunk, i).unwrap_or(chunk.len() - 1);
            if t.is_sym('[') {
                entries.push(Entry::Range(render(&chunk[i..=end])));
            }
            i = end + 1;
            continue;
        }
        if t.is_sym('#') {
            i += 1;
            if chunk.get(i).is_some_and(|t| t.is_sym('(')) {
                i = close_of(chunk, i).unwrap_or(chunk.len() - 1);
            }
            i += 1;
            continue;
        }
        if t.is_sym('.') {
            i += 2;
            continue;
        }
        if t.is_sym(':') && chunk.get(i + 1).is_some_and(|t| t.is_sym(':')) {
            if let (Some(Entry::Word(word, _)), Some(scoped)) = (entries.last_mut(), chunk.get(i + 2)) {
                word.push_str("::");
                word.push_str(&scoped.text);
            }
            i += 3;
            continue;
        }
        if matches!(t.kind, TokenKind::Ident | TokenKind::Macro) {
            entries.push(Entry::Word(t.text.clone(), t.line));
        }
        i += 1;
    }

    let name_at = entries.iter().rposition(|e| matches!(e, Entry::Word(..)));
    let mut item = Item {
        words: Vec::new(),
        packed: Vec::new(),
        name: None,
    };
    for (idx, entry) in entries.into_iter().enumerate() {
        match entry {
            Entry::Word(w, line) if Some(idx) == name_at => item.name = Some((w, line)),
            Entry::Word(w, _) if name_at.is_some_and(|n| idx < n) => item.words.push(w),
            Entry::Range(r) if name_at.is_some_and(|n| idx < n) => item.packed.push(r),
            _ => {}
        }
    }
    item
}

/// A name introduced by a declaration, with the head that applies to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declared {
    pub name: String,
    pub line: u32,
    pub head: Head,
}

/// Parses `head item, item, ...`. Items without their own head inherit the
/// previous one; a head without a direction inherits the previous direction.
pub fn declarations(toks: &[Token]) -> Vec<Declared> {
    let mut head = Head::default();
    let mut out = Vec::new();
    for chunk in split_commas(toks) {
        let item = analyze(chunk);
        let Some((name, line)) = item.name else {
            continue;
        };
        if !item.words.is_empty() || !item.packed.is_empty() {
            let direction = item
                .words
                .iter()
                .find(|w| DIRECTIONS.contains(&w.as_str()))
                .cloned();
            let net_type = item
                .words
                .iter()
                .find(|w| !DIRECTIONS.contains(&w.as_str()) && !MODIFIERS.contains(&w.as_str()))
                .cloned();
            head = Head {
                direction: direction.or(head.direction.take()),
                net_type,
                packed: item.packed,
            };
        }
        out.push(Declared {
            name,
            line,
            head: head.clone(),
        });
    }
    out
}

/// Bit width implied by a declaration head, when it is a known constant.
pub fn width_of(head: &Head) -> Option<i64> {
    if head.packed.is_empty() {
        return match head.net_type.as_deref() {
            None | Some("wire" | "reg" | "logic" | "bit" | "tri" | "tri0" | "tri1" | "triand"
            | "trior" | "trireg" | "wand" | "wor" | "uwire" | "supply0" | "supply1") => Some(1),
            Some("byte") => Some(8),
            Some("shortint") => Some(16),
            Some("int" | "integer") => Some(32),
            Some("longint" | "time") => Some(64),
            _ => None,
        };
    }
    head.packed.iter().try_fold(1i64, |acc, range| {
        let inner = range.strip_prefix('[')?.strip_suffix(']')?;
        let (msb, lsb) = inner.split_once(':')?;
        let msb: i64 = msb.replace('_', "").parse().ok()?;
        let lsb: i64 = lsb.replace('_', "").parse().ok()?;
        let bits = msb.checked_sub(lsb)?.checked_abs()?.checked_add(1)?;
        acc.checked_mul(bits)
    })
}

// ---------------------------------------------------------------------------
// Passes 2 and 3: header and body
// ---------------------------------------------------------------------------

struct Cursor<'t> {
    toks: &'t [Token],
    pos: usize,
    /// Current procedural nesting.
    depth: usize,
}

/// Procedural statements nested deeper than this abort the module scan.
const MAX_NESTING: usize = 256;

/// Body items scanned between cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 1024;

/// Why a module scan ended early.
enum Stop {
    /// An opening delimiter whose match lies past the end of the module.
    Unbalanced { line: u32, what: String },
    TooDeep { line: u32 },
    Cancelled,
}

impl<'t> Cursor<'t> {
    /// Moves forward `n` tokens, stopping at the end.
    fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.toks.len());
    }

    fn peek(&self) -> Option<&'t Token> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, n: usize) -> Option<&'t Token> {
        self.toks.get(self.pos + n)
    }

    fn at_sym(&self, c: char) -> bool {
        self.peek().is_some_and(|t| t.is_sym(c))
    }

    fn at_ident(&self, word: &str) -> bool {
        self.peek().is_some_and(|t| t.is_ident(word))
    }

    fn line(&self) -> u32 {
        self.peek()
            .or_else(|| self.toks.last())
            .map_or(0, |t| t.line)
    }

    /// Consumes the group opened at the cursor and returns its inner tokens.
    fn group(&mut self) -> Result<&'t [Token], Stop> {
        let line = self.line();
        match close_of(self.toks, self.pos) {
            Some(end) => {
                let inner = &self.toks[self.pos + 1..end];
                self.pos = end + 1;
                Ok(inner)
            }
            None => Err(Stop::Unbalanced {
                line,
                what: format!("'{}'", self.peek().map_or("", |t| t.text.as_str())),
            }),
        }
    }

    /// Consumes through the next `;` outside brackets. Returns the statement
    /// tokens without the `;`.
    fn statement(&mut self) -> Result<&'t [Token], Stop> {
        let start = self.pos;
        while let Some(t) = self.peek() {
            if t.is_sym(';') {
                let body = &self.toks[start..self.pos];
                self.advance(1);
                return Ok(body);
            }
            if closer(t).is_some() {
                self.group()?;
            } else {
                self.advance(1);
            }
        }
        Ok(&self.toks[start..])
    }

    /// Consumes through the keyword `close`.
    fn through(&mut self, open: &str, close: &str) -> Result<(), Stop> {
        let line = self.line();
        while let Some(t) = self.peek() {
            self.advance(1);
            if t.is_ident(close) {
                return Ok(());
            }
        }
        Err(Stop::Unbalanced {
            line,
            what: format!("'{open}' without '{close}'"),
        })
    }

    fn skip_label(&mut self) {
        if self.at_sym(':') && !self.peek_at(1).is_some_and(|t| t.is_sym(':')) {
            self.advance(2);
        }
    }

    /// Skips `@(...)`, `@*`, `@name`, `#delay`, `#(...)`, and `##n` controls.
    fn skip_timing_controls(&mut self) -> Result<(), Stop> {
        while self.at_sym('@') || self.at_sym('#') {
            self.advance(1);
            while self.at_sym('#') {
                self.advance(1);
            }
            if self.at_sym('(') {
                self.group()?;
            } else {
                self.advance(1);
            }
        }
        Ok(())
    }

    /// Skips one procedural statement, including nested blocks.
    fn skip_procedural(&mut self) -> Result<(), Stop> {
        if self.depth >= MAX_NESTING {
            return Err(Stop::TooDeep { line: self.line() });
        }
        self.depth += 1;
        let skipped = self.skip_procedural_step();
        self.depth -= 1;
        skipped
    }

    fn skip_procedural_step(&mut self) -> Result<(), Stop> {
        self.skip_timing_controls()?;
        let Some(t) = self.peek() else {
            return Ok(());
        };
        if t.kind == TokenKind::Ident {
            match t.text.as_str() {
                "begin" | "fork" => {
                    self.advance(1);
                    self.skip_label();
                    loop {
                        let Some(t) = self.peek() else {
                            return Err(Stop::Unbalanced {
                                line: self.line(),
                                what: "'begin' without 'end'".to_string(),
                            });
                        };
                        if ["end", "join", "join_any", "join_none"].contains(&t.text.as_str())
                            && t.kind == TokenKind::Ident
                        {
                            self.advance(1);
                            self.skip_label();
                            return Ok(());
                        }
                        self.skip_procedural()?;
                    }
                }
                "if" => {
                    self.advance(1);
                    if self.at_sym('(') {
                        self.group()?;
                    }
                    self.skip_procedural()?;
                    if self.at_ident("else") {
                        self.advance(1);
                        self.skip_procedural()?;
                    }
                    return Ok(());
                }
                "unique" | "unique0" | "priority" => {
                    self.advance(1);
                    return self.skip_procedural();
                }
                "case" | "casex" | "casez" | "randcase" => {
                    let line = self.line();
                    let mut depth = 0usize;
                    while let Some(t) = self.peek() {
                        self.advance(1);
                        if t.kind != TokenKind::Ident {
                            continue;
                        }
                        match t.text.as_str() {
                            "case" | "casex" | "casez" | "randcase" => depth += 1,
                            "endcase" => {
                                depth -= 1;
                                if depth == 0 {
                                    return Ok(());
                                }
                            }
                            _ => {}
                        }
                    }
                    return Err(Stop::Unbalanced {
                        line,
                        what: "'case' without 'endcase'".to_string(),
                    });
                }
                "for" | "while" | "repeat" | "foreach" | "wait" => {
                    self.advance(1);
                    if self.at_sym('(') {
                        self.group()?;
                    }
                    return self.skip_procedural();
                }
                "forever" => {
                    self.advance(1);
                    return self.skip_procedural();
                }
                "do" => {
                    self.advance(1);
                    self.skip_procedural()?;
                    self.statement()?;
                    return Ok(());
                }
                "assert" | "assume" | "cover" => {
                    self.advance(1);
                    if self.at_sym('(') {
                        self.group()?;
                    }
                    self.skip_procedural()?;
                    if self.at_ident("else") {
                        self.advance(1);
                        self.skip_procedural()?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
        if t.kind == TokenKind::Macro {
            self.advance(1);
            if self.at_sym('(') {
                self.group()?;
            }
            if self.at_sym(';') {
                self.advance(1);
            }
            return Ok(());
        }
        self.statement().map(|_| ())
    }
}

/// Accumulates one module's declarations while rejecting duplicates.
struct ModuleBuilder {
    decl: ModuleDecl,
    ports: HashMap<String, usize>,
    signals: HashMap<String, usize>,
    instances: HashMap<String, usize>,
    issues: Vec<Issue>,
}

impl ModuleBuilder {
    fn duplicate(&mut self, what: &str, name: &str, line: u32) {
        self.issues.push(Issue {
            kind: DiagnosticKind::DuplicateDeclaration,
            line,
            message: format!("{what} '{name}' declared again in module '{}'", self.decl.name),
        });
    }

    fn header_port(&mut self, name: String, line: u32, head: Option<Head>, index: usize) {
        if self.ports.contains_key(&name) {
            self.duplicate("port", &name, line);
            return;
        }
        let declared = head.is_some();
        self.ports.insert(name.clone(), self.decl.ports.len());
        self.decl.ports.push(PortDecl {
            name,
            line,
            head: head.unwrap_or_default(),
            index: Some(index),
            declared,
        });
    }

    fn body_port(&mut self, d: Declared) {
        match self.ports.get(&d.name).copied() {
            Some(i) if !self.decl.ports[i].declared => {
                let port = &mut self.decl.ports[i];
                port.head = d.head;
                port.line = d.line;
                port.declared = true;
            }
            Some(_) => self.duplicate("port", &d.name, d.line),
            None => {
                self.ports.insert(d.name.clone(), self.decl.ports.len());
                self.decl.ports.push(PortDecl {
                    name: d.name,
                    line: d.line,
                    head: d.head,
                    index: None,
                    declared: true,
                });
            }
        }
    }

    fn signal(&mut self, d: Declared) {
        if let Some(&i) = self.ports.get(&d.name) {
            // `output q; reg [3:0] q;` types the port instead.
            let port = &mut self.decl.ports[i];
            if port.head.net_type.is_none() {
                port.head.net_type = d.head.net_type;
            }
            if port.head.packed.is_empty() {
                port.head.packed = d.head.packed;
            }
            return;
        }
        if self.signals.contains_key(&d.name) {
            self.duplicate("signal", &d.name, d.line);
            return;
        }
        self.signals.insert(d.name.clone(), self.decl.signals.len());
        self.decl.signals.push(SignalDecl {
            name: d.name,
            line: d.line,
            head: d.head,
        });
    }

    fn instance(&mut self, inst: InstanceDecl) {
        if self.instances.contains_key(&inst.name) {
            self.duplicate("instance", &inst.name, inst.line);
            return;
        }
        self.instances.insert(inst.name.clone(), self.decl.instances.len());
        self.decl.instances.push(inst);
    }

    fn malformed(&mut self, line: u32, what: &str) {
        self.issues.push(Issue {
            kind: DiagnosticKind::MalformedStatement,
            line,
            message: format!("{what} in module '{}'; statement skipped", self.decl.name),
        });
    }

    fn stopped(&mut self, stop: Stop) {
        let (kind, line, message) = match stop {
            Stop::Unbalanced { line, what } => (
                DiagnosticKind::UnbalancedDelimiter,
                line,
                format!("unbalanced {what} in module '{}'; rest of module skipped", self.decl.name),
            ),
            Stop::TooDeep { line } => (
                DiagnosticKind::MalformedStatement,
                line,
                format!(
                    "statements nested deeper than {MAX_NESTING} levels in module '{}'; rest of module skipped",
                    self.decl.name
                ),
            ),
            Stop::Cancelled => return,
        };
        self.issues.push(Issue { kind, line, message });
    }
}

/// Runs the header and body passes over one module span.
///
/// Content problems become issues; only cancellation is an error.
pub fn scan_module(
    toks: &[Token],
    span: &ModuleSpan,
    cancel: &CancellationToken,
) -> Result<(ModuleDecl, Vec<Issue>), ParseError> {
    let mut b = ModuleBuilder {
        decl: ModuleDecl {
            name: span.name.clone(),
            line_start: span.line_start,
            line_end: span.line_end,
            ..ModuleDecl::default()
        },
        ports: HashMap::new(),
        signals: HashMap::new(),
        instances: HashMap::new(),
        issues: Vec::new(),
    };
    let mut cur = Cursor {
        toks: toks.get(span.start..span.end).unwrap_or_default(),
        pos: 0,
        depth: 0,
    };

    match scan_header(&mut cur, &mut b).and_then(|()| scan_body(&mut cur, &mut b, cancel)) {
        Ok(()) => {}
        Err(Stop::Cancelled) => return Err(ParseError::Cancelled),
        Err(stop) => b.stopped(stop),
    }
    Ok((b.decl, b.issues))
}

fn scan_header(cur: &mut Cursor<'_>, b: &mut ModuleBuilder) -> Result<(), Stop> {
    while cur.at_ident("import") {
        cur.statement()?;
    }
    if cur.at_sym('#') && cur.peek_at(1).is_some_and(|t| t.is_sym('(')) {
        cur.advance(1);
        let params = cur.group()?;
        for chunk in split_commas(params) {
            if let Some((name, _)) = analyze(chunk).name {
                if !b.decl.parameters.contains(&name) {
                    b.decl.parameters.push(name);
                }
            }
        }
    }
    if cur.at_sym('(') {
        let list = cur.group()?;
        let chunks = split_commas(list);
        let ansi = chunks.iter().any(|chunk| {
            let item = analyze(chunk);
            !item.words.is_empty() || !item.packed.is_empty()
        });
        if ansi {
            for (index, d) in declarations(list).into_iter().enumerate() {
                b.header_port(d.name, d.line, Some(d.head), index);
            }
        } else {
            for (index, chunk) in chunks.iter().enumerate() {
                // `.ext(int)` names the port `ext`.
                let name = if chunk.first().is_some_and(|t| t.is_sym('.')) {
                    chunk.get(1)
                } else {
                    chunk.iter().find(|t| t.kind == TokenKind::Ident)
                };
                if let Some(t) = name {
                    b.header_port(t.text.clone(), t.line, None, index);
                }
            }
        }
    }
    // Anything else up to the header's `;` (e.g. a stray `import`).
    cur.statement()?;
    Ok(())
}

fn scan_body(
    cur: &mut Cursor<'_>,
    b: &mut ModuleBuilder,
    cancel: &CancellationToken,
) -> Result<(), Stop> {
    let mut items = 0usize;
    while cur.peek().is_some() {
        items += 1;
        if items % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(Stop::Cancelled);
        }
        let (before, line) = (cur.pos, cur.line());
        scan_item(cur, b)?;
        // Every item consumes at least one token.
        if cur.pos == before {
            b.malformed(line, "unexpected token");
            cur.advance(1);
        }
    }
    Ok(())
}

/// Scans one body statement or construct opener.
fn scan_item(cur: &mut Cursor<'_>, b: &mut ModuleBuilder) -> Result<(), Stop> {
    let Some(t) = cur.peek() else {
        return Ok(());
    };
    match t.kind {
        TokenKind::Ident => {}
        TokenKind::Macro => {
            cur.advance(1);
            if cur.at_sym('(') {
                cur.group()?;
            }
            return Ok(());
        }
        TokenKind::Symbol if t.is_sym(';') => {
            cur.advance(1);
            return Ok(());
        }
        TokenKind::Symbol if t.is_sym(':') && cur.peek_at(1).is_some_and(|n| n.is_sym(':')) => {
            b.malformed(t.line, "statement starts with '::'");
            cur.statement()?;
            return Ok(());
        }
        TokenKind::Symbol if t.is_sym(':') => {
            cur.skip_label();
            return Ok(());
        }
        TokenKind::Number if cur.peek_at(1).is_some_and(|n| n.is_sym(':')) => {
            cur.advance(2);
            return Ok(());
        }
        _ => {
            cur.statement()?;
            return Ok(());
        }
    }

    let word = t.text.as_str();
    if DIRECTIONS.contains(&word) {
        for d in declarations(cur.statement()?) {
            b.body_port(d);
        }
    } else if NET_TYPES.contains(&word) {
        for d in declarations(cur.statement()?) {
            b.signal(d);
        }
    } else if word == "parameter" {
        for chunk in split_commas(cur.statement()?) {
            if let Some((name, _)) = analyze(chunk).name {
                if !b.decl.parameters.contains(&name) {
                    b.decl.parameters.push(name);
                }
            }
        }
    } else if word == "default" && cur.peek_at(1).is_some_and(|n| n.is_sym(':')) {
        cur.advance(2);
    } else if SKIP_STATEMENTS.contains(&word) || PRIMITIVES.contains(&word) {
        cur.statement()?;
    } else if let Some((open, close)) = BLOCKS.iter().find(|(open, _)| *open == word) {
        cur.advance(1);
        cur.through(open, close)?;
    } else if PROCEDURAL.contains(&word) {
        cur.advance(1);
        cur.skip_procedural()?;
    } else if DELIMITERS.contains(&word) {
        cur.advance(1);
    } else if matches!(word, "if" | "for" | "case" | "casex" | "casez" | "while") {
        // Generate constructs: skip the condition, scan the body in place.
        cur.advance(1);
        if cur.at_sym('(') {
            cur.group()?;
        }
    } else if is_keyword(word) {
        cur.statement()?;
    } else if cur.peek_at(1).is_some_and(|n| n.is_sym(':'))
        && !cur.peek_at(2).is_some_and(|n| n.is_sym(':'))
    {
        // `label :` in a generate case or before a block.
        cur.advance(2);
    } else {
        scan_instance_or_typed(cur, b)?;
    }
    Ok(())
}

/// Handles a statement starting with a non-keyword identifier: a module
/// instantiation, a declaration with a user-defined type, or something else
/// that is skipped.
fn scan_instance_or_typed(cur: &mut Cursor<'_>, b: &mut ModuleBuilder) -> Result<(), Stop> {
    let start = cur.pos;
    let line = cur.line();
    let mut module_type = cur.peek().map(|t| t.text.clone()).unwrap_or_default();
    cur.advance(1);
    while cur.at_sym(':') && cur.peek_at(1).is_some_and(|t| t.is_sym(':')) {
        if let Some(scoped) = cur.peek_at(2) {
            module_type.push_str("::");
            module_type.push_str(&scoped.text);
        }
        cur.advance(3);
    }

    let mut overrides = None;
    if cur.at_sym('#') {
        cur.advance(1);
        if cur.at_sym('(') {
            overrides = Some(render(cur.group()?));
        } else {
            cur.advance(1);
        }
    }

    let is_name = |t: Option<&Token>| {
        t.is_some_and(|t| t.kind == TokenKind::Ident && !is_keyword(&t.text))
    };
    if !is_name(cur.peek()) {
        if overrides.is_some() {
            b.issues.push(Issue {
                kind: DiagnosticKind::MalformedInstance,
                line,
                message: format!("instance of '{module_type}' has no name"),
            });
        }
        cur.statement()?;
        return Ok(());
    }

    // Look past the name and any dimensions to decide what this is.
    let mut ahead = cur.pos + 1;
    while cur.toks.get(ahead).is_some_and(|t| t.is_sym('[')) {
        match close_of(cur.toks, ahead) {
            Some(end) => ahead = end + 1,
            None => break,
        }
    }
    let after = cur.toks.get(ahead);
    if overrides.is_none() && after.is_some_and(|t| t.is_sym(';') || t.is_sym(',') || t.is_sym('=')) {
        cur.pos = start;
        for d in declarations(cur.statement()?) {
            b.signal(d);
        }
        return Ok(());
    }
    if !after.is_some_and(|t| t.is_sym('(')) {
        if overrides.is_some() {
            b.issues.push(Issue {
                kind: DiagnosticKind::MalformedInstance,
                line,
                message: format!("instance of '{module_type}' has no port list"),
            });
        }
        cur.statement()?;
        return Ok(());
    }

    loop {
        let Some(name) = cur.peek().filter(|t| is_name(Some(*t))) else {
            b.issues.push(Issue {
                kind: DiagnosticKind::MalformedInstance,
                line: cur.line(),
                message: format!("expected an instance name in instantiation of '{module_type}'"),
            });
            cur.statement()?;
            return Ok(());
        };
        let name_line = name.line;
        cur.advance(1);

        let mut array = None;
        while cur.at_sym('[') {
            let dims_start = cur.pos;
            cur.group()?;
            array.get_or_insert_with(|| render(&cur.toks[dims_start..cur.pos]));
        }

        if !cur.at_sym('(') {
            b.issues.push(Issue {
                kind: DiagnosticKind::MalformedInstance,
                line: name_line,
                message: format!("instance '{}' of '{module_type}' has no port list", name.text),
            });
            cur.statement()?;
            return Ok(());
        }
        let conns = connections(cur.group()?);
        b.instance(InstanceDecl {
            name: name.text.clone(),
            line: name_line,
            module_type: module_type.clone(),
            parameter_overrides: overrides.clone(),
            array,
            connections: conns,
        });

        if cur.at_sym(',') {
            cur.advance(1);
            continue;
        }
        if cur.at_sym(';') {
            cur.advance(1);
        } else {
            b.issues.push(Issue {
                kind: DiagnosticKind::MalformedInstance,
                line: name_line,
                message: format!("expected ';' after instance '{}'", name.text),
            });
            cur.statement()?;
        }
        return Ok(());
    }
}

fn connections(list: &[Token]) -> Vec<Connection> {
    let mut out = Vec::new();
    for (index, chunk) in split_commas(list).into_iter().enumerate() {
        if chunk.is_empty() {
            continue;
        }
        if chunk[0].is_sym('.') {
            match chunk.get(1) {
                Some(t) if t.is_sym('*') => out.push(Connection {
                    port: PortRef::Wildcard,
                    expr: "*".to_string(),
                    base: None,
                }),
                Some(t) if t.kind == TokenKind::Ident => {
                    let (expr, base) = match chunk.get(2) {
                        Some(open) if open.is_sym('(') => {
                            let end = close_of(chunk, 2).unwrap_or(chunk.len() - 1);
                            let inner = &chunk[3..end.max(3)];
                            (render(inner), simple_base(inner))
                        }
                        // `.name` binds the same-named net.
                        _ => (t.text.clone(), Some(t.text.clone())),
                    };
                    out.push(Connection {
                        port: PortRef::Named(t.text.clone()),
                        expr,
                        base,
                    });
                }
                _ => {}
            }
        } else {
            out.push(Connection {
                port: PortRef::Positional(index),
                expr: render(chunk),
                base: simple_base(chunk),
            });
        }
    }
    out
}

//! Structural HDL parser for edaflow.
//!
//! Turns Verilog/SystemVerilog text into design-graph nodes and edges by
//! lexical passes (tokenize, module spans, header, body statements), without
//! a full grammar. Content problems become [`ParseDiagnostic`] values; only
//! cancellation and I/O are errors.

pub mod error;
pub mod config;
pub mod lexer;
pub mod verilog;
pub mod parse;
pub mod resolve;
pub mod discover;
pub mod pipeline;

// Re-export commonly used types
pub use error::{DiagnosticKind, ParseDiagnostic, ParseError};
pub use config::ParserConfig;
pub use parse::{parse_bytes, parse_source, ParsedFile};
pub use resolve::{resolve_dependencies, resolve_into, Resolution};
pub use discover::discover_sources;
pub use pipeline::{IndexReport, Indexer, Source};

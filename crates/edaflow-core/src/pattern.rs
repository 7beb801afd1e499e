//! Name lookup by substring or wildcard pattern.
//!
//! Matching rules:
//! - a pattern without `*` or `?` matches any name that contains it
//! - a pattern with wildcards must match the whole name; `*` matches any run
//!   of characters (possibly empty), `?` exactly one character
//! - matching is case-sensitive unless [`NamePattern::case_insensitive`] is set
//!
//! Results are sorted by node id.

use crate::graph::DesignGraph;
use crate::node::{GraphNode, NodeKind};

/// A compiled name pattern with lookup options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    chars: Vec<char>,
    wildcard: bool,
    case_insensitive: bool,
    kind: Option<NodeKind>,
}

impl NamePattern {
    pub fn new(pattern: &str) -> Self {
        NamePattern {
            chars: pattern.chars().collect(),
            wildcard: pattern.contains(['*', '?']),
            case_insensitive: false,
            kind: None,
        }
    }

    pub fn case_insensitive(mut self, yes: bool) -> Self {
        self.case_insensitive = yes;
        self
    }

    /// Restrict matches to one node kind.
    pub fn kind(mut self, kind: Option<NodeKind>) -> Self {
        self.kind = kind;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn matches_node(&self, node: &GraphNode) -> bool {
        self.kind.map_or(true, |k| node.kind == k) && self.matches(&node.name)
    }

    pub fn matches(&self, name: &str) -> bool {
        let name: Vec<char> = name.chars().collect();
        if self.wildcard {
            glob_match(&self.chars, &name, self.case_insensitive)
        } else {
            contains(&name, &self.chars, self.case_insensitive)
        }
    }
}

fn char_eq(a: char, b: char, fold: bool) -> bool {
    if fold {
        a == b || a.to_lowercase().eq(b.to_lowercase())
    } else {
        a == b
    }
}

fn contains(haystack: &[char], needle: &[char], fold: bool) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack
        .windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(&a, &b)| char_eq(a, b, fold)))
}

/// Iterative glob with single-star backtracking; linear in practice and never
/// exponential.
fn glob_match(pattern: &[char], name: &[char], fold: bool) -> bool {
    let (mut p, mut n) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while n < name.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            p += 1;
            resume = n;
        } else if p < pattern.len() && (pattern[p] == '?' || char_eq(pattern[p], name[n], fold)) {
            p += 1;
            n += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            n = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

impl DesignGraph {
    /// Nodes whose name matches `pattern` with default options.
    pub fn find_by_pattern(&self, pattern: &str) -> Vec<&GraphNode> {
        self.find_matching(&NamePattern::new(pattern))
    }

    /// Nodes matching a configured [`NamePattern`], sorted by id.
    pub fn find_matching(&self, pattern: &NamePattern) -> Vec<&GraphNode> {
        let mut found: Vec<&GraphNode> = self.nodes().filter(|n| pattern.matches_node(n)).collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found
    }
}

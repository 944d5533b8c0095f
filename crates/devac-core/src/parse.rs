//! Contract between the seed pipeline and language parsers
//!
//! Parsers are total: a syntax error yields a result with warnings, never an
//! `Err`. Unknown constructs degrade to `kind=unknown` or are skipped.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{Edge, ExternalRef, Node};

/// One coherent snapshot of a single source file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ParseResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external_refs: Vec<ExternalRef>,
    /// Hex SHA-256 of the file content; every emitted row carries this.
    pub source_file_hash: String,
    /// Package-relative, forward-slashed.
    pub file_path: String,
    pub parse_time_ms: u64,
    pub warnings: Vec<String>,
}

impl ParseResult {
    /// Result for a file that produced no symbols (empty or comment-only).
    pub fn empty(file_path: impl Into<String>, source_file_hash: impl Into<String>) -> Self {
        ParseResult {
            file_path: file_path.into(),
            source_file_hash: source_file_hash.into(),
            ..Default::default()
        }
    }
}

/// Identity of the package being parsed; flows into entity IDs.
#[derive(Debug, Clone)]
pub struct ParserContext {
    pub repo: String,
    pub package: String,
}

impl ParserContext {
    pub fn new(repo: impl Into<String>, package: impl Into<String>) -> Self {
        ParserContext {
            repo: repo.into(),
            package: package.into(),
        }
    }
}

/// A language parser pluggable into the update manager.
pub trait LanguageParser: Send + Sync {
    /// Language identifier, e.g. "typescript".
    fn language(&self) -> &'static str;

    /// Extensions this parser claims, with leading dot, e.g. `[".ts", ".tsx"]`.
    fn extensions(&self) -> &'static [&'static str];

    /// Whether this parser handles the given path. Type-declaration files
    /// (`*.d.ts`) carry no structural content and are declined.
    fn can_parse(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => return false,
        };
        if name.ends_with(".d.ts") {
            return false;
        }
        self.extensions().iter().any(|ext| name.ends_with(ext))
    }

    /// Parse file content under a virtual path (no filesystem access).
    fn parse_content(
        &self,
        content: &str,
        virtual_path: &str,
        ctx: &ParserContext,
    ) -> anyhow::Result<ParseResult>;

    /// Parse a file from disk. `rel_path` is the package-relative path
    /// recorded in the emitted rows.
    fn parse(&self, path: &Path, rel_path: &str, ctx: &ParserContext) -> anyhow::Result<ParseResult> {
        let content = std::fs::read_to_string(path)?;
        self.parse_content(&content, rel_path, ctx)
    }
}

//! Reference TypeScript/JavaScript parser for the seed pipeline
//!
//! Implements the `LanguageParser` contract from `devac-core` on top of
//! tree-sitter. Parsers are total: syntax errors surface as warnings on the
//! result, never as errors.

mod extract;
pub mod registry;
pub mod typescript;

pub use registry::ParserRegistry;
pub use typescript::{JavaScriptParser, TypeScriptParser};

#[cfg(test)]
mod tests;

//! TypeScript and JavaScript parser implementations

use std::time::Instant;

use anyhow::{Result, anyhow};
use devac_core::{LanguageParser, ParseResult, ParserContext, compute_content_hash, ids};
use tree_sitter::{Language, Parser};

use crate::extract::Extractor;

fn parse_with(
    language: Language,
    content: &str,
    virtual_path: &str,
    ctx: &ParserContext,
) -> Result<ParseResult> {
    let started = Instant::now();
    let file_path = ids::normalize_path(virtual_path);
    let file_hash = compute_content_hash(content.as_bytes());

    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|e| anyhow!("failed to set parser language: {e}"))?;

    // tree-sitter only returns None on cancellation or a missing language;
    // syntax errors still yield a tree with ERROR nodes.
    let Some(tree) = parser.parse(content, None) else {
        let mut result = ParseResult::empty(file_path, file_hash);
        result.warnings.push("parser produced no tree".to_string());
        result.parse_time_ms = started.elapsed().as_millis() as u64;
        return Ok(result);
    };

    let mut result = Extractor::run(tree.root_node(), content.as_bytes(), &file_path, &file_hash, ctx);
    result.parse_time_ms = started.elapsed().as_millis() as u64;
    Ok(result)
}

/// Parser for `.ts` / `.tsx` sources.
pub struct TypeScriptParser;

impl LanguageParser for TypeScriptParser {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".ts", ".tsx"]
    }

    fn parse_content(
        &self,
        content: &str,
        virtual_path: &str,
        ctx: &ParserContext,
    ) -> Result<ParseResult> {
        let language: Language = if virtual_path.ends_with(".tsx") {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        } else {
            tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
        };
        parse_with(language, content, virtual_path, ctx)
    }
}

/// Parser for `.js` / `.jsx` / `.mjs` / `.cjs` sources.
pub struct JavaScriptParser;

impl LanguageParser for JavaScriptParser {
    fn language(&self) -> &'static str {
        "javascript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".js", ".jsx", ".mjs", ".cjs"]
    }

    fn parse_content(
        &self,
        content: &str,
        virtual_path: &str,
        ctx: &ParserContext,
    ) -> Result<ParseResult> {
        parse_with(
            tree_sitter_javascript::LANGUAGE.into(),
            content,
            virtual_path,
            ctx,
        )
    }
}

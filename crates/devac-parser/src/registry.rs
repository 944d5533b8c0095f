//! Parser lookup by file extension

use std::path::Path;
use std::sync::Arc;

use devac_core::LanguageParser;

use crate::typescript::{JavaScriptParser, TypeScriptParser};

/// Set of registered language parsers.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        ParserRegistry {
            parsers: Vec::new(),
        }
    }

    /// Registry with the built-in TypeScript and JavaScript parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(TypeScriptParser));
        registry.register(Arc::new(JavaScriptParser));
        registry
    }

    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        self.parsers.push(parser);
    }

    /// First registered parser that claims the path.
    pub fn for_path(&self, path: &Path) -> Option<Arc<dyn LanguageParser>> {
        self.parsers.iter().find(|p| p.can_parse(path)).cloned()
    }

    /// All extensions claimed by any registered parser.
    pub fn extensions(&self) -> Vec<&'static str> {
        self.parsers
            .iter()
            .flat_map(|p| p.extensions().iter().copied())
            .collect()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

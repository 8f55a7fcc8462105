//! Language seam over tree-sitter parsing and querying.
//!
//! The engine consumes parsing through this trait so the grammar stays an
//! external capability. One implementation ships: TypeScript, whose grammar
//! also parses plain JavaScript.

use crate::error::{EngineError, Result};
use std::path::Path;
use tree_sitter::{Language as TsLanguage, Parser, Query, Tree};

/// A language the engine can parse and query.
pub trait Language: Send + Sync {
    /// Returns the name of the language.
    fn name(&self) -> &'static str;

    /// Returns the file extensions associated with this language.
    fn extensions(&self) -> &[&'static str];

    /// Returns the tree-sitter grammar.
    fn grammar(&self) -> TsLanguage;

    /// Parses source code into a tree-sitter AST.
    fn parse(&self, source: &str) -> Result<Tree> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.grammar())
            .map_err(|e| EngineError::Parse {
                path: Path::new("<source>").to_path_buf(),
                message: format!("Failed to set language: {e}"),
            })?;

        parser
            .parse(source, None)
            .ok_or_else(|| EngineError::Parse {
                path: Path::new("<source>").to_path_buf(),
                message: "Failed to parse source".to_string(),
            })
    }

    /// Creates a tree-sitter query for this language.
    fn query(&self, pattern: &str) -> Result<Query> {
        Ok(Query::new(&self.grammar(), pattern)?)
    }

    /// Checks if this language handles the given file extension.
    fn matches_extension(&self, ext: &str) -> bool {
        self.extensions().iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// TypeScript (and JavaScript) support.
pub struct TypeScript;

impl Language for TypeScript {
    fn name(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &[&'static str] {
        &["ts", "tsx", "js", "jsx", "mjs", "cjs"]
    }

    fn grammar(&self) -> TsLanguage {
        tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typescript() {
        let tree = TypeScript.parse("export function hello(): void {}").unwrap();
        assert_eq!(tree.root_node().kind(), "program");
        assert!(!tree.root_node().has_error());
    }

    #[test]
    fn test_query_function_names() {
        let query = TypeScript
            .query("(function_declaration name: (identifier) @name)")
            .unwrap();
        assert_eq!(query.capture_names().len(), 1);
    }

    #[test]
    fn test_extension_matching() {
        assert!(TypeScript.matches_extension("ts"));
        assert!(TypeScript.matches_extension("TSX"));
        assert!(!TypeScript.matches_extension("py"));
    }
}

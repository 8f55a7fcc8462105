//! A loaded source file: text, syntax tree, and declaration lookup.

use std::ops::Range;
use std::path::{Path, PathBuf};

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, QueryCursor, Tree};

use crate::edit::EditScript;
use crate::error::{EngineError, Result};
use crate::lang::{Language, TypeScript};
use crate::symbols::{ParentScope, SymbolKind};

/// Quote character used for module specifiers in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteStyle {
    Single,
    Double,
}

impl QuoteStyle {
    pub fn char(&self) -> char {
        match self {
            QuoteStyle::Single => '\'',
            QuoteStyle::Double => '"',
        }
    }
}

/// A declaration found in a file.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    pub kind: SymbolKind,
    /// The declaration node itself (the declarator for variables, the member
    /// definition for methods and properties).
    pub span: Range<usize>,
    /// The declared identifier.
    pub name_span: Range<usize>,
    /// The whole statement, including an `export` keyword when present.
    pub statement_span: Range<usize>,
    pub is_exported: bool,
    /// Enclosing class name for members.
    pub parent_name: Option<String>,
    /// Number of declarators sharing the statement (variables only, else 1).
    pub declarator_count: usize,
    /// True when the statement sits directly in the program, not nested in
    /// another declaration's body.
    pub is_top_level: bool,
}

impl Declaration {
    /// True if this declaration matches an optional parent-scope filter.
    pub fn matches_scope(&self, scope: Option<&ParentScope>) -> bool {
        match scope {
            None => true,
            Some(scope) => self.parent_name.as_deref() == Some(scope.name.as_str()),
        }
    }
}

/// An in-memory handle to one parsed file.
///
/// The project model owns every handle; a handle's spans index into `text`
/// and are invalidated by any mutation.
pub struct SourceFile {
    path: PathBuf,
    text: String,
    tree: Tree,
    dirty: bool,
}

impl SourceFile {
    /// Parse `text` as the contents of `path`.
    pub fn parse(path: impl Into<PathBuf>, text: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let text = text.into();
        let tree = TypeScript.parse(&text).map_err(|e| match e {
            EngineError::Parse { message, .. } => EngineError::Parse {
                path: path.clone(),
                message,
            },
            other => other,
        })?;
        Ok(Self {
            path,
            text,
            tree,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// True when in-memory text has not been persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Replace the whole text and reparse.
    pub fn set_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.text = text.into();
        self.tree = TypeScript.parse(&self.text)?;
        self.dirty = true;
        Ok(())
    }

    /// Apply an edit script and reparse. Fails without modifying the file if
    /// the script overlaps or falls outside the text.
    pub fn apply_edits(&mut self, script: &EditScript) -> Result<()> {
        let new_text = script.apply(&self.text).ok_or_else(|| {
            EngineError::Validation(format!(
                "Edit script for {} is inconsistent (overlapping or out-of-range spans)",
                self.path.display()
            ))
        })?;
        self.set_text(new_text)
    }

    /// Dominant quote style of the file's module specifiers.
    pub fn quote_style(&self) -> QuoteStyle {
        let singles = self.text.matches("from '").count() + self.text.matches("import '").count();
        let doubles =
            self.text.matches("from \"").count() + self.text.matches("import \"").count();
        if doubles > singles {
            QuoteStyle::Double
        } else {
            QuoteStyle::Single
        }
    }

    /// Find all declarations of `kind`, optionally filtered by name.
    pub fn declarations(&self, kind: SymbolKind, name: Option<&str>) -> Result<Vec<Declaration>> {
        let query_str = declaration_query(kind);
        let query = TypeScript.query(query_str)?;
        let source_bytes = self.text.as_bytes();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, self.tree.root_node(), source_bytes);

        let mut out = Vec::new();
        while let Some(m) = matches.next() {
            let mut decl_name = None;
            let mut name_span = None;
            let mut def_node = None;

            for capture in m.captures {
                let capture_name = query.capture_names()[capture.index as usize];
                match capture_name {
                    "name" => {
                        decl_name = capture.node.utf8_text(source_bytes).ok().map(String::from);
                        name_span = Some(capture.node.byte_range());
                    }
                    "def" => def_node = Some(capture.node),
                    _ => {}
                }
            }

            let (Some(decl_name), Some(name_span), Some(def)) = (decl_name, name_span, def_node)
            else {
                continue;
            };
            if let Some(wanted) = name {
                if decl_name != wanted {
                    continue;
                }
            }
            out.push(self.build_declaration(decl_name, kind, name_span, def));
        }
        Ok(out)
    }

    /// Assemble a [`Declaration`] from the matched definition node.
    fn build_declaration(
        &self,
        name: String,
        kind: SymbolKind,
        name_span: Range<usize>,
        def: Node<'_>,
    ) -> Declaration {
        let source_bytes = self.text.as_bytes();

        // Statement node: climb out of declarators and export wrappers.
        let mut statement = def;
        let mut declarator_count = 1;
        if kind == SymbolKind::Variable {
            if let Some(parent) = def.parent() {
                if matches!(parent.kind(), "lexical_declaration" | "variable_declaration") {
                    declarator_count = parent
                        .named_children(&mut parent.walk())
                        .filter(|c| c.kind() == "variable_declarator")
                        .count();
                    statement = parent;
                }
            }
        }

        let mut is_exported = false;
        if let Some(parent) = statement.parent() {
            if parent.kind() == "export_statement" {
                is_exported = true;
                statement = parent;
            }
        }

        // Enclosing class for members.
        let mut parent_name = None;
        if kind.is_member() {
            let mut ancestor = def.parent();
            while let Some(node) = ancestor {
                if matches!(node.kind(), "class_declaration" | "abstract_class_declaration") {
                    parent_name = node
                        .child_by_field_name("name")
                        .and_then(|n| n.utf8_text(source_bytes).ok())
                        .map(String::from);
                    break;
                }
                ancestor = node.parent();
            }
        }

        let is_top_level = statement
            .parent()
            .is_some_and(|p| p.kind() == "program");

        Declaration {
            name,
            kind,
            span: def.byte_range(),
            name_span,
            statement_span: statement.byte_range(),
            is_exported,
            parent_name,
            declarator_count,
            is_top_level,
        }
    }

    /// All top-level declarations of every kind, for conflict checks and
    /// dependency-closure analysis of moves.
    pub fn all_top_level_declarations(&self) -> Result<Vec<Declaration>> {
        let mut out = Vec::new();
        for kind in [
            SymbolKind::Function,
            SymbolKind::Class,
            SymbolKind::Interface,
            SymbolKind::TypeAlias,
            SymbolKind::Enum,
            SymbolKind::Variable,
        ] {
            out.extend(
                self.declarations(kind, None)?
                    .into_iter()
                    .filter(|d| d.is_top_level),
            );
        }
        Ok(out)
    }

    /// Names exported from this file, including re-exported ones.
    pub fn exported_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .all_top_level_declarations()?
            .into_iter()
            .filter(|d| d.is_exported)
            .map(|d| d.name)
            .collect();

        // `export { a, b }` clauses, with or without a source.
        let query = TypeScript.query(
            "(export_statement (export_clause (export_specifier name: (identifier) @name)))",
        )?;
        let source_bytes = self.text.as_bytes();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, self.tree.root_node(), source_bytes);
        while let Some(m) = matches.next() {
            for capture in m.captures {
                if let Ok(text) = capture.node.utf8_text(source_bytes) {
                    if !names.iter().any(|n| n == text) {
                        names.push(text.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    /// Byte spans of every identifier-like node whose text equals `name`.
    pub fn identifier_spans(&self, name: &str) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        collect_identifiers(self.tree.root_node(), self.text.as_bytes(), name, &mut spans);
        spans
    }

    /// The line of text containing `offset`, trimmed, for messages.
    pub fn line_context(&self, offset: usize) -> String {
        let offset = offset.min(self.text.len());
        let start = self.text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let end = self.text[offset..]
            .find('\n')
            .map(|i| offset + i)
            .unwrap_or(self.text.len());
        self.text[start..end].trim().to_string()
    }
}

/// Identifier-like node kinds that can reference a declaration.
const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "type_identifier",
    "property_identifier",
    "shorthand_property_identifier",
    "shorthand_property_identifier_pattern",
];

fn collect_identifiers(node: Node<'_>, source: &[u8], name: &str, out: &mut Vec<Range<usize>>) {
    if IDENTIFIER_KINDS.contains(&node.kind()) {
        if node.utf8_text(source) == Ok(name) {
            out.push(node.byte_range());
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_identifiers(child, source, name, out);
    }
}

/// Tree-sitter query locating declarations of one kind.
fn declaration_query(kind: SymbolKind) -> &'static str {
    match kind {
        SymbolKind::Function => "(function_declaration name: (identifier) @name) @def",
        SymbolKind::Class => "(class_declaration name: (type_identifier) @name) @def",
        SymbolKind::Interface => "(interface_declaration name: (type_identifier) @name) @def",
        SymbolKind::TypeAlias => "(type_alias_declaration name: (type_identifier) @name) @def",
        SymbolKind::Enum => "(enum_declaration name: (identifier) @name) @def",
        SymbolKind::Variable => "(variable_declarator name: (identifier) @name) @def",
        SymbolKind::Method => "(method_definition name: (property_identifier) @name) @def",
        SymbolKind::Property => {
            "(public_field_definition name: (property_identifier) @name) @def"
        }
    }
}

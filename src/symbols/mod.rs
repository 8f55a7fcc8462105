//! Symbol model: declaration kinds, selectors, resolved symbols, references.
//!
//! ## Overview
//!
//! - **Selector**: a query identifying zero-or-one declaration by kind, name,
//!   file, and optional enclosing scope.
//! - **ResolvedSymbol**: a selector matched to a concrete declaration, with
//!   byte spans into the project model's current text.
//! - **Reference**: one use-site, found by identifier search or through
//!   import/export analysis.

mod resolver;

pub use resolver::{Eligibility, SymbolResolver};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

/// The kind of declaration a selector targets.
///
/// The match on this enum is exhaustive everywhere it is dispatched on, so a
/// new kind cannot silently fall through to a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    TypeAlias,
    Enum,
    Variable,
    Method,
    Property,
}

impl SymbolKind {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::TypeAlias => "type alias",
            SymbolKind::Enum => "enum",
            SymbolKind::Variable => "variable",
            SymbolKind::Method => "method",
            SymbolKind::Property => "property",
        }
    }

    /// True for kinds declared as members of a class rather than at the top
    /// level of a file.
    pub fn is_member(&self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Property)
    }

    /// The complementary member kind, used for conflict detection: a method
    /// clashes with an existing property of the same name and vice versa.
    pub fn complementary_member(&self) -> Option<SymbolKind> {
        match self {
            SymbolKind::Method => Some(SymbolKind::Property),
            SymbolKind::Property => Some(SymbolKind::Method),
            SymbolKind::Function
            | SymbolKind::Class
            | SymbolKind::Interface
            | SymbolKind::TypeAlias
            | SymbolKind::Enum
            | SymbolKind::Variable => None,
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Enclosing scope that disambiguates class members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentScope {
    pub kind: SymbolKind,
    pub name: String,
}

/// Identifies zero-or-one declaration in the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    pub kind: SymbolKind,
    pub name: String,
    pub file_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_scope: Option<ParentScope>,
}

impl Selector {
    /// Create a selector for a top-level declaration.
    pub fn new(kind: SymbolKind, name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            name: name.into(),
            file_path: file_path.into(),
            parent_scope: None,
        }
    }

    /// Scope the selector to an enclosing declaration.
    pub fn in_scope(mut self, kind: SymbolKind, name: impl Into<String>) -> Self {
        self.parent_scope = Some(ParentScope {
            kind,
            name: name.into(),
        });
        self
    }
}

/// How a reference was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceKind {
    /// A plain identifier use in code.
    Identifier,
    /// A named import specifier.
    Import,
    /// A re-export (`export { x } from ...`), the barrel-file edge direct
    /// identifier search misses.
    ReExport,
    /// Use through a namespace or barrel alias (`utils.getUserData`).
    NamespaceMember,
}

/// One use-site of a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub file: PathBuf,
    /// Byte span of the referencing identifier in that file's current text.
    pub span: Range<usize>,
    pub kind: ReferenceKind,
    /// The line containing the reference, for messages.
    pub context: String,
}

impl Reference {
    pub fn new(
        file: impl Into<PathBuf>,
        span: Range<usize>,
        kind: ReferenceKind,
        context: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            span,
            kind,
            context: context.into(),
        }
    }
}

/// A selector successfully matched to a concrete declaration.
///
/// Spans index into the project model's current text for `file_path` and are
/// invalidated by any mutation of that file; re-resolve after editing.
#[derive(Debug, Clone)]
pub struct ResolvedSymbol {
    pub name: String,
    pub kind: SymbolKind,
    pub file_path: PathBuf,
    /// Span of the full declaration (the whole statement for top-level kinds,
    /// the member definition for methods/properties).
    pub span: Range<usize>,
    /// Span of just the declared identifier.
    pub name_span: Range<usize>,
    /// For a declarator inside a multi-declarator statement, the span of the
    /// enclosing statement.
    pub statement_span: Range<usize>,
    pub is_exported: bool,
    pub references: Vec<Reference>,
}

impl ResolvedSymbol {
    /// References located outside the declaring file.
    pub fn external_references(&self) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(|r| r.file != self.file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_serde_round_trip() {
        let selector = Selector::new(SymbolKind::Method, "getUser", "src/userService.ts")
            .in_scope(SymbolKind::Class, "UserService");

        let json = serde_json::to_string(&selector).unwrap();
        assert!(json.contains("\"parentScope\""));
        let back: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, selector);
    }

    #[test]
    fn test_complementary_member_kinds() {
        assert_eq!(
            SymbolKind::Method.complementary_member(),
            Some(SymbolKind::Property)
        );
        assert_eq!(
            SymbolKind::Property.complementary_member(),
            Some(SymbolKind::Method)
        );
        assert_eq!(SymbolKind::Function.complementary_member(), None);
    }

    #[test]
    fn test_member_kinds() {
        assert!(SymbolKind::Method.is_member());
        assert!(!SymbolKind::Class.is_member());
    }
}

//! Selector resolution and project-wide reference discovery.

use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::imports::import_statements;
use crate::logging::SharedSink;
use crate::project::{ProjectModel, SourceFile};

use super::{Reference, ReferenceKind, ResolvedSymbol, Selector};

/// Outcome of an eligibility check before an operation runs.
///
/// Blockers stop the operation; warnings are reported but never block.
#[derive(Debug, Clone, Default)]
pub struct Eligibility {
    pub can_proceed: bool,
    pub blockers: Vec<String>,
    pub warnings: Vec<String>,
}

impl Eligibility {
    pub fn ok() -> Self {
        Self {
            can_proceed: true,
            blockers: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn block(&mut self, message: impl Into<String>) {
        self.can_proceed = false;
        self.blockers.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Resolves selectors against the project model and finds use-sites.
pub struct SymbolResolver {
    sink: SharedSink,
}

impl SymbolResolver {
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }

    /// Match a selector to its declaration, or `None` when the file or the
    /// declaration does not exist. Ambiguity resolves to the first
    /// declaration in source order.
    pub fn resolve(
        &self,
        model: &mut ProjectModel,
        selector: &Selector,
    ) -> Result<Option<ResolvedSymbol>> {
        let key = model.key(&selector.file_path);
        let Some(file) = model.ensure_mut(&key)? else {
            self.sink.debug(&format!(
                "resolve: file not found: {}",
                selector.file_path.display()
            ));
            return Ok(None);
        };

        let declarations = file.declarations(selector.kind, Some(&selector.name))?;
        let Some(decl) = declarations
            .iter()
            .find(|d| d.matches_scope(selector.parent_scope.as_ref()))
        else {
            return Ok(None);
        };

        let mut symbol = ResolvedSymbol {
            name: decl.name.clone(),
            kind: decl.kind,
            file_path: key,
            span: decl.span.clone(),
            name_span: decl.name_span.clone(),
            statement_span: decl.statement_span.clone(),
            is_exported: decl.is_exported,
            references: Vec::new(),
        };
        symbol.references = self.references(model, &symbol)?;
        Ok(Some(symbol))
    }

    /// Find every use-site of `symbol` across the project. A file outside the
    /// declaring one only contributes occurrences when it actually binds the
    /// symbol: a named or default import resolving to the declaring file (or
    /// to a barrel forwarding it), a re-export of the name, or a member
    /// access through a namespace alias of such a module. A same-named local
    /// in an unrelated file is not a reference.
    pub fn references(
        &self,
        model: &mut ProjectModel,
        symbol: &ResolvedSymbol,
    ) -> Result<Vec<Reference>> {
        let mut references = if symbol.kind.is_member() {
            member_references(model, symbol)?
        } else {
            top_level_references(model, symbol)?
        };
        references.sort_by(|a, b| (&a.file, a.span.start).cmp(&(&b.file, b.span.start)));
        self.sink.debug(&format!(
            "references: {} use-site(s) of {} {}",
            references.len(),
            symbol.kind,
            symbol.name
        ));
        Ok(references)
    }

    /// Check whether `symbol` can be moved to another file.
    pub fn validate_for_move(&self, symbol: &ResolvedSymbol) -> Eligibility {
        let mut eligibility = Eligibility::ok();
        if symbol.kind.is_member() {
            eligibility.block(format!(
                "cannot move {} '{}': class members cannot be moved independently of their class",
                symbol.kind, symbol.name
            ));
        }
        if !symbol.is_exported && symbol.external_references().next().is_some() {
            eligibility.warn(format!(
                "'{}' is not exported but is referenced outside its file",
                symbol.name
            ));
        }
        eligibility
    }

    /// Check whether `symbol` can be removed. Every external reference is a
    /// blocker; internal references inside the declaring file only warn.
    pub fn validate_for_removal(&self, symbol: &ResolvedSymbol) -> Eligibility {
        let mut eligibility = Eligibility::ok();
        for reference in symbol.external_references() {
            eligibility.block(format!(
                "'{}' is referenced in {}: {}",
                symbol.name,
                reference.file.display(),
                reference.context
            ));
        }
        let internal = symbol
            .references
            .iter()
            .filter(|r| r.file == symbol.file_path)
            .count();
        if internal > 0 {
            eligibility.warn(format!(
                "'{}' has {internal} reference(s) within its own file",
                symbol.name
            ));
        }
        eligibility
    }
}

fn top_level_references(
    model: &mut ProjectModel,
    symbol: &ResolvedSymbol,
) -> Result<Vec<Reference>> {
    let origins = export_origins(model, symbol)?;
    let mut references = Vec::new();
    for path in model.project_files() {
        if path == symbol.file_path {
            declaring_file_references(model, symbol, &path, &mut references)?;
            continue;
        }
        let access = file_access(model, &path, &symbol.name, &origins)?;
        if !access.reaches() {
            continue;
        }
        let Some(file) = model.ensure_mut(&path)? else {
            continue;
        };
        let (import_spans, re_export_spans) = statement_spans(file);
        let text = file.text();
        for span in file.identifier_spans(&symbol.name) {
            let kind = if within_any(&access.import_spans, &span) {
                ReferenceKind::Import
            } else if within_any(&access.re_export_spans, &span) {
                ReferenceKind::ReExport
            } else if within_any(&import_spans, &span) || within_any(&re_export_spans, &span) {
                // A same-named specifier bound from an unrelated module.
                continue;
            } else if let Some(receiver) = member_receiver(text, span.start) {
                if access.aliases.iter().any(|a| *a == receiver) {
                    ReferenceKind::NamespaceMember
                } else {
                    continue;
                }
            } else if access.binds_name {
                ReferenceKind::Identifier
            } else {
                continue;
            };
            let context = file.line_context(span.start);
            references.push(Reference::new(&path, span, kind, context));
        }
    }
    Ok(references)
}

/// Member names are never imported, so their use-sites are property accesses:
/// `receiver.name` anywhere in the project, plus every occurrence inside the
/// declaring file. A bare identifier in another file is not a member use.
fn member_references(
    model: &mut ProjectModel,
    symbol: &ResolvedSymbol,
) -> Result<Vec<Reference>> {
    let mut references = Vec::new();
    for path in model.project_files() {
        let is_declaring = path == symbol.file_path;
        let Some(file) = model.ensure_mut(&path)? else {
            continue;
        };
        let text = file.text();
        for span in file.identifier_spans(&symbol.name) {
            if is_declaring && covers(&symbol.statement_span, &span) {
                continue;
            }
            let is_access = member_receiver(text, span.start).is_some();
            if !is_declaring && !is_access {
                continue;
            }
            let kind = if is_access {
                ReferenceKind::NamespaceMember
            } else {
                ReferenceKind::Identifier
            };
            let context = file.line_context(span.start);
            references.push(Reference::new(&path, span, kind, context));
        }
    }
    Ok(references)
}

/// Everything in the declaring file counts except the declaration itself.
fn declaring_file_references(
    model: &mut ProjectModel,
    symbol: &ResolvedSymbol,
    path: &Path,
    references: &mut Vec<Reference>,
) -> Result<()> {
    let Some(file) = model.ensure_mut(path)? else {
        return Ok(());
    };
    let (import_spans, re_export_spans) = statement_spans(file);
    let text = file.text();
    for span in file.identifier_spans(&symbol.name) {
        if covers(&symbol.statement_span, &span) {
            continue;
        }
        let kind = if within_any(&import_spans, &span) {
            ReferenceKind::Import
        } else if within_any(&re_export_spans, &span) {
            ReferenceKind::ReExport
        } else if span.start > 0 && text.as_bytes()[span.start - 1] == b'.' {
            ReferenceKind::NamespaceMember
        } else {
            ReferenceKind::Identifier
        };
        let context = file.line_context(span.start);
        references.push(Reference::new(path, span, kind, context));
    }
    Ok(())
}

/// How a non-declaring file can reach a top-level symbol.
#[derive(Default)]
struct FileAccess {
    /// The file binds the name directly, via a named import without an alias
    /// or a default import.
    binds_name: bool,
    /// Import statements naming the symbol from an exporting module.
    import_spans: Vec<Range<usize>>,
    /// Re-export statements forwarding the symbol.
    re_export_spans: Vec<Range<usize>>,
    /// Namespace aliases bound to exporting modules.
    aliases: Vec<String>,
}

impl FileAccess {
    fn reaches(&self) -> bool {
        self.binds_name
            || !self.import_spans.is_empty()
            || !self.re_export_spans.is_empty()
            || !self.aliases.is_empty()
    }
}

fn file_access(
    model: &mut ProjectModel,
    path: &Path,
    name: &str,
    origins: &[PathBuf],
) -> Result<FileAccess> {
    let mut access = FileAccess::default();
    let Some(file) = model.ensure_mut(path)? else {
        return Ok(access);
    };
    let parsed = import_statements(file);
    let resolver = model.resolver();
    for (span, edge) in parsed {
        let from_origin = origins
            .iter()
            .any(|o| resolver.specifier_points_to(path, &edge.module_specifier, o));
        if !from_origin {
            continue;
        }
        if edge.is_re_export {
            if edge.named.iter().any(|s| s.name == name) {
                access.re_export_spans.push(span);
            }
            continue;
        }
        if edge.named.iter().any(|s| s.name == name) {
            access.import_spans.push(span.clone());
            if edge.named.iter().any(|s| s.name == name && s.alias.is_none()) {
                access.binds_name = true;
            }
        }
        if edge.default_import.as_deref() == Some(name) {
            access.import_spans.push(span.clone());
            access.binds_name = true;
        }
        if let Some(alias) = edge.namespace_import {
            access.aliases.push(alias);
        }
    }
    Ok(access)
}

/// The modules exporting the symbol: the declaring file plus every barrel
/// re-exporting it from one of them, transitively.
fn export_origins(model: &mut ProjectModel, symbol: &ResolvedSymbol) -> Result<Vec<PathBuf>> {
    let mut origins = vec![symbol.file_path.clone()];
    loop {
        let mut grew = false;
        for path in model.project_files() {
            if origins.contains(&path) {
                continue;
            }
            let Some(file) = model.ensure_mut(&path)? else {
                continue;
            };
            let edges: Vec<_> = import_statements(file)
                .into_iter()
                .map(|(_, edge)| edge)
                .collect();
            let resolver = model.resolver();
            let forwards = edges.iter().any(|edge| {
                edge.is_re_export
                    && (edge.is_star || edge.named.iter().any(|s| s.name == symbol.name))
                    && origins
                        .iter()
                        .any(|o| resolver.specifier_points_to(&path, &edge.module_specifier, o))
            });
            if forwards {
                origins.push(path);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }
    Ok(origins)
}

/// The identifier directly before a `.` preceding `start`, if any.
fn member_receiver(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    if start == 0 || bytes[start - 1] != b'.' {
        return None;
    }
    let mut i = start - 1;
    while i > 0 && is_ident_byte(bytes[i - 1]) {
        i -= 1;
    }
    if i == start - 1 {
        return None;
    }
    Some(&text[i..start - 1])
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn covers(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    inner.start >= outer.start && inner.end <= outer.end
}

fn within_any(spans: &[Range<usize>], span: &Range<usize>) -> bool {
    spans.iter().any(|s| covers(s, span))
}

/// Spans of import statements and of re-export statements (`export ... from`)
/// at the top level of a file.
fn statement_spans(file: &SourceFile) -> (Vec<Range<usize>>, Vec<Range<usize>>) {
    let mut imports = Vec::new();
    let mut re_exports = Vec::new();
    let root = file.tree().root_node();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        match child.kind() {
            "import_statement" => imports.push(child.byte_range()),
            "export_statement" if child.child_by_field_name("source").is_some() => {
                re_exports.push(child.byte_range());
            }
            _ => {}
        }
    }
    (imports, re_exports)
}

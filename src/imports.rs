//! Virtual import model: per-file import/export edges mutated independently
//! of file text and flushed atomically.
//!
//! Operations never splice import statements directly. They mutate this
//! model, and [`VirtualImportManager::write_back`] rewrites each touched
//! file's import block in one pass, ordered by original insertion index with
//! quote style preserved per edge. The two-phase design avoids
//! order-dependent partial edits when many symbols move in and out of the
//! same file within one batch.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tree_sitter::Node;

use crate::edit::{Edit, EditScript, expand_to_lines};
use crate::error::Result;
use crate::logging::SharedSink;
use crate::project::{ProjectModel, QuoteStyle, SourceFile};

/// One named specifier of an import or re-export clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSpecifier {
    /// The exported name being imported.
    pub name: String,
    /// Local alias (`import { a as b }`).
    pub alias: Option<String>,
}

impl NamedSpecifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }

    /// The name the file binds locally.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} as {}", self.name, alias),
            None => self.name.clone(),
        }
    }
}

/// One import or re-export edge of a file.
///
/// Invariant: a file holds at most one edge per
/// `(module_specifier, is_re_export)` pair.
#[derive(Debug, Clone)]
pub struct VirtualImport {
    pub module_specifier: String,
    pub named: Vec<NamedSpecifier>,
    pub default_import: Option<String>,
    pub namespace_import: Option<String>,
    pub is_type_only: bool,
    pub is_re_export: bool,
    /// `export * from ...`.
    pub is_star: bool,
    /// Bare `import './side-effect';`.
    pub is_side_effect: bool,
    /// Position of the original statement; new edges sort after all
    /// originals, preserving insertion order.
    pub original_index: usize,
    pub quote: QuoteStyle,
}

impl VirtualImport {
    fn new(module_specifier: impl Into<String>, index: usize, quote: QuoteStyle) -> Self {
        Self {
            module_specifier: module_specifier.into(),
            named: Vec::new(),
            default_import: None,
            namespace_import: None,
            is_type_only: false,
            is_re_export: false,
            is_star: false,
            is_side_effect: false,
            original_index: index,
            quote,
        }
    }

    /// True when nothing is imported or re-exported through this edge and it
    /// never was a bare side-effect import.
    fn is_empty(&self) -> bool {
        self.named.is_empty()
            && self.default_import.is_none()
            && self.namespace_import.is_none()
            && !self.is_star
            && !self.is_side_effect
    }

    /// Render the edge back to a statement.
    fn render(&self) -> String {
        let q = self.quote.char();
        let spec = format!("{q}{}{q}", self.module_specifier);

        if self.is_re_export {
            if self.is_star {
                return format!("export * from {spec};");
            }
            let kw = if self.is_type_only { "export type" } else { "export" };
            let names: Vec<String> = self.named.iter().map(NamedSpecifier::render).collect();
            return format!("{kw} {{ {} }} from {spec};", names.join(", "));
        }

        if self.is_side_effect {
            return format!("import {spec};");
        }

        let kw = if self.is_type_only { "import type" } else { "import" };
        let mut clauses = Vec::new();
        if let Some(default) = &self.default_import {
            clauses.push(default.clone());
        }
        if let Some(ns) = &self.namespace_import {
            clauses.push(format!("* as {ns}"));
        }
        if !self.named.is_empty() {
            let names: Vec<String> = self.named.iter().map(NamedSpecifier::render).collect();
            clauses.push(format!("{{ {} }}", names.join(", ")));
        }
        format!("{kw} {} from {spec};", clauses.join(", "))
    }
}

/// The virtual import set of one file.
#[derive(Debug)]
struct FileImports {
    edges: Vec<VirtualImport>,
    next_index: usize,
    default_quote: QuoteStyle,
    modified: bool,
}

/// Builds and flushes virtual import sets for touched files.
pub struct VirtualImportManager {
    files: HashMap<PathBuf, FileImports>,
    sink: SharedSink,
}

impl VirtualImportManager {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            files: HashMap::new(),
            sink,
        }
    }

    /// Parse a file's import/export declarations into the model on first
    /// touch; later touches are no-ops.
    pub fn touch(&mut self, model: &mut ProjectModel, path: &Path) -> Result<()> {
        let key = model.key(path);
        if self.files.contains_key(&key) {
            return Ok(());
        }
        let file = model.require_mut(&key)?;
        let default_quote = file.quote_style();
        let mut edges: Vec<VirtualImport> = Vec::new();
        for (_, parsed) in import_statements(file) {
            merge_edge(&mut edges, parsed);
        }
        let next_index = edges.len();
        self.files.insert(
            key,
            FileImports {
                edges,
                next_index,
                default_quote,
                modified: false,
            },
        );
        Ok(())
    }

    fn entry(&mut self, model: &ProjectModel, path: &Path) -> &mut FileImports {
        let key = model.key(path);
        self.files.get_mut(&key).expect("file not touched")
    }

    /// Current edges for a touched file.
    pub fn edges(&self, model: &ProjectModel, path: &Path) -> &[VirtualImport] {
        self.files
            .get(&model.key(path))
            .map(|f| f.edges.as_slice())
            .unwrap_or(&[])
    }

    /// Add a named import of `symbol` from `module_specifier`.
    ///
    /// Silently dropped when the specifier resolves back to the importing
    /// file itself (self-import guard).
    pub fn add_named_import(
        &mut self,
        model: &mut ProjectModel,
        path: &Path,
        symbol: &str,
        module_specifier: &str,
    ) -> Result<()> {
        self.add_named(model, path, symbol, module_specifier, false)
    }

    /// Add a named re-export of `symbol` from `module_specifier`.
    pub fn add_named_re_export(
        &mut self,
        model: &mut ProjectModel,
        path: &Path,
        symbol: &str,
        module_specifier: &str,
    ) -> Result<()> {
        self.add_named(model, path, symbol, module_specifier, true)
    }

    fn add_named(
        &mut self,
        model: &mut ProjectModel,
        path: &Path,
        symbol: &str,
        module_specifier: &str,
        re_export: bool,
    ) -> Result<()> {
        let key = model.key(path);
        if model
            .resolver()
            .specifier_points_to(&key, module_specifier, &key)
        {
            self.sink.debug(&format!(
                "dropping self-import of '{symbol}' in {}",
                key.display()
            ));
            return Ok(());
        }
        self.touch(model, &key)?;
        let entry = self.entry(model, &key);
        let quote = entry.default_quote;
        let index = entry.next_index;

        let pos = entry
            .edges
            .iter()
            .position(|e| e.module_specifier == module_specifier && e.is_re_export == re_export);
        let pos = match pos {
            Some(pos) => pos,
            None => {
                entry.next_index += 1;
                let mut edge = VirtualImport::new(module_specifier, index, quote);
                edge.is_re_export = re_export;
                entry.edges.push(edge);
                entry.edges.len() - 1
            }
        };
        let edge = &mut entry.edges[pos];
        if !edge.named.iter().any(|s| s.name == symbol) {
            edge.named.push(NamedSpecifier::new(symbol));
            entry.modified = true;
        }
        Ok(())
    }

    /// Remove a named import of `symbol`; with `module_specifier` given, only
    /// from that edge. Empty edges are dropped.
    pub fn remove_named_import(
        &mut self,
        model: &mut ProjectModel,
        path: &Path,
        symbol: &str,
        module_specifier: Option<&str>,
    ) -> Result<()> {
        let key = model.key(path);
        self.touch(model, &key)?;
        let entry = self.entry(model, &key);
        let mut removed = false;
        for edge in entry.edges.iter_mut() {
            if edge.is_re_export {
                continue;
            }
            if let Some(spec) = module_specifier {
                if edge.module_specifier != spec {
                    continue;
                }
            }
            let before = edge.named.len();
            edge.named.retain(|s| s.name != symbol);
            removed |= edge.named.len() != before;
        }
        if removed {
            entry.edges.retain(|e| !e.is_empty());
            entry.modified = true;
        }
        Ok(())
    }

    /// Repoint imports of `symbol` from `old_module` to `new_module`.
    ///
    /// Named and default imports move to the new module. A namespace import
    /// of the old module is preserved and a direct named import of the
    /// symbol is added alongside it.
    pub fn update_import_path(
        &mut self,
        model: &mut ProjectModel,
        path: &Path,
        symbol: &str,
        old_module: &str,
        new_module: &str,
    ) -> Result<()> {
        let key = model.key(path);
        self.touch(model, &key)?;

        let mut move_named = false;
        let mut move_default = false;
        let mut move_re_export = false;
        let mut alongside_namespace = false;
        {
            let entry = self.entry(model, &key);
            for edge in entry.edges.iter_mut() {
                if edge.module_specifier != old_module {
                    continue;
                }
                if edge.named.iter().any(|s| s.name == symbol) {
                    edge.named.retain(|s| s.name != symbol);
                    if edge.is_re_export {
                        move_re_export = true;
                    } else {
                        move_named = true;
                    }
                    entry.modified = true;
                }
                if !edge.is_re_export && edge.default_import.as_deref() == Some(symbol) {
                    edge.default_import = None;
                    move_default = true;
                    entry.modified = true;
                }
                if !edge.is_re_export && edge.namespace_import.is_some() {
                    alongside_namespace = true;
                }
            }
            entry.edges.retain(|e| !e.is_empty());
        }

        if move_named || move_default || alongside_namespace {
            self.add_named_import(model, &key, symbol, new_module)?;
        }
        if move_re_export {
            self.add_named_re_export(model, &key, symbol, new_module)?;
        }
        Ok(())
    }

    /// Remove named imports whose only in-file reference is the import
    /// statement itself.
    pub fn remove_unused_imports(&mut self, model: &mut ProjectModel, path: &Path) -> Result<Vec<String>> {
        let key = model.key(path);
        self.touch(model, &key)?;

        let statement_spans: Vec<Range<usize>> = {
            let file = model.require_mut(&key)?;
            import_statements(file).into_iter().map(|(s, _)| s).collect()
        };
        let local_names: Vec<String> = self
            .edges(model, &key)
            .iter()
            .filter(|e| !e.is_re_export)
            .flat_map(|e| e.named.iter().map(|s| s.local_name().to_string()))
            .collect();

        let mut unused = Vec::new();
        for name in local_names {
            let file = model.require_mut(&key)?;
            let uses = file
                .identifier_spans(&name)
                .into_iter()
                .filter(|span| !statement_spans.iter().any(|s| covers(s, span)))
                .count();
            if uses == 0 {
                unused.push(name);
            }
        }

        let entry = self.entry(model, &key);
        for name in &unused {
            for edge in entry.edges.iter_mut() {
                if !edge.is_re_export {
                    edge.named.retain(|s| s.local_name() != name);
                }
            }
            entry.modified = true;
        }
        entry.edges.retain(|e| !e.is_empty());
        Ok(unused)
    }

    /// Flush every modified file: strip the current import/export-from
    /// statements, re-emit the virtual set ordered by original index, and
    /// persist. Returns the paths written.
    pub fn write_back(&mut self, model: &mut ProjectModel) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        let paths: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|(_, f)| f.modified)
            .map(|(p, _)| p.clone())
            .collect();

        for path in paths {
            let entry = self.files.get_mut(&path).expect("known path");
            let mut edges = entry.edges.clone();
            edges.sort_by_key(|e| e.original_index);
            let rendered: String = edges
                .iter()
                .map(|e| format!("{}\n", e.render()))
                .collect();

            let file = model.require_mut(&path)?;
            // Spans are re-derived from the current tree: body edits made
            // since the first touch must not invalidate the flush.
            let spans: Vec<Range<usize>> = import_statements(file)
                .into_iter()
                .map(|(span, _)| expand_to_lines(file.text(), span))
                .collect();

            let mut script = EditScript::new();
            match spans.first() {
                Some(first) => {
                    script.push(Edit::replace(first.clone(), rendered));
                    for span in &spans[1..] {
                        script.push(Edit::delete(span.clone()));
                    }
                }
                None => {
                    if !rendered.is_empty() {
                        script.push(Edit::insert(0, rendered));
                    }
                }
            }
            if !script.is_empty() {
                file.apply_edits(&script)?;
            }
            model.persist(&path)?;
            entry.modified = false;
            self.sink.debug(&format!("rewrote imports in {}", path.display()));
            written.push(path);
        }
        Ok(written)
    }
}

fn covers(outer: &Range<usize>, inner: &Range<usize>) -> bool {
    outer.start <= inner.start && inner.end <= outer.end
}

/// Merge a parsed statement into the edge set, keeping the invariant of one
/// edge per `(module_specifier, is_re_export)`.
fn merge_edge(edges: &mut Vec<VirtualImport>, parsed: VirtualImport) {
    if let Some(existing) = edges.iter_mut().find(|e| {
        e.module_specifier == parsed.module_specifier && e.is_re_export == parsed.is_re_export
    }) {
        for spec in parsed.named {
            if !existing.named.iter().any(|s| s.name == spec.name) {
                existing.named.push(spec);
            }
        }
        existing.default_import = existing.default_import.take().or(parsed.default_import);
        existing.namespace_import = existing.namespace_import.take().or(parsed.namespace_import);
        existing.is_star |= parsed.is_star;
        existing.is_side_effect |= parsed.is_side_effect;
    } else {
        edges.push(parsed);
    }
}

/// Extract all import statements and export-from statements of a file as
/// `(span, parsed edge)` pairs, in document order.
pub(crate) fn import_statements(file: &SourceFile) -> Vec<(Range<usize>, VirtualImport)> {
    let root = file.tree().root_node();
    let text = file.text();
    let mut out = Vec::new();
    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "import_statement" => {
                if let Some(edge) = parse_import(node, text, out.len()) {
                    out.push((node.byte_range(), edge));
                }
            }
            "export_statement" => {
                // Only re-exports (with a source) belong to the model.
                if node.child_by_field_name("source").is_some() {
                    if let Some(edge) = parse_re_export(node, text, out.len()) {
                        out.push((node.byte_range(), edge));
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn specifier_and_quote(source_node: Node<'_>, text: &str) -> Option<(String, QuoteStyle)> {
    let raw = &text[source_node.byte_range()];
    let quote = if raw.starts_with('"') {
        QuoteStyle::Double
    } else {
        QuoteStyle::Single
    };
    let spec = raw.trim_matches(|c| c == '\'' || c == '"').to_string();
    Some((spec, quote))
}

fn parse_named_specifiers(clause: Node<'_>, text: &str) -> Vec<NamedSpecifier> {
    let mut out = Vec::new();
    let mut cursor = clause.walk();
    for spec in clause.named_children(&mut cursor) {
        if !matches!(spec.kind(), "import_specifier" | "export_specifier") {
            continue;
        }
        let name = spec
            .child_by_field_name("name")
            .map(|n| text[n.byte_range()].to_string());
        let alias = spec
            .child_by_field_name("alias")
            .map(|n| text[n.byte_range()].to_string());
        if let Some(name) = name {
            out.push(NamedSpecifier { name, alias });
        }
    }
    out
}

fn parse_import(node: Node<'_>, text: &str, index: usize) -> Option<VirtualImport> {
    let source = node.child_by_field_name("source")?;
    let (spec, quote) = specifier_and_quote(source, text)?;
    let mut edge = VirtualImport::new(spec, index, quote);
    edge.is_type_only = text[node.byte_range()].starts_with("import type");

    let mut clause = None;
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "import_clause" {
            clause = Some(child);
        }
    }
    let Some(clause) = clause else {
        edge.is_side_effect = true;
        return Some(edge);
    };

    let mut cursor = clause.walk();
    for child in clause.named_children(&mut cursor) {
        match child.kind() {
            "identifier" => edge.default_import = Some(text[child.byte_range()].to_string()),
            "namespace_import" => {
                let mut inner = child.walk();
                for grand in child.named_children(&mut inner) {
                    if grand.kind() == "identifier" {
                        edge.namespace_import = Some(text[grand.byte_range()].to_string());
                    }
                }
            }
            "named_imports" => edge.named = parse_named_specifiers(child, text),
            _ => {}
        }
    }
    Some(edge)
}

fn parse_re_export(node: Node<'_>, text: &str, index: usize) -> Option<VirtualImport> {
    let source = node.child_by_field_name("source")?;
    let (spec, quote) = specifier_and_quote(source, text)?;
    let mut edge = VirtualImport::new(spec, index, quote);
    edge.is_re_export = true;
    edge.is_type_only = text[node.byte_range()].starts_with("export type");

    let statement_text = &text[node.byte_range()];
    if statement_text.contains('*') && !statement_text.contains('{') {
        edge.is_star = true;
        return Some(edge);
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "export_clause" {
            edge.named = parse_named_specifiers(child, text);
        }
    }
    Some(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::logging::NullSink;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup(files: &[(&str, &str)]) -> (TempDir, ProjectModel, VirtualImportManager) {
        let dir = TempDir::new().unwrap();
        for (path, text) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, text).unwrap();
        }
        let model =
            ProjectModel::new(dir.path(), RetryPolicy::immediate(), Arc::new(NullSink)).unwrap();
        let manager = VirtualImportManager::new(Arc::new(NullSink));
        (dir, model, manager)
    }

    #[test]
    fn test_parse_import_forms() {
        let (_dir, mut model, mut manager) = setup(&[(
            "app.ts",
            "import def, { a, b as c } from './x';\nimport * as ns from \"./y\";\nimport './effect';\nexport { z } from './z';\n",
        )]);
        manager.touch(&mut model, Path::new("app.ts")).unwrap();
        let edges = manager.edges(&model, Path::new("app.ts")).to_vec();
        assert_eq!(edges.len(), 4);

        let x = edges.iter().find(|e| e.module_specifier == "./x").unwrap();
        assert_eq!(x.default_import.as_deref(), Some("def"));
        assert_eq!(x.named.len(), 2);
        assert_eq!(x.named[1].alias.as_deref(), Some("c"));
        assert_eq!(x.quote, QuoteStyle::Single);

        let y = edges.iter().find(|e| e.module_specifier == "./y").unwrap();
        assert_eq!(y.namespace_import.as_deref(), Some("ns"));
        assert_eq!(y.quote, QuoteStyle::Double);

        let effect = edges
            .iter()
            .find(|e| e.module_specifier == "./effect")
            .unwrap();
        assert!(effect.is_side_effect);

        let z = edges.iter().find(|e| e.is_re_export).unwrap();
        assert_eq!(z.named[0].name, "z");
    }

    #[test]
    fn test_render_preserves_quote_style() {
        let mut edge = VirtualImport::new("./mod", 0, QuoteStyle::Double);
        edge.named.push(NamedSpecifier::new("a"));
        assert_eq!(edge.render(), "import { a } from \"./mod\";");

        edge.quote = QuoteStyle::Single;
        edge.default_import = Some("def".into());
        assert_eq!(edge.render(), "import def, { a } from './mod';");
    }

    #[test]
    fn test_self_import_is_dropped() {
        let (_dir, mut model, mut manager) = setup(&[("a.ts", "export const a = 1;\n")]);
        manager
            .add_named_import(&mut model, Path::new("a.ts"), "a", "./a")
            .unwrap();
        manager.touch(&mut model, Path::new("a.ts")).unwrap();
        assert!(manager.edges(&model, Path::new("a.ts")).is_empty());
    }

    #[test]
    fn test_write_back_rewrites_and_orders() {
        let (dir, mut model, mut manager) = setup(&[(
            "app.ts",
            "import { a } from './a';\nimport { b } from './b';\n\nexport function run() { return a + b; }\n",
        )]);
        manager
            .add_named_import(&mut model, Path::new("app.ts"), "extra", "./b")
            .unwrap();
        manager
            .add_named_import(&mut model, Path::new("app.ts"), "fresh", "./c")
            .unwrap();
        let written = manager.write_back(&mut model).unwrap();
        assert_eq!(written.len(), 1);

        let text = fs::read_to_string(dir.path().join("app.ts")).unwrap();
        let a_pos = text.find("from './a'").unwrap();
        let b_pos = text.find("from './b'").unwrap();
        let c_pos = text.find("from './c'").unwrap();
        assert!(a_pos < b_pos && b_pos < c_pos);
        assert!(text.contains("import { b, extra } from './b';"));
        assert!(text.contains("export function run()"));
    }

    #[test]
    fn test_update_import_path_keeps_namespace() {
        let (_dir, mut model, mut manager) = setup(&[(
            "app.ts",
            "import * as svc from './old';\n\nsvc.getUserData();\n",
        )]);
        manager
            .update_import_path(&mut model, Path::new("app.ts"), "getUserData", "./old", "./new")
            .unwrap();
        let edges = manager.edges(&model, Path::new("app.ts")).to_vec();
        assert!(edges.iter().any(|e| e.namespace_import.is_some() && e.module_specifier == "./old"));
        assert!(edges.iter().any(|e| {
            e.module_specifier == "./new" && e.named.iter().any(|s| s.name == "getUserData")
        }));
    }

    #[test]
    fn test_remove_named_import() {
        let (_dir, mut model, mut manager) = setup(&[(
            "app.ts",
            "import { a, b } from './lib';\nimport { a as alias } from './other';\n\nexport const v = [a, b, alias];\n",
        )]);
        manager
            .remove_named_import(&mut model, Path::new("app.ts"), "a", Some("./lib"))
            .unwrap();
        let edges = manager.edges(&model, Path::new("app.ts")).to_vec();
        let lib = edges.iter().find(|e| e.module_specifier == "./lib").unwrap();
        assert_eq!(lib.named.len(), 1);
        assert_eq!(lib.named[0].name, "b");
        // The aliased import from the other module is untouched.
        assert!(edges.iter().any(|e| {
            e.module_specifier == "./other" && e.named.iter().any(|s| s.name == "a")
        }));

        manager
            .remove_named_import(&mut model, Path::new("app.ts"), "b", None)
            .unwrap();
        let edges = manager.edges(&model, Path::new("app.ts")).to_vec();
        assert!(!edges.iter().any(|e| e.module_specifier == "./lib"));
    }

    #[test]
    fn test_remove_unused_imports() {
        let (_dir, mut model, mut manager) = setup(&[(
            "app.ts",
            "import { used, unused } from './lib';\n\nexport const v = used();\n",
        )]);
        let removed = manager
            .remove_unused_imports(&mut model, Path::new("app.ts"))
            .unwrap();
        assert_eq!(removed, vec!["unused".to_string()]);
        let edges = manager.edges(&model, Path::new("app.ts")).to_vec();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].named.len(), 1);
        assert_eq!(edges[0].named[0].name, "used");
    }
}

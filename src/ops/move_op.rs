//! Move pipeline: relocate a top-level declaration to another file and
//! rewrite every import/export edge that pointed at the old location.

use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::edit::{Edit, EditScript};
use crate::error::{EngineError, Result};
use crate::imports::VirtualImportManager;
use crate::project::{Declaration, SourceFile};
use crate::symbols::{Selector, SymbolKind};

use super::{BatchContext, Engine, MoveOptions, Outcome, is_identifier, remove};

pub(crate) fn run(
    engine: &mut Engine,
    selector: &Selector,
    target_file: &Path,
    options: &MoveOptions,
    context: &mut BatchContext,
) -> Result<Outcome> {
    let mut outcome = Outcome::default();

    // Validation, all before any mutation.
    if selector.file_path.as_os_str().is_empty() {
        return Err(EngineError::Validation("source file path is empty".into()));
    }
    if target_file.as_os_str().is_empty() {
        return Err(EngineError::Validation("target file path is empty".into()));
    }
    if !is_identifier(&selector.name) {
        return Err(EngineError::Validation(format!(
            "'{}' is not a valid identifier",
            selector.name
        )));
    }
    let source_key = engine.model.key(&selector.file_path);
    let target_key = engine.model.key(target_file);
    if source_key == target_key {
        return Err(EngineError::Validation(
            "source and target are the same file".into(),
        ));
    }
    if selector.kind.is_member() {
        return Err(EngineError::Validation(format!(
            "cannot move {} '{}': class members cannot be moved independently of their class",
            selector.kind, selector.name
        )));
    }
    if !engine.model.exists(&source_key) {
        return Err(EngineError::Validation(format!(
            "source file not found: {}",
            source_key.display()
        )));
    }
    if let Some(target) = engine.model.ensure_mut(&target_key)? {
        // An exported name clashes even without a local declaration, e.g. a
        // re-export in a barrel target.
        let clash = target
            .all_top_level_declarations()?
            .iter()
            .any(|d| d.name == selector.name)
            || target.exported_names()?.iter().any(|n| n == &selector.name);
        if clash && !context.placed(&target_key, &selector.name) {
            return Err(EngineError::Validation(format!(
                "target file already declares or exports '{}'",
                selector.name
            )));
        }
    }

    // Locate.
    let Some(symbol) = engine.resolver.resolve(&mut engine.model, selector)? else {
        return Err(EngineError::Resolution {
            name: selector.name.clone(),
            kind: selector.kind.name().to_string(),
            path: selector.file_path.clone(),
        });
    };
    let eligibility = engine.resolver.validate_for_move(&symbol);
    if !eligibility.can_proceed {
        return Err(EngineError::Validation(eligibility.blockers.join("; ")));
    }
    outcome.warnings.extend(eligibility.warnings);

    // Plan the move from a single read of the source file.
    let plan = {
        let file = engine
            .model
            .get(&source_key)
            .ok_or_else(|| EngineError::FileNotFound(source_key.clone()))?;
        plan_move(file, selector)?
    };
    for warning in &plan.warnings {
        outcome.warnings.push(warning.clone());
    }

    let mut imports = VirtualImportManager::new(engine.sink.clone());

    // Splice the moved block into the target.
    {
        let target = engine.model.ensure_or_create(&target_key)?;
        let mut text = target.text().to_string();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&plan.moved_block);
        if !plan.moved_block.ends_with('\n') {
            text.push('\n');
        }
        target.set_text(text)?;
    }

    // Imports the moved code used in its old file, re-pointed to the target.
    for (name, old_spec) in &plan.used_imports {
        let new_spec = repoint_specifier(engine, &source_key, &target_key, old_spec);
        imports.add_named_import(&mut engine.model, &target_key, name, &new_spec)?;
    }
    // Helpers that stay behind get imported from the source file.
    if !plan.remaining_helpers.is_empty() {
        let helper_spec = engine
            .model
            .resolver()
            .module_specifier(&target_key, &source_key);
        for helper in &plan.remaining_helpers {
            imports.add_named_import(&mut engine.model, &target_key, helper, &helper_spec)?;
        }
    }

    // Remove from the source, moved helpers first (their spans re-resolve
    // per deletion), unless this is a copy.
    if !options.copy_only {
        remove::structural_delete(engine, selector, &source_key)?;
        for (kind, name) in &plan.moved_helpers {
            let helper_selector = Selector::new(*kind, name.clone(), &source_key);
            remove::structural_delete(engine, &helper_selector, &source_key)?;
        }
    }
    // Helpers left behind must be reachable from the target.
    if !plan.remaining_helpers.is_empty() {
        export_helpers(engine, &source_key, &plan)?;
    }

    context.record_move(target_key.clone(), &selector.name);

    // Rewrite every other importer of the symbol from the old path to the
    // new one.
    let importer_files =
        rewrite_importers(engine, &mut imports, selector, &source_key, &target_key)?;

    let mut affected = imports.write_back(&mut engine.model)?;
    for path in engine.model.persist_dirty()? {
        if !affected.contains(&path) {
            affected.push(path);
        }
    }
    for path in importer_files {
        if !affected.contains(&path) {
            affected.push(path);
        }
    }
    affected.sort();
    outcome.affected_files = affected;
    Ok(outcome)
}

/// Everything the move needs from the source file, computed before any
/// mutation invalidates spans.
struct MovePlan {
    /// Declaration text plus its dependency closure, export-prefixed.
    moved_block: String,
    /// Locally-declared helpers moved along with the symbol.
    moved_helpers: Vec<(SymbolKind, String)>,
    /// Helpers referenced by the moved code that stay in the source file.
    remaining_helpers: Vec<String>,
    /// `(local name, module specifier)` of source imports the moved code used.
    used_imports: Vec<(String, String)>,
    warnings: Vec<String>,
}

fn plan_move(file: &SourceFile, selector: &Selector) -> Result<MovePlan> {
    let text = file.text();
    let mut warnings = Vec::new();

    let declarations = file.declarations(selector.kind, Some(&selector.name))?;
    let declaration = declarations
        .iter()
        .find(|d| d.matches_scope(selector.parent_scope.as_ref()))
        .ok_or_else(|| EngineError::Validation(format!(
            "declaration '{}' disappeared while planning the move",
            selector.name
        )))?;
    let statement_span = &declaration.statement_span;

    let mut pieces: Vec<(usize, String)> = Vec::new();
    pieces.push((
        statement_span.start,
        exported_declaration_text(text, selector, statement_span, declaration.declarator_count),
    ));

    // Dependency closure: top-level helpers referenced inside the moved
    // declaration. A helper with no other use moves along; one still used
    // elsewhere stays and gets imported into the target.
    let mut moved_helpers = Vec::new();
    let mut remaining_helpers = Vec::new();
    for helper in file.all_top_level_declarations()? {
        if helper.name == selector.name {
            continue;
        }
        let spans = file.identifier_spans(&helper.name);
        let used_by_moved = spans.iter().any(|s| within(s, statement_span));
        if !used_by_moved {
            continue;
        }
        let used_elsewhere = spans
            .iter()
            .any(|s| !within(s, statement_span) && !within(s, &helper.statement_span));
        if used_elsewhere || helper.is_exported {
            remaining_helpers.push(helper.name.clone());
            if !helper.is_exported {
                warnings.push(format!(
                    "helper '{}' stays in the source file and was exported to remain reachable",
                    helper.name
                ));
            }
        } else {
            pieces.push((
                helper.statement_span.start,
                text[helper.statement_span.clone()].to_string(),
            ));
            moved_helpers.push((helper.kind, helper.name.clone()));
        }
    }
    pieces.sort_by_key(|(start, _)| *start);
    let moved_block = pieces
        .into_iter()
        .map(|(_, t)| t)
        .collect::<Vec<_>>()
        .join("\n\n");

    // Which of the file's imports does the moved block use?
    let mut used_imports = Vec::new();
    for (local, spec, supported) in imported_names(file) {
        let used = file
            .identifier_spans(&local)
            .iter()
            .any(|s| within(s, statement_span));
        if !used {
            continue;
        }
        if supported {
            used_imports.push((local, spec));
        } else {
            warnings.push(format!(
                "moved code uses '{local}' from {spec} via a default or namespace import; \
                 add that import to the target manually"
            ));
        }
    }

    Ok(MovePlan {
        moved_block,
        moved_helpers,
        remaining_helpers,
        used_imports,
        warnings,
    })
}

/// The statement text with an `export` prefix guaranteed, reduced to a single
/// declarator when the statement declares several.
fn exported_declaration_text(
    text: &str,
    selector: &Selector,
    statement_span: &Range<usize>,
    declarator_count: usize,
) -> String {
    let statement = &text[statement_span.clone()];
    if declarator_count > 1 {
        let stripped = statement.strip_prefix("export ").unwrap_or(statement);
        let keyword = stripped.split_whitespace().next().unwrap_or("const");
        if let Some(decl_start) = stripped.find(&selector.name) {
            let declarator = extract_declarator(&stripped[decl_start..]);
            return format!("export {keyword} {declarator};");
        }
    }
    if statement.starts_with("export") {
        statement.to_string()
    } else {
        format!("export {statement}")
    }
}

/// One declarator from a multi-declarator statement: up to the comma at
/// bracket depth zero, or the trailing semicolon.
fn extract_declarator(text: &str) -> &str {
    let mut depth = 0i32;
    for (i, b) in text.bytes().enumerate() {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth -= 1,
            b',' | b';' if depth == 0 => return text[..i].trim_end(),
            _ => {}
        }
    }
    text.trim_end().trim_end_matches(';')
}

/// `(local name, module specifier, supported)` of every import binding in a
/// file. Named specifiers are supported for re-pointing; default and
/// namespace bindings are reported but not moved.
fn imported_names(file: &SourceFile) -> Vec<(String, String, bool)> {
    let mut names = Vec::new();
    let text = file.text();
    let root = file.tree().root_node();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        if child.kind() != "import_statement" {
            continue;
        }
        let Some(source) = child.child_by_field_name("source") else {
            continue;
        };
        let spec = text[source.byte_range()]
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();
        let mut clause_cursor = child.walk();
        for clause in child.named_children(&mut clause_cursor) {
            if clause.kind() != "import_clause" {
                continue;
            }
            let mut inner = clause.walk();
            for part in clause.named_children(&mut inner) {
                match part.kind() {
                    "identifier" => {
                        names.push((text[part.byte_range()].to_string(), spec.clone(), false));
                    }
                    "namespace_import" => {
                        if let Some(alias) = part.named_child(0) {
                            names.push((
                                text[alias.byte_range()].to_string(),
                                spec.clone(),
                                false,
                            ));
                        }
                    }
                    "named_imports" => {
                        let mut specs = part.walk();
                        for item in part.named_children(&mut specs) {
                            if item.kind() != "import_specifier" {
                                continue;
                            }
                            let local = item
                                .child_by_field_name("alias")
                                .or_else(|| item.child_by_field_name("name"));
                            if let Some(local) = local {
                                names.push((
                                    text[local.byte_range()].to_string(),
                                    spec.clone(),
                                    true,
                                ));
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    names
}

/// Re-point a module specifier written relative to the source file so it
/// resolves the same module from the target file.
fn repoint_specifier(
    engine: &mut Engine,
    source_key: &Path,
    target_key: &Path,
    spec: &str,
) -> String {
    if !spec.starts_with('.') {
        return spec.to_string();
    }
    let resolved = engine
        .model
        .resolver()
        .resolve_specifier(source_key, spec)
        .into_iter()
        .find(|candidate| engine.model.exists(candidate));
    match resolved {
        Some(module) => engine.model.resolver().module_specifier(target_key, &module),
        None => spec.to_string(),
    }
}

/// Prefix `export` onto helpers that stay behind but are now imported by the
/// moved code.
fn export_helpers(engine: &mut Engine, source_key: &Path, plan: &MovePlan) -> Result<()> {
    for helper in &plan.remaining_helpers {
        let file = engine.model.require_mut(source_key)?;
        let declaration: Option<Declaration> = file
            .all_top_level_declarations()?
            .into_iter()
            .find(|d| &d.name == helper);
        let Some(declaration) = declaration else {
            continue;
        };
        if declaration.is_exported {
            continue;
        }
        let mut script = EditScript::new();
        script.push(Edit::insert(declaration.statement_span.start, "export "));
        file.apply_edits(&script)?;
    }
    Ok(())
}

/// Update every other project file importing or re-exporting the symbol from
/// the old path, including namespace-alias call sites, which are patched
/// textually. Returns the files touched outside the import manager.
fn rewrite_importers(
    engine: &mut Engine,
    imports: &mut VirtualImportManager,
    selector: &Selector,
    source_key: &Path,
    target_key: &Path,
) -> Result<Vec<PathBuf>> {
    let mut touched = Vec::new();
    for path in engine.model.project_files() {
        if path == source_key || path == target_key {
            continue;
        }
        imports.touch(&mut engine.model, &path)?;
        let edges: Vec<_> = imports.edges(&engine.model, &path).to_vec();
        for edge in edges {
            if !engine.model.resolver().specifier_points_to(
                &path,
                &edge.module_specifier,
                source_key,
            ) {
                continue;
            }
            let new_spec = engine.model.resolver().module_specifier(&path, target_key);
            let names_symbol = edge.named.iter().any(|s| s.name == selector.name)
                || edge.default_import.as_deref() == Some(selector.name.as_str());
            if names_symbol {
                imports.update_import_path(
                    &mut engine.model,
                    &path,
                    &selector.name,
                    &edge.module_specifier,
                    &new_spec,
                )?;
            } else if let Some(alias) = &edge.namespace_import {
                let patched =
                    patch_namespace_uses(engine, &path, alias, &selector.name)?;
                if patched {
                    imports.add_named_import(
                        &mut engine.model,
                        &path,
                        &selector.name,
                        &new_spec,
                    )?;
                    touched.push(path.clone());
                }
            }
        }
    }
    Ok(touched)
}

/// Replace `alias.symbol` member accesses with a bare `symbol` reference.
fn patch_namespace_uses(
    engine: &mut Engine,
    path: &Path,
    alias: &str,
    name: &str,
) -> Result<bool> {
    let file = engine.model.require_mut(path)?;
    let text = file.text();
    let needle = format!("{alias}.{name}");
    let mut script = EditScript::new();
    for (start, _) in text.match_indices(&needle) {
        let before_ok = start == 0
            || !text.as_bytes()[start - 1].is_ascii_alphanumeric()
                && text.as_bytes()[start - 1] != b'_'
                && text.as_bytes()[start - 1] != b'$'
                && text.as_bytes()[start - 1] != b'.';
        let end = start + needle.len();
        let after_ok = end >= text.len()
            || !text.as_bytes()[end].is_ascii_alphanumeric()
                && text.as_bytes()[end] != b'_'
                && text.as_bytes()[end] != b'$';
        if before_ok && after_ok {
            script.push(Edit::delete(start..start + alias.len() + 1));
        }
    }
    if script.is_empty() {
        return Ok(false);
    }
    file.apply_edits(&script)?;
    Ok(true)
}

fn within(span: &Range<usize>, outer: &Range<usize>) -> bool {
    span.start >= outer.start && span.end <= outer.end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_declarator_stops_at_top_level_comma() {
        assert_eq!(extract_declarator("a = f(1, 2), b = 3;"), "a = f(1, 2)");
        assert_eq!(extract_declarator("a = [1, 2];"), "a = [1, 2]");
        assert_eq!(extract_declarator("a = 1"), "a = 1");
    }

    #[test]
    fn test_exported_declaration_text_adds_export() {
        let text = "function f() { return 1; }";
        let selector = Selector::new(SymbolKind::Function, "f", "x.ts");
        let out = exported_declaration_text(text, &selector, &(0..text.len()), 1);
        assert_eq!(out, "export function f() { return 1; }");
    }

    #[test]
    fn test_exported_declaration_text_splits_declarators() {
        let text = "const a = 1, b = 2;";
        let selector = Selector::new(SymbolKind::Variable, "b", "x.ts");
        let out = exported_declaration_text(text, &selector, &(0..text.len()), 2);
        assert_eq!(out, "export const b = 2;");
    }
}

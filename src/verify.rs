//! Post-hoc verification of operation postconditions.
//!
//! Verification re-checks the current trees and never mutates file content;
//! running it twice over the same operation yields the same result. A failure
//! is reported, never reverted — commit already happened at persist.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ops::{Operation, remove};
use crate::project::{ProjectModel, SourceFile};
use crate::symbols::Selector;

/// Per-postcondition outcomes. Checks that do not apply to the operation
/// report `true` (or `None` for the optional source check).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationDetails {
    pub symbol_added_to_target: bool,
    /// `None` when nothing was supposed to be removed (copy-only moves).
    pub symbol_removed_from_source: Option<bool>,
    pub imports_updated_in_target: bool,
    pub references_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub success: bool,
    pub details: VerificationDetails,
    pub failures: Vec<String>,
}

impl VerificationResult {
    fn from_details(details: VerificationDetails, failures: Vec<String>) -> Self {
        Self {
            success: failures.is_empty(),
            details,
            failures,
        }
    }
}

/// Re-check the postconditions of `operation` against the model's current
/// trees.
pub(crate) fn verify(operation: &Operation, model: &mut ProjectModel) -> VerificationResult {
    match operation {
        Operation::Move {
            selector,
            target_file,
            options,
        } => verify_move(model, selector, target_file, options.copy_only),
        Operation::Rename {
            selector, new_name, ..
        } => verify_rename(model, selector, new_name),
        Operation::Remove { selector, .. } => verify_remove(model, selector),
    }
}

fn verify_move(
    model: &mut ProjectModel,
    selector: &Selector,
    target_file: &Path,
    copy_only: bool,
) -> VerificationResult {
    let source_key = model.key(&selector.file_path);
    let target_key = model.key(target_file);
    let mut failures = Vec::new();

    let symbol_added_to_target = declaration_present(model, &target_key, selector);
    if !symbol_added_to_target {
        failures.push(format!(
            "'{}' is not declared in {}",
            selector.name,
            target_key.display()
        ));
    }

    let symbol_removed_from_source = if copy_only {
        None
    } else {
        let removed = !declaration_present(model, &source_key, selector);
        if !removed {
            failures.push(format!(
                "'{}' is still declared in {}",
                selector.name,
                source_key.display()
            ));
        }
        Some(removed)
    };

    // The target must not import the symbol back from its old file.
    let imports_updated_in_target =
        !imports_name_from(model, &target_key, &selector.name, &source_key);
    if !imports_updated_in_target {
        failures.push(format!(
            "{} still imports '{}' from the old path",
            target_key.display(),
            selector.name
        ));
    }

    // No other file may still import or re-export the symbol from the old
    // path.
    let mut references_updated = true;
    for path in model.project_files() {
        if path == source_key || path == target_key {
            continue;
        }
        if imports_name_from(model, &path, &selector.name, &source_key) {
            references_updated = false;
            failures.push(format!(
                "{} still imports '{}' from the old path",
                path.display(),
                selector.name
            ));
        }
    }

    VerificationResult::from_details(
        VerificationDetails {
            symbol_added_to_target,
            symbol_removed_from_source,
            imports_updated_in_target,
            references_updated,
        },
        failures,
    )
}

fn verify_rename(
    model: &mut ProjectModel,
    selector: &Selector,
    new_name: &str,
) -> VerificationResult {
    let key = model.key(&selector.file_path);
    let mut failures = Vec::new();

    let renamed_selector = Selector {
        name: new_name.to_string(),
        ..selector.clone()
    };
    let new_present = declaration_present(model, &key, &renamed_selector);
    if !new_present {
        failures.push(format!(
            "'{new_name}' is not declared in {}",
            key.display()
        ));
    }
    let old_gone = !declaration_present(model, &key, selector);
    if !old_gone {
        failures.push(format!(
            "'{}' is still declared in {}",
            selector.name,
            key.display()
        ));
    }

    // No file may still import or re-export the old identifier from the
    // declaring module. Same-named imports from unrelated modules are not
    // this rename's business.
    let mut references_updated = true;
    for path in model.project_files() {
        if imports_name_from(model, &path, &selector.name, &key) {
            references_updated = false;
            failures.push(format!(
                "{} still imports '{}'",
                path.display(),
                selector.name
            ));
        }
    }

    VerificationResult::from_details(
        VerificationDetails {
            symbol_added_to_target: new_present,
            symbol_removed_from_source: Some(old_gone),
            imports_updated_in_target: true,
            references_updated,
        },
        failures,
    )
}

fn verify_remove(model: &mut ProjectModel, selector: &Selector) -> VerificationResult {
    let key = model.key(&selector.file_path);
    let mut failures = Vec::new();

    let still_exists = remove::symbol_still_exists(model, selector, &key).unwrap_or(false);
    if still_exists {
        failures.push(format!(
            "'{}' still exists in {}",
            selector.name,
            key.display()
        ));
    }

    VerificationResult::from_details(
        VerificationDetails {
            symbol_added_to_target: true,
            symbol_removed_from_source: Some(!still_exists),
            imports_updated_in_target: true,
            references_updated: true,
        },
        failures,
    )
}

fn declaration_present(model: &mut ProjectModel, key: &Path, selector: &Selector) -> bool {
    let Ok(Some(file)) = model.ensure_mut(key) else {
        return false;
    };
    file.declarations(selector.kind, Some(&selector.name))
        .map(|decls| {
            decls
                .iter()
                .any(|d| d.matches_scope(selector.parent_scope.as_ref()))
        })
        .unwrap_or(false)
}

/// True when `path` imports or re-exports `name` from a module resolving to
/// `from_file`.
fn imports_name_from(model: &mut ProjectModel, path: &Path, name: &str, from_file: &Path) -> bool {
    let Ok(Some(file)) = model.ensure_mut(path) else {
        return false;
    };
    let specs: Vec<(String, Vec<String>)> = import_edges(file);
    let resolver = model.resolver();
    specs.iter().any(|(spec, names)| {
        names.iter().any(|n| n == name) && resolver.specifier_points_to(path, spec, from_file)
    })
}

/// `(specifier, imported names)` for every import and `export-from`
/// statement in a file.
fn import_edges(file: &SourceFile) -> Vec<(String, Vec<String>)> {
    let text = file.text();
    let mut edges = Vec::new();
    let root = file.tree().root_node();
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        let is_import = child.kind() == "import_statement";
        let is_re_export =
            child.kind() == "export_statement" && child.child_by_field_name("source").is_some();
        if !is_import && !is_re_export {
            continue;
        }
        let Some(source) = child.child_by_field_name("source") else {
            continue;
        };
        let spec = text[source.byte_range()]
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();

        let mut names = Vec::new();
        collect_specifier_names(child, text, &mut names);
        edges.push((spec, names));
    }
    edges
}

fn collect_specifier_names(node: tree_sitter::Node, text: &str, names: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "import_specifier" || child.kind() == "export_specifier" {
            if let Some(name) = child.child_by_field_name("name") {
                names.push(text[name.byte_range()].to_string());
            }
        } else {
            collect_specifier_names(child, text, names);
        }
    }
}

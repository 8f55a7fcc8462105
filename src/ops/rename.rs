//! Rename pipeline: rename a declaration and every enumerable reference,
//! then patch the bare-identifier occurrences the primitive misses.

use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;

use crate::edit::{Edit, EditScript};
use crate::error::{EngineError, Result};
use crate::symbols::{Selector, SymbolKind};

use super::{Engine, Outcome, is_identifier, is_reserved_keyword};

pub(crate) fn run(engine: &mut Engine, selector: &Selector, new_name: &str) -> Result<Outcome> {
    let mut outcome = Outcome::default();

    if new_name.is_empty() {
        return Err(EngineError::Validation("new name is empty".into()));
    }
    if !is_identifier(new_name) {
        return Err(EngineError::Validation(format!(
            "'{new_name}' is not a valid identifier"
        )));
    }
    if is_reserved_keyword(new_name) {
        return Err(EngineError::Validation(format!(
            "'{new_name}' is a reserved keyword"
        )));
    }
    if new_name == selector.name {
        return Err(EngineError::Validation(
            "new name is identical to the current name".into(),
        ));
    }

    let Some(symbol) = engine.resolver.resolve(&mut engine.model, selector)? else {
        return Err(EngineError::Resolution {
            name: selector.name.clone(),
            kind: selector.kind.name().to_string(),
            path: selector.file_path.clone(),
        });
    };

    check_conflicts(engine, selector, new_name)?;

    // Group every span to rewrite by file; each file's text is still
    // pristine, so one edit script per file applies cleanly.
    let mut spans_by_file: HashMap<PathBuf, Vec<Range<usize>>> = HashMap::new();
    spans_by_file
        .entry(symbol.file_path.clone())
        .or_default()
        .push(symbol.name_span.clone());
    for reference in &symbol.references {
        spans_by_file
            .entry(reference.file.clone())
            .or_default()
            .push(reference.span.clone());
    }

    let touched: Vec<PathBuf> = spans_by_file.keys().cloned().collect();
    for (path, mut spans) in spans_by_file {
        spans.sort_by_key(|s| (s.start, s.end));
        spans.dedup();
        let file = engine.model.require_mut(&path)?;
        let mut script = EditScript::new();
        for span in spans {
            script.push(Edit::replace(span, new_name));
        }
        file.apply_edits(&script)?;
    }

    patch_leftover_identifiers(engine, &touched, &selector.name, new_name)?;

    outcome.affected_files = engine.model.persist_dirty()?;
    outcome.affected_files.sort();
    Ok(outcome)
}

/// Kind-specific conflict detection in the declaring file.
fn check_conflicts(engine: &mut Engine, selector: &Selector, new_name: &str) -> Result<()> {
    let file = engine.model.require_mut(&selector.file_path)?;
    let scope = selector.parent_scope.as_ref();

    if selector.kind.is_member() {
        let same_kind = file.declarations(selector.kind, Some(new_name))?;
        let clash = same_kind.iter().find(|d| d.matches_scope(scope));
        let complementary = selector
            .kind
            .complementary_member()
            .map(|kind| file.declarations(kind, Some(new_name)))
            .transpose()?
            .unwrap_or_default();
        let comp_clash = complementary.iter().find(|d| d.matches_scope(scope));

        if let Some(existing) = clash.or(comp_clash) {
            let class = existing
                .parent_name
                .clone()
                .or_else(|| scope.map(|s| s.name.clone()))
                .unwrap_or_else(|| "<anonymous>".into());
            return Err(EngineError::Validation(format!(
                "cannot rename '{}' to '{new_name}': class '{class}' already declares a {} \
                 named '{new_name}'",
                selector.name, existing.kind
            )));
        }
        return Ok(());
    }

    // Top level: a same-kind clash, which for variables also covers sibling
    // declarators of the same statement.
    let kinds: &[SymbolKind] = if selector.kind == SymbolKind::Variable {
        &[SymbolKind::Variable]
    } else {
        &[selector.kind]
    };
    for kind in kinds {
        if !file.declarations(*kind, Some(new_name))?.is_empty() {
            return Err(EngineError::Validation(format!(
                "cannot rename '{}' to '{new_name}': a {kind} named '{new_name}' already \
                 exists in {}",
                selector.name,
                selector.file_path.display()
            )));
        }
    }
    Ok(())
}

/// Second pass over the files the rename actually touched, for bare
/// occurrences the reference search missed (aliased barrel specifiers and
/// shorthand uses). Occurrences followed by `=` or `:` are declarations or
/// object keys of an unrelated binding and stay untouched. Files with no
/// binding of the symbol are never patched.
fn patch_leftover_identifiers(
    engine: &mut Engine,
    files: &[PathBuf],
    old_name: &str,
    new_name: &str,
) -> Result<()> {
    for path in files {
        let Some(file) = engine.model.ensure_mut(path)? else {
            continue;
        };
        let spans: Vec<Range<usize>> = file
            .identifier_spans(old_name)
            .into_iter()
            .filter(|span| !followed_by_binding_punct(file.text(), span.end))
            .collect();
        if spans.is_empty() {
            continue;
        }
        let mut script = EditScript::new();
        for span in spans {
            script.push(Edit::replace(span, new_name));
        }
        file.apply_edits(&script)?;
    }
    Ok(())
}

/// True when the next non-space character is a plain `=` or `:`.
fn followed_by_binding_punct(text: &str, from: usize) -> bool {
    let rest = text[from..].trim_start_matches([' ', '\t']);
    match rest.as_bytes() {
        [b'=', b'=', ..] | [b'=', b'>', ..] => false,
        [b'=', ..] | [b':', ..] => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_followed_by_binding_punct() {
        assert!(followed_by_binding_punct("x = 1", 1));
        assert!(followed_by_binding_punct("x: 1", 1));
        assert!(!followed_by_binding_punct("x == 1", 1));
        assert!(!followed_by_binding_punct("x => 1", 1));
        assert!(!followed_by_binding_punct("x(1)", 1));
        assert!(!followed_by_binding_punct("x", 1));
    }
}

//! Multi-strategy symbol removal.
//!
//! Strategies run in strict order, each independently re-verified through
//! [`symbol_still_exists`] before the chain reports success. The first two
//! are tree-structural; the last two are text-level and flagged lossy.

use std::fs;
use std::ops::Range;
use std::path::Path;

use regex::Regex;

use crate::edit::{Edit, EditScript, expand_to_lines};
use crate::error::{EngineError, Result};
use crate::imports::VirtualImportManager;
use crate::project::ProjectModel;
use crate::symbols::{ReferenceKind, Selector, SymbolKind};

use super::{Engine, Outcome, RemovalMethod, RemoveOptions};

pub(crate) fn run(
    engine: &mut Engine,
    selector: &Selector,
    reason: Option<&str>,
    options: &RemoveOptions,
) -> Result<Outcome> {
    let key = engine.model.key(&selector.file_path);
    let Some(symbol) = engine.resolver.resolve(&mut engine.model, selector)? else {
        return Err(EngineError::Resolution {
            name: selector.name.clone(),
            kind: selector.kind.name().to_string(),
            path: selector.file_path.clone(),
        });
    };

    let mut outcome = Outcome::default();
    let eligibility = engine.resolver.validate_for_removal(&symbol);
    outcome.warnings.extend(eligibility.warnings);

    let forced = !eligibility.can_proceed;
    if forced && !options.force_remove {
        return Err(EngineError::Validation(format!(
            "cannot remove '{}': symbol is referenced elsewhere; remove the references first or \
             use the force option. {}",
            selector.name,
            eligibility.blockers.join("; ")
        )));
    }
    if forced {
        outcome
            .warnings
            .push(format!("forced removal of referenced symbol '{}'", selector.name));
    }
    if let Some(reason) = reason {
        engine
            .sink
            .info(&format!("removing '{}': {reason}", selector.name));
    }

    let method = run_chain(engine, selector, &key, options)?;
    outcome.removal_method = Some(if forced && method == RemovalMethod::Standard {
        RemovalMethod::Forced
    } else {
        method
    });
    if matches!(method, RemovalMethod::ManualText | RemovalMethod::DirectFs) {
        outcome.warnings.push(format!(
            "'{}' was removed by a lossy text strategy; review the result",
            selector.name
        ));
    }

    engine.model.persist(&key)?;
    outcome.affected_files.push(key.clone());

    if options.cleanup_dependencies {
        let mut imports = VirtualImportManager::new(engine.sink.clone());
        let removed = imports.remove_unused_imports(&mut engine.model, &key)?;
        // Importers of a force-removed symbol lose their dangling specifier.
        let mut importers: Vec<_> = symbol
            .references
            .iter()
            .filter(|r| r.kind == ReferenceKind::Import && r.file != key)
            .map(|r| r.file.clone())
            .collect();
        importers.sort();
        importers.dedup();
        for path in &importers {
            imports.remove_named_import(&mut engine.model, path, &selector.name, None)?;
        }
        for path in imports.write_back(&mut engine.model)? {
            if !outcome.affected_files.contains(&path) {
                outcome.affected_files.push(path);
            }
        }
        if !removed.is_empty() {
            outcome
                .warnings
                .push(format!("dropped unused imports: {}", removed.join(", ")));
        }
    }

    Ok(outcome)
}

/// Attempt every enabled strategy in order until one removes the symbol.
fn run_chain(
    engine: &mut Engine,
    selector: &Selector,
    key: &Path,
    options: &RemoveOptions,
) -> Result<RemovalMethod> {
    let mut last_error = String::from("no strategy attempted");

    let attempts: &[(RemovalMethod, bool)] = &[
        (RemovalMethod::Standard, true),
        (RemovalMethod::Aggressive, options.fallback_to_aggressive),
        (RemovalMethod::ManualText, true),
        (RemovalMethod::DirectFs, !engine.model.is_dry_run()),
    ];

    for (method, enabled) in attempts {
        if !enabled {
            continue;
        }
        let attempt = match method {
            RemovalMethod::Standard | RemovalMethod::Forced => structural(engine, selector, key),
            RemovalMethod::Aggressive => aggressive(engine, selector, key),
            RemovalMethod::ManualText => manual_text(engine, selector, key),
            RemovalMethod::DirectFs => direct_fs(engine, selector, key),
        };
        match attempt {
            Ok(()) => {
                if !symbol_still_exists(&mut engine.model, selector, key)? {
                    return Ok(*method);
                }
                last_error = format!("{method:?} strategy ran but the symbol is still present");
            }
            Err(error) => {
                last_error = error.to_string();
            }
        }
        engine.sink.warn(&format!(
            "removal strategy {method:?} failed for '{}': {last_error}",
            selector.name
        ));
    }

    Err(EngineError::RemovalExhausted {
        name: selector.name.clone(),
        last_error,
    })
}

/// Delete the declaration node span; for a multi-declarator statement only
/// the matching declarator and its comma.
fn structural(engine: &mut Engine, selector: &Selector, key: &Path) -> Result<()> {
    let file = engine.model.require_mut(key)?;
    let declarations = file.declarations(selector.kind, Some(&selector.name))?;
    let Some(decl) = declarations
        .iter()
        .find(|d| d.matches_scope(selector.parent_scope.as_ref()))
    else {
        return Err(EngineError::Validation(format!(
            "declaration '{}' not found for structural removal",
            selector.name
        )));
    };

    let span = if decl.declarator_count > 1 {
        declarator_with_comma(file.text(), decl.span.clone())
    } else {
        expand_to_lines(file.text(), decl.statement_span.clone())
    };
    let mut script = EditScript::new();
    script.push(Edit::delete(span));
    file.apply_edits(&script)
}

/// Re-query every declaration of that kind and name and delete each; covers
/// spans gone stale after earlier edits left duplicates behind.
fn aggressive(engine: &mut Engine, selector: &Selector, key: &Path) -> Result<()> {
    let file = engine.model.require_mut(key)?;
    let declarations = file.declarations(selector.kind, Some(&selector.name))?;
    if declarations.is_empty() {
        return Err(EngineError::Validation(format!(
            "no '{}' declarations found for aggressive removal",
            selector.name
        )));
    }

    let mut spans: Vec<Range<usize>> = declarations
        .iter()
        .map(|d| {
            if d.declarator_count > 1 {
                declarator_with_comma(file.text(), d.span.clone())
            } else {
                expand_to_lines(file.text(), d.statement_span.clone())
            }
        })
        .collect();
    spans.sort_by_key(|s| (s.start, s.end));
    spans.dedup();

    let mut script = EditScript::new();
    for span in spans {
        script.push(Edit::delete(span));
    }
    file.apply_edits(&script)
}

/// Pattern-match the declaration signature and excise a brace- or
/// line-balanced span. Lossy.
fn manual_text(engine: &mut Engine, selector: &Selector, key: &Path) -> Result<()> {
    let file = engine.model.require_mut(key)?;
    let span = find_text_span(file.text(), selector.kind, &selector.name)?.ok_or_else(|| {
        EngineError::Validation(format!(
            "no text pattern matched '{}' for manual removal",
            selector.name
        ))
    })?;
    let span = expand_to_lines(file.text(), span);
    let mut script = EditScript::new();
    script.push(Edit::delete(span));
    file.apply_edits(&script)
}

/// Splice the declaration out of the on-disk text, bypassing the model, then
/// force-reload the tree.
fn direct_fs(engine: &mut Engine, selector: &Selector, key: &Path) -> Result<()> {
    let text = fs::read_to_string(key)?;
    let span = find_text_span(&text, selector.kind, &selector.name)?.ok_or_else(|| {
        EngineError::Validation(format!(
            "no text pattern matched '{}' on disk",
            selector.name
        ))
    })?;
    let span = expand_to_lines(&text, span);
    let mut new_text = String::with_capacity(text.len());
    new_text.push_str(&text[..span.start]);
    new_text.push_str(&text[span.end..]);
    fs::write(key, new_text)?;
    engine.model.force_reload(key)?;
    Ok(())
}

/// Re-verification used between strategies: declaration lookup first, then a
/// declaration-shaped text pattern. Never a plain reference search, which
/// would false-positive on remaining call sites.
pub(crate) fn symbol_still_exists(
    model: &mut ProjectModel,
    selector: &Selector,
    key: &Path,
) -> Result<bool> {
    let Some(file) = model.ensure_mut(key)? else {
        return Ok(false);
    };
    let declarations = file.declarations(selector.kind, Some(&selector.name))?;
    if declarations
        .iter()
        .any(|d| d.matches_scope(selector.parent_scope.as_ref()))
    {
        return Ok(true);
    }
    Ok(find_text_span(file.text(), selector.kind, &selector.name)?.is_some())
}

/// Structural deletion entry point shared with the move pipeline.
pub(crate) fn structural_delete(engine: &mut Engine, selector: &Selector, key: &Path) -> Result<()> {
    structural(engine, selector, key)
}

/// A declarator span widened to swallow one adjacent comma.
fn declarator_with_comma(text: &str, span: Range<usize>) -> Range<usize> {
    let bytes = text.as_bytes();
    let mut end = span.end;
    while end < bytes.len() && bytes[end].is_ascii_whitespace() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b',' {
        return span.start..end + 1;
    }
    let mut start = span.start;
    while start > 0 && bytes[start - 1].is_ascii_whitespace() {
        start -= 1;
    }
    if start > 0 && bytes[start - 1] == b',' {
        return start - 1..span.end;
    }
    span
}

/// Locate a declaration by signature pattern and balanced scan.
fn find_text_span(text: &str, kind: SymbolKind, name: &str) -> Result<Option<Range<usize>>> {
    let escaped = regex::escape(name);
    let pattern = match kind {
        SymbolKind::Function => {
            format!(r"(?m)^[ \t]*(export\s+)?(default\s+)?(async\s+)?function\*?\s+{escaped}\b")
        }
        SymbolKind::Class => {
            format!(r"(?m)^[ \t]*(export\s+)?(default\s+)?(abstract\s+)?class\s+{escaped}\b")
        }
        SymbolKind::Interface => format!(r"(?m)^[ \t]*(export\s+)?interface\s+{escaped}\b"),
        SymbolKind::TypeAlias => format!(r"(?m)^[ \t]*(export\s+)?type\s+{escaped}\b"),
        SymbolKind::Enum => format!(r"(?m)^[ \t]*(export\s+)?(const\s+)?enum\s+{escaped}\b"),
        SymbolKind::Variable => {
            format!(r"(?m)^[ \t]*(export\s+)?(const|let|var)\s+{escaped}\b")
        }
        SymbolKind::Method => format!(
            r"(?m)^[ \t]*(public\s+|private\s+|protected\s+)?(static\s+)?(async\s+)?{escaped}\s*\("
        ),
        SymbolKind::Property => format!(
            r"(?m)^[ \t]*(public\s+|private\s+|protected\s+)?(static\s+)?(readonly\s+)?{escaped}\s*[:=]"
        ),
    };
    let re = Regex::new(&pattern)?;
    let Some(m) = re.find(text) else {
        return Ok(None);
    };
    Ok(Some(m.start()..balanced_end(text, m.start())))
}

/// Scan from a declaration start to its end: the matching close brace when a
/// `{` opens before any terminator, otherwise the first `;` or line end.
fn balanced_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut i = start;
    let mut depth = 0usize;
    let mut saw_brace = false;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                saw_brace = true;
                depth += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                if saw_brace && depth == 0 {
                    let mut end = i + 1;
                    if end < bytes.len() && bytes[end] == b';' {
                        end += 1;
                    }
                    return end;
                }
            }
            b';' if !saw_brace => return i + 1,
            b'\n' if !saw_brace && depth == 0 => {
                // A statement without brace or semicolon ends at its line,
                // unless the next line continues it with deeper indentation.
                return i;
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_end_function_body() {
        let text = "export function f() {\n  if (x) { y(); }\n  return 1;\n}\nconst z = 2;\n";
        let end = balanced_end(text, 0);
        assert_eq!(&text[..end], "export function f() {\n  if (x) { y(); }\n  return 1;\n}");
    }

    #[test]
    fn test_balanced_end_type_alias() {
        let text = "export type Id = string;\nconst x = 1;\n";
        let end = balanced_end(text, 0);
        assert_eq!(&text[..end], "export type Id = string;");
    }

    #[test]
    fn test_declarator_with_comma() {
        let text = "const a = 1, b = 2;";
        // Span of `a = 1`.
        let span = declarator_with_comma(text, 6..11);
        assert_eq!(&text[span], "a = 1,");
        // Span of `b = 2` takes the leading comma instead.
        let span = declarator_with_comma(text, 13..18);
        assert_eq!(&text[span], ", b = 2");
    }

    #[test]
    fn test_find_text_span_const_object() {
        let text = "export const config = {\n  a: 1,\n};\nconst other = 2;\n";
        let span = find_text_span(text, SymbolKind::Variable, "config")
            .unwrap()
            .unwrap();
        assert!(text[span.clone()].starts_with("export const config"));
        assert!(text[span].ends_with("};"));
    }
}

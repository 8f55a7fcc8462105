//! Operation types, orchestration, and batch execution.
//!
//! `Engine` owns the project model and dispatches each [`Operation`] to its
//! pipeline. Execution is strictly sequential; the model is the only shared
//! state and `persist` is the commit point. A failed operation after an
//! in-memory mutation leaves the model divergent from disk, and the caller
//! reconciles via `force_reload` before retrying.

mod move_op;
pub(crate) mod remove;
mod rename;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use similar::TextDiff;

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::logging::SharedSink;
use crate::project::ProjectModel;
use crate::symbols::{Selector, SymbolResolver};
use crate::verify::{self, VerificationResult};

/// Options for a move operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoveOptions {
    /// Copy the declaration into the target without removing it from the
    /// source.
    pub copy_only: bool,
}

/// Options for a remove operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoveOptions {
    /// Skip the external-reference blocker.
    pub force_remove: bool,
    /// After removal, drop import specifiers left without a use.
    pub cleanup_dependencies: bool,
    /// Allow the aggressive re-query strategy when the structural one fails.
    pub fallback_to_aggressive: bool,
}

impl Default for RemoveOptions {
    fn default() -> Self {
        Self {
            force_remove: false,
            cleanup_dependencies: false,
            fallback_to_aggressive: true,
        }
    }
}

/// One refactoring operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Operation {
    Move {
        selector: Selector,
        target_file: PathBuf,
        #[serde(default)]
        options: MoveOptions,
    },
    Rename {
        selector: Selector,
        new_name: String,
        /// Accepted for interface compatibility; renames are always
        /// project-wide.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
    Remove {
        selector: Selector,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        #[serde(default)]
        options: RemoveOptions,
    },
}

impl Operation {
    pub fn selector(&self) -> &Selector {
        match self {
            Operation::Move { selector, .. }
            | Operation::Rename { selector, .. }
            | Operation::Remove { selector, .. } => selector,
        }
    }
}

/// How a removal was ultimately carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RemovalMethod {
    /// Structural deletion with no blockers skipped.
    Standard,
    /// Structural deletion with the reference blocker overridden.
    Forced,
    /// Re-queried all matching declarations and deleted each.
    Aggressive,
    /// Lossy pattern-matched text excision.
    ManualText,
    /// Disk-level splice outside the model, followed by a reload.
    DirectFs,
}

/// Outcome of one operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub success: bool,
    /// Every file whose persisted content changed.
    pub affected_files: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removal_method: Option<RemovalMethod>,
}

impl OperationResult {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            affected_files: Vec::new(),
            error: Some(error),
            warnings: Vec::new(),
            removal_method: None,
        }
    }
}

/// An ordered sequence of operations sharing one batch context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub operations: Vec<Operation>,
    /// Overrides the engine default when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_on_error: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// True iff every operation succeeded.
    pub success: bool,
    pub results: Vec<OperationResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped_early: bool,
}

/// Cross-operation state within one batch.
///
/// Only used to suppress false naming-conflict reports: a symbol this batch
/// placed into a file is not a conflict for later operations targeting the
/// same file.
#[derive(Debug, Default)]
pub struct BatchContext {
    moved_symbols: HashMap<PathBuf, Vec<String>>,
}

impl BatchContext {
    pub(crate) fn record_move(&mut self, target: PathBuf, name: &str) {
        self.moved_symbols.entry(target).or_default().push(name.to_string());
    }

    pub(crate) fn placed(&self, target: &Path, name: &str) -> bool {
        self.moved_symbols
            .get(target)
            .is_some_and(|names| names.iter().any(|n| n == name))
    }
}

/// A dry-run rendering of an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub affected_files: Vec<PathBuf>,
    /// Unified diff of every file the operation would change.
    pub diff: String,
}

/// What a pipeline hands back on success.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub affected_files: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub removal_method: Option<RemovalMethod>,
}

/// The refactoring engine: project model plus operation pipelines.
pub struct Engine {
    model: ProjectModel,
    resolver: SymbolResolver,
    config: EngineConfig,
    sink: SharedSink,
}

impl Engine {
    pub fn new(root: impl Into<PathBuf>, config: EngineConfig, sink: SharedSink) -> Result<Self> {
        let model = ProjectModel::new(root, config.retry, sink.clone())?;
        Ok(Self {
            model,
            resolver: SymbolResolver::new(sink.clone()),
            config,
            sink,
        })
    }

    pub fn model(&self) -> &ProjectModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ProjectModel {
        &mut self.model
    }

    /// Execute one operation outside any batch.
    pub fn execute_operation(&mut self, operation: &Operation) -> OperationResult {
        let mut context = BatchContext::default();
        self.execute_with_context(operation, &mut context)
    }

    /// Execute one operation within a shared batch context.
    pub fn execute_with_context(
        &mut self,
        operation: &Operation,
        context: &mut BatchContext,
    ) -> OperationResult {
        self.sink.info(&format!(
            "executing {} of '{}'",
            operation_name(operation),
            operation.selector().name
        ));
        let outcome = match operation {
            Operation::Move {
                selector,
                target_file,
                options,
            } => move_op::run(self, selector, target_file, options, context),
            Operation::Rename {
                selector, new_name, ..
            } => rename::run(self, selector, new_name),
            Operation::Remove {
                selector,
                reason,
                options,
            } => remove::run(self, selector, reason.as_deref(), options),
        };
        match outcome {
            Ok(mut outcome) => {
                let verification = verify::verify(operation, &mut self.model);
                for failure in &verification.failures {
                    outcome.warnings.push(format!("verification: {failure}"));
                }
                OperationResult {
                    success: true,
                    affected_files: outcome.affected_files,
                    error: None,
                    warnings: outcome.warnings,
                    removal_method: outcome.removal_method,
                }
            }
            Err(error) => {
                self.sink.error(&format!(
                    "{} of '{}' failed: {error}",
                    operation_name(operation),
                    operation.selector().name
                ));
                OperationResult::failure(error.to_string())
            }
        }
    }

    /// Execute a batch sequentially. `stop_on_error` is checked between
    /// operations only; a partially-applied failed operation is never rolled
    /// back.
    pub fn execute_batch(&mut self, request: &BatchRequest) -> BatchResult {
        let stop_on_error = request.stop_on_error.unwrap_or(self.config.stop_on_error);
        let mut context = BatchContext::default();
        let mut results = Vec::with_capacity(request.operations.len());
        let mut stopped_early = false;

        for operation in &request.operations {
            let result = self.execute_with_context(operation, &mut context);
            let failed = !result.success;
            results.push(result);
            if failed && stop_on_error {
                stopped_early = true;
                break;
            }
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        BatchResult {
            success: failed == 0 && !stopped_early,
            failed,
            succeeded,
            results,
            stopped_early,
        }
    }

    /// Re-check an operation's postconditions against the current trees.
    /// Never mutates file content; calling it twice yields the same result.
    pub fn verify(&mut self, operation: &Operation) -> VerificationResult {
        verify::verify(operation, &mut self.model)
    }

    /// Run an operation against in-memory state only and render the diff,
    /// then discard all in-memory changes.
    pub fn preview(&mut self, operation: &Operation) -> Result<Preview> {
        let before: HashMap<PathBuf, String> = self
            .model
            .project_files()
            .into_iter()
            .filter_map(|p| {
                let text = match self.model.get(&p) {
                    Some(file) => Some(file.text().to_string()),
                    None => std::fs::read_to_string(&p).ok(),
                };
                text.map(|t| (p, t))
            })
            .collect();

        self.model.set_dry_run(true);
        let result = {
            let mut context = BatchContext::default();
            self.execute_with_context(operation, &mut context)
        };

        let mut diff = String::new();
        let mut affected = Vec::new();
        if result.success {
            for path in &result.affected_files {
                let after = self.model.get(path).map(|f| f.text().to_string());
                let Some(after) = after else { continue };
                let empty = String::new();
                let old = before.get(path).unwrap_or(&empty);
                if *old == after {
                    continue;
                }
                let name = self.relative_display(path);
                diff.push_str(
                    &TextDiff::from_lines(old.as_str(), after.as_str())
                        .unified_diff()
                        .header(&format!("a/{name}"), &format!("b/{name}"))
                        .to_string(),
                );
                affected.push(path.clone());
            }
        }

        // Discard the previewed state entirely.
        let root = self.model.resolver().root().to_path_buf();
        self.model = ProjectModel::new(root, self.config.retry, self.sink.clone())?;

        match result.error {
            Some(error) => Err(EngineError::Validation(error)),
            None => Ok(Preview {
                affected_files: affected,
                diff,
            }),
        }
    }

    fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(self.model.resolver().root())
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Move { .. } => "move",
        Operation::Rename { .. } => "rename",
        Operation::Remove { .. } => "remove",
    }
}

/// TypeScript reserved words that cannot be used as declaration names.
const RESERVED_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with", "yield", "let", "static", "await",
];

pub(crate) fn is_reserved_keyword(name: &str) -> bool {
    RESERVED_KEYWORDS.contains(&name)
}

/// True for names shaped like a TypeScript identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolKind;

    #[test]
    fn test_operation_json_shape() {
        let json = r#"{
            "type": "remove",
            "selector": {"kind": "function", "name": "helper", "filePath": "src/util.ts"},
            "options": {"forceRemove": true}
        }"#;
        let operation: Operation = serde_json::from_str(json).unwrap();
        match &operation {
            Operation::Remove { selector, options, .. } => {
                assert_eq!(selector.kind, SymbolKind::Function);
                assert!(options.force_remove);
                assert!(options.fallback_to_aggressive);
            }
            _ => panic!("expected remove"),
        }
    }

    #[test]
    fn test_identifier_shapes() {
        assert!(is_identifier("getUserData"));
        assert!(is_identifier("_x$1"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
        assert!(is_reserved_keyword("class"));
        assert!(!is_reserved_keyword("klass"));
    }

    #[test]
    fn test_batch_context_suppression() {
        let mut context = BatchContext::default();
        context.record_move(PathBuf::from("/p/f.ts"), "X");
        assert!(context.placed(Path::new("/p/f.ts"), "X"));
        assert!(!context.placed(Path::new("/p/f.ts"), "Y"));
        assert!(!context.placed(Path::new("/p/g.ts"), "X"));
    }
}

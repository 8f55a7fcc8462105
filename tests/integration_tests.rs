//! Integration tests for the symshift engine.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use symshift::prelude::*;
use tempfile::TempDir;

fn write_file(root: &Path, rel: &str, text: &str) {
    let full = root.join(rel);
    fs::create_dir_all(full.parent().unwrap()).unwrap();
    fs::write(full, text).unwrap();
}

fn engine(root: &Path) -> Engine {
    Engine::new(root, EngineConfig::new(), Arc::new(NullSink)).unwrap()
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap()
}

/// The project layout from the end-to-end move scenario: a service file with
/// a function depending on a model import and a local helper, plus a caller.
fn create_user_project(root: &Path) {
    write_file(
        root,
        "models/User.ts",
        "export interface User {\n  id: string;\n  name: string;\n}\n\nexport function createDefaultUser(): User {\n  return { id: '0', name: 'unknown' };\n}\n",
    );
    write_file(
        root,
        "services/userService.ts",
        "import { User, createDefaultUser } from '../models/User';\n\nexport async function getUserData(id: string): Promise<User> {\n  if (!id) {\n    return createDefaultUser();\n  }\n  return { id, name: 'user-' + id };\n}\n\nexport function listUsers(): User[] {\n  return [];\n}\n",
    );
    write_file(
        root,
        "services/profileService.ts",
        "export function getProfile(id: string) {\n  return { id };\n}\n",
    );
    write_file(
        root,
        "app.ts",
        "import { getUserData } from './services/userService';\n\nexport async function main() {\n  const user = await getUserData('42');\n  console.log(user.name);\n}\n",
    );
}

#[test]
fn test_resolve_miss_fails_without_mutation() {
    let dir = TempDir::new().unwrap();
    create_user_project(dir.path());
    let before = read(dir.path(), "services/userService.ts");

    let mut engine = engine(dir.path());
    let operation = Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "noSuchFunction", "services/userService.ts"),
        reason: None,
        options: RemoveOptions::default(),
    };
    let result = engine.execute_operation(&operation);

    assert!(!result.success);
    assert!(result.error.unwrap().contains("noSuchFunction"));
    assert!(result.affected_files.is_empty());
    assert_eq!(read(dir.path(), "services/userService.ts"), before);
}

#[test]
fn test_remove_unreferenced_symbol_is_structural() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "util.ts",
        "export function used() { return 1; }\n\nfunction orphan() {\n  return 2;\n}\n",
    );

    let mut engine = engine(dir.path());
    let operation = Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "orphan", "util.ts"),
        reason: Some("dead code".into()),
        options: RemoveOptions::default(),
    };
    let result = engine.execute_operation(&operation);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.removal_method, Some(RemovalMethod::Standard));
    let text = read(dir.path(), "util.ts");
    assert!(!text.contains("orphan"));
    assert!(text.contains("function used"));

    let verification = engine.verify(&operation);
    assert!(verification.success);
    assert_eq!(verification.details.symbol_removed_from_source, Some(true));
}

#[test]
fn test_remove_referenced_symbol_requires_force() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "util.ts", "export function shared() { return 1; }\n");
    write_file(
        dir.path(),
        "app.ts",
        "import { shared } from './util';\n\nexport const v = shared();\n",
    );

    let mut engine = engine(dir.path());
    let selector = Selector::new(SymbolKind::Function, "shared", "util.ts");

    let blocked = engine.execute_operation(&Operation::Remove {
        selector: selector.clone(),
        reason: None,
        options: RemoveOptions::default(),
    });
    assert!(!blocked.success);
    assert!(blocked.error.unwrap().contains("referenced"));
    assert!(read(dir.path(), "util.ts").contains("shared"));

    let forced = engine.execute_operation(&Operation::Remove {
        selector,
        reason: None,
        options: RemoveOptions {
            force_remove: true,
            ..RemoveOptions::default()
        },
    });
    assert!(forced.success, "{:?}", forced.error);
    assert_ne!(forced.removal_method, Some(RemovalMethod::Standard));
    assert!(!read(dir.path(), "util.ts").contains("shared"));
}

#[test]
fn test_remove_ignores_unrelated_same_name() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "util.ts",
        "export function used() { return 1; }\n\nfunction orphan() {\n  return 2;\n}\n",
    );
    // A local of the same name in a file that never imports the symbol.
    write_file(
        dir.path(),
        "other.ts",
        "function orphan() {\n  return 3;\n}\n\nexport const y = orphan();\n",
    );
    let other_before = read(dir.path(), "other.ts");

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "orphan", "util.ts"),
        reason: None,
        options: RemoveOptions::default(),
    });

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.removal_method, Some(RemovalMethod::Standard));
    assert!(!read(dir.path(), "util.ts").contains("orphan"));
    assert_eq!(read(dir.path(), "other.ts"), other_before);
}

#[test]
fn test_rename_leaves_unrelated_same_name_alone() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "util.ts", "export function helper() { return 1; }\n");
    write_file(
        dir.path(),
        "other.ts",
        "const helper = () => 2;\n\nexport const y = helper();\n",
    );
    let other_before = read(dir.path(), "other.ts");

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Rename {
        selector: Selector::new(SymbolKind::Function, "helper", "util.ts"),
        new_name: "fetchHelper".into(),
        scope: None,
    });

    assert!(result.success, "{:?}", result.error);
    assert!(read(dir.path(), "util.ts").contains("function fetchHelper"));
    assert_eq!(read(dir.path(), "other.ts"), other_before);
}

#[test]
fn test_method_rename_conflict_names_the_class() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "service.ts",
        "export class UserService {\n  methodA() {\n    return 1;\n  }\n\n  methodB() {\n    return 2;\n  }\n}\n",
    );

    let mut engine = engine(dir.path());
    let selector = Selector::new(SymbolKind::Method, "methodA", "service.ts")
        .in_scope(SymbolKind::Class, "UserService");

    let conflict = engine.execute_operation(&Operation::Rename {
        selector: selector.clone(),
        new_name: "methodB".into(),
        scope: None,
    });
    assert!(!conflict.success);
    let error = conflict.error.unwrap();
    assert!(error.contains("methodB"));
    assert!(error.contains("UserService"));

    let renamed = engine.execute_operation(&Operation::Rename {
        selector,
        new_name: "methodC".into(),
        scope: None,
    });
    assert!(renamed.success, "{:?}", renamed.error);
    let text = read(dir.path(), "service.ts");
    assert!(text.contains("methodC()"));
    assert!(!text.contains("methodA"));
}

#[test]
fn test_rename_conflicts_with_complementary_member_kind() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "model.ts",
        "export class Model {\n  count = 0;\n\n  total() {\n    return this.count;\n  }\n}\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Rename {
        selector: Selector::new(SymbolKind::Method, "total", "model.ts")
            .in_scope(SymbolKind::Class, "Model"),
        new_name: "count".into(),
        scope: None,
    });

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("property"));
    assert!(error.contains("Model"));
}

#[test]
fn test_rename_updates_importers() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "util.ts", "export function oldName() { return 1; }\n");
    write_file(
        dir.path(),
        "app.ts",
        "import { oldName } from './util';\n\nexport const v = oldName();\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Rename {
        selector: Selector::new(SymbolKind::Function, "oldName", "util.ts"),
        new_name: "newName".into(),
        scope: None,
    });

    assert!(result.success, "{:?}", result.error);
    assert!(read(dir.path(), "util.ts").contains("function newName"));
    let app = read(dir.path(), "app.ts");
    assert!(app.contains("import { newName } from './util';"));
    assert!(app.contains("newName()"));
    assert!(!app.contains("oldName"));
}

#[test]
fn test_end_to_end_move_get_user_data() {
    let dir = TempDir::new().unwrap();
    create_user_project(dir.path());

    let mut engine = engine(dir.path());
    let operation = Operation::Move {
        selector: Selector::new(SymbolKind::Function, "getUserData", "services/userService.ts"),
        target_file: dir.path().join("services/profileService.ts"),
        options: MoveOptions::default(),
    };
    let result = engine.execute_operation(&operation);
    assert!(result.success, "{:?}", result.error);

    let source = read(dir.path(), "services/userService.ts");
    assert!(!source.contains("getUserData"));
    assert!(source.contains("listUsers"));

    let target = read(dir.path(), "services/profileService.ts");
    assert!(target.contains("export async function getUserData"));
    assert!(target.contains("from '../models/User'"));
    assert!(target.contains("User"));
    assert!(target.contains("createDefaultUser"));

    let app = read(dir.path(), "app.ts");
    assert!(app.contains("from './services/profileService'"));
    assert!(!app.contains("./services/userService"));

    let verification = engine.verify(&operation);
    assert!(verification.success, "{:?}", verification.failures);
    assert!(verification.details.symbol_added_to_target);
    assert_eq!(verification.details.symbol_removed_from_source, Some(true));
}

#[test]
fn test_copy_only_move_keeps_the_source() {
    let dir = TempDir::new().unwrap();
    create_user_project(dir.path());

    let mut engine = engine(dir.path());
    let operation = Operation::Move {
        selector: Selector::new(SymbolKind::Function, "listUsers", "services/userService.ts"),
        target_file: dir.path().join("services/profileService.ts"),
        options: MoveOptions { copy_only: true },
    };
    let result = engine.execute_operation(&operation);
    assert!(result.success, "{:?}", result.error);

    assert!(read(dir.path(), "services/userService.ts").contains("listUsers"));
    assert!(read(dir.path(), "services/profileService.ts").contains("listUsers"));

    let verification = engine.verify(&operation);
    assert_eq!(verification.details.symbol_removed_from_source, None);
}

#[test]
fn test_verification_is_idempotent() {
    let dir = TempDir::new().unwrap();
    create_user_project(dir.path());

    let mut engine = engine(dir.path());
    let operation = Operation::Move {
        selector: Selector::new(SymbolKind::Function, "getUserData", "services/userService.ts"),
        target_file: dir.path().join("services/profileService.ts"),
        options: MoveOptions::default(),
    };
    let result = engine.execute_operation(&operation);
    assert!(result.success, "{:?}", result.error);

    let first = engine.verify(&operation);
    let second = engine.verify(&operation);
    assert_eq!(first.success, second.success);
    assert_eq!(first.details, second.details);
}

#[test]
fn test_batch_suppresses_false_naming_conflicts() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.ts", "export function symbolX() { return 1; }\n");
    write_file(dir.path(), "b.ts", "export function symbolY() { return 2; }\n");

    let mut engine = engine(dir.path());
    let batch = BatchRequest {
        operations: vec![
            Operation::Move {
                selector: Selector::new(SymbolKind::Function, "symbolX", "a.ts"),
                target_file: dir.path().join("shared.ts"),
                options: MoveOptions::default(),
            },
            Operation::Move {
                selector: Selector::new(SymbolKind::Function, "symbolY", "b.ts"),
                target_file: dir.path().join("shared.ts"),
                options: MoveOptions::default(),
            },
        ],
        stop_on_error: Some(true),
    };
    let result = engine.execute_batch(&batch);

    assert!(result.success, "{:?}", result.results);
    assert_eq!(result.succeeded, 2, "{:?}", result.results);
    assert!(!result.stopped_early);
    let shared = read(dir.path(), "shared.ts");
    assert!(shared.contains("symbolX"));
    assert!(shared.contains("symbolY"));
}

#[test]
fn test_batch_stop_on_error() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.ts", "export function f() { return 1; }\n");

    let mut engine = engine(dir.path());
    let batch = BatchRequest {
        operations: vec![
            Operation::Rename {
                selector: Selector::new(SymbolKind::Function, "missing", "a.ts"),
                new_name: "other".into(),
                scope: None,
            },
            Operation::Rename {
                selector: Selector::new(SymbolKind::Function, "f", "a.ts"),
                new_name: "g".into(),
                scope: None,
            },
        ],
        stop_on_error: Some(true),
    };
    let result = engine.execute_batch(&batch);

    assert!(!result.success);
    assert!(result.stopped_early);
    assert_eq!(result.results.len(), 1);
    assert!(read(dir.path(), "a.ts").contains("function f"));
}

#[test]
fn test_move_conflict_outside_batch_context() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "a.ts", "export function taken() { return 1; }\n");
    write_file(dir.path(), "b.ts", "export function taken() { return 2; }\n");

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Move {
        selector: Selector::new(SymbolKind::Function, "taken", "a.ts"),
        target_file: dir.path().join("b.ts"),
        options: MoveOptions::default(),
    });

    assert!(!result.success);
    assert!(result.error.unwrap().contains("already declares"));
}

#[test]
fn test_remove_cleanup_drops_unused_imports() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "lib.ts", "export function onlyDep() { return 1; }\n");
    write_file(
        dir.path(),
        "app.ts",
        "import { onlyDep } from './lib';\n\nfunction wrapper() {\n  return onlyDep();\n}\n\nexport const keep = 1;\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "wrapper", "app.ts"),
        reason: None,
        options: RemoveOptions {
            cleanup_dependencies: true,
            ..RemoveOptions::default()
        },
    });

    assert!(result.success, "{:?}", result.error);
    let app = read(dir.path(), "app.ts");
    assert!(!app.contains("wrapper"));
    assert!(!app.contains("onlyDep"));
    assert!(app.contains("export const keep"));
}

#[test]
fn test_remove_variable_declarator_keeps_siblings() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "vars.ts", "const alpha = 1, beta = 2;\n\nexport const keep = alpha + beta;\n");

    // beta is referenced, so force the removal.
    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Variable, "beta", "vars.ts"),
        reason: None,
        options: RemoveOptions {
            force_remove: true,
            ..RemoveOptions::default()
        },
    });

    assert!(result.success, "{:?}", result.error);
    let text = read(dir.path(), "vars.ts");
    assert!(text.contains("alpha = 1"));
    assert!(!text.contains("beta = 2"));
}

#[test]
fn test_dry_run_preview_leaves_disk_untouched() {
    let dir = TempDir::new().unwrap();
    create_user_project(dir.path());
    let before = read(dir.path(), "services/userService.ts");

    let mut engine = engine(dir.path());
    let preview = engine
        .preview(&Operation::Move {
            selector: Selector::new(
                SymbolKind::Function,
                "getUserData",
                "services/userService.ts",
            ),
            target_file: dir.path().join("services/profileService.ts"),
            options: MoveOptions::default(),
        })
        .unwrap();

    assert!(!preview.diff.is_empty());
    assert!(preview.diff.contains("getUserData"));
    assert_eq!(read(dir.path(), "services/userService.ts"), before);
    assert!(!read(dir.path(), "services/profileService.ts").contains("getUserData"));

    // The engine still works normally after a preview.
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "listUsers", "services/userService.ts"),
        reason: None,
        options: RemoveOptions::default(),
    });
    assert!(result.success, "{:?}", result.error);
}

#[test]
fn test_move_rewrites_re_export_barrel() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "impl/feature.ts", "export function feature() { return 1; }\n");
    write_file(dir.path(), "index.ts", "export { feature } from './impl/feature';\n");
    write_file(dir.path(), "impl/other.ts", "export const other = 1;\n");

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Move {
        selector: Selector::new(SymbolKind::Function, "feature", "impl/feature.ts"),
        target_file: dir.path().join("impl/moved.ts"),
        options: MoveOptions::default(),
    });

    assert!(result.success, "{:?}", result.error);
    let index = read(dir.path(), "index.ts");
    assert!(index.contains("export { feature } from './impl/moved';"));
}

#[test]
fn test_move_conflicts_with_target_re_export() {
    let dir = TempDir::new().unwrap();
    write_file(dir.path(), "impl/real.ts", "export function picked() { return 1; }\n");
    write_file(dir.path(), "barrel.ts", "export { picked } from './impl/real';\n");
    write_file(dir.path(), "a.ts", "export function picked() { return 9; }\n");
    let barrel_before = read(dir.path(), "barrel.ts");

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Move {
        selector: Selector::new(SymbolKind::Function, "picked", "a.ts"),
        target_file: dir.path().join("barrel.ts"),
        options: MoveOptions::default(),
    });

    assert!(!result.success);
    assert!(result.error.unwrap().contains("already declares or exports"));
    assert_eq!(read(dir.path(), "barrel.ts"), barrel_before);
    assert!(read(dir.path(), "a.ts").contains("picked"));
}

#[test]
fn test_move_repoints_default_importer() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "util.ts",
        "export default class Logger {\n  log(message: string) {\n    return message;\n  }\n}\n",
    );
    write_file(
        dir.path(),
        "app.ts",
        "import Logger from './util';\n\nexport const logger = new Logger();\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Move {
        selector: Selector::new(SymbolKind::Class, "Logger", "util.ts"),
        target_file: dir.path().join("logging.ts"),
        options: MoveOptions::default(),
    });

    assert!(result.success, "{:?}", result.error);
    assert!(read(dir.path(), "logging.ts").contains("class Logger"));
    let app = read(dir.path(), "app.ts");
    assert!(app.contains("from './logging'"));
    assert!(!app.contains("./util"));
}

#[test]
fn test_remove_overload_signature_falls_back_to_text_strategy() {
    let dir = TempDir::new().unwrap();
    // The overload signature survives structural deletion of the
    // implementation, so the chain has to drop down to text excision.
    write_file(
        dir.path(),
        "format.ts",
        "export function formatLabel(value: string): string;\nexport function formatLabel(value: any): string {\n  return String(value);\n}\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "formatLabel", "format.ts"),
        reason: None,
        options: RemoveOptions::default(),
    });

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.removal_method, Some(RemovalMethod::ManualText));
    assert!(result.warnings.iter().any(|w| w.contains("lossy")));
    assert!(!read(dir.path(), "format.ts").contains("formatLabel"));
}

#[test]
fn test_remove_reports_exhausted_strategies() {
    let dir = TempDir::new().unwrap();
    // Two surviving overload signatures defeat every strategy, including the
    // on-disk splice, each of which excises at most one of them.
    write_file(
        dir.path(),
        "parse.ts",
        "export function parseId(value: string): number;\nexport function parseId(value: number): number;\nexport function parseId(value: any): number {\n  return Number(value);\n}\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "parseId", "parse.ts"),
        reason: None,
        options: RemoveOptions::default(),
    });

    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.contains("removal strategies"));
    assert!(error.contains("parseId"));
    assert!(read(dir.path(), "parse.ts").contains("parseId"));
}

#[test]
fn test_forced_remove_cleanup_drops_dangling_imports() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "util.ts",
        "export function legacy() { return 1; }\nexport function keep() { return 2; }\n",
    );
    write_file(
        dir.path(),
        "app.ts",
        "import { legacy, keep } from './util';\n\nexport const v = keep();\n",
    );

    let mut engine = engine(dir.path());
    let result = engine.execute_operation(&Operation::Remove {
        selector: Selector::new(SymbolKind::Function, "legacy", "util.ts"),
        reason: None,
        options: RemoveOptions {
            force_remove: true,
            cleanup_dependencies: true,
            ..RemoveOptions::default()
        },
    });

    assert!(result.success, "{:?}", result.error);
    assert!(!read(dir.path(), "util.ts").contains("legacy"));
    let app = read(dir.path(), "app.ts");
    assert!(app.contains("import { keep } from './util';"));
    assert!(!app.contains("legacy"));
}

//! # symshift
//!
//! A symbol-level refactoring engine for TypeScript and JavaScript projects.
//!
//! This crate provides three operations over a multi-file source tree:
//! - Moving a declaration to another file, with import/export rewiring
//! - Renaming a declaration and every reference to it
//! - Removing a declaration through an escalating strategy chain
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use symshift::prelude::*;
//! use std::sync::Arc;
//!
//! // Move getUserData from userService.ts to profileService.ts
//! let mut engine = Engine::new(
//!     "./my-project",
//!     EngineConfig::new(),
//!     Arc::new(TracingSink),
//! )?;
//! let operation = Operation::Move {
//!     selector: Selector::new(
//!         SymbolKind::Function,
//!         "getUserData",
//!         "services/userService.ts",
//!     ),
//!     target_file: "services/profileService.ts".into(),
//!     options: MoveOptions::default(),
//! };
//! let result = engine.execute_operation(&operation);
//! assert!(result.success);
//! # Ok::<(), symshift::error::EngineError>(())
//! ```
//!
//! ## Batches
//!
//! Operations run strictly sequentially over one shared project model. A
//! batch carries a context that keeps a symbol moved by an earlier operation
//! from being reported as a naming conflict by a later one:
//!
//! ```rust,no_run
//! use symshift::prelude::*;
//! # use std::sync::Arc;
//! # let mut engine = Engine::new(".", EngineConfig::new(), Arc::new(NullSink))?;
//! let batch = BatchRequest {
//!     operations: vec![/* ... */],
//!     stop_on_error: Some(true),
//! };
//! let result = engine.execute_batch(&batch);
//! println!("{} succeeded, {} failed", result.succeeded, result.failed);
//! # Ok::<(), symshift::error::EngineError>(())
//! ```
//!
//! There is no rollback: `persist` is the commit point, and a failure after
//! an in-memory mutation leaves the model ahead of disk until the caller
//! reloads.

pub mod config;
pub mod edit;
pub mod error;
pub mod imports;
pub mod lang;
pub mod logging;
pub mod ops;
pub mod paths;
pub mod project;
pub mod symbols;
pub mod verify;

pub mod prelude {
    pub use crate::config::{EngineConfig, RetryPolicy};
    pub use crate::error::{EngineError, Result};
    pub use crate::imports::{NamedSpecifier, VirtualImport, VirtualImportManager};
    pub use crate::lang::{Language, TypeScript};
    pub use crate::logging::{LogLevel, LogSink, MemorySink, NullSink, SharedSink, TracingSink};
    pub use crate::ops::{
        BatchContext, BatchRequest, BatchResult, Engine, MoveOptions, Operation, OperationResult,
        Preview, RemovalMethod, RemoveOptions,
    };
    pub use crate::project::{Declaration, ProjectModel, QuoteStyle, SourceFile};
    pub use crate::symbols::{
        Eligibility, ParentScope, Reference, ReferenceKind, ResolvedSymbol, Selector, SymbolKind,
        SymbolResolver,
    };
    pub use crate::verify::{VerificationDetails, VerificationResult};
}

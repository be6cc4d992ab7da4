//! The multi-layer type checker.
//!
//! One visitor struct holds the shared state; the layers live in separate
//! files as `impl` blocks: literals and expressions in [`exprs`],
//! declarations in [`decls`], statements and control flow in [`stmts`].
//! Checking runs in two phases per module: first every module-level
//! declaration gets its signature resolved (so calls between functions type
//! regardless of declaration order), then initializers and bodies are
//! checked against those signatures.
//!
//! The checker never stops at the first error: failed sub-expressions
//! produce [`TypeInfo::Unknown`], which is compatible with everything and
//! keeps one mistake from cascading into dozens of reports.

mod decls;
mod exprs;
mod stmts;

use ahash::AHashMap;

use crate::ast::{AnalysisStore, DeclKind, Program};
use crate::diagnostics::DiagnosticBag;
use crate::globals::GlobalSymbolTable;
use crate::scope::SymbolTable;
use crate::types::{TypeInfo, TypeSystem};

/// Exported value types of already-built modules (module → name → type),
/// consulted for imported symbols and qualified references.
pub type DepValues = AHashMap<String, AHashMap<String, TypeInfo>>;

/// Shared state for all checker layers.
pub struct TypeChecker<'a> {
    pub(crate) program: &'a Program,
    pub(crate) table: &'a mut SymbolTable,
    pub(crate) types: &'a mut TypeSystem,
    pub(crate) store: &'a mut AnalysisStore,
    pub(crate) globals: &'a GlobalSymbolTable,
    pub(crate) dep_values: &'a DepValues,
    pub(crate) diagnostics: &'a mut DiagnosticBag,
    /// Return type of the function whose body is being checked.
    pub(crate) current_return: Option<TypeInfo>,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        program: &'a Program,
        table: &'a mut SymbolTable,
        types: &'a mut TypeSystem,
        store: &'a mut AnalysisStore,
        globals: &'a GlobalSymbolTable,
        dep_values: &'a DepValues,
        diagnostics: &'a mut DiagnosticBag,
    ) -> Self {
        Self {
            program,
            table,
            types,
            store,
            globals,
            dep_values,
            diagnostics,
            current_return: None,
        }
    }

    /// Checks the whole module.
    pub fn check(mut self) {
        // Phase 1: signatures, enum validation, imported symbol types.
        for decl in &self.program.decls {
            self.resolve_decl_signature(decl);
        }
        // Phase 2: initializers and bodies.
        for decl in &self.program.decls {
            match &decl.kind {
                DeclKind::Variable(var) => self.check_module_variable(decl, var),
                DeclKind::Function(function) => self.check_function_body(decl, function),
                _ => {}
            }
        }
    }
}

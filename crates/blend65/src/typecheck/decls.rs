//! Declaration layer: signatures, enum validation, variable declarations.

use super::TypeChecker;
use crate::ast::{Decl, DeclKind, FunctionDecl, TypeExpr, VariableDecl};
use crate::diagnostics::DiagnosticCode;
use crate::scope::{ScopeId, SymbolKind};
use crate::source::SourceSpan;
use crate::types::TypeInfo;

impl TypeChecker<'_> {
    /// Resolves an annotation, reporting `UNKNOWN_TYPE` and recovering with
    /// [`TypeInfo::Unknown`] when the name doesn't resolve.
    pub(crate) fn resolve_annotation(&mut self, annotation: &TypeExpr) -> TypeInfo {
        match self.types.resolve(annotation) {
            Some(ty) => ty,
            None => {
                self.diagnostics.report(
                    DiagnosticCode::UnknownType,
                    "unknown type in annotation",
                    annotation.location,
                );
                TypeInfo::Unknown
            }
        }
    }

    /// Phase 1: resolve the types a declaration exposes to the rest of the
    /// module (and to importers) without touching bodies or initializers.
    pub(crate) fn resolve_decl_signature(&mut self, decl: &Decl) {
        match &decl.kind {
            DeclKind::Function(function) => self.resolve_function_signature(decl, function),
            DeclKind::Enum(decl_enum) => {
                // Values were computed during symbol-table construction;
                // here they are validated against the byte range.
                for member in &decl_enum.members {
                    if let Some(value) = member.value {
                        if value > u32::from(u8::MAX) {
                            self.diagnostics.report(
                                DiagnosticCode::NumericOverflow,
                                format!(
                                    "enum member '{}.{}' value {value} does not fit in a byte",
                                    decl_enum.name, member.name
                                ),
                                member.location,
                            );
                        }
                    }
                }
            }
            DeclKind::Map(map) => {
                let ty = self.resolve_annotation(&map.ty);
                // The layout and alias passes size the mapping from the
                // node annotation.
                self.store.set_type(decl.id, ty.clone());
                if let Some(symbol) = self.table.symbol_for_node(decl.id) {
                    self.table.symbol_mut(symbol).ty = Some(ty);
                }
            }
            DeclKind::Import(_) => self.resolve_import_types(decl),
            DeclKind::Variable(_) | DeclKind::TypeAlias(_) => {}
        }
    }

    fn resolve_function_signature(&mut self, decl: &Decl, function: &FunctionDecl) {
        let mut params = Vec::with_capacity(function.params.len());
        let mut names = Vec::with_capacity(function.params.len());
        let body_scope = self.table.scope_for_node(decl.id);
        for param in &function.params {
            let ty = match &param.annotation {
                Some(annotation) => self.resolve_annotation(annotation),
                None => {
                    self.diagnostics.report(
                        DiagnosticCode::MissingTypeAnnotation,
                        format!("parameter '{}' needs a type annotation", param.name),
                        param.location,
                    );
                    TypeInfo::Unknown
                }
            };
            if let Some(scope) = body_scope {
                if let Some(symbol) = self.table.lookup_local(scope, &param.name) {
                    self.table.symbol_mut(symbol).ty = Some(ty.clone());
                }
            }
            params.push(ty);
            names.push(param.name.clone());
        }
        let ret = match &function.return_type {
            Some(annotation) => self.resolve_annotation(annotation),
            None => TypeInfo::Void,
        };
        let signature = TypeInfo::Function {
            params,
            ret: Box::new(ret),
            param_names: Some(names),
        };
        if let Some(symbol) = self.table.symbol_for_node(decl.id) {
            self.table.symbol_mut(symbol).ty = Some(signature);
        }
    }

    /// Fills in the types of imported value symbols from the exporting
    /// module's checked table.
    fn resolve_import_types(&mut self, decl: &Decl) {
        let DeclKind::Import(_) = &decl.kind else { return };
        let root = self.table.root();
        let imported: Vec<_> = self
            .table
            .symbols_in(root)
            .filter(|s| s.kind == SymbolKind::ImportedSymbol && s.ty.is_none())
            .map(|s| (s.id, s.source_module.clone(), s.original_name.clone()))
            .collect();
        for (id, module, original) in imported {
            let (Some(module), Some(original)) = (module, original) else { continue };
            let ty = self
                .dep_values
                .get(&module)
                .and_then(|values| values.get(&original))
                .cloned();
            if let Some(ty) = ty {
                self.table.symbol_mut(id).ty = Some(ty);
            }
        }
    }

    /// Checks a module-level `let`/`const`.
    pub(crate) fn check_module_variable(&mut self, decl: &Decl, var: &VariableDecl) {
        let root = self.table.root();
        let ty = self.check_variable_decl(var, decl.id, decl.location, root);
        if let Some(symbol) = self.table.symbol_for_node(decl.id) {
            self.table.symbol_mut(symbol).ty = Some(ty);
        }
    }

    /// Shared `let`/`const` checking for module and local declarations.
    /// Returns the variable's resolved type.
    pub(crate) fn check_variable_decl(
        &mut self,
        var: &VariableDecl,
        node: crate::ast::NodeId,
        location: SourceSpan,
        scope: ScopeId,
    ) -> TypeInfo {
        let annotated = var.annotation.as_ref().map(|a| self.resolve_annotation(a));

        if var.is_const && var.initializer.is_none() {
            self.diagnostics.report(
                DiagnosticCode::ConstRequiresInitializer,
                format!("const '{}' must have an initializer", var.name),
                location,
            );
        }
        if annotated.is_none() && var.initializer.is_none() {
            self.diagnostics.push(
                crate::diagnostics::Diagnostic::new(
                    DiagnosticCode::MissingTypeAnnotation,
                    format!("'{}' needs a type annotation or an initializer", var.name),
                    location,
                )
                .with_suggestion("write `let name: type;` or `let name = value;`"),
            );
            return TypeInfo::Unknown;
        }

        let initialized = var
            .initializer
            .as_ref()
            .map(|init| self.check_expr(init, scope, annotated.as_ref()));

        let ty = match (annotated, initialized) {
            (Some(annotated), Some(initialized)) => {
                if !initialized.compatibility(&annotated).is_assignable() {
                    self.diagnostics.report(
                        DiagnosticCode::TypeMismatch,
                        format!(
                            "cannot initialize '{}' of type {annotated} with a value of type {initialized}",
                            var.name
                        ),
                        location,
                    );
                }
                annotated
            }
            (Some(annotated), None) => annotated,
            (None, Some(initialized)) => initialized,
            (None, None) => TypeInfo::Unknown,
        };
        // Record the declared type on the statement node so analyses can
        // size the variable without a symbol lookup.
        self.store.set_type(node, ty.clone());
        ty
    }
}

//! Statement and control-flow layer.

use super::TypeChecker;
use crate::ast::{Decl, Expr, FunctionDecl, Stmt, StmtKind};
use crate::diagnostics::DiagnosticCode;
use crate::scope::ScopeId;
use crate::types::TypeInfo;

impl TypeChecker<'_> {
    /// Checks a function body against its resolved signature.
    pub(crate) fn check_function_body(&mut self, decl: &Decl, function: &FunctionDecl) {
        let Some(scope) = self.table.scope_for_node(decl.id) else {
            // The declaration collided with another symbol; phase 1 never
            // created a body scope.
            return;
        };
        // Read the return type back from the phase-1 signature: an
        // unresolvable annotation already reported UNKNOWN_TYPE and became
        // Unknown, which must suppress return-mismatch cascades here.
        let ret = self
            .table
            .symbol_for_node(decl.id)
            .and_then(|id| match &self.table.symbol(id).ty {
                Some(TypeInfo::Function { ret, .. }) => Some(ret.as_ref().clone()),
                _ => None,
            })
            .unwrap_or(TypeInfo::Void);
        let previous = self.current_return.replace(ret.clone());
        self.check_stmts(&function.body, scope);
        self.current_return = previous;

        if !ret.is_void() && !ret.is_unknown() && !always_returns(&function.body) {
            self.diagnostics.report(
                DiagnosticCode::MayNotReturn,
                format!("function '{}' may reach its end without returning a {ret}", function.name),
                decl.location,
            );
        }
    }

    pub(crate) fn check_stmts(&mut self, stmts: &[Stmt], scope: ScopeId) {
        for stmt in stmts {
            self.check_stmt(stmt, scope);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, scope: ScopeId) {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let _ = self.check_expr(expr, scope, None);
            }
            StmtKind::Let(var) => {
                let ty = self.check_variable_decl(var, stmt.id, stmt.location, scope);
                if let Some(symbol) = self.table.symbol_for_node(stmt.id) {
                    self.table.symbol_mut(symbol).ty = Some(ty);
                }
                // Const locals with folded initializers participate in
                // constant propagation.
                if var.is_const {
                    if let Some(init) = &var.initializer {
                        if let Some(value) = self.store.const_value(init.id) {
                            self.store.set_const_value(stmt.id, value);
                        }
                    }
                }
            }
            StmtKind::Block(body) => {
                let inner = self.table.scope_for_branch(stmt.id, 0).unwrap_or(scope);
                self.check_stmts(body, inner);
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.expect_bool(condition, scope, "if condition");
                let then_scope = self.table.scope_for_branch(stmt.id, 0).unwrap_or(scope);
                self.check_stmts(then_branch, then_scope);
                if let Some(else_branch) = else_branch {
                    let else_scope = self.table.scope_for_branch(stmt.id, 1).unwrap_or(scope);
                    self.check_stmts(else_branch, else_scope);
                }
            }
            StmtKind::While { condition, body } => {
                self.expect_bool(condition, scope, "while condition");
                let body_scope = self.table.scope_for_branch(stmt.id, 0).unwrap_or(scope);
                self.check_stmts(body, body_scope);
            }
            StmtKind::DoWhile { body, condition } => {
                let body_scope = self.table.scope_for_branch(stmt.id, 0).unwrap_or(scope);
                self.check_stmts(body, body_scope);
                // The condition sees declarations from the body scope.
                self.expect_bool(condition, body_scope, "do-while condition");
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                let loop_scope = self.table.scope_for_branch(stmt.id, 0).unwrap_or(scope);
                if let Some(init) = init {
                    self.check_stmt(init, loop_scope);
                }
                if let Some(condition) = condition {
                    self.expect_bool(condition, loop_scope, "for condition");
                }
                if let Some(update) = update {
                    let _ = self.check_expr(update, loop_scope, None);
                }
                self.check_stmts(body, loop_scope);
            }
            StmtKind::Loop { body } => {
                let body_scope = self.table.scope_for_branch(stmt.id, 0).unwrap_or(scope);
                self.check_stmts(body, body_scope);
            }
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                let scrutinee_ty = self.check_expr(scrutinee, scope, None);
                let matchable =
                    scrutinee_ty.is_numeric() || matches!(scrutinee_ty, TypeInfo::Enum { .. } | TypeInfo::Unknown);
                if !matchable {
                    self.diagnostics.report(
                        DiagnosticCode::TypeMismatch,
                        format!("match scrutinee must be numeric or an enum, found {scrutinee_ty}"),
                        scrutinee.location,
                    );
                }
                for (index, arm) in arms.iter().enumerate() {
                    let pattern_ty = self.check_expr(&arm.pattern, scope, Some(&scrutinee_ty));
                    if matchable && !pattern_ty.compatibility(&scrutinee_ty).is_assignable() {
                        self.diagnostics.report(
                            DiagnosticCode::TypeMismatch,
                            format!("match arm pattern has type {pattern_ty}, expected {scrutinee_ty}"),
                            arm.pattern.location,
                        );
                    }
                    let arm_scope = self
                        .table
                        .scope_for_branch(stmt.id, u8::try_from(index).unwrap_or(u8::MAX))
                        .unwrap_or(scope);
                    self.check_stmts(&arm.body, arm_scope);
                }
                if let Some(default) = default {
                    let default_scope = self
                        .table
                        .scope_for_branch(stmt.id, u8::try_from(arms.len()).unwrap_or(u8::MAX))
                        .unwrap_or(scope);
                    self.check_stmts(default, default_scope);
                }
            }
            StmtKind::Return(value) => self.check_return(stmt, value.as_ref(), scope),
            StmtKind::Break | StmtKind::Continue => {
                if !self.table.is_inside_loop(scope) {
                    let which = if matches!(stmt.kind, StmtKind::Break) { "break" } else { "continue" };
                    self.diagnostics.report(
                        DiagnosticCode::ControlFlowOutsideLoop,
                        format!("'{which}' outside of a loop"),
                        stmt.location,
                    );
                }
            }
        }
    }

    fn check_return(&mut self, stmt: &Stmt, value: Option<&Expr>, scope: ScopeId) {
        let expected = self.current_return.clone().unwrap_or(TypeInfo::Void);
        match value {
            Some(value) => {
                let value_ty = self.check_expr(value, scope, Some(&expected));
                if expected.is_void() {
                    self.diagnostics.report(
                        DiagnosticCode::UnexpectedReturnValue,
                        "void function returns a value",
                        value.location,
                    );
                } else if !value_ty.compatibility(&expected).is_assignable() {
                    self.diagnostics.report(
                        DiagnosticCode::ReturnTypeMismatch,
                        format!("return type is {expected}, found {value_ty}"),
                        value.location,
                    );
                }
            }
            None => {
                if !expected.is_void() && !expected.is_unknown() {
                    self.diagnostics.report(
                        DiagnosticCode::MissingReturnValue,
                        format!("non-void function must return a {expected}"),
                        stmt.location,
                    );
                }
            }
        }
    }

    fn expect_bool(&mut self, condition: &Expr, scope: ScopeId, context: &str) {
        let ty = self.check_expr(condition, scope, Some(&TypeInfo::Bool));
        if !matches!(ty, TypeInfo::Bool | TypeInfo::Unknown) {
            self.diagnostics.report(
                DiagnosticCode::TypeMismatch,
                format!("{context} must be bool, found {ty}; integers are not truthy"),
                condition.location,
            );
        }
    }
}

/// Conservative all-paths-return analysis for the `MAY_NOT_RETURN` warning.
///
/// `true` means every path through `stmts` ends in a return (or diverges in
/// an infinite loop, which never reaches the function exit).
fn always_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Return(_) => true,
        StmtKind::Block(body) => always_returns(body),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => match else_branch {
            Some(else_branch) => always_returns(then_branch) && always_returns(else_branch),
            None => false,
        },
        StmtKind::Match { arms, default, .. } => match default {
            Some(default) => arms.iter().all(|arm| always_returns(&arm.body)) && always_returns(default),
            None => false,
        },
        // An infinite loop without a break never reaches the function exit.
        StmtKind::Loop { body } => !contains_break(body),
        _ => false,
    }
}

fn contains_break(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::Break => true,
        StmtKind::Block(body) => contains_break(body),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => contains_break(then_branch) || else_branch.as_deref().is_some_and(contains_break),
        StmtKind::Match { arms, default, .. } => {
            arms.iter().any(|arm| contains_break(&arm.body)) || default.as_deref().is_some_and(contains_break)
        }
        // Breaks inside a nested loop bind to that loop.
        _ => false,
    })
}

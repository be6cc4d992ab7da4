//! Literal and expression layers.
//!
//! Every expression gets a type annotation in the analysis store, even when
//! checking fails: failed sub-expressions type as `Unknown` so the walk
//! keeps going. Compile-time constants (literals, enum members, `sizeof`,
//! `length`, const folds) are recorded alongside; the loop analyzer and the
//! IL generator read them back.

use super::TypeChecker;
use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::diagnostics::DiagnosticCode;
use crate::globals::SimpleLookup;
use crate::scope::{ScopeId, SymbolId, SymbolKind};
use crate::types::TypeInfo;

impl TypeChecker<'_> {
    /// Type-checks `expr` in `scope` and annotates the node.
    ///
    /// `expected` is the type the context wants (declared variable type,
    /// parameter type); it tightens literal inference but never forces a
    /// conversion by itself.
    pub(crate) fn check_expr(&mut self, expr: &Expr, scope: ScopeId, expected: Option<&TypeInfo>) -> TypeInfo {
        let ty = match &expr.kind {
            ExprKind::Number(value) => self.check_number(expr, *value, expected),
            ExprKind::Bool(_) => TypeInfo::Bool,
            ExprKind::Str(_) => TypeInfo::String,
            ExprKind::ArrayLiteral(items) => self.check_array_literal(expr, items, scope, expected),
            ExprKind::Identifier(name) => self.check_identifier(expr, name, scope),
            ExprKind::Member { object, property } => self.check_member(expr, object, property, scope),
            ExprKind::Unary { op, operand } => self.check_unary(expr, *op, operand, scope),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(expr, *op, lhs, rhs, scope),
            ExprKind::Assign { target, value } => self.check_assign(target, value, scope),
            ExprKind::Call { callee, args } => self.check_call(expr, callee, args, scope),
            ExprKind::Index { target, index } => self.check_index(target, index, scope),
        };
        self.store.set_type(expr.id, ty.clone());
        ty
    }

    fn check_number(&mut self, expr: &Expr, value: u32, expected: Option<&TypeInfo>) -> TypeInfo {
        self.store.set_const_value(expr.id, u64::from(value));
        if value > u32::from(u16::MAX) {
            self.diagnostics.report(
                DiagnosticCode::NumericOverflow,
                format!("literal {value} does not fit in a word"),
                expr.location,
            );
            return TypeInfo::Word;
        }
        match expected {
            Some(TypeInfo::Byte) => {
                if value > u32::from(u8::MAX) {
                    self.diagnostics.report(
                        DiagnosticCode::NumericOverflow,
                        format!("literal {value} does not fit in a byte"),
                        expr.location,
                    );
                }
                TypeInfo::Byte
            }
            Some(TypeInfo::Word) => TypeInfo::Word,
            _ => {
                if value <= u32::from(u8::MAX) {
                    TypeInfo::Byte
                } else {
                    TypeInfo::Word
                }
            }
        }
    }

    fn check_array_literal(
        &mut self,
        expr: &Expr,
        items: &[Expr],
        scope: ScopeId,
        expected: Option<&TypeInfo>,
    ) -> TypeInfo {
        let expected_element = match expected {
            Some(TypeInfo::Array { element, .. }) => Some(element.as_ref().clone()),
            _ => None,
        };
        let mut element = expected_element.clone().unwrap_or(TypeInfo::Unknown);
        for (index, item) in items.iter().enumerate() {
            let item_ty = self.check_expr(item, scope, expected_element.as_ref());
            if element.is_unknown() {
                element = item_ty;
            } else if !item_ty.compatibility(&element).is_assignable() {
                self.diagnostics.report(
                    DiagnosticCode::TypeMismatch,
                    format!("array element {index} has type {item_ty}, expected {element}"),
                    item.location,
                );
            }
        }
        let length = u16::try_from(items.len()).ok();
        if length.is_none() {
            self.diagnostics.report(
                DiagnosticCode::NumericOverflow,
                "array literal is longer than a word can index",
                expr.location,
            );
        }
        TypeInfo::array(element, length.or(Some(0)))
    }

    fn check_identifier(&mut self, expr: &Expr, name: &str, scope: ScopeId) -> TypeInfo {
        if let Some(symbol) = self.table.lookup_in_chain(scope, name) {
            self.fold_symbol_const(expr, symbol);
            return self.table.symbol(symbol).ty.clone().unwrap_or(TypeInfo::Unknown);
        }
        // Not in scope: consult the global table for a better message.
        let diagnostic = match self.globals.lookup_simple(name) {
            SimpleLookup::Unique(global) => crate::diagnostics::Diagnostic::new(
                DiagnosticCode::SymbolNotFound,
                format!("'{name}' is not in scope"),
                expr.location,
            )
            .with_suggestion(format!("import it: `import {name} from {}`", global.module)),
            SimpleLookup::Ambiguous(candidates) => {
                let modules: Vec<_> = candidates.iter().map(|c| c.module.as_str()).collect();
                crate::diagnostics::Diagnostic::new(
                    DiagnosticCode::SymbolNotFound,
                    format!("'{name}' is ambiguous; exported by modules {}", modules.join(", ")),
                    expr.location,
                )
                .with_suggestion("qualify the reference with its module name")
            }
            SimpleLookup::NotFound => crate::diagnostics::Diagnostic::new(
                DiagnosticCode::SymbolNotFound,
                format!("'{name}' is not declared"),
                expr.location,
            ),
        };
        self.diagnostics.push(diagnostic);
        TypeInfo::Unknown
    }

    /// Copies a known compile-time value onto an identifier use.
    fn fold_symbol_const(&mut self, expr: &Expr, symbol: SymbolId) {
        let symbol = self.table.symbol(symbol);
        if symbol.kind == SymbolKind::EnumMember {
            if let Some(TypeInfo::Enum { members, .. }) = &symbol.ty {
                if let Some(&value) = members.get(&symbol.name) {
                    self.store.set_const_value(expr.id, u64::from(value));
                }
            }
        } else if symbol.is_const {
            if let Some(node) = symbol.node {
                if let Some(value) = self.store.const_value(node) {
                    self.store.set_const_value(expr.id, value);
                }
            }
        }
    }

    fn check_member(&mut self, expr: &Expr, object: &Expr, property: &str, scope: ScopeId) -> TypeInfo {
        if let Some(name) = object.as_identifier() {
            // Enum member access: `Color.Red`.
            if let Some(symbol) = self.table.lookup_in_chain(scope, name) {
                let symbol = self.table.symbol(symbol);
                if let Some(TypeInfo::Enum { name: enum_name, members }) = &symbol.ty {
                    if symbol.name == *enum_name {
                        let enum_ty = symbol.ty.clone().expect("checked above");
                        self.store.set_type(object.id, enum_ty.clone());
                        return match members.get(property) {
                            Some(&value) => {
                                self.store.set_const_value(expr.id, u64::from(value));
                                enum_ty
                            }
                            None => {
                                self.diagnostics.report(
                                    DiagnosticCode::SymbolNotFound,
                                    format!("enum '{enum_name}' has no member '{property}'"),
                                    expr.location,
                                );
                                TypeInfo::Unknown
                            }
                        };
                    }
                }
            } else if self.globals.lookup_qualified(name, property).is_some() {
                // Qualified cross-module reference: `Mod.symbol`.
                let ty = self
                    .dep_values
                    .get(name)
                    .and_then(|values| values.get(property))
                    .cloned()
                    .unwrap_or(TypeInfo::Unknown);
                return ty;
            }
        }
        let object_ty = self.check_expr(object, scope, None);
        if !object_ty.is_unknown() {
            self.diagnostics.report(
                DiagnosticCode::InvalidOperator,
                format!("type {object_ty} has no member '{property}'"),
                expr.location,
            );
        }
        TypeInfo::Unknown
    }

    fn check_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr, scope: ScopeId) -> TypeInfo {
        match op {
            UnaryOp::Not => {
                let ty = self.check_expr(operand, scope, Some(&TypeInfo::Bool));
                if !matches!(ty, TypeInfo::Bool | TypeInfo::Unknown) {
                    self.diagnostics.report(
                        DiagnosticCode::TypeMismatch,
                        format!("'not' expects bool, found {ty}"),
                        operand.location,
                    );
                }
                TypeInfo::Bool
            }
            UnaryOp::BitNot | UnaryOp::Negate => {
                let ty = self.check_expr(operand, scope, None);
                if !ty.is_numeric() && !ty.is_unknown() {
                    self.diagnostics.report(
                        DiagnosticCode::InvalidOperator,
                        format!("operator '{op}' expects a numeric operand, found {ty}"),
                        operand.location,
                    );
                    return TypeInfo::Unknown;
                }
                if ty.is_unknown() { TypeInfo::Unknown } else { ty }
            }
            UnaryOp::AddressOf => {
                let _ = self.check_expr(operand, scope, None);
                if !operand.is_lvalue() {
                    self.diagnostics.report(
                        DiagnosticCode::InvalidLValue,
                        "'&' expects an addressable location",
                        operand.location,
                    );
                }
                TypeInfo::Word
            }
        }
    }

    fn check_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr, scope: ScopeId) -> TypeInfo {
        let lhs_ty = self.check_expr(lhs, scope, None);
        let rhs_ty = self.check_expr(rhs, scope, None);

        if op.is_logical() {
            for (operand, ty) in [(lhs, &lhs_ty), (rhs, &rhs_ty)] {
                if !matches!(ty, TypeInfo::Bool | TypeInfo::Unknown) {
                    self.diagnostics.report(
                        DiagnosticCode::TypeMismatch,
                        format!("operator '{op}' expects bool operands, found {ty}"),
                        operand.location,
                    );
                }
            }
            return TypeInfo::Bool;
        }

        if op.is_comparison() {
            let compatible = lhs_ty.compatibility(&rhs_ty).is_assignable()
                || rhs_ty.compatibility(&lhs_ty).is_assignable();
            if !compatible {
                self.diagnostics.report(
                    DiagnosticCode::TypeMismatch,
                    format!("cannot compare {lhs_ty} and {rhs_ty} with '{op}'"),
                    expr.location,
                );
            }
            return TypeInfo::Bool;
        }

        // Arithmetic / bitwise.
        for (operand, ty) in [(lhs, &lhs_ty), (rhs, &rhs_ty)] {
            if !ty.is_numeric() && !ty.is_unknown() {
                self.diagnostics.report(
                    DiagnosticCode::InvalidOperator,
                    format!("operator '{op}' expects numeric operands, found {ty}"),
                    operand.location,
                );
                return TypeInfo::Unknown;
            }
        }
        let result = lhs_ty.numeric_result(&rhs_ty);
        self.fold_binary(expr, op, lhs, rhs, &result);
        result
    }

    /// Folds constant operands and flags folded byte overflow. The overflow
    /// note is informational: runtime wrap-around is defined behavior on
    /// this target.
    fn fold_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr, result: &TypeInfo) {
        let (Some(a), Some(b)) = (self.store.const_value(lhs.id), self.store.const_value(rhs.id)) else {
            return;
        };
        let value = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            BinaryOp::Mod => a.checked_rem(b),
            BinaryOp::BitAnd => Some(a & b),
            BinaryOp::BitOr => Some(a | b),
            BinaryOp::BitXor => Some(a ^ b),
            BinaryOp::Shl => a.checked_shl(u32::try_from(b).unwrap_or(u32::MAX)),
            BinaryOp::Shr => a.checked_shr(u32::try_from(b).unwrap_or(u32::MAX)),
            _ => None,
        };
        let Some(value) = value else { return };
        self.store.set_const_value(expr.id, value);
        if *result == TypeInfo::Byte && op.can_overflow_byte() && value > u64::from(u8::MAX) {
            self.diagnostics.report_info(
                DiagnosticCode::NumericOverflow,
                format!("byte arithmetic overflows: {a} {op} {b} = {value}"),
                expr.location,
            );
        }
    }

    fn check_assign(&mut self, target: &Expr, value: &Expr, scope: ScopeId) -> TypeInfo {
        if !target.is_lvalue() {
            self.diagnostics.report(
                DiagnosticCode::InvalidLValue,
                "assignment target must be a variable, index, or member",
                target.location,
            );
            let _ = self.check_expr(value, scope, None);
            return TypeInfo::Void;
        }
        let target_ty = self.check_expr(target, scope, None);
        if let Some(name) = target.as_identifier() {
            if let Some(symbol) = self.table.lookup_in_chain(scope, name) {
                let symbol = self.table.symbol(symbol);
                if symbol.is_const {
                    self.diagnostics.push(
                        crate::diagnostics::Diagnostic::new(
                            DiagnosticCode::ConstReassignment,
                            format!("cannot reassign const '{name}'; it is immutable"),
                            target.location,
                        )
                        .with_suggestion("declare it with `let` if it needs to change"),
                    );
                }
            }
        }
        let value_ty = self.check_expr(value, scope, Some(&target_ty));
        if !value_ty.compatibility(&target_ty).is_assignable() {
            self.diagnostics.report(
                DiagnosticCode::TypeMismatch,
                format!("cannot assign {value_ty} to a location of type {target_ty}"),
                value.location,
            );
        }
        TypeInfo::Void
    }

    fn check_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr], scope: ScopeId) -> TypeInfo {
        // Intrinsics with compile-time semantics first.
        if let Some(name) = callee.as_identifier() {
            if let Some(symbol) = self.table.lookup_in_chain(scope, name) {
                if self.table.symbol(symbol).kind == SymbolKind::Intrinsic {
                    match name {
                        "sizeof" => return self.check_sizeof(expr, args, scope),
                        "length" => return self.check_length(expr, args, scope),
                        _ => {}
                    }
                }
            }
        }

        let callee_ty = self.check_expr(callee, scope, None);
        let TypeInfo::Function { params, ret, param_names } = callee_ty else {
            if !callee_ty.is_unknown() {
                self.diagnostics.report(
                    DiagnosticCode::NotCallable,
                    format!("value of type {callee_ty} is not callable"),
                    callee.location,
                );
            }
            for arg in args {
                let _ = self.check_expr(arg, scope, None);
            }
            return TypeInfo::Unknown;
        };

        if args.len() != params.len() {
            self.diagnostics.report(
                DiagnosticCode::ArgumentCountMismatch,
                format!("expected {} argument(s), found {}", params.len(), args.len()),
                expr.location,
            );
        }
        for (index, (arg, param)) in args.iter().zip(&params).enumerate() {
            let arg_ty = self.check_expr(arg, scope, Some(param));
            if !arg_ty.compatibility(param).is_assignable() {
                let param_name = param_names
                    .as_ref()
                    .and_then(|names| names.get(index))
                    .map_or_else(|| format!("#{index}"), |n| format!("'{n}'"));
                self.diagnostics.report(
                    DiagnosticCode::ArgumentTypeMismatch,
                    format!("argument {param_name} expects {param}, found {arg_ty}"),
                    arg.location,
                );
            }
        }
        // Surplus arguments still get checked so their errors surface.
        for arg in args.iter().skip(params.len()) {
            let _ = self.check_expr(arg, scope, None);
        }
        *ret
    }

    /// `sizeof(T)` / `sizeof(expr)`: folds to the byte size, emits no IL.
    fn check_sizeof(&mut self, expr: &Expr, args: &[Expr], scope: ScopeId) -> TypeInfo {
        if args.len() != 1 {
            self.diagnostics.report(
                DiagnosticCode::ArgumentCountMismatch,
                format!("sizeof expects 1 argument, found {}", args.len()),
                expr.location,
            );
            return TypeInfo::Word;
        }
        let arg = &args[0];
        // A bare identifier naming a type wins over a shadowing variable.
        let ty = match arg.as_identifier().and_then(|name| self.types.lookup(name)) {
            Some(ty) => {
                self.store.set_type(arg.id, ty.clone());
                ty
            }
            None => self.check_expr(arg, scope, None),
        };
        if ty.is_unknown() {
            return TypeInfo::Word;
        }
        self.store
            .set_const_value(expr.id, u64::try_from(ty.size()).unwrap_or(u64::MAX));
        TypeInfo::Word
    }

    /// `length(array)`: folds to the fixed length.
    fn check_length(&mut self, expr: &Expr, args: &[Expr], scope: ScopeId) -> TypeInfo {
        if args.len() != 1 {
            self.diagnostics.report(
                DiagnosticCode::ArgumentCountMismatch,
                format!("length expects 1 argument, found {}", args.len()),
                expr.location,
            );
            return TypeInfo::Word;
        }
        let arg_ty = self.check_expr(&args[0], scope, None);
        match arg_ty {
            TypeInfo::Array { length: Some(length), .. } => {
                self.store.set_const_value(expr.id, u64::from(length));
            }
            TypeInfo::Array { length: None, .. } => {
                self.diagnostics.report(
                    DiagnosticCode::TypeMismatch,
                    "length requires an array with a fixed length",
                    args[0].location,
                );
            }
            TypeInfo::Unknown => {}
            other => {
                self.diagnostics.report(
                    DiagnosticCode::TypeMismatch,
                    format!("length expects an array, found {other}"),
                    args[0].location,
                );
            }
        }
        TypeInfo::Word
    }

    fn check_index(&mut self, target: &Expr, index: &Expr, scope: ScopeId) -> TypeInfo {
        let target_ty = self.check_expr(target, scope, None);
        let index_ty = self.check_expr(index, scope, None);
        if !index_ty.is_numeric() && !index_ty.is_unknown() {
            self.diagnostics.report(
                DiagnosticCode::TypeMismatch,
                format!("index must be numeric, found {index_ty}"),
                index.location,
            );
        }
        match target_ty {
            TypeInfo::Array { element, .. } => *element,
            TypeInfo::Unknown => TypeInfo::Unknown,
            other => {
                self.diagnostics.report(
                    DiagnosticCode::TypeMismatch,
                    format!("cannot index a value of type {other}"),
                    target.location,
                );
                TypeInfo::Unknown
            }
        }
    }
}

//! Programmatic AST construction.
//!
//! The external parser hands programs to the middle-end through this API;
//! the test suites use it directly. The builder owns the [`NodeId`] counter
//! and a "current location" that stamps every node created until it is moved
//! again, so front-ends set a position once per source token run.

use super::{
    BinaryOp, Decl, DeclKind, EnumDecl, EnumMember, Expr, ExprKind, FunctionDecl, ImportDecl, ImportList,
    ImportName, MapDecl, MapForm, MatchArm, NodeId, Param, Program, Stmt, StmtKind, StorageClass, TypeAliasDecl,
    TypeExpr, UnaryOp, VariableDecl,
};
use crate::source::{SourceId, SourceSpan};

/// Builds one module's AST, handing out ids and locations.
#[derive(Debug)]
pub struct AstBuilder {
    source: Option<SourceId>,
    next_id: u32,
    location: SourceSpan,
}

impl AstBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            next_id: 0,
            location: SourceSpan::synthetic(),
        }
    }

    /// Builder whose nodes point into a registered source file.
    #[must_use]
    pub fn for_source(source: SourceId) -> Self {
        Self {
            source: Some(source),
            next_id: 0,
            location: SourceSpan::synthetic(),
        }
    }

    /// Sets the location stamped on subsequently created nodes.
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.location = SourceSpan::at(self.source, line, column);
        self
    }

    fn next(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr {
            id: self.next(),
            location: self.location,
            kind,
        }
    }

    fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.next(),
            location: self.location,
            kind,
        }
    }

    fn decl(&mut self, kind: DeclKind) -> Decl {
        Decl {
            id: self.next(),
            location: self.location,
            kind,
        }
    }

    /// Finishes the module, consuming the builder.
    #[must_use]
    pub fn program(self, name: impl Into<String>, decls: Vec<Decl>) -> Program {
        Program {
            name: name.into(),
            source: self.source,
            decls,
            location: SourceSpan::at(self.source, 1, 1),
            node_count: self.next_id,
        }
    }

    // --- expressions ---

    pub fn number(&mut self, value: u32) -> Expr {
        self.expr(ExprKind::Number(value))
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.expr(ExprKind::Bool(value))
    }

    pub fn string(&mut self, value: impl Into<String>) -> Expr {
        self.expr(ExprKind::Str(value.into()))
    }

    pub fn array_literal(&mut self, items: Vec<Expr>) -> Expr {
        self.expr(ExprKind::ArrayLiteral(items))
    }

    pub fn ident(&mut self, name: impl Into<String>) -> Expr {
        self.expr(ExprKind::Identifier(name.into()))
    }

    pub fn member(&mut self, object: Expr, property: impl Into<String>) -> Expr {
        self.expr(ExprKind::Member {
            object: Box::new(object),
            property: property.into(),
        })
    }

    pub fn unary(&mut self, op: UnaryOp, operand: Expr) -> Expr {
        self.expr(ExprKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn assign(&mut self, target: Expr, value: Expr) -> Expr {
        self.expr(ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    pub fn call(&mut self, callee: Expr, args: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    /// `name(args...)` with a plain identifier callee.
    pub fn call_named(&mut self, name: impl Into<String>, args: Vec<Expr>) -> Expr {
        let callee = self.ident(name);
        self.call(callee, args)
    }

    pub fn index(&mut self, target: Expr, index: Expr) -> Expr {
        self.expr(ExprKind::Index {
            target: Box::new(target),
            index: Box::new(index),
        })
    }

    // --- type expressions ---

    #[must_use]
    pub fn ty(&self, name: impl Into<String>) -> TypeExpr {
        TypeExpr::named(name, self.location)
    }

    #[must_use]
    pub fn ty_array(&self, element: TypeExpr, length: Option<u16>) -> TypeExpr {
        TypeExpr::array(element, length, self.location)
    }

    // --- statements ---

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn let_local(&mut self, name: impl Into<String>, annotation: Option<TypeExpr>, init: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Let(VariableDecl {
            name: name.into(),
            annotation,
            initializer: init,
            is_const: false,
            is_exported: false,
            storage: StorageClass::Auto,
        }))
    }

    pub fn const_local(&mut self, name: impl Into<String>, annotation: Option<TypeExpr>, init: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Let(VariableDecl {
            name: name.into(),
            annotation,
            initializer: init,
            is_const: true,
            is_exported: false,
            storage: StorageClass::Auto,
        }))
    }

    pub fn block(&mut self, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(body))
    }

    pub fn if_stmt(&mut self, condition: Expr, then_branch: Vec<Stmt>, else_branch: Option<Vec<Stmt>>) -> Stmt {
        self.stmt(StmtKind::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    pub fn while_stmt(&mut self, condition: Expr, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::While { condition, body })
    }

    pub fn do_while(&mut self, body: Vec<Stmt>, condition: Expr) -> Stmt {
        self.stmt(StmtKind::DoWhile { body, condition })
    }

    pub fn for_stmt(
        &mut self,
        init: Option<Stmt>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
    ) -> Stmt {
        self.stmt(StmtKind::For {
            init: init.map(Box::new),
            condition,
            update,
            body,
        })
    }

    pub fn loop_stmt(&mut self, body: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Loop { body })
    }

    #[must_use]
    pub fn arm(&self, pattern: Expr, body: Vec<Stmt>) -> MatchArm {
        MatchArm {
            location: self.location,
            pattern,
            body,
        }
    }

    pub fn match_stmt(&mut self, scrutinee: Expr, arms: Vec<MatchArm>, default: Option<Vec<Stmt>>) -> Stmt {
        self.stmt(StmtKind::Match {
            scrutinee,
            arms,
            default,
        })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    pub fn brk(&mut self) -> Stmt {
        self.stmt(StmtKind::Break)
    }

    pub fn cont(&mut self) -> Stmt {
        self.stmt(StmtKind::Continue)
    }

    // --- declarations ---

    #[must_use]
    pub fn param(&mut self, name: impl Into<String>, annotation: TypeExpr) -> Param {
        Param {
            id: self.next(),
            location: self.location,
            name: name.into(),
            annotation: Some(annotation),
        }
    }

    pub fn function(
        &mut self,
        name: impl Into<String>,
        params: Vec<Param>,
        return_type: Option<TypeExpr>,
        body: Vec<Stmt>,
    ) -> Decl {
        self.decl(DeclKind::Function(FunctionDecl {
            name: name.into(),
            params,
            return_type,
            body,
            is_exported: false,
        }))
    }

    pub fn global_var(
        &mut self,
        name: impl Into<String>,
        storage: StorageClass,
        annotation: Option<TypeExpr>,
        init: Option<Expr>,
    ) -> Decl {
        self.decl(DeclKind::Variable(VariableDecl {
            name: name.into(),
            annotation,
            initializer: init,
            is_const: false,
            is_exported: false,
            storage,
        }))
    }

    pub fn global_const(&mut self, name: impl Into<String>, annotation: Option<TypeExpr>, init: Option<Expr>) -> Decl {
        self.decl(DeclKind::Variable(VariableDecl {
            name: name.into(),
            annotation,
            initializer: init,
            is_const: true,
            is_exported: false,
            storage: StorageClass::Auto,
        }))
    }

    pub fn enum_decl(&mut self, name: impl Into<String>, members: &[(&str, Option<u32>)]) -> Decl {
        let members = members
            .iter()
            .map(|(name, value)| EnumMember {
                location: self.location,
                name: (*name).to_owned(),
                value: *value,
            })
            .collect();
        self.decl(DeclKind::Enum(EnumDecl {
            name: name.into(),
            members,
            is_exported: false,
        }))
    }

    pub fn type_alias(&mut self, name: impl Into<String>, ty: TypeExpr) -> Decl {
        self.decl(DeclKind::TypeAlias(TypeAliasDecl {
            name: name.into(),
            ty,
            is_exported: false,
        }))
    }

    pub fn import(&mut self, names: &[&str], module: impl Into<String>) -> Decl {
        let list = ImportList::Named(
            names
                .iter()
                .map(|name| ImportName {
                    location: self.location,
                    name: (*name).to_owned(),
                })
                .collect(),
        );
        self.decl(DeclKind::Import(ImportDecl {
            list,
            module: module.into(),
        }))
    }

    pub fn import_all(&mut self, module: impl Into<String>) -> Decl {
        self.decl(DeclKind::Import(ImportDecl {
            list: ImportList::Wildcard,
            module: module.into(),
        }))
    }

    pub fn map_decl(&mut self, name: impl Into<String>, form: MapForm, ty: TypeExpr) -> Decl {
        self.decl(DeclKind::Map(MapDecl {
            name: name.into(),
            ty,
            form,
            is_exported: false,
        }))
    }

    /// Marks a declaration as exported.
    #[must_use]
    pub fn export(mut decl: Decl) -> Decl {
        match &mut decl.kind {
            DeclKind::Function(f) => f.is_exported = true,
            DeclKind::Variable(v) => v.is_exported = true,
            DeclKind::Enum(e) => e.is_exported = true,
            DeclKind::TypeAlias(t) => t.is_exported = true,
            DeclKind::Map(m) => m.is_exported = true,
            DeclKind::Import(_) => {}
        }
        decl
    }
}

impl Default for AstBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_unique_ids() {
        let mut b = AstBuilder::new();
        let one = b.number(1);
        let two = b.number(2);
        let sum = b.binary(BinaryOp::Add, one.clone(), two.clone());
        assert_ne!(one.id, two.id);
        assert_ne!(two.id, sum.id);
        let program = b.program("main", vec![]);
        assert_eq!(program.node_count, 3);
    }

    #[test]
    fn location_stamps_following_nodes() {
        let mut b = AstBuilder::new();
        b.at(7, 3);
        let expr = b.number(0);
        assert_eq!(expr.location.start.line, 7);
        assert_eq!(expr.location.start.column, 3);
    }
}

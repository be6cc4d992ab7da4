//! The Blend65 abstract syntax tree.
//!
//! The tree is produced by the external parser (through [`build::AstBuilder`])
//! and is immutable from the analyzer's point of view: passes never rewrite
//! nodes, they annotate them through the side tables in [`meta`]. Every node
//! carries a [`NodeId`] unique within its module, which is what the side
//! tables and analyses key on.

pub use decl::{
    Decl, DeclKind, EnumDecl, EnumMember, FunctionDecl, ImportDecl, ImportList, ImportName, MapDecl, MapForm,
    Param, StorageClass, TypeAliasDecl, VariableDecl,
};
pub use expr::{BinaryOp, Expr, ExprKind, UnaryOp};
pub use meta::{AnalysisStore, MetaKey, MetaValue};
pub use stmt::{MatchArm, Stmt, StmtKind};

use serde::{Deserialize, Serialize};

use crate::source::{SourceId, SourceSpan};

pub mod build;
mod decl;
mod expr;
mod meta;
mod stmt;

/// Identifier of one AST node, unique within its module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u32);

impl NodeId {
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A type annotation as written in source.
///
/// Resolved against the [`TypeSystem`](crate::types::TypeSystem) during type
/// checking; `Named` covers built-ins as well as enum and alias names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeExpr {
    pub location: SourceSpan,
    pub kind: TypeExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeExprKind {
    /// `byte`, `word`, `bool`, `string`, `void`, or a user type name.
    Named(String),
    /// `[T; N]` with a fixed length, or `[T]` with the length left open.
    Array {
        element: Box<TypeExpr>,
        length: Option<u16>,
    },
}

impl TypeExpr {
    #[must_use]
    pub fn named(name: impl Into<String>, location: SourceSpan) -> Self {
        Self {
            location,
            kind: TypeExprKind::Named(name.into()),
        }
    }

    #[must_use]
    pub fn array(element: Self, length: Option<u16>, location: SourceSpan) -> Self {
        Self {
            location,
            kind: TypeExprKind::Array {
                element: Box::new(element),
                length,
            },
        }
    }
}

/// One parsed module: its name, source handle, and top-level declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Module name used in `import ... from <name>`.
    pub name: String,
    /// Handle into the [`SourceRegistry`](crate::source::SourceRegistry).
    pub source: Option<SourceId>,
    pub decls: Vec<Decl>,
    pub location: SourceSpan,
    /// Total number of [`NodeId`]s handed out while building this module;
    /// sizes the analysis side tables.
    pub node_count: u32,
}

impl Program {
    /// Iterates over the module's function declarations.
    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.decls.iter().filter_map(|d| match &d.kind {
            DeclKind::Function(f) => Some(f),
            _ => None,
        })
    }

    /// Looks up a top-level declaration by name. Imports never match; an
    /// import introduces a binding, not a declaration.
    #[must_use]
    pub fn find_decl(&self, name: &str) -> Option<&Decl> {
        self.decls.iter().find(|d| d.name() == Some(name))
    }
}

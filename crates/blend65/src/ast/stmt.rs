//! Statement nodes.

use serde::{Deserialize, Serialize};

use super::{Expr, NodeId, VariableDecl};
use crate::source::SourceSpan;

/// A statement with identity and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub id: NodeId,
    pub location: SourceSpan,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Expr(Expr),
    /// Local `let` / `const`; the enclosing statement carries id + location.
    Let(VariableDecl),
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// `do { ... } while (cond);`; the body runs at least once.
    DoWhile {
        body: Vec<Stmt>,
        condition: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        condition: Option<Expr>,
        update: Option<Expr>,
        body: Vec<Stmt>,
    },
    /// Infinite loop; exits only through `break` (or `return`).
    Loop {
        body: Vec<Stmt>,
    },
    /// N-way branch on constant patterns, with an optional `else` arm.
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
        default: Option<Vec<Stmt>>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
}

/// One `case pattern: body` arm of a `match`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchArm {
    pub location: SourceSpan,
    /// Constant expression compared against the scrutinee.
    pub pattern: Expr,
    pub body: Vec<Stmt>,
}

impl Stmt {
    /// Whether this statement introduces a loop scope.
    #[must_use]
    pub fn is_loop(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::While { .. } | StmtKind::DoWhile { .. } | StmtKind::For { .. } | StmtKind::Loop { .. }
        )
    }
}

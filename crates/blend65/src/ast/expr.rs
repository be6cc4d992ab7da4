//! Expression nodes.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::NodeId;
use crate::source::SourceSpan;

/// An expression with identity and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub location: SourceSpan,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    /// Numeric literal. The parser guarantees the value fits a word unless
    /// it appeared in a context that rejects it; overflow against a declared
    /// `byte` type is the type checker's call.
    Number(u32),
    Bool(bool),
    Str(String),
    /// `[1, 2, 3]`, used mainly for `data` initializers.
    ArrayLiteral(Vec<Expr>),
    Identifier(String),
    /// `object.property`: enum member access (`Color.Red`) or a qualified
    /// module reference (`gfx.clear`).
    Member { object: Box<Expr>, property: String },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`; the target must be an lvalue.
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    /// Whether this expression can appear on the left of an assignment.
    #[must_use]
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Identifier(_) | ExprKind::Index { .. } | ExprKind::Member { .. }
        )
    }

    /// The identifier name if this is a bare identifier.
    #[must_use]
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// Binary operators, with the surface symbol kept for error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

impl BinaryOp {
    /// Arithmetic and bitwise operators: numeric operands, numeric result.
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Mod
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
                | Self::Shl
                | Self::Shr
        )
    }

    /// Comparison and equality: compatible operands, `bool` result.
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    /// Short-circuiting logical operators: `bool` operands, `bool` result.
    #[must_use]
    pub fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    /// Operators whose `byte op byte` result may exceed a byte.
    #[must_use]
    pub fn can_overflow_byte(self) -> bool {
        matches!(self, Self::Add | Self::Mul)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Logical `not`; operand and result are `bool`.
    #[strum(serialize = "not")]
    Not,
    /// Bitwise complement `~`.
    #[strum(serialize = "~")]
    BitNot,
    /// Two's-complement negate `-` (wrapping on the unsigned types).
    #[strum(serialize = "-")]
    Negate,
    /// Address-of `&`; yields the operand's address as a `word`.
    #[strum(serialize = "&")]
    AddressOf,
}

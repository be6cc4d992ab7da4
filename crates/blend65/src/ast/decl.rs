//! Top-level declaration nodes.

use serde::{Deserialize, Serialize};
use strum::Display;

use super::{Expr, NodeId, Stmt, TypeExpr};
use crate::source::SourceSpan;

/// A module-level declaration with identity and location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decl {
    pub id: NodeId,
    pub location: SourceSpan,
    pub kind: DeclKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeclKind {
    Function(FunctionDecl),
    Variable(VariableDecl),
    Enum(EnumDecl),
    TypeAlias(TypeAliasDecl),
    Import(ImportDecl),
    Map(MapDecl),
}

impl Decl {
    /// The declared name, if this declaration introduces one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Function(f) => Some(&f.name),
            DeclKind::Variable(v) => Some(&v.name),
            DeclKind::Enum(e) => Some(&e.name),
            DeclKind::TypeAlias(t) => Some(&t.name),
            DeclKind::Map(m) => Some(&m.name),
            DeclKind::Import(_) => None,
        }
    }

    /// Whether the declaration is visible to importing modules.
    #[must_use]
    pub fn is_exported(&self) -> bool {
        match &self.kind {
            DeclKind::Function(f) => f.is_exported,
            DeclKind::Variable(v) => v.is_exported,
            DeclKind::Enum(e) => e.is_exported,
            DeclKind::TypeAlias(t) => t.is_exported,
            DeclKind::Map(m) => m.is_exported,
            DeclKind::Import(_) => false,
        }
    }
}

/// Where a module-level variable's storage is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum StorageClass {
    /// No qualifier; function locals live in frames, module variables in RAM.
    #[default]
    Auto,
    /// `@zp`: allocated in the zero-page window.
    #[strum(serialize = "zp")]
    ZeroPage,
    /// `ram`: explicit RAM placement, counted in layout statistics.
    Ram,
    /// `data`: initialized data section.
    Data,
}

/// `let` / `const` declaration, at module level or as a statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub initializer: Option<Expr>,
    pub is_const: bool,
    pub is_exported: bool,
    pub storage: StorageClass,
}

/// One function parameter. Parameters require annotations; the checker
/// reports the missing annotation rather than inferring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub id: NodeId,
    pub location: SourceSpan,
    pub name: String,
    pub annotation: Option<TypeExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    /// Absent return type means `void`.
    pub return_type: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumMember {
    pub location: SourceSpan,
    pub name: String,
    /// Explicit value; absent members take previous + 1, starting at 0.
    pub value: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub members: Vec<EnumMember>,
    pub is_exported: bool,
}

/// `type Sprite = [byte; 64];`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub is_exported: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportName {
    pub location: SourceSpan,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImportList {
    /// `import a, b from Mod`
    Named(Vec<ImportName>),
    /// `import * from Mod`
    Wildcard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDecl {
    pub list: ImportList,
    pub module: String,
}

/// The address form of a `@map` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MapForm {
    /// `@map border at $D020: byte;`, one location, size from the type.
    Simple { address: u16 },
    /// `@map screen at $0400..$07E7: byte;`, an explicit range.
    Range { start: u16, end: u16 },
    /// `@map sprites at $2000: [byte; 64];`, array laid out from `start`.
    Sequential { start: u16 },
    /// `@map voices at $D400, $D407, $D40E: byte;`, scattered fixed
    /// addresses; the entry spans the min..max envelope.
    Explicit { addresses: Vec<u16> },
}

/// Declaration binding an identifier to fixed hardware addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub form: MapForm,
    pub is_exported: bool,
}

//! Type descriptors and the compatibility relation.
//!
//! Blend65's type universe is small and closed: two unsigned integers, bool,
//! string, fixed/dynamic arrays, function types, and byte-backed enums. The
//! interesting part is the compatibility lattice: byte widens to word
//! implicitly, narrowing needs an explicit conversion, and bool is isolated
//! because integers are not truthy on this target.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ast::{TypeExpr, TypeExprKind};

/// A resolved type.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub enum TypeInfo {
    /// Not yet known; produced for unresolved expressions so checking can
    /// continue without cascading errors.
    Unknown,
    Void,
    /// 8-bit unsigned.
    Byte,
    /// 16-bit unsigned.
    Word,
    Bool,
    /// Pointer to PETSCII data.
    String,
    Array {
        element: Box<TypeInfo>,
        /// `None` = dynamic length (pointer + runtime length).
        length: Option<u16>,
    },
    Function {
        params: Vec<TypeInfo>,
        ret: Box<TypeInfo>,
        /// Parameter names carried for diagnostics only; never part of
        /// identity.
        param_names: Option<Vec<String>>,
    },
    Enum {
        name: String,
        /// Member name → value, in declaration order.
        members: IndexMap<String, u32>,
    },
}

/// Structural identity: function parameter names are ignored.
impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unknown, Self::Unknown)
            | (Self::Void, Self::Void)
            | (Self::Byte, Self::Byte)
            | (Self::Word, Self::Word)
            | (Self::Bool, Self::Bool)
            | (Self::String, Self::String) => true,
            (
                Self::Array { element: a, length: la },
                Self::Array { element: b, length: lb },
            ) => a == b && la == lb,
            (
                Self::Function { params: pa, ret: ra, .. },
                Self::Function { params: pb, ret: rb, .. },
            ) => pa == pb && ra == rb,
            (
                Self::Enum { name: na, members: ma },
                Self::Enum { name: nb, members: mb },
            ) => na == nb && ma == mb,
            _ => false,
        }
    }
}

/// Result of comparing two types for assignability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Compatibility {
    /// Same kind and same structural attributes.
    Identical,
    /// Implicitly assignable (widening, fixed array → dynamic array).
    Compatible,
    /// Assignable only with an explicit conversion (narrowing).
    RequiresConversion,
    Incompatible,
}

impl Compatibility {
    /// Whether a value may be assigned without an explicit conversion.
    #[must_use]
    pub fn is_assignable(self) -> bool {
        matches!(self, Self::Identical | Self::Compatible)
    }
}

impl TypeInfo {
    /// Storage size in bytes. Dynamic arrays, strings, and functions are
    /// represented by a 16-bit address.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Unknown | Self::Void => 0,
            Self::Byte | Self::Bool | Self::Enum { .. } => 1,
            Self::Word | Self::String | Self::Function { .. } => 2,
            Self::Array { element, length } => match length {
                Some(n) => *n as usize * element.size(),
                None => 2,
            },
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Byte | Self::Word)
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// The result type when two numeric operands mix: the larger wins.
    #[must_use]
    pub fn numeric_result(&self, other: &Self) -> Self {
        if matches!(self, Self::Word) || matches!(other, Self::Word) {
            Self::Word
        } else {
            Self::Byte
        }
    }

    /// Assignability of a value of type `self` into a slot of type `target`.
    #[must_use]
    pub fn compatibility(&self, target: &Self) -> Compatibility {
        if self == target {
            return Compatibility::Identical;
        }
        match (self, target) {
            // Unknown suppresses cascades in both directions.
            (Self::Unknown, _) | (_, Self::Unknown) => Compatibility::Compatible,
            // Widening is implicit; narrowing needs a conversion.
            (Self::Byte, Self::Word) => Compatibility::Compatible,
            (Self::Word, Self::Byte) => Compatibility::RequiresConversion,
            // Integers are not truthy.
            (Self::Bool, t) | (t, Self::Bool) if t.is_numeric() => Compatibility::Incompatible,
            (
                Self::Array { element: a, length: Some(_) },
                Self::Array { element: b, length: None },
            ) if a == b => Compatibility::Compatible,
            _ => Compatibility::Incompatible,
        }
    }

    /// Short name for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Unknown => "<unknown>".to_owned(),
            Self::Void => "void".to_owned(),
            Self::Byte => "byte".to_owned(),
            Self::Word => "word".to_owned(),
            Self::Bool => "bool".to_owned(),
            Self::String => "string".to_owned(),
            Self::Array { element, length } => match length {
                Some(n) => format!("[{}; {n}]", element.describe()),
                None => format!("[{}]", element.describe()),
            },
            Self::Function { params, ret, .. } => {
                let params: Vec<_> = params.iter().map(Self::describe).collect();
                format!("function({}): {}", params.join(", "), ret.describe())
            }
            Self::Enum { name, .. } => name.clone(),
        }
    }

    /// Constructor for function types.
    #[must_use]
    pub fn function(params: Vec<Self>, ret: Self) -> Self {
        Self::Function {
            params,
            ret: Box::new(ret),
            param_names: None,
        }
    }

    /// Constructor for array types.
    #[must_use]
    pub fn array(element: Self, length: Option<u16>) -> Self {
        Self::Array {
            element: Box::new(element),
            length,
        }
    }
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Per-module table of named types: the built-ins plus enums and aliases
/// declared in the module (or imported into it).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeSystem {
    user_types: IndexMap<String, TypeInfo>,
}

impl TypeSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an enum or alias under `name`. Later registrations win, the
    /// duplicate-declaration diagnostic is the symbol table's job.
    pub fn define(&mut self, name: impl Into<String>, ty: TypeInfo) {
        self.user_types.insert(name.into(), ty);
    }

    /// Looks up a named type: built-ins first, then user types.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<TypeInfo> {
        match name {
            "byte" => Some(TypeInfo::Byte),
            "word" => Some(TypeInfo::Word),
            "bool" => Some(TypeInfo::Bool),
            "string" => Some(TypeInfo::String),
            "void" => Some(TypeInfo::Void),
            _ => self.user_types.get(name).cloned(),
        }
    }

    /// Resolves a written annotation to a [`TypeInfo`]. `None` means an
    /// unknown named type; the caller reports `UNKNOWN_TYPE` and continues
    /// with [`TypeInfo::Unknown`].
    #[must_use]
    pub fn resolve(&self, expr: &TypeExpr) -> Option<TypeInfo> {
        match &expr.kind {
            TypeExprKind::Named(name) => self.lookup(name),
            TypeExprKind::Array { element, length } => {
                let element = self.resolve(element)?;
                Some(TypeInfo::array(element, *length))
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypeInfo)> {
        self.user_types.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sizes() {
        assert_eq!(TypeInfo::Byte.size(), 1);
        assert_eq!(TypeInfo::Word.size(), 2);
        assert_eq!(TypeInfo::Bool.size(), 1);
        assert_eq!(TypeInfo::array(TypeInfo::Word, Some(10)).size(), 20);
    }

    #[test]
    fn widening_is_compatible_narrowing_is_not() {
        assert_eq!(TypeInfo::Byte.compatibility(&TypeInfo::Word), Compatibility::Compatible);
        assert_eq!(
            TypeInfo::Word.compatibility(&TypeInfo::Byte),
            Compatibility::RequiresConversion
        );
    }

    #[test]
    fn bool_is_isolated_from_integers() {
        assert_eq!(TypeInfo::Bool.compatibility(&TypeInfo::Byte), Compatibility::Incompatible);
        assert_eq!(TypeInfo::Word.compatibility(&TypeInfo::Bool), Compatibility::Incompatible);
    }

    #[test]
    fn fixed_array_widens_to_dynamic_only() {
        let fixed = TypeInfo::array(TypeInfo::Byte, Some(8));
        let dynamic = TypeInfo::array(TypeInfo::Byte, None);
        let other_fixed = TypeInfo::array(TypeInfo::Byte, Some(16));
        assert_eq!(fixed.compatibility(&dynamic), Compatibility::Compatible);
        assert_eq!(dynamic.compatibility(&fixed), Compatibility::Incompatible);
        assert_eq!(fixed.compatibility(&other_fixed), Compatibility::Incompatible);
    }

    #[test]
    fn function_identity_ignores_param_names() {
        let named = TypeInfo::Function {
            params: vec![TypeInfo::Byte],
            ret: Box::new(TypeInfo::Void),
            param_names: Some(vec!["n".to_owned()]),
        };
        let unnamed = TypeInfo::function(vec![TypeInfo::Byte], TypeInfo::Void);
        assert_eq!(named.compatibility(&unnamed), Compatibility::Identical);
    }

    #[test]
    fn numeric_mixing_prefers_word() {
        assert_eq!(TypeInfo::Byte.numeric_result(&TypeInfo::Word), TypeInfo::Word);
        assert_eq!(TypeInfo::Byte.numeric_result(&TypeInfo::Byte), TypeInfo::Byte);
    }

    #[test]
    fn type_system_resolves_nested_arrays() {
        let mut types = TypeSystem::new();
        types.define(
            "Sprite",
            TypeInfo::array(TypeInfo::Byte, Some(64)),
        );
        let expr = TypeExpr::array(
            TypeExpr::named("Sprite", crate::source::SourceSpan::synthetic()),
            Some(8),
            crate::source::SourceSpan::synthetic(),
        );
        let resolved = types.resolve(&expr).unwrap();
        assert_eq!(resolved.size(), 8 * 64);
    }
}

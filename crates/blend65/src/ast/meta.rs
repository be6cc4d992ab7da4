//! Analysis side tables.
//!
//! The AST is immutable; passes attach their results to nodes through an
//! [`AnalysisStore`] keyed by [`NodeId`] and a closed [`MetaKey`] set. Values
//! are a tagged union: no stringly-typed keys, no downcasting.

use ahash::AHashMap;
use strum::Display;

use super::NodeId;
use crate::target::MemoryRegion;
use crate::types::TypeInfo;

/// The closed set of annotation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum MetaKey {
    /// Resolved type of an expression ([`MetaValue::Type`]).
    TypeInfo,
    /// Memory region a location expression touches ([`MetaValue::Region`]).
    AliasRegion,
    /// Symbols this node's symbol may alias ([`MetaValue::Symbols`]).
    AliasPointsTo,
    /// Node writes into the code region ([`MetaValue::Flag`]).
    SelfModifyingCode,
    /// Loop id assigned by the loop analyzer ([`MetaValue::Int`]).
    LoopId,
    /// Compile-time constant value folded for this node ([`MetaValue::Int`]).
    ConstValue,
    /// Expression is loop-invariant in its innermost loop ([`MetaValue::Flag`]).
    LoopInvariant,
}

/// Tagged annotation values.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Type(TypeInfo),
    Region(MemoryRegion),
    Symbols(Vec<String>),
    Flag(bool),
    Int(u64),
}

/// Per-module annotation store.
#[derive(Debug, Default)]
pub struct AnalysisStore {
    entries: AHashMap<(NodeId, MetaKey), MetaValue>,
}

impl AnalysisStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, node: NodeId, key: MetaKey, value: MetaValue) {
        self.entries.insert((node, key), value);
    }

    #[must_use]
    pub fn get(&self, node: NodeId, key: MetaKey) -> Option<&MetaValue> {
        self.entries.get(&(node, key))
    }

    /// Annotates the node's resolved type.
    pub fn set_type(&mut self, node: NodeId, ty: TypeInfo) {
        self.set(node, MetaKey::TypeInfo, MetaValue::Type(ty));
    }

    /// The type annotated on `node`, or [`TypeInfo::Unknown`] if the checker
    /// never reached it.
    #[must_use]
    pub fn type_of(&self, node: NodeId) -> TypeInfo {
        match self.get(node, MetaKey::TypeInfo) {
            Some(MetaValue::Type(ty)) => ty.clone(),
            _ => TypeInfo::Unknown,
        }
    }

    pub fn set_region(&mut self, node: NodeId, region: MemoryRegion) {
        self.set(node, MetaKey::AliasRegion, MetaValue::Region(region));
    }

    #[must_use]
    pub fn region_of(&self, node: NodeId) -> Option<MemoryRegion> {
        match self.get(node, MetaKey::AliasRegion) {
            Some(MetaValue::Region(region)) => Some(*region),
            _ => None,
        }
    }

    pub fn set_const_value(&mut self, node: NodeId, value: u64) {
        self.set(node, MetaKey::ConstValue, MetaValue::Int(value));
    }

    #[must_use]
    pub fn const_value(&self, node: NodeId) -> Option<u64> {
        match self.get(node, MetaKey::ConstValue) {
            Some(MetaValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Lexical scopes and symbol records.
//!
//! Scopes, symbols, and their mutual references form cycles (scope owns
//! symbols, symbols back-reference their scope, both reference AST nodes),
//! so both live in arenas inside [`SymbolTable`] and refer to each other by
//! id. Name maps are insertion-ordered: frame layout and the deterministic
//! memory plan depend on declaration order surviving analysis.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ast::{NodeId, StorageClass};
use crate::source::SourceSpan;
use crate::types::TypeInfo;

/// Identifier of a scope within one module's [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl ScopeId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("scope arena overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a symbol within one module's [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("symbol arena overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum ScopeKind {
    Module,
    Function,
    Block,
    Loop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Parameter,
    Function,
    ImportedSymbol,
    Constant,
    EnumMember,
    Intrinsic,
}

/// A node in the scope tree. Only the module root has no parent;
/// `loop_depth` increments at every [`ScopeKind::Loop`] scope on the path
/// from the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Name → symbol, in declaration order.
    symbols: IndexMap<String, SymbolId>,
    /// The AST node that opened this scope.
    pub node: Option<NodeId>,
    /// Symbol of the function this scope belongs to, if any.
    pub function: Option<SymbolId>,
    pub loop_depth: u32,
}

/// One declared name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Resolved type; `None` until the type checker visits the declaration.
    pub ty: Option<TypeInfo>,
    pub location: SourceSpan,
    /// Owning scope (back-reference by id).
    pub scope: ScopeId,
    pub is_exported: bool,
    pub is_const: bool,
    /// For imports: the module the symbol came from.
    pub source_module: Option<String>,
    /// For imports: the name in the source module (aliasing hook).
    pub original_name: Option<String>,
    pub storage: StorageClass,
    /// Declaring AST node.
    pub node: Option<NodeId>,
}

/// Field bundle for declaring a symbol.
#[derive(Debug, Clone)]
pub struct SymbolSeed {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Option<TypeInfo>,
    pub location: SourceSpan,
    pub is_exported: bool,
    pub is_const: bool,
    pub source_module: Option<String>,
    pub original_name: Option<String>,
    pub storage: StorageClass,
    pub node: Option<NodeId>,
}

impl SymbolSeed {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: SymbolKind, location: SourceSpan) -> Self {
        Self {
            name: name.into(),
            kind,
            ty: None,
            location,
            is_exported: false,
            is_const: false,
            source_module: None,
            original_name: None,
            storage: StorageClass::Auto,
            node: None,
        }
    }

    #[must_use]
    pub fn ty(mut self, ty: TypeInfo) -> Self {
        self.ty = Some(ty);
        self
    }

    #[must_use]
    pub fn exported(mut self, exported: bool) -> Self {
        self.is_exported = exported;
        self
    }

    #[must_use]
    pub fn constant(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    #[must_use]
    pub fn imported_from(mut self, module: impl Into<String>, original: impl Into<String>) -> Self {
        self.source_module = Some(module.into());
        self.original_name = Some(original.into());
        self
    }

    #[must_use]
    pub fn storage(mut self, storage: StorageClass) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn node(mut self, node: NodeId) -> Self {
        self.node = Some(node);
        self
    }
}

/// Error returned when a name is already bound in the same scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateDeclaration {
    /// The symbol already holding the name.
    pub existing: SymbolId,
}

/// One module's scope tree and symbol arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolTable {
    module: String,
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    /// AST node → scope it opened; how later passes re-enter the right scope.
    node_scopes: IndexMap<NodeId, ScopeId>,
    /// (statement node, branch index) → scope, for constructs whose bodies
    /// are bare statement lists (then/else branches, loop bodies, match
    /// arms). Branch 0 is the primary body.
    branch_scopes: IndexMap<(NodeId, u8), ScopeId>,
    /// Declaring AST node → symbol.
    node_symbols: IndexMap<NodeId, SymbolId>,
}

impl SymbolTable {
    /// Creates the table with its root module scope.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        let root = Scope {
            id: ScopeId::new(0),
            kind: ScopeKind::Module,
            parent: None,
            children: Vec::new(),
            symbols: IndexMap::new(),
            node: None,
            function: None,
            loop_depth: 0,
        };
        Self {
            module: module.into(),
            scopes: vec![root],
            symbols: Vec::new(),
            node_scopes: IndexMap::new(),
            branch_scopes: IndexMap::new(),
            node_symbols: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module
    }

    /// The root module scope.
    #[must_use]
    pub fn root(&self) -> ScopeId {
        ScopeId::new(0)
    }

    /// Creates a child scope and links it into the tree.
    ///
    /// `loop_depth` carries over from the parent and increments only when
    /// the new scope is a [`ScopeKind::Loop`]. Function scopes record the
    /// enclosing function symbol for `return` checking.
    pub fn create_scope(
        &mut self,
        kind: ScopeKind,
        parent: ScopeId,
        node: Option<NodeId>,
        function: Option<SymbolId>,
    ) -> ScopeId {
        let parent_scope = &self.scopes[parent.index()];
        let loop_depth = parent_scope.loop_depth + u32::from(kind == ScopeKind::Loop);
        let function = function.or(parent_scope.function);
        let id = ScopeId::new(self.scopes.len());
        self.scopes.push(Scope {
            id,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            symbols: IndexMap::new(),
            node,
            function,
            loop_depth,
        });
        self.scopes[parent.index()].children.push(id);
        if let Some(node) = node {
            self.node_scopes.insert(node, id);
        }
        id
    }

    /// Declares a symbol directly in `scope`.
    ///
    /// Fails only when the name is already bound *in this scope*; shadowing
    /// an outer binding is allowed.
    pub fn declare(&mut self, scope: ScopeId, seed: SymbolSeed) -> Result<SymbolId, DuplicateDeclaration> {
        if let Some(&existing) = self.scopes[scope.index()].symbols.get(&seed.name) {
            return Err(DuplicateDeclaration { existing });
        }
        let id = SymbolId::new(self.symbols.len());
        self.symbols.push(Symbol {
            id,
            name: seed.name.clone(),
            kind: seed.kind,
            ty: seed.ty,
            location: seed.location,
            scope,
            is_exported: seed.is_exported,
            is_const: seed.is_const,
            source_module: seed.source_module,
            original_name: seed.original_name,
            storage: seed.storage,
            node: seed.node,
        });
        self.scopes[scope.index()].symbols.insert(seed.name, id);
        if let Some(node) = seed.node {
            self.node_symbols.insert(node, id);
        }
        Ok(id)
    }

    /// Creates a scope for the `branch`-th body of statement `node`.
    pub fn create_branch_scope(
        &mut self,
        kind: ScopeKind,
        parent: ScopeId,
        node: NodeId,
        branch: u8,
    ) -> ScopeId {
        let id = self.create_scope(kind, parent, None, None);
        self.branch_scopes.insert((node, branch), id);
        id
    }

    /// The scope opened by `node`, if the symbol-table builder created one.
    #[must_use]
    pub fn scope_for_node(&self, node: NodeId) -> Option<ScopeId> {
        self.node_scopes.get(&node).copied()
    }

    /// The scope of the `branch`-th body of statement `node`.
    #[must_use]
    pub fn scope_for_branch(&self, node: NodeId, branch: u8) -> Option<ScopeId> {
        self.branch_scopes.get(&(node, branch)).copied()
    }

    /// The symbol declared by `node`, if any.
    #[must_use]
    pub fn symbol_for_node(&self, node: NodeId) -> Option<SymbolId> {
        self.node_symbols.get(&node).copied()
    }

    /// Looks a name up in `scope` only.
    #[must_use]
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.index()].symbols.get(name).copied()
    }

    /// Walks the parent chain up to the module scope; returns the innermost
    /// binding.
    #[must_use]
    pub fn lookup_in_chain(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let scope = &self.scopes[id.index()];
            if let Some(&symbol) = scope.symbols.get(name) {
                return Some(symbol);
            }
            current = scope.parent;
        }
        None
    }

    /// Whether `scope` sits inside at least one loop.
    #[must_use]
    pub fn is_inside_loop(&self, scope: ScopeId) -> bool {
        self.scopes[scope.index()].loop_depth > 0
    }

    /// Symbol of the function enclosing `scope`, if any.
    #[must_use]
    pub fn enclosing_function_symbol(&self, scope: ScopeId) -> Option<SymbolId> {
        self.scopes[scope.index()].function
    }

    #[must_use]
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.index()]
    }

    /// Symbols declared directly in `scope`, in declaration order.
    pub fn symbols_in(&self, scope: ScopeId) -> impl Iterator<Item = &Symbol> {
        self.scopes[scope.index()]
            .symbols
            .values()
            .map(|&id| &self.symbols[id.index()])
    }

    pub fn scopes(&self) -> impl Iterator<Item = &Scope> {
        self.scopes.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    /// Exported module-level symbols, in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols_in(self.root()).filter(|s| s.is_exported)
    }
}

impl Scope {
    /// Names declared directly in this scope, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }

    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(name: &str) -> SymbolSeed {
        SymbolSeed::new(name, SymbolKind::Variable, SourceSpan::synthetic())
    }

    #[test]
    fn redeclaration_in_same_scope_fails() {
        let mut table = SymbolTable::new("main");
        let root = table.root();
        let first = table.declare(root, seed("x")).unwrap();
        let err = table.declare(root, seed("x")).unwrap_err();
        assert_eq!(err.existing, first);
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let mut table = SymbolTable::new("main");
        let root = table.root();
        let outer = table.declare(root, seed("x")).unwrap();
        let block = table.create_scope(ScopeKind::Block, root, None, None);
        let inner = table.declare(block, seed("x")).unwrap();
        assert_ne!(outer, inner);
        // Innermost binding wins.
        assert_eq!(table.lookup_in_chain(block, "x"), Some(inner));
        assert_eq!(table.lookup_in_chain(root, "x"), Some(outer));
    }

    #[test]
    fn loop_depth_increments_only_at_loop_scopes() {
        let mut table = SymbolTable::new("main");
        let root = table.root();
        let func = table.create_scope(ScopeKind::Function, root, None, None);
        let outer_loop = table.create_scope(ScopeKind::Loop, func, None, None);
        let block = table.create_scope(ScopeKind::Block, outer_loop, None, None);
        let inner_loop = table.create_scope(ScopeKind::Loop, block, None, None);
        assert_eq!(table.scope(func).loop_depth, 0);
        assert_eq!(table.scope(outer_loop).loop_depth, 1);
        assert_eq!(table.scope(block).loop_depth, 1);
        assert_eq!(table.scope(inner_loop).loop_depth, 2);
        assert!(table.is_inside_loop(block));
        assert!(!table.is_inside_loop(func));
    }

    #[test]
    fn enclosing_function_propagates_to_nested_scopes() {
        let mut table = SymbolTable::new("main");
        let root = table.root();
        let f = table
            .declare(root, SymbolSeed::new("f", SymbolKind::Function, SourceSpan::synthetic()))
            .unwrap();
        let body = table.create_scope(ScopeKind::Function, root, None, Some(f));
        let block = table.create_scope(ScopeKind::Block, body, None, None);
        assert_eq!(table.enclosing_function_symbol(block), Some(f));
        assert_eq!(table.enclosing_function_symbol(root), None);
    }
}

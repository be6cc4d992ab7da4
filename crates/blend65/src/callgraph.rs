//! Whole-program call graph and recursion queries.
//!
//! Functions are keyed by their qualified name (`module::function`); query
//! helpers also accept a bare name when it is unambiguous. Edges are
//! recorded for every call expression in a body, however deeply nested. The
//! graph feeds recursion diagnostics, the frame allocator's liveness
//! reasoning, and the tail-call/inline hints.

use ahash::AHashSet;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::ast::{DeclKind, Expr, ExprKind, Program, Stmt, StmtKind};
use crate::scope::{SymbolKind, SymbolTable};
use crate::source::SourceSpan;

/// One function's node in the call graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallGraphNode {
    /// Qualified `module::function` name.
    pub function: String,
    pub location: SourceSpan,
    pub callees: IndexSet<String>,
    pub callers: IndexSet<String>,
    /// Callee → every call-site location, in source order.
    pub call_sites: IndexMap<String, Vec<SourceSpan>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallGraph {
    nodes: IndexMap<String, CallGraphNode>,
}

impl CallGraph {
    /// Resolves a bare or qualified name to a node key.
    ///
    /// Bare names resolve only when exactly one module defines them.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if self.nodes.contains_key(name) {
            return self.nodes.get_key_value(name).map(|(k, _)| k.as_str());
        }
        let mut found = None;
        for key in self.nodes.keys() {
            if key.rsplit("::").next() == Some(name) {
                if found.is_some() {
                    return None;
                }
                found = Some(key.as_str());
            }
        }
        found
    }

    #[must_use]
    pub fn node(&self, name: &str) -> Option<&CallGraphNode> {
        let key = self.resolve(name)?;
        self.nodes.get(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CallGraphNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `f` calls itself.
    #[must_use]
    pub fn is_directly_recursive(&self, name: &str) -> bool {
        self.node(name)
            .is_some_and(|node| node.callees.contains(&node.function))
    }

    /// `f` participates in a call cycle (direct or indirect).
    #[must_use]
    pub fn is_recursive(&self, name: &str) -> bool {
        let Some(start) = self.node(name) else { return false };
        let mut stack: Vec<&str> = start.callees.iter().map(String::as_str).collect();
        let mut seen = AHashSet::new();
        while let Some(current) = stack.pop() {
            if current == start.function {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                stack.extend(node.callees.iter().map(String::as_str));
            }
        }
        false
    }

    /// Length of the longest call chain starting at `name`, counted in
    /// edges. `None` encodes an unbounded depth (recursion).
    #[must_use]
    pub fn max_call_depth(&self, name: &str) -> Option<usize> {
        let key = self.resolve(name)?;
        let mut on_stack = AHashSet::new();
        self.depth_of(key, &mut on_stack)
    }

    fn depth_of(&self, key: &str, on_stack: &mut AHashSet<String>) -> Option<usize> {
        if !on_stack.insert(key.to_owned()) {
            // Cycle: depth is unbounded.
            return None;
        }
        let mut depth = Some(0);
        if let Some(node) = self.nodes.get(key) {
            for callee in &node.callees {
                if self.nodes.contains_key(callee) {
                    match self.depth_of(callee, on_stack) {
                        Some(sub) => depth = depth.map(|d| d.max(sub + 1)),
                        None => depth = None,
                    }
                    if depth.is_none() {
                        break;
                    }
                }
            }
        }
        on_stack.remove(key);
        depth
    }

    /// Functions nobody calls. Empty when every function has a caller.
    #[must_use]
    pub fn entry_points(&self) -> Vec<&str> {
        self.nodes
            .values()
            .filter(|node| node.callers.is_empty())
            .map(|node| node.function.as_str())
            .collect()
    }

    /// Functions not reachable from `root` through call edges.
    #[must_use]
    pub fn unreachable_from(&self, root: &str) -> Vec<&str> {
        let mut reached = AHashSet::new();
        if let Some(key) = self.resolve(root) {
            let mut stack = vec![key];
            while let Some(current) = stack.pop() {
                if !reached.insert(current) {
                    continue;
                }
                if let Some(node) = self.nodes.get(current) {
                    stack.extend(node.callees.iter().map(String::as_str));
                }
            }
        }
        self.nodes
            .keys()
            .filter(|key| !reached.contains(key.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Whether `a` can transitively reach `b` through call edges.
    #[must_use]
    pub fn reaches(&self, a: &str, b: &str) -> bool {
        let (Some(a), Some(b)) = (self.resolve(a), self.resolve(b)) else {
            return false;
        };
        let mut seen = AHashSet::new();
        let mut stack = vec![a];
        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                for callee in &node.callees {
                    if callee == b {
                        return true;
                    }
                    stack.push(callee.as_str());
                }
            }
        }
        false
    }

    /// Functions participating in any call cycle, in registration order.
    #[must_use]
    pub fn recursive_functions(&self) -> Vec<&CallGraphNode> {
        self.nodes
            .values()
            .filter(|node| self.is_recursive(&node.function))
            .collect()
    }
}

/// Accumulates call edges module by module.
#[derive(Debug, Default)]
pub struct CallGraphBuilder {
    graph: CallGraph,
}

impl CallGraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the module's functions and records every call site in
    /// their bodies. The symbol table resolves callees, including imports.
    pub fn add_module(&mut self, program: &Program, table: &SymbolTable) {
        for decl in &program.decls {
            if let DeclKind::Function(function) = &decl.kind {
                let key = qualified(&program.name, &function.name);
                self.graph.nodes.entry(key).or_insert_with(|| CallGraphNode {
                    function: qualified(&program.name, &function.name),
                    location: decl.location,
                    callees: IndexSet::new(),
                    callers: IndexSet::new(),
                    call_sites: IndexMap::new(),
                });
            }
        }
        for decl in &program.decls {
            if let DeclKind::Function(function) = &decl.kind {
                let caller = qualified(&program.name, &function.name);
                self.walk_stmts(&function.body, &caller, program, table);
            }
        }
    }

    #[must_use]
    pub fn finish(self) -> CallGraph {
        self.graph
    }

    fn record_call(&mut self, caller: &str, callee: String, location: SourceSpan) {
        if let Some(node) = self.graph.nodes.get_mut(caller) {
            node.callees.insert(callee.clone());
            node.call_sites.entry(callee.clone()).or_default().push(location);
        }
        if let Some(node) = self.graph.nodes.get_mut(&callee) {
            node.callers.insert(caller.to_owned());
        }
    }

    /// Resolves a callee expression to a qualified function key.
    fn resolve_callee(&self, callee: &Expr, program: &Program, table: &SymbolTable) -> Option<String> {
        match &callee.kind {
            ExprKind::Identifier(name) => {
                let symbol = table.lookup_local(table.root(), name)?;
                let symbol = table.symbol(symbol);
                match symbol.kind {
                    SymbolKind::Function => Some(qualified(&program.name, name)),
                    SymbolKind::ImportedSymbol => {
                        let module = symbol.source_module.as_deref()?;
                        let original = symbol.original_name.as_deref()?;
                        Some(qualified(module, original))
                    }
                    _ => None,
                }
            }
            ExprKind::Member { object, property } => {
                let module = object.as_identifier()?;
                Some(qualified(module, property))
            }
            _ => None,
        }
    }

    fn walk_stmts(&mut self, stmts: &[Stmt], caller: &str, program: &Program, table: &SymbolTable) {
        for stmt in stmts {
            self.walk_stmt(stmt, caller, program, table);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt, caller: &str, program: &Program, table: &SymbolTable) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.walk_expr(expr, caller, program, table),
            StmtKind::Let(var) => {
                if let Some(init) = &var.initializer {
                    self.walk_expr(init, caller, program, table);
                }
            }
            StmtKind::Block(body) | StmtKind::Loop { body } => self.walk_stmts(body, caller, program, table),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(condition, caller, program, table);
                self.walk_stmts(then_branch, caller, program, table);
                if let Some(else_branch) = else_branch {
                    self.walk_stmts(else_branch, caller, program, table);
                }
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.walk_expr(condition, caller, program, table);
                self.walk_stmts(body, caller, program, table);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init, caller, program, table);
                }
                if let Some(condition) = condition {
                    self.walk_expr(condition, caller, program, table);
                }
                if let Some(update) = update {
                    self.walk_expr(update, caller, program, table);
                }
                self.walk_stmts(body, caller, program, table);
            }
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                self.walk_expr(scrutinee, caller, program, table);
                for arm in arms {
                    self.walk_expr(&arm.pattern, caller, program, table);
                    self.walk_stmts(&arm.body, caller, program, table);
                }
                if let Some(default) = default {
                    self.walk_stmts(default, caller, program, table);
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value, caller, program, table);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr, caller: &str, program: &Program, table: &SymbolTable) {
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                if let Some(callee_key) = self.resolve_callee(callee, program, table) {
                    self.record_call(caller, callee_key, expr.location);
                }
                for arg in args {
                    self.walk_expr(arg, caller, program, table);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs, caller, program, table);
                self.walk_expr(rhs, caller, program, table);
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand, caller, program, table),
            ExprKind::Assign { target, value } => {
                self.walk_expr(target, caller, program, table);
                self.walk_expr(value, caller, program, table);
            }
            ExprKind::Index { target, index } => {
                self.walk_expr(target, caller, program, table);
                self.walk_expr(index, caller, program, table);
            }
            ExprKind::Member { object, .. } => self.walk_expr(object, caller, program, table),
            ExprKind::ArrayLiteral(items) => {
                for item in items {
                    self.walk_expr(item, caller, program, table);
                }
            }
            ExprKind::Number(_) | ExprKind::Bool(_) | ExprKind::Str(_) | ExprKind::Identifier(_) => {}
        }
    }
}

fn qualified(module: &str, name: &str) -> String {
    format!("{module}::{name}")
}

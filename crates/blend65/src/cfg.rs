//! Per-function control-flow graphs.
//!
//! Nodes live in an arena inside the graph; edges are id lists. The builder
//! keeps an insertion point (`current`) while walking the body; a `None`
//! insertion point means the following statements in the lexical sequence
//! are unreachable, which is reported immediately and deduplicated against
//! the post-build reachability sweep.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::Display;

use crate::ast::{FunctionDecl, NodeId, Stmt, StmtKind};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::source::SourceSpan;

/// Identifier of one CFG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfgNodeId(u32);

impl CfgNodeId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("CFG arena overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum CfgNodeKind {
    Entry,
    Exit,
    Statement,
    Branch,
    /// Join point after a branch.
    Merge,
    LoopHeader,
    /// Sentinel every loop exit funnels through.
    LoopExit,
    Return,
    Break,
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    /// The statement this node represents, for synthetic nodes `None`.
    pub stmt: Option<NodeId>,
    pub location: Option<SourceSpan>,
    pub predecessors: SmallVec<[CfgNodeId; 2]>,
    pub successors: SmallVec<[CfgNodeId; 2]>,
    pub reachable: bool,
}

/// The CFG of one function: exactly one entry and one exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    pub function: String,
    nodes: Vec<CfgNode>,
    entry: CfgNodeId,
    exit: CfgNodeId,
}

impl ControlFlowGraph {
    #[must_use]
    pub fn entry(&self) -> CfgNodeId {
        self.entry
    }

    #[must_use]
    pub fn exit(&self) -> CfgNodeId {
        self.exit
    }

    #[must_use]
    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Statement nodes left unreachable after the BFS sweep.
    pub fn unreachable_statements(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter().filter(|n| !n.reachable && n.stmt.is_some())
    }
}

/// Builds the CFG for one function and reports unreachable code.
pub fn build_cfg(name: &str, function: &FunctionDecl, diagnostics: &mut DiagnosticBag) -> ControlFlowGraph {
    let mut builder = CfgBuilder {
        nodes: Vec::new(),
        loop_stack: Vec::new(),
        warned: AHashSet::new(),
        diagnostics: &mut *diagnostics,
    };
    let entry = builder.new_node(CfgNodeKind::Entry, None, None);
    let exit = builder.new_node(CfgNodeKind::Exit, None, None);
    let mut current = Some(entry);
    builder.visit_stmts(&function.body, &mut current, exit);
    // Falling off the end is the implicit return path.
    if let Some(current) = current {
        builder.connect(current, exit);
    }

    let mut graph = ControlFlowGraph {
        function: name.to_owned(),
        nodes: builder.nodes,
        entry,
        exit,
    };
    let warned = builder.warned;
    mark_reachable(&mut graph);
    for node in &graph.nodes {
        if !node.reachable {
            if let (Some(stmt), Some(location)) = (node.stmt, node.location) {
                if !warned.contains(&stmt) {
                    diagnostics.report(DiagnosticCode::UnreachableCode, "unreachable code", location);
                }
            }
        }
    }
    graph
}

/// BFS from the entry, setting `reachable` flags.
fn mark_reachable(graph: &mut ControlFlowGraph) {
    let mut queue = vec![graph.entry];
    let mut seen = AHashSet::new();
    seen.insert(graph.entry);
    while let Some(id) = queue.pop() {
        graph.nodes[id.index()].reachable = true;
        for &succ in &graph.nodes[id.index()].successors.clone() {
            if seen.insert(succ) {
                queue.push(succ);
            }
        }
    }
}

struct CfgBuilder<'a> {
    nodes: Vec<CfgNode>,
    /// (continue target, break target) per enclosing loop.
    loop_stack: Vec<(CfgNodeId, CfgNodeId)>,
    /// Statements already reported through the insertion-point rule, so the
    /// reachability sweep doesn't report them twice.
    warned: AHashSet<NodeId>,
    diagnostics: &'a mut DiagnosticBag,
}

impl CfgBuilder<'_> {
    fn new_node(&mut self, kind: CfgNodeKind, stmt: Option<NodeId>, location: Option<SourceSpan>) -> CfgNodeId {
        let id = CfgNodeId::new(self.nodes.len());
        self.nodes.push(CfgNode {
            id,
            kind,
            stmt,
            location,
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
            reachable: false,
        });
        id
    }

    fn connect(&mut self, from: CfgNodeId, to: CfgNodeId) {
        if !self.nodes[from.index()].successors.contains(&to) {
            self.nodes[from.index()].successors.push(to);
            self.nodes[to.index()].predecessors.push(from);
        }
    }

    /// Appends a node after the insertion point and advances it.
    fn append(&mut self, kind: CfgNodeKind, stmt: &Stmt, current: &mut Option<CfgNodeId>) -> CfgNodeId {
        let node = self.new_node(kind, Some(stmt.id), Some(stmt.location));
        if let Some(current) = *current {
            self.connect(current, node);
        }
        *current = Some(node);
        node
    }

    fn visit_stmts(&mut self, stmts: &[Stmt], current: &mut Option<CfgNodeId>, exit: CfgNodeId) {
        for stmt in stmts {
            if current.is_none() {
                // Dead statement; one warning each, keep scanning.
                if self.warned.insert(stmt.id) {
                    self.diagnostics
                        .report(DiagnosticCode::UnreachableCode, "unreachable code", stmt.location);
                }
                continue;
            }
            self.visit_stmt(stmt, current, exit);
        }
    }

    fn visit_stmt(&mut self, stmt: &Stmt, current: &mut Option<CfgNodeId>, exit: CfgNodeId) {
        match &stmt.kind {
            StmtKind::Expr(_) | StmtKind::Let(_) => {
                self.append(CfgNodeKind::Statement, stmt, current);
            }
            StmtKind::Block(body) => {
                self.visit_stmts(body, current, exit);
            }
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let branch = self.append(CfgNodeKind::Branch, stmt, current);
                let mut then_end = Some(branch);
                self.visit_stmts(then_branch, &mut then_end, exit);
                let mut else_end = match else_branch {
                    Some(else_branch) => {
                        let mut else_end = Some(branch);
                        self.visit_stmts(else_branch, &mut else_end, exit);
                        else_end
                    }
                    // No else: the false edge falls through the branch node.
                    None => Some(branch),
                };
                // Avoid a self-merge when both arms end at the branch node.
                if else_end == Some(branch) && then_end == Some(branch) {
                    *current = Some(branch);
                    return;
                }
                if then_end.is_some() || else_end.is_some() {
                    let merge = self.new_node(CfgNodeKind::Merge, None, None);
                    for end in [then_end.take(), else_end.take()].into_iter().flatten() {
                        self.connect(end, merge);
                    }
                    *current = Some(merge);
                } else {
                    *current = None;
                }
            }
            StmtKind::While { body, .. } => {
                let header = self.append(CfgNodeKind::LoopHeader, stmt, current);
                let loop_exit = self.new_node(CfgNodeKind::LoopExit, None, None);
                // The condition may be false on entry.
                self.connect(header, loop_exit);
                self.loop_stack.push((header, loop_exit));
                let mut body_end = Some(header);
                self.visit_stmts(body, &mut body_end, exit);
                if let Some(body_end) = body_end {
                    self.connect(body_end, header);
                }
                self.loop_stack.pop();
                *current = Some(loop_exit);
            }
            StmtKind::For { init, body, .. } => {
                if let Some(init) = init {
                    self.visit_stmt(init, current, exit);
                }
                let header = self.append(CfgNodeKind::LoopHeader, stmt, current);
                let loop_exit = self.new_node(CfgNodeKind::LoopExit, None, None);
                self.connect(header, loop_exit);
                self.loop_stack.push((header, loop_exit));
                let mut body_end = Some(header);
                self.visit_stmts(body, &mut body_end, exit);
                if let Some(body_end) = body_end {
                    self.connect(body_end, header);
                }
                self.loop_stack.pop();
                *current = Some(loop_exit);
            }
            StmtKind::DoWhile { body, .. } => {
                // Body first; the condition back-edges to it.
                let header = self.append(CfgNodeKind::LoopHeader, stmt, current);
                let condition = self.new_node(CfgNodeKind::Branch, None, None);
                let loop_exit = self.new_node(CfgNodeKind::LoopExit, None, None);
                self.connect(condition, header);
                self.connect(condition, loop_exit);
                self.loop_stack.push((condition, loop_exit));
                let mut body_end = Some(header);
                self.visit_stmts(body, &mut body_end, exit);
                if let Some(body_end) = body_end {
                    self.connect(body_end, condition);
                }
                self.loop_stack.pop();
                *current = Some(loop_exit);
            }
            StmtKind::Loop { body } => {
                let header = self.append(CfgNodeKind::LoopHeader, stmt, current);
                let loop_exit = self.new_node(CfgNodeKind::LoopExit, None, None);
                // No header→exit edge: the loop only ends through `break`.
                self.loop_stack.push((header, loop_exit));
                let mut body_end = Some(header);
                self.visit_stmts(body, &mut body_end, exit);
                if let Some(body_end) = body_end {
                    self.connect(body_end, header);
                }
                self.loop_stack.pop();
                *current = Some(loop_exit);
            }
            StmtKind::Match { arms, default, .. } => {
                let branch = self.append(CfgNodeKind::Branch, stmt, current);
                let mut ends: Vec<CfgNodeId> = Vec::new();
                for arm in arms {
                    let mut arm_end = Some(branch);
                    self.visit_stmts(&arm.body, &mut arm_end, exit);
                    ends.extend(arm_end);
                }
                match default {
                    Some(default) => {
                        let mut default_end = Some(branch);
                        self.visit_stmts(default, &mut default_end, exit);
                        ends.extend(default_end);
                    }
                    // No default arm: the scrutinee may match nothing.
                    None => ends.push(branch),
                }
                if ends.is_empty() {
                    *current = None;
                } else if ends == [branch] {
                    *current = Some(branch);
                } else {
                    let merge = self.new_node(CfgNodeKind::Merge, None, None);
                    for end in ends {
                        self.connect(end, merge);
                    }
                    *current = Some(merge);
                }
            }
            StmtKind::Return(_) => {
                let node = self.append(CfgNodeKind::Return, stmt, current);
                self.connect(node, exit);
                *current = None;
            }
            StmtKind::Break => {
                let node = self.append(CfgNodeKind::Break, stmt, current);
                if let Some(&(_, break_target)) = self.loop_stack.last() {
                    self.connect(node, break_target);
                }
                *current = None;
            }
            StmtKind::Continue => {
                let node = self.append(CfgNodeKind::Continue, stmt, current);
                if let Some(&(continue_target, _)) = self.loop_stack.last() {
                    self.connect(node, continue_target);
                }
                *current = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;

    fn graph_for(body: Vec<Stmt>) -> (ControlFlowGraph, DiagnosticBag) {
        let function = FunctionDecl {
            name: "f".to_owned(),
            params: vec![],
            return_type: None,
            body,
            is_exported: false,
        };
        let mut diags = DiagnosticBag::new();
        let graph = build_cfg("f", &function, &mut diags);
        (graph, diags)
    }

    #[test]
    fn straight_line_body_is_fully_reachable() {
        let mut b = AstBuilder::new();
        let one = b.number(1);
        let two = b.number(2);
        let body = vec![b.expr_stmt(one), b.expr_stmt(two)];
        let (graph, diags) = graph_for(body);
        assert!(diags.is_empty());
        assert!(graph.nodes().all(|n| n.reachable));
    }

    #[test]
    fn code_after_return_is_reported_once_per_statement() {
        let mut b = AstBuilder::new();
        let value = b.number(1);
        let ret = b.ret(Some(value));
        let addr = b.number(0xD020);
        let zero = b.number(0);
        let poke = b.call_named("poke", vec![addr, zero]);
        let dead = b.expr_stmt(poke);
        let (graph, diags) = graph_for(vec![ret, dead]);
        assert_eq!(diags.with_code(DiagnosticCode::UnreachableCode).count(), 1);
        assert_eq!(graph.unreachable_statements().count(), 0);
    }

    #[test]
    fn if_without_else_merges_the_fallthrough_edge() {
        let mut b = AstBuilder::new();
        let cond = b.boolean(true);
        let one = b.number(1);
        let then_branch = vec![b.expr_stmt(one)];
        let if_stmt = b.if_stmt(cond, then_branch, None);
        let two = b.number(2);
        let after = b.expr_stmt(two);
        let (graph, diags) = graph_for(vec![if_stmt, after]);
        assert!(diags.is_empty());
        assert!(graph.nodes().all(|n| n.reachable));
        assert_eq!(graph.nodes().filter(|n| n.kind == CfgNodeKind::Merge).count(), 1);
    }

    #[test]
    fn while_loop_has_back_edge_and_exit_edge() {
        let mut b = AstBuilder::new();
        let cond = b.boolean(true);
        let one = b.number(1);
        let body = vec![b.expr_stmt(one)];
        let while_stmt = b.while_stmt(cond, body);
        let (graph, diags) = graph_for(vec![while_stmt]);
        assert!(diags.is_empty());
        let header = graph.nodes().find(|n| n.kind == CfgNodeKind::LoopHeader).unwrap();
        // Header reaches both the body statement and the loop exit.
        assert_eq!(header.successors.len(), 2);
        // The body statement loops back to the header.
        let body_node = graph.nodes().find(|n| n.kind == CfgNodeKind::Statement).unwrap();
        assert!(body_node.successors.contains(&header.id));
    }

    #[test]
    fn both_branches_returning_kills_the_merge() {
        let mut b = AstBuilder::new();
        let cond = b.boolean(true);
        let one = b.number(1);
        let two = b.number(2);
        let then_branch = vec![b.ret(Some(one))];
        let else_branch = vec![b.ret(Some(two))];
        let if_stmt = b.if_stmt(cond, then_branch, Some(else_branch));
        let three = b.number(3);
        let after = b.expr_stmt(three);
        let (_, diags) = graph_for(vec![if_stmt, after]);
        assert_eq!(diags.with_code(DiagnosticCode::UnreachableCode).count(), 1);
    }

    #[test]
    fn break_exits_infinite_loop() {
        let mut b = AstBuilder::new();
        let brk = b.brk();
        let loop_stmt = b.loop_stmt(vec![brk]);
        let one = b.number(1);
        let after = b.expr_stmt(one);
        let (graph, diags) = graph_for(vec![loop_stmt, after]);
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        assert!(graph.nodes().all(|n| n.reachable));
    }
}

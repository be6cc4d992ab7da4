//! Loop structure analysis.
//!
//! Builds one [`LoopInfo`] per loop: the nesting tree, read/modified
//! variable sets (transitive through nested loops), basic and derived
//! induction variables, loop-invariant expressions hoisted to the outermost
//! loop where they stay invariant, and iteration estimates that feed the
//! unroll decision. The walk collects raw facts first; invariance and
//! induction are decided afterwards, once every write in the loop is known.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ast::{
    AnalysisStore, BinaryOp, Expr, ExprKind, FunctionDecl, MetaKey, MetaValue, NodeId, Stmt, StmtKind, UnaryOp,
};
use crate::options::CompileOptions;
use crate::source::SourceSpan;

/// Identifier of a loop within one function's analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopId(u32);

impl LoopId {
    fn new(index: usize) -> Self {
        Self(index.try_into().expect("loop arena overflow"))
    }

    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum LoopKind {
    While,
    For,
    DoWhile,
    Infinite,
}

/// How an induction variable advances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InductionKind {
    /// `i = i ± step` exactly once per iteration.
    Basic { step: i64 },
    /// `j = scale * i + offset` where `i` is a basic induction variable.
    Derived { base: String, scale: i64, offset: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InductionVariable {
    pub name: String,
    pub kind: InductionKind,
}

/// Everything the analyzer learned about one loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopInfo {
    pub id: LoopId,
    pub kind: LoopKind,
    pub location: SourceSpan,
    pub function: String,
    /// 1 for an outermost loop.
    pub nesting_depth: u32,
    pub parent: Option<LoopId>,
    pub children: Vec<LoopId>,
    pub induction_variables: Vec<InductionVariable>,
    /// Expression nodes invariant in this loop; after hoisting, each
    /// expression is listed on the outermost loop where it is invariant.
    pub invariants: Vec<NodeId>,
    pub modified_variables: IndexSet<String>,
    pub read_variables: IndexSet<String>,
    pub estimated_iterations: Option<u64>,
    pub is_countable: bool,
    /// The loop statement node (maps to the CFG loop header).
    pub header_stmt: NodeId,
    pub has_break_or_continue: bool,
    pub is_unroll_candidate: bool,
}

/// How a variable is written inside one loop iteration.
#[derive(Debug, Clone)]
enum WriteForm {
    /// `i = i ± step` with a constant step.
    SelfDelta { step: i64 },
    /// `j = scale * base + offset` with constant scale/offset.
    Linear { base: String, scale: i64, offset: i64 },
    /// Anything else, or a write observed from an outer loop.
    Opaque,
}

/// A compound expression that may be hoistable, with the loop stack it was
/// found under.
#[derive(Debug)]
struct InvariantCandidate {
    expr: NodeId,
    variables: Vec<String>,
    /// Innermost-last loop indices enclosing the expression.
    stack: Vec<usize>,
}

/// Analyzes every loop of one function.
pub fn analyze_loops(
    function_name: &str,
    function: &FunctionDecl,
    store: &mut AnalysisStore,
    options: &CompileOptions,
) -> Vec<LoopInfo> {
    let mut analyzer = LoopAnalyzer {
        function: function_name,
        loops: Vec::new(),
        writes: Vec::new(),
        candidates: Vec::new(),
        stack: Vec::new(),
        store: &mut *store,
    };
    analyzer.walk_stmts(&function.body);
    let LoopAnalyzer {
        mut loops,
        writes,
        candidates,
        ..
    } = analyzer;

    for index in 0..loops.len() {
        detect_induction_variables(&mut loops, &writes, index);
    }
    resolve_invariants(&mut loops, &candidates, store);
    for index in 0..loops.len() {
        estimate_iterations(&mut loops, function, index, store);
        let info = &mut loops[index];
        info.is_countable = info.estimated_iterations.is_some();
        info.is_unroll_candidate = info.children.is_empty()
            && !info.has_break_or_continue
            && info
                .estimated_iterations
                .is_some_and(|n| n >= 1 && n <= u64::from(options.max_unroll));
    }
    for info in &loops {
        store.set(info.header_stmt, MetaKey::LoopId, MetaValue::Int(u64::from(info.id.0)));
    }
    loops
}

struct LoopAnalyzer<'a> {
    function: &'a str,
    loops: Vec<LoopInfo>,
    /// Per-loop write forms, parallel to `loops`.
    writes: Vec<Vec<(String, WriteForm)>>,
    candidates: Vec<InvariantCandidate>,
    /// Indices of the loops currently open, outermost first.
    stack: Vec<usize>,
    store: &'a mut AnalysisStore,
}

impl LoopAnalyzer<'_> {
    fn open_loop(&mut self, kind: LoopKind, stmt: &Stmt) {
        let id = LoopId::new(self.loops.len());
        let parent = self.stack.last().map(|&i| self.loops[i].id);
        let nesting_depth = u32::try_from(self.stack.len()).unwrap_or(u32::MAX) + 1;
        if let Some(&parent_index) = self.stack.last() {
            self.loops[parent_index].children.push(id);
        }
        self.loops.push(LoopInfo {
            id,
            kind,
            location: stmt.location,
            function: self.function.to_owned(),
            nesting_depth,
            parent,
            children: Vec::new(),
            induction_variables: Vec::new(),
            invariants: Vec::new(),
            modified_variables: IndexSet::new(),
            read_variables: IndexSet::new(),
            estimated_iterations: None,
            is_countable: false,
            header_stmt: stmt.id,
            has_break_or_continue: false,
            is_unroll_candidate: false,
        });
        self.writes.push(Vec::new());
        self.stack.push(self.loops.len() - 1);
    }

    fn close_loop(&mut self) {
        self.stack.pop();
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.scan_expr(expr),
            StmtKind::Let(var) => {
                if let Some(init) = &var.initializer {
                    self.scan_expr(init);
                }
                self.record_write(&var.name, WriteForm::Opaque);
            }
            StmtKind::Block(body) => self.walk_stmts(body),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.scan_expr(condition);
                self.walk_stmts(then_branch);
                if let Some(else_branch) = else_branch {
                    self.walk_stmts(else_branch);
                }
            }
            StmtKind::While { condition, body } => {
                self.open_loop(LoopKind::While, stmt);
                self.scan_expr(condition);
                self.walk_stmts(body);
                self.close_loop();
            }
            StmtKind::DoWhile { body, condition } => {
                self.open_loop(LoopKind::DoWhile, stmt);
                self.walk_stmts(body);
                self.scan_expr(condition);
                self.close_loop();
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.open_loop(LoopKind::For, stmt);
                // The init write runs once, not per iteration; it must not
                // disqualify the induction pattern of the update.
                match init.as_deref().map(|s| &s.kind) {
                    Some(StmtKind::Let(var)) => {
                        if let Some(expr) = &var.initializer {
                            self.scan_expr(expr);
                        }
                    }
                    Some(StmtKind::Expr(Expr {
                        kind: ExprKind::Assign { value, .. },
                        ..
                    })) => self.scan_expr(value),
                    Some(_) => {
                        if let Some(init) = init {
                            self.walk_stmt(init);
                        }
                    }
                    None => {}
                }
                if let Some(condition) = condition {
                    self.scan_expr(condition);
                }
                if let Some(update) = update {
                    self.scan_expr(update);
                }
                self.walk_stmts(body);
                self.close_loop();
            }
            StmtKind::Loop { body } => {
                self.open_loop(LoopKind::Infinite, stmt);
                self.walk_stmts(body);
                self.close_loop();
            }
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                self.scan_expr(scrutinee);
                for arm in arms {
                    self.scan_expr(&arm.pattern);
                    self.walk_stmts(&arm.body);
                }
                if let Some(default) = default {
                    self.walk_stmts(default);
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.scan_expr(value);
                }
            }
            StmtKind::Break | StmtKind::Continue => {
                if let Some(&innermost) = self.stack.last() {
                    self.loops[innermost].has_break_or_continue = true;
                }
            }
        }
    }

    /// Records reads, writes, and invariance candidates for one expression
    /// tree.
    fn scan_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier(name) => self.record_read(name),
            ExprKind::Assign { target, value } => {
                self.scan_expr(value);
                if let Some(name) = target.as_identifier() {
                    let form = self.classify_write(name, value);
                    self.record_write(name, form);
                } else {
                    self.scan_expr(target);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.scan_expr(lhs);
                self.scan_expr(rhs);
                self.note_invariant_candidate(expr);
            }
            ExprKind::Unary { operand, .. } => {
                self.scan_expr(operand);
                self.note_invariant_candidate(expr);
            }
            ExprKind::Call { callee, args } => {
                // A direct callee identifier is a function reference, not a
                // variable read.
                if callee.as_identifier().is_none() {
                    self.scan_expr(callee);
                }
                for arg in args {
                    self.scan_expr(arg);
                }
            }
            ExprKind::Index { target, index } => {
                self.scan_expr(target);
                self.scan_expr(index);
            }
            ExprKind::ArrayLiteral(items) => {
                for item in items {
                    self.scan_expr(item);
                }
            }
            ExprKind::Member { .. } | ExprKind::Number(_) | ExprKind::Bool(_) | ExprKind::Str(_) => {}
        }
    }

    fn record_read(&mut self, name: &str) {
        for &index in &self.stack {
            self.loops[index].read_variables.insert(name.to_owned());
        }
    }

    fn record_write(&mut self, name: &str, form: WriteForm) {
        let Some(&innermost) = self.stack.last() else { return };
        for &index in &self.stack {
            self.loops[index].modified_variables.insert(name.to_owned());
            // Seen from an outer loop, a nested write happens many times
            // per iteration and can never be an induction step.
            let recorded = if index == innermost { form.clone() } else { WriteForm::Opaque };
            self.writes[index].push((name.to_owned(), recorded));
        }
    }

    /// Matches `i = i ± c` and `j = a * i + c` update shapes, resolving
    /// constants through the type checker's folds.
    fn classify_write(&self, target: &str, value: &Expr) -> WriteForm {
        if let ExprKind::Binary { op, lhs, rhs } = &value.kind {
            match op {
                BinaryOp::Add | BinaryOp::Sub => {
                    if lhs.as_identifier() == Some(target) {
                        if let Some(step) = self.const_of(rhs) {
                            let step = if *op == BinaryOp::Sub { -step } else { step };
                            return WriteForm::SelfDelta { step };
                        }
                    }
                    if *op == BinaryOp::Add && rhs.as_identifier() == Some(target) {
                        if let Some(step) = self.const_of(lhs) {
                            return WriteForm::SelfDelta { step };
                        }
                    }
                    if *op == BinaryOp::Add {
                        // a * i + c (either operand order).
                        for (scaled, offset) in [(lhs, rhs), (rhs, lhs)] {
                            if let (Some((base, scale)), Some(offset)) =
                                (self.scaled_identifier(scaled), self.const_of(offset))
                            {
                                if base != target {
                                    return WriteForm::Linear { base, scale, offset };
                                }
                            }
                        }
                    }
                }
                BinaryOp::Mul => {
                    if let Some((base, scale)) = self.scaled_identifier(value) {
                        if base != target {
                            return WriteForm::Linear { base, scale, offset: 0 };
                        }
                    }
                }
                _ => {}
            }
        }
        WriteForm::Opaque
    }

    /// Matches `c * i` or `i * c`, returning `(i, c)`.
    fn scaled_identifier(&self, expr: &Expr) -> Option<(String, i64)> {
        let ExprKind::Binary {
            op: BinaryOp::Mul,
            lhs,
            rhs,
        } = &expr.kind
        else {
            return None;
        };
        if let (Some(scale), Some(base)) = (self.const_of(lhs), rhs.as_identifier()) {
            return Some((base.to_owned(), scale));
        }
        if let (Some(base), Some(scale)) = (lhs.as_identifier(), self.const_of(rhs)) {
            return Some((base.to_owned(), scale));
        }
        None
    }

    fn const_of(&self, expr: &Expr) -> Option<i64> {
        self.store.const_value(expr.id).and_then(|v| i64::try_from(v).ok())
    }

    fn note_invariant_candidate(&mut self, expr: &Expr) {
        if self.stack.is_empty() {
            return;
        }
        let mut variables = Vec::new();
        if !collect_variables(expr, &mut variables) {
            return;
        }
        self.candidates.push(InvariantCandidate {
            expr: expr.id,
            variables,
            stack: self.stack.clone(),
        });
    }
}

/// Collects every variable an expression reads. Returns `false` when the
/// expression contains something that disqualifies invariance (calls,
/// indexing, assignment, address-of).
fn collect_variables(expr: &Expr, out: &mut Vec<String>) -> bool {
    match &expr.kind {
        ExprKind::Number(_) | ExprKind::Bool(_) | ExprKind::Str(_) | ExprKind::Member { .. } => true,
        ExprKind::Identifier(name) => {
            out.push(name.clone());
            true
        }
        ExprKind::Binary { lhs, rhs, .. } => collect_variables(lhs, out) && collect_variables(rhs, out),
        ExprKind::Unary { op, operand } => *op != UnaryOp::AddressOf && collect_variables(operand, out),
        ExprKind::Call { .. } | ExprKind::Index { .. } | ExprKind::Assign { .. } | ExprKind::ArrayLiteral(_) => false,
    }
}

/// Assigns each candidate to the outermost loop where every operand stays
/// unmodified; runs after the walk so modified sets are complete.
fn resolve_invariants(loops: &mut [LoopInfo], candidates: &[InvariantCandidate], store: &mut AnalysisStore) {
    for candidate in candidates {
        let target = candidate.stack.iter().copied().find(|&index| {
            candidate
                .variables
                .iter()
                .all(|name| !loops[index].modified_variables.contains(name))
        });
        if let Some(index) = target {
            loops[index].invariants.push(candidate.expr);
            store.set(candidate.expr, MetaKey::LoopInvariant, MetaValue::Flag(true));
        }
    }
}

/// Pulls basic and derived induction variables out of the recorded writes.
fn detect_induction_variables(loops: &mut [LoopInfo], writes: &[Vec<(String, WriteForm)>], index: usize) {
    // One write per iteration, or the variable is out.
    let mut single_writes: Vec<(&str, &WriteForm)> = Vec::new();
    for (name, form) in &writes[index] {
        let count = writes[index].iter().filter(|(n, _)| n == name).count();
        if count == 1 {
            single_writes.push((name, form));
        }
    }
    let mut induction: Vec<InductionVariable> = single_writes
        .iter()
        .filter_map(|(name, form)| match form {
            WriteForm::SelfDelta { step } => Some(InductionVariable {
                name: (*name).to_owned(),
                kind: InductionKind::Basic { step: *step },
            }),
            _ => None,
        })
        .collect();
    let derived: Vec<InductionVariable> = single_writes
        .iter()
        .filter_map(|(name, form)| match form {
            WriteForm::Linear { base, scale, offset }
                if induction
                    .iter()
                    .any(|iv| &iv.name == base && matches!(iv.kind, InductionKind::Basic { .. })) =>
            {
                Some(InductionVariable {
                    name: (*name).to_owned(),
                    kind: InductionKind::Derived {
                        base: base.clone(),
                        scale: *scale,
                        offset: *offset,
                    },
                })
            }
            _ => None,
        })
        .collect();
    induction.extend(derived);
    loops[index].induction_variables = induction;
}

/// `for (let i = c0; i < cN; i = i + s)` → iteration count.
fn estimate_iterations(loops: &mut [LoopInfo], function: &FunctionDecl, index: usize, store: &AnalysisStore) {
    let header = loops[index].header_stmt;
    let Some(stmt) = find_stmt(&function.body, header) else { return };
    let StmtKind::For {
        init: Some(init),
        condition: Some(condition),
        ..
    } = &stmt.kind
    else {
        return;
    };
    let StmtKind::Let(var) = &init.kind else { return };
    let Some(start) = var.initializer.as_ref().and_then(|e| store.const_value(e.id)) else {
        return;
    };
    let ExprKind::Binary { op, lhs, rhs } = &condition.kind else { return };
    if !matches!(op, BinaryOp::Lt | BinaryOp::Le) || lhs.as_identifier() != Some(var.name.as_str()) {
        return;
    }
    let Some(limit) = store.const_value(rhs.id) else { return };
    let step = loops[index].induction_variables.iter().find_map(|iv| {
        if iv.name == var.name {
            match iv.kind {
                InductionKind::Basic { step } => Some(step),
                InductionKind::Derived { .. } => None,
            }
        } else {
            None
        }
    });
    let Some(step) = step else { return };
    if step <= 0 {
        return;
    }
    let (Ok(start), Ok(limit)) = (i64::try_from(start), i64::try_from(limit)) else {
        return;
    };
    let limit = limit + i64::from(*op == BinaryOp::Le);
    let span = limit - start;
    let iterations = if span <= 0 { 0 } else { (span + step - 1) / step };
    loops[index].estimated_iterations = u64::try_from(iterations).ok();
}

/// Finds a statement by node id anywhere in a body.
fn find_stmt(stmts: &[Stmt], id: NodeId) -> Option<&Stmt> {
    for stmt in stmts {
        if stmt.id == id {
            return Some(stmt);
        }
        let found = match &stmt.kind {
            StmtKind::Block(body) | StmtKind::Loop { body } => find_stmt(body, id),
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => find_stmt(then_branch, id).or_else(|| else_branch.as_deref().and_then(|b| find_stmt(b, id))),
            StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } => find_stmt(body, id),
            StmtKind::For { init, body, .. } => init
                .as_deref()
                .and_then(|i| find_stmt(std::slice::from_ref(i), id))
                .or_else(|| find_stmt(body, id)),
            StmtKind::Match { arms, default, .. } => arms
                .iter()
                .find_map(|arm| find_stmt(&arm.body, id))
                .or_else(|| default.as_deref().and_then(|d| find_stmt(d, id))),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;

    /// `for (let i = 0; i < 5; i = i + 1) { total = total + n; }` where the
    /// loop also reads an untouched variable pair.
    fn counted_loop() -> (FunctionDecl, AnalysisStore) {
        let mut b = AstBuilder::new();
        let zero = b.number(0);
        let init = b.let_local("i", Some(b.ty("byte")), Some(zero));
        let i1 = b.ident("i");
        let five = b.number(5);
        let cond = b.binary(BinaryOp::Lt, i1, five);
        let i2 = b.ident("i");
        let one = b.number(1);
        let bump = b.binary(BinaryOp::Add, i2, one);
        let i3 = b.ident("i");
        let update = b.assign(i3, bump);
        let a = b.ident("a");
        let n = b.ident("n");
        let sum = b.binary(BinaryOp::Add, a, n);
        let total = b.ident("total");
        let acc = b.assign(total, sum);
        let body = vec![b.expr_stmt(acc)];
        let for_stmt = b.for_stmt(Some(init), Some(cond), Some(update), body);
        let function = FunctionDecl {
            name: "f".to_owned(),
            params: vec![],
            return_type: None,
            body: vec![for_stmt],
            is_exported: false,
        };
        // Re-run the literal folds the type checker would have produced.
        let mut store = AnalysisStore::new();
        fold_numbers(&function.body, &mut store);
        (function, store)
    }

    fn fold_numbers(stmts: &[Stmt], store: &mut AnalysisStore) {
        fn expr(e: &Expr, store: &mut AnalysisStore) {
            if let ExprKind::Number(n) = e.kind {
                store.set_const_value(e.id, u64::from(n));
            }
            match &e.kind {
                ExprKind::Binary { lhs, rhs, .. } => {
                    expr(lhs, store);
                    expr(rhs, store);
                }
                ExprKind::Unary { operand, .. } => expr(operand, store),
                ExprKind::Assign { target, value } => {
                    expr(target, store);
                    expr(value, store);
                }
                ExprKind::Call { args, .. } => args.iter().for_each(|a| expr(a, store)),
                ExprKind::Index { target, index } => {
                    expr(target, store);
                    expr(index, store);
                }
                ExprKind::ArrayLiteral(items) => items.iter().for_each(|i| expr(i, store)),
                _ => {}
            }
        }
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Expr(e) => expr(e, store),
                StmtKind::Let(v) => {
                    if let Some(init) = &v.initializer {
                        expr(init, store);
                    }
                }
                StmtKind::For {
                    init,
                    condition,
                    update,
                    body,
                } => {
                    if let Some(init) = init {
                        fold_numbers(std::slice::from_ref(init), store);
                    }
                    if let Some(c) = condition {
                        expr(c, store);
                    }
                    if let Some(u) = update {
                        expr(u, store);
                    }
                    fold_numbers(body, store);
                }
                StmtKind::While { condition, body } => {
                    expr(condition, store);
                    fold_numbers(body, store);
                }
                StmtKind::Block(body) | StmtKind::Loop { body } => fold_numbers(body, store),
                _ => {}
            }
        }
    }

    #[test]
    fn basic_induction_variable_and_iteration_count() {
        let (function, mut store) = counted_loop();
        let loops = analyze_loops("f", &function, &mut store, &CompileOptions::default());
        assert_eq!(loops.len(), 1);
        let info = &loops[0];
        assert_eq!(info.kind, LoopKind::For);
        assert_eq!(info.nesting_depth, 1);
        assert!(info
            .induction_variables
            .iter()
            .any(|iv| iv.name == "i" && iv.kind == InductionKind::Basic { step: 1 }));
        assert_eq!(info.estimated_iterations, Some(5));
        assert!(info.is_countable);
        assert!(info.is_unroll_candidate);
    }

    #[test]
    fn invariant_expression_is_attributed_to_the_loop() {
        let (function, mut store) = counted_loop();
        let loops = analyze_loops("f", &function, &mut store, &CompileOptions::default());
        // `a + n` reads only variables the loop never writes.
        assert_eq!(loops[0].invariants.len(), 1);
        assert!(loops[0].modified_variables.contains("total"));
        assert!(loops[0].read_variables.contains("a"));
    }

    #[test]
    fn break_disqualifies_unrolling() {
        let mut b = AstBuilder::new();
        let zero = b.number(0);
        let init = b.let_local("i", Some(b.ty("byte")), Some(zero));
        let i1 = b.ident("i");
        let four = b.number(4);
        let cond = b.binary(BinaryOp::Lt, i1, four);
        let i2 = b.ident("i");
        let one = b.number(1);
        let bump = b.binary(BinaryOp::Add, i2, one);
        let i3 = b.ident("i");
        let update = b.assign(i3, bump);
        let brk = b.brk();
        let for_stmt = b.for_stmt(Some(init), Some(cond), Some(update), vec![brk]);
        let function = FunctionDecl {
            name: "f".to_owned(),
            params: vec![],
            return_type: None,
            body: vec![for_stmt],
            is_exported: false,
        };
        let mut store = AnalysisStore::new();
        fold_numbers(&function.body, &mut store);
        let loops = analyze_loops("f", &function, &mut store, &CompileOptions::default());
        assert!(loops[0].has_break_or_continue);
        assert!(!loops[0].is_unroll_candidate);
    }

    #[test]
    fn nested_write_is_opaque_to_the_outer_loop() {
        let mut b = AstBuilder::new();
        // outer: while (true) { inner: while (true) { i = i + 1; } }
        let i = b.ident("i");
        let one = b.number(1);
        let bump = b.binary(BinaryOp::Add, i, one);
        let i2 = b.ident("i");
        let assign = b.assign(i2, bump);
        let inner_cond = b.boolean(true);
        let inner = b.while_stmt(inner_cond, vec![b.expr_stmt(assign)]);
        let outer_cond = b.boolean(true);
        let outer = b.while_stmt(outer_cond, vec![inner]);
        let function = FunctionDecl {
            name: "f".to_owned(),
            params: vec![],
            return_type: None,
            body: vec![outer],
            is_exported: false,
        };
        let mut store = AnalysisStore::new();
        fold_numbers(&function.body, &mut store);
        let loops = analyze_loops("f", &function, &mut store, &CompileOptions::default());
        let outer_info = loops.iter().find(|l| l.nesting_depth == 1).unwrap();
        let inner_info = loops.iter().find(|l| l.nesting_depth == 2).unwrap();
        assert!(inner_info
            .induction_variables
            .iter()
            .any(|iv| matches!(iv.kind, InductionKind::Basic { step: 1 })));
        assert!(outer_info.induction_variables.is_empty());
        assert_eq!(inner_info.parent, Some(outer_info.id));
        assert_eq!(outer_info.children, vec![inner_info.id]);
    }
}

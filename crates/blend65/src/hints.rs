//! 6502-specific optimization hints.
//!
//! Pure advice: nothing here changes semantics. Access counters weighted by
//! loop nesting rank variables for the zero-page budget, small leaf
//! functions become inline candidates, and functions ending in a direct
//! call become tail-call candidates for the emitter's jump-instead-of-call
//! rewrite.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::ast::{DeclKind, Expr, ExprKind, FunctionDecl, Program, Stmt, StmtKind, StorageClass};
use crate::callgraph::CallGraph;
use crate::options::CompileOptions;
use crate::scope::{SymbolKind, SymbolTable};
use crate::source::SourceSpan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum HintKind {
    ZeroPageCandidate,
    HotVariable,
    InlineCandidate,
    TailCallCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub enum HintPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl HintPriority {
    fn from_score(score: u64) -> Self {
        match score {
            0..=9 => Self::Low,
            10..=99 => Self::Medium,
            100..=999 => Self::High,
            _ => Self::Critical,
        }
    }
}

/// One piece of advice for the emitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub kind: HintKind,
    /// Variable or function the hint concerns.
    pub symbol: String,
    pub score: u64,
    pub estimated_byte_saving: u64,
    pub estimated_cycle_saving: u64,
    pub priority: HintPriority,
    pub location: SourceSpan,
}

/// Read/write counters for one symbol.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AccessCounts {
    pub reads: u64,
    pub writes: u64,
    /// Accesses multiplied by `loop_access_multiplier` per nesting level.
    pub weighted: u64,
}

impl AccessCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.reads + self.writes
    }
}

/// Produces the hint list for one module.
pub fn analyze_hints(
    program: &Program,
    table: &SymbolTable,
    call_graph: &CallGraph,
    options: &CompileOptions,
) -> Vec<Hint> {
    let mut counter = AccessCounter {
        counts: IndexMap::new(),
        multiplier: u64::from(options.loop_access_multiplier),
        depth: 0,
    };
    for decl in &program.decls {
        if let DeclKind::Function(function) = &decl.kind {
            counter.walk_stmts(&function.body);
        } else if let DeclKind::Variable(var) = &decl.kind {
            if let Some(init) = &var.initializer {
                counter.walk_expr(init, false);
            }
        }
    }

    let mut hints = Vec::new();
    zero_page_hints(program, table, &counter.counts, options, &mut hints);
    hot_variable_hints(table, &counter.counts, &mut hints);
    for decl in &program.decls {
        if let DeclKind::Function(function) = &decl.kind {
            let qualified = format!("{}::{}", program.name, function.name);
            inline_hint(decl.location, function, &qualified, call_graph, options, &mut hints);
            tail_call_hint(decl.location, function, table, &qualified, call_graph, &mut hints);
        }
    }
    hints
}

/// Ranks zero-page candidates by weighted score and recommends the top of
/// the ranking until the byte budget is spent.
fn zero_page_hints(
    program: &Program,
    table: &SymbolTable,
    counts: &IndexMap<String, AccessCounts>,
    options: &CompileOptions,
    hints: &mut Vec<Hint>,
) {
    let mut ranked: Vec<(&String, &AccessCounts)> = counts
        .iter()
        .filter(|(name, counts)| {
            counts.total() >= u64::from(options.min_zero_page_access_count) && eligible_for_zp(program, table, name)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.weighted.cmp(&a.1.weighted).then_with(|| a.0.cmp(b.0)));

    let mut budget = options.zero_page_hint_budget;
    for (name, counts) in ranked {
        let size = table
            .lookup_in_chain(table.root(), name)
            .and_then(|id| table.symbol(id).ty.as_ref().map(crate::types::TypeInfo::size))
            .unwrap_or(1)
            .max(1);
        if size > budget {
            continue;
        }
        budget -= size;
        hints.push(Hint {
            kind: HintKind::ZeroPageCandidate,
            symbol: name.clone(),
            score: counts.weighted,
            // Zero-page addressing saves one byte and one cycle per access.
            estimated_byte_saving: counts.total(),
            estimated_cycle_saving: counts.weighted,
            priority: HintPriority::from_score(counts.weighted),
            location: SourceSpan::synthetic(),
        });
    }
}

/// A symbol already pinned to an address gains nothing from the hint.
fn eligible_for_zp(program: &Program, table: &SymbolTable, name: &str) -> bool {
    if program
        .decls
        .iter()
        .any(|d| matches!(&d.kind, DeclKind::Map(map) if map.name == name))
    {
        return false;
    }
    match table.lookup_in_chain(table.root(), name) {
        Some(id) => {
            let symbol = table.symbol(id);
            symbol.storage != StorageClass::ZeroPage
                && matches!(symbol.kind, SymbolKind::Variable | SymbolKind::Parameter)
        }
        // Function locals are not declared at the root; still eligible.
        None => true,
    }
}

/// The best loop-weighted variables, regardless of the zero-page budget.
fn hot_variable_hints(table: &SymbolTable, counts: &IndexMap<String, AccessCounts>, hints: &mut Vec<Hint>) {
    const HOT_VARIABLE_LIMIT: usize = 5;
    let mut in_loops: Vec<(&String, &AccessCounts)> = counts
        .iter()
        .filter(|(_, counts)| counts.weighted > counts.total())
        .collect();
    in_loops.sort_by(|a, b| b.1.weighted.cmp(&a.1.weighted).then_with(|| a.0.cmp(b.0)));
    for (name, counts) in in_loops.into_iter().take(HOT_VARIABLE_LIMIT) {
        let location = table
            .lookup_in_chain(table.root(), name)
            .map_or(SourceSpan::synthetic(), |id| table.symbol(id).location);
        hints.push(Hint {
            kind: HintKind::HotVariable,
            symbol: name.clone(),
            score: counts.weighted,
            estimated_byte_saving: 0,
            estimated_cycle_saving: counts.weighted,
            priority: HintPriority::from_score(counts.weighted),
            location,
        });
    }
}

fn inline_hint(
    location: SourceSpan,
    function: &FunctionDecl,
    qualified: &str,
    call_graph: &CallGraph,
    options: &CompileOptions,
    hints: &mut Vec<Hint>,
) {
    const MAX_INLINE_PARAMS: usize = 6;
    let instructions = estimate_instructions(&function.body);
    let makes_calls = call_graph.node(qualified).is_some_and(|n| !n.callees.is_empty());
    let has_loops = body_has_loops(&function.body);
    if instructions <= options.max_inline_instructions
        && function.params.len() < MAX_INLINE_PARAMS
        && !makes_calls
        && !has_loops
    {
        let callers = call_graph.node(qualified).map_or(0, |n| n.callers.len() as u64);
        let score = instructions as u64 + callers * 10;
        hints.push(Hint {
            kind: HintKind::InlineCandidate,
            symbol: qualified.to_owned(),
            score,
            // Dropping JSR/RTS saves four bytes and twelve cycles per site.
            estimated_byte_saving: callers * 4,
            estimated_cycle_saving: callers * 12,
            priority: HintPriority::from_score(score),
            location,
        });
    }
}

fn tail_call_hint(
    location: SourceSpan,
    function: &FunctionDecl,
    table: &SymbolTable,
    qualified: &str,
    call_graph: &CallGraph,
    hints: &mut Vec<Hint>,
) {
    if !has_tail_call(&function.body, table) {
        return;
    }
    let sites = call_graph.node(qualified).map_or(1, |n| n.callees.len().max(1) as u64);
    hints.push(Hint {
        kind: HintKind::TailCallCandidate,
        symbol: qualified.to_owned(),
        score: sites,
        // JSR+RTS → JMP: one byte and nine cycles per rewritten site.
        estimated_byte_saving: sites,
        estimated_cycle_saving: sites * 9,
        priority: HintPriority::from_score(sites),
        location,
    });
}

/// `return f(...)` anywhere in the body counts; the emitter decides per
/// site whether the rewrite is safe.
fn has_tail_call(stmts: &[Stmt], table: &SymbolTable) -> bool {
    stmts.iter().any(|stmt| match &stmt.kind {
        StmtKind::Return(Some(Expr {
            kind: ExprKind::Call { callee, .. },
            ..
        })) => callee.as_identifier().is_some_and(|name| {
            table
                .lookup_local(table.root(), name)
                .is_some_and(|id| matches!(table.symbol(id).kind, SymbolKind::Function | SymbolKind::ImportedSymbol))
        }),
        StmtKind::Block(body) | StmtKind::Loop { body } => has_tail_call(body, table),
        StmtKind::If {
            then_branch,
            else_branch,
            ..
        } => {
            has_tail_call(then_branch, table) || else_branch.as_deref().is_some_and(|b| has_tail_call(b, table))
        }
        StmtKind::While { body, .. } | StmtKind::DoWhile { body, .. } | StmtKind::For { body, .. } => {
            has_tail_call(body, table)
        }
        StmtKind::Match { arms, default, .. } => {
            arms.iter().any(|arm| has_tail_call(&arm.body, table))
                || default.as_deref().is_some_and(|d| has_tail_call(d, table))
        }
        _ => false,
    })
}

fn body_has_loops(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| {
        stmt.is_loop()
            || match &stmt.kind {
                StmtKind::Block(body) => body_has_loops(body),
                StmtKind::If {
                    then_branch,
                    else_branch,
                    ..
                } => body_has_loops(then_branch) || else_branch.as_deref().is_some_and(body_has_loops),
                StmtKind::Match { arms, default, .. } => {
                    arms.iter().any(|arm| body_has_loops(&arm.body)) || default.as_deref().is_some_and(body_has_loops)
                }
                _ => false,
            }
    })
}

/// Rough IL instruction estimate: one per statement plus one per
/// non-trivial expression node. The emitter owns the precise size model.
fn estimate_instructions(stmts: &[Stmt]) -> usize {
    fn expr_cost(expr: &Expr) -> usize {
        match &expr.kind {
            ExprKind::Number(_) | ExprKind::Bool(_) | ExprKind::Str(_) | ExprKind::Identifier(_) => 1,
            ExprKind::Member { .. } => 1,
            ExprKind::Unary { operand, .. } => 1 + expr_cost(operand),
            ExprKind::Binary { lhs, rhs, .. } => 1 + expr_cost(lhs) + expr_cost(rhs),
            ExprKind::Assign { target, value } => 1 + expr_cost(target) + expr_cost(value),
            ExprKind::Call { args, .. } => 2 + args.iter().map(expr_cost).sum::<usize>(),
            ExprKind::Index { target, index } => 2 + expr_cost(target) + expr_cost(index),
            ExprKind::ArrayLiteral(items) => items.iter().map(expr_cost).sum::<usize>(),
        }
    }
    stmts
        .iter()
        .map(|stmt| match &stmt.kind {
            StmtKind::Expr(expr) => expr_cost(expr),
            StmtKind::Let(var) => 1 + var.initializer.as_ref().map_or(0, expr_cost),
            StmtKind::Block(body) => estimate_instructions(body),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                1 + expr_cost(condition)
                    + estimate_instructions(then_branch)
                    + else_branch.as_deref().map_or(0, estimate_instructions)
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                2 + expr_cost(condition) + estimate_instructions(body)
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                2 + init.as_deref().map_or(0, |i| estimate_instructions(std::slice::from_ref(i)))
                    + condition.as_ref().map_or(0, expr_cost)
                    + update.as_ref().map_or(0, expr_cost)
                    + estimate_instructions(body)
            }
            StmtKind::Loop { body } => 1 + estimate_instructions(body),
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                expr_cost(scrutinee)
                    + arms
                        .iter()
                        .map(|arm| 1 + expr_cost(&arm.pattern) + estimate_instructions(&arm.body))
                        .sum::<usize>()
                    + default.as_deref().map_or(0, estimate_instructions)
            }
            StmtKind::Return(value) => 1 + value.as_ref().map_or(0, expr_cost),
            StmtKind::Break | StmtKind::Continue => 1,
        })
        .sum()
}

/// Counts reads/writes with loop weighting.
struct AccessCounter {
    counts: IndexMap<String, AccessCounts>,
    multiplier: u64,
    depth: u32,
}

impl AccessCounter {
    fn weight(&self) -> u64 {
        // Cap the exponent; deeper nesting cannot overflow the counter.
        self.multiplier.saturating_pow(self.depth.min(6))
    }

    fn bump(&mut self, name: &str, write: bool) {
        let weight = self.weight();
        let entry = self.counts.entry(name.to_owned()).or_default();
        if write {
            entry.writes += 1;
        } else {
            entry.reads += 1;
        }
        entry.weighted = entry.weighted.saturating_add(weight);
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.walk_expr(expr, false),
            StmtKind::Let(var) => {
                if let Some(init) = &var.initializer {
                    self.walk_expr(init, false);
                }
                self.bump(&var.name, true);
            }
            StmtKind::Block(body) => self.walk_stmts(body),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(condition, false);
                self.walk_stmts(then_branch);
                if let Some(else_branch) = else_branch {
                    self.walk_stmts(else_branch);
                }
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.depth += 1;
                self.walk_expr(condition, false);
                self.walk_stmts(body);
                self.depth -= 1;
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                self.depth += 1;
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(condition) = condition {
                    self.walk_expr(condition, false);
                }
                if let Some(update) = update {
                    self.walk_expr(update, false);
                }
                self.walk_stmts(body);
                self.depth -= 1;
            }
            StmtKind::Loop { body } => {
                self.depth += 1;
                self.walk_stmts(body);
                self.depth -= 1;
            }
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                self.walk_expr(scrutinee, false);
                for arm in arms {
                    self.walk_stmts(&arm.body);
                }
                if let Some(default) = default {
                    self.walk_stmts(default);
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value, false);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr, is_write: bool) {
        match &expr.kind {
            ExprKind::Identifier(name) => self.bump(name, is_write),
            ExprKind::Assign { target, value } => {
                if let Some(name) = target.as_identifier() {
                    self.bump(name, true);
                } else {
                    self.walk_expr(target, true);
                }
                self.walk_expr(value, false);
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs, false);
                self.walk_expr(rhs, false);
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand, false),
            ExprKind::Call { callee, args } => {
                // Function references are not variable accesses.
                if callee.as_identifier().is_none() {
                    self.walk_expr(callee, false);
                }
                for arg in args {
                    self.walk_expr(arg, false);
                }
            }
            ExprKind::Index { target, index } => {
                self.walk_expr(target, is_write);
                self.walk_expr(index, false);
            }
            ExprKind::ArrayLiteral(items) => {
                for item in items {
                    self.walk_expr(item, false);
                }
            }
            ExprKind::Member { .. } | ExprKind::Number(_) | ExprKind::Bool(_) | ExprKind::Str(_) => {}
        }
    }
}

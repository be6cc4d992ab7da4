//! Pointer alias analysis and memory-region classification.
//!
//! Every symbol is tagged with the [`MemoryRegion`] its storage lives in;
//! points-to sets grow from address-of assignments and close transitively
//! over pointer copies. Non-aliasing is proven structurally: different
//! regions never alias, and two `@map` symbols with disjoint fixed ranges
//! never alias. Writes into the code region are flagged as self-modifying
//! code, a warning, since the trick is legitimate on this platform.

use ahash::AHashMap;
use indexmap::{IndexMap, IndexSet};

use crate::ast::{
    AnalysisStore, DeclKind, Expr, ExprKind, MapForm, MetaKey, MetaValue, Program, Stmt, StmtKind, UnaryOp,
};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::scope::{SymbolKind, SymbolTable};
use crate::target::{MemoryRegion, TargetDescriptor};

/// Result of the alias pass for one module.
#[derive(Debug, Default)]
pub struct AliasAnalysis {
    /// Symbol name → region its storage belongs to.
    regions: IndexMap<String, MemoryRegion>,
    /// Symbol name → fixed address range, for `@map` symbols.
    fixed_ranges: AHashMap<String, (u16, u16)>,
    /// Symbol name → symbols it may alias.
    points_to: IndexMap<String, IndexSet<String>>,
}

impl AliasAnalysis {
    #[must_use]
    pub fn region_of(&self, name: &str) -> Option<MemoryRegion> {
        self.regions.get(name).copied()
    }

    /// The points-to set of `name` (empty if it never held an address).
    pub fn points_to_iter(&self, name: &str) -> impl Iterator<Item = &str> {
        self.points_to
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Whether `a` may alias `b` through a recorded points-to relation.
    #[must_use]
    pub fn may_alias(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let a_points_b = self.points_to.get(a).is_some_and(|set| set.contains(b));
        let b_points_a = self.points_to.get(b).is_some_and(|set| set.contains(a));
        let share_target = match (self.points_to.get(a), self.points_to.get(b)) {
            (Some(pa), Some(pb)) => pa.intersection(pb).next().is_some(),
            _ => false,
        };
        a_points_b || b_points_a || share_target
    }

    /// Whether `a` and `b` provably occupy disjoint storage: different
    /// memory regions, or distinct fixed addresses. Symmetric, and never
    /// true when a points-to relation connects the two.
    #[must_use]
    pub fn provably_no_alias(&self, a: &str, b: &str) -> bool {
        if self.may_alias(a, b) {
            return false;
        }
        if let (Some(ra), Some(rb)) = (self.region_of(a), self.region_of(b)) {
            if ra != rb {
                return true;
            }
        }
        if let (Some(&(s1, e1)), Some(&(s2, e2))) = (self.fixed_ranges.get(a), self.fixed_ranges.get(b)) {
            return e1 < s2 || e2 < s1;
        }
        false
    }
}

/// Runs the alias pass over one module.
pub fn analyze_aliases(
    program: &Program,
    table: &SymbolTable,
    store: &mut AnalysisStore,
    target: &TargetDescriptor,
    diagnostics: &mut DiagnosticBag,
) -> AliasAnalysis {
    let mut analysis = AliasAnalysis::default();

    // Region tags from declarations.
    for symbol in table.symbols() {
        let region = match symbol.kind {
            SymbolKind::Function => MemoryRegion::Code,
            SymbolKind::Intrinsic => continue,
            _ => match symbol.storage {
                crate::ast::StorageClass::ZeroPage => MemoryRegion::ZeroPage,
                _ => MemoryRegion::Ram,
            },
        };
        analysis.regions.insert(symbol.name.clone(), region);
    }
    for decl in &program.decls {
        if let DeclKind::Map(map) = &decl.kind {
            let ty_size = store.type_of(decl.id).size().max(1);
            let (start, end) = map_range(&map.form, ty_size);
            let region = target.region_of(start);
            analysis.regions.insert(map.name.clone(), region);
            analysis.fixed_ranges.insert(map.name.clone(), (start, end));
            store.set_region(decl.id, region);
            if region == MemoryRegion::Code {
                diagnostics.report(
                    DiagnosticCode::SelfModifyingCode,
                    format!("'@map {}' binds addresses inside the code region", map.name),
                    decl.location,
                );
            }
        }
    }

    // Direct points-to facts and self-modifying-code checks.
    let mut walker = Walker {
        analysis: &mut analysis,
        copy_edges: Vec::new(),
        store,
        target,
        diagnostics,
    };
    for decl in &program.decls {
        match &decl.kind {
            DeclKind::Variable(var) => {
                if let Some(init) = &var.initializer {
                    walker.record_assignment(&var.name, init, decl.location);
                }
            }
            DeclKind::Function(function) => walker.walk_stmts(&function.body),
            _ => {}
        }
    }
    let copy_edges = walker.copy_edges;

    // Transitive closure over pointer copies.
    let mut changed = true;
    while changed {
        changed = false;
        for (to, from) in &copy_edges {
            let sources: Vec<String> = analysis
                .points_to
                .get(from)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            if sources.is_empty() {
                continue;
            }
            let entry = analysis.points_to.entry(to.clone()).or_default();
            for source in sources {
                changed |= entry.insert(source);
            }
        }
    }

    analysis
}

fn map_range(form: &MapForm, ty_size: usize) -> (u16, u16) {
    let size = u16::try_from(ty_size).unwrap_or(u16::MAX).max(1);
    match form {
        MapForm::Simple { address } | MapForm::Sequential { start: address } => {
            (*address, address.saturating_add(size - 1))
        }
        MapForm::Range { start, end } => (*start, *end),
        MapForm::Explicit { addresses } => {
            let start = addresses.iter().copied().min().unwrap_or(0);
            let end = addresses.iter().copied().max().unwrap_or(0);
            (start, end)
        }
    }
}

struct Walker<'a> {
    analysis: &'a mut AliasAnalysis,
    /// `(to, from)` pointer copies awaiting closure.
    copy_edges: Vec<(String, String)>,
    store: &'a mut AnalysisStore,
    target: &'a TargetDescriptor,
    diagnostics: &'a mut DiagnosticBag,
}

impl Walker<'_> {
    fn record_assignment(&mut self, target_name: &str, value: &Expr, location: crate::source::SourceSpan) {
        match &value.kind {
            ExprKind::Unary {
                op: UnaryOp::AddressOf,
                operand,
            } => {
                if let Some(pointee) = operand.as_identifier() {
                    self.analysis
                        .points_to
                        .entry(target_name.to_owned())
                        .or_default()
                        .insert(pointee.to_owned());
                }
            }
            ExprKind::Identifier(source) => {
                self.copy_edges.push((target_name.to_owned(), source.clone()));
            }
            _ => {}
        }
        if self.analysis.region_of(target_name) == Some(MemoryRegion::Code) {
            self.diagnostics.report(
                DiagnosticCode::SelfModifyingCode,
                format!("write to '{target_name}' lands in the code region"),
                location,
            );
        }
    }

    fn walk_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.walk_expr(expr),
            StmtKind::Let(var) => {
                if let Some(init) = &var.initializer {
                    self.record_assignment(&var.name, init, stmt.location);
                    self.walk_expr(init);
                }
            }
            StmtKind::Block(body) | StmtKind::Loop { body } => self.walk_stmts(body),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.walk_expr(condition);
                self.walk_stmts(then_branch);
                if let Some(else_branch) = else_branch {
                    self.walk_stmts(else_branch);
                }
            }
            StmtKind::While { condition, body } | StmtKind::DoWhile { body, condition } => {
                self.walk_expr(condition);
                self.walk_stmts(body);
            }
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => {
                if let Some(init) = init {
                    self.walk_stmt(init);
                }
                if let Some(condition) = condition {
                    self.walk_expr(condition);
                }
                if let Some(update) = update {
                    self.walk_expr(update);
                }
                self.walk_stmts(body);
            }
            StmtKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                self.walk_expr(scrutinee);
                for arm in arms {
                    self.walk_stmts(&arm.body);
                }
                if let Some(default) = default {
                    self.walk_stmts(default);
                }
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Assign { target, value } => {
                self.walk_expr(value);
                if let Some(name) = target.as_identifier() {
                    self.record_assignment(name, value, expr.location);
                    if self.analysis.region_of(name) == Some(MemoryRegion::Code) {
                        self.store.set(expr.id, MetaKey::SelfModifyingCode, MetaValue::Flag(true));
                    }
                } else {
                    self.walk_expr(target);
                }
            }
            ExprKind::Call { callee, args } => {
                // `poke` with a constant address into the code range is a
                // self-modifying store.
                if callee.as_identifier() == Some("poke") {
                    if let Some(address) = args.first().and_then(|a| self.store.const_value(a.id)) {
                        if let Ok(address) = u16::try_from(address) {
                            if self.target.region_of(address) == MemoryRegion::Code {
                                self.diagnostics.report(
                                    DiagnosticCode::SelfModifyingCode,
                                    format!("poke writes into the code region at ${address:04X}"),
                                    expr.location,
                                );
                                self.store.set(expr.id, MetaKey::SelfModifyingCode, MetaValue::Flag(true));
                            }
                        }
                    }
                }
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.walk_expr(operand),
            ExprKind::Index { target, index } => {
                self.walk_expr(target);
                self.walk_expr(index);
            }
            ExprKind::ArrayLiteral(items) => {
                for item in items {
                    self.walk_expr(item);
                }
            }
            ExprKind::Member { .. }
            | ExprKind::Identifier(_)
            | ExprKind::Number(_)
            | ExprKind::Bool(_)
            | ExprKind::Str(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::AstBuilder;
    use crate::registry::{ImportResolver, ModuleRegistry};
    use crate::symtab::{DepTypes, build_symbol_table};

    fn run(program: &Program) -> (AliasAnalysis, DiagnosticBag, AnalysisStore) {
        let mut registry = ModuleRegistry::new();
        registry.register(program.clone());
        let mut resolver = ImportResolver::new();
        let mut diags = DiagnosticBag::new();
        let built = build_symbol_table(program, &mut resolver, &registry, &DepTypes::default(), &mut diags);
        let mut store = AnalysisStore::new();
        let analysis = analyze_aliases(program, &built.table, &mut store, &TargetDescriptor::c64(), &mut diags);
        (analysis, diags, store)
    }

    #[test]
    fn map_symbols_take_their_region_from_the_target() {
        let mut b = AstBuilder::new();
        let border = b.map_decl("border", MapForm::Simple { address: 0xD020 }, b.ty("byte"));
        let buffer = b.map_decl("buffer", MapForm::Simple { address: 0xC000 }, b.ty("byte"));
        let program = b.program("main", vec![border, buffer]);
        let (analysis, diags, _) = run(&program);
        assert_eq!(analysis.region_of("border"), Some(MemoryRegion::Hardware));
        assert_eq!(analysis.region_of("buffer"), Some(MemoryRegion::Ram));
        assert!(!diags.has_errors());
        // Hardware vs RAM: provably disjoint.
        assert!(analysis.provably_no_alias("border", "buffer"));
        assert!(analysis.provably_no_alias("buffer", "border"));
    }

    #[test]
    fn address_of_propagates_through_pointer_copies() {
        let mut b = AstBuilder::new();
        let x = b.global_var("x", crate::ast::StorageClass::Auto, Some(b.ty("byte")), None);
        let x_ref = b.ident("x");
        let addr = b.unary(UnaryOp::AddressOf, x_ref);
        let p = b.global_var("p", crate::ast::StorageClass::Auto, Some(b.ty("word")), Some(addr));
        let p_ref = b.ident("p");
        let q = b.global_var("q", crate::ast::StorageClass::Auto, Some(b.ty("word")), Some(p_ref));
        let program = b.program("main", vec![x, p, q]);
        let (analysis, _, _) = run(&program);
        assert!(analysis.points_to_iter("p").any(|s| s == "x"));
        assert!(analysis.points_to_iter("q").any(|s| s == "x"));
        assert!(analysis.may_alias("p", "q"));
        assert!(!analysis.provably_no_alias("p", "q"));
    }

    #[test]
    fn poke_into_code_region_warns_about_self_modifying_code() {
        let mut b = AstBuilder::new();
        let f = {
            let addr = b.number(0x0810);
            let value = b.number(0xEA);
            let poke = b.call_named("poke", vec![addr, value]);
            let stmt = b.expr_stmt(poke);
            b.function("patch", vec![], None, vec![stmt])
        };
        let program = b.program("main", vec![f]);
        let mut registry = ModuleRegistry::new();
        registry.register(program.clone());
        let mut resolver = ImportResolver::new();
        let mut diags = DiagnosticBag::new();
        let built = build_symbol_table(&program, &mut resolver, &registry, &DepTypes::default(), &mut diags);
        let mut store = AnalysisStore::new();
        // The type checker would have folded the literal.
        fn fold(stmts: &[Stmt], store: &mut AnalysisStore) {
            for stmt in stmts {
                if let StmtKind::Expr(Expr {
                    kind: ExprKind::Call { args, .. },
                    ..
                }) = &stmt.kind
                {
                    for arg in args {
                        if let ExprKind::Number(n) = arg.kind {
                            store.set_const_value(arg.id, u64::from(n));
                        }
                    }
                }
            }
        }
        if let DeclKind::Function(function) = &program.decls[0].kind {
            fold(&function.body, &mut store);
        }
        analyze_aliases(&program, &built.table, &mut store, &TargetDescriptor::c64(), &mut diags);
        assert_eq!(diags.with_code(DiagnosticCode::SelfModifyingCode).count(), 1);
        assert!(!diags.has_errors());
    }

    #[test]
    fn hardware_writes_never_warn() {
        let mut b = AstBuilder::new();
        let border = b.map_decl("border", MapForm::Simple { address: 0xD020 }, b.ty("byte"));
        let f = {
            let target = b.ident("border");
            let zero = b.number(0);
            let assign = b.assign(target, zero);
            let stmt = b.expr_stmt(assign);
            b.function("blank", vec![], None, vec![stmt])
        };
        let program = b.program("main", vec![border, f]);
        let (_, diags, _) = run(&program);
        assert_eq!(diags.with_code(DiagnosticCode::SelfModifyingCode).count(), 0);
    }
}

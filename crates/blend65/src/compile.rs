//! The compilation pipeline.
//!
//! One [`Compiler`] owns a compilation: it registers the parsed modules,
//! orders them by import dependencies, runs the per-module passes (symbols
//! → types → CFG → call graph → loop/alias/hint analyses), then the global
//! passes (memory layout → frames → IL). Every pass appends to one ordered
//! diagnostic stream and keeps going after errors; only IL generation is
//! gated on an error-free program.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::alias::{AliasAnalysis, analyze_aliases};
use crate::ast::{AnalysisStore, DeclKind, Program};
use crate::callgraph::{CallGraph, CallGraphBuilder};
use crate::cfg::{ControlFlowGraph, build_cfg};
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticCode, Severity};
use crate::frames::{FrameMap, allocate_frames};
use crate::globals::GlobalSymbolTable;
use crate::hints::{Hint, analyze_hints};
use crate::il::{IlProgram, generate_il};
use crate::layout::{MemoryLayout, build_memory_layout};
use crate::loops::{LoopInfo, analyze_loops};
use crate::options::CompileOptions;
use crate::registry::{ImportResolver, ModuleRegistry};
use crate::scope::SymbolTable;
use crate::source::SourceRegistry;
use crate::symtab::{DepTypes, build_symbol_table};
use crate::target::TargetDescriptor;
use crate::tracer::{NoopTracer, PassTracer};
use crate::typecheck::{DepValues, TypeChecker};
use crate::types::TypeSystem;

/// Per-module artifacts accumulated by the pipeline.
#[derive(Debug)]
pub struct ModuleAnalysis {
    pub name: String,
    pub table: SymbolTable,
    pub types: TypeSystem,
    pub store: AnalysisStore,
    /// Function name → CFG.
    pub cfgs: IndexMap<String, ControlFlowGraph>,
    /// Function name → loop analysis.
    pub loops: IndexMap<String, Vec<LoopInfo>>,
    pub alias: AliasAnalysis,
    pub hints: Vec<Hint>,
    /// False when this module's own passes recorded errors; downstream
    /// global passes still run, IL generation skips the module.
    pub success: bool,
}

/// Summary counters reported through the tracer and on the output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileStatistics {
    pub module_count: usize,
    pub function_count: usize,
    pub symbol_count: usize,
    pub errors: usize,
    pub warnings: usize,
    pub infos: usize,
}

/// Everything the middle-end hands downstream.
#[derive(Debug)]
pub struct CompileOutput {
    pub modules: IndexMap<String, ModuleAnalysis>,
    pub globals: GlobalSymbolTable,
    pub call_graph: CallGraph,
    pub layout: MemoryLayout,
    pub frames: FrameMap,
    /// Present only when no error-severity diagnostic was recorded.
    pub il: Option<IlProgram>,
    pub diagnostics: Vec<Diagnostic>,
    pub statistics: CompileStatistics,
    pub sources: SourceRegistry,
    pub success: bool,
}

impl CompileOutput {
    /// Diagnostics with the given code, in emission order.
    pub fn diagnostics_with(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }
}

/// The middle-end driver.
#[derive(Debug)]
pub struct Compiler<Tr: PassTracer = NoopTracer> {
    target: TargetDescriptor,
    options: CompileOptions,
    tracer: Tr,
}

impl Compiler<NoopTracer> {
    #[must_use]
    pub fn new(target: TargetDescriptor, options: CompileOptions) -> Self {
        Self {
            target,
            options,
            tracer: NoopTracer,
        }
    }
}

impl<Tr: PassTracer> Compiler<Tr> {
    /// Compiler with an explicit tracer implementation.
    #[must_use]
    pub fn with_tracer(target: TargetDescriptor, options: CompileOptions, tracer: Tr) -> Self {
        Self {
            target,
            options,
            tracer,
        }
    }

    /// Consumes the compiler, returning the tracer (to read recordings).
    #[must_use]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Runs the whole middle-end over a set of parsed modules.
    ///
    /// `parser_diagnostics` are forwarded first so the output stream starts
    /// with upstream problems; `sources` feeds diagnostic snippets and is
    /// returned in the output so formatters can render them.
    pub fn compile(
        &mut self,
        programs: Vec<Program>,
        parser_diagnostics: Vec<Diagnostic>,
        sources: SourceRegistry,
    ) -> CompileOutput {
        let mut diagnostics = DiagnosticBag::new();
        let mut traced = 0usize;
        diagnostics.extend(parser_diagnostics);

        let mut registry = ModuleRegistry::new();
        let mut globals = GlobalSymbolTable::new();
        for program in programs {
            globals.add_module(&program);
            registry.register(program);
        }
        let mut resolver = ImportResolver::new();

        let order = module_order(&registry, &mut diagnostics);
        self.trace_new(&diagnostics, &mut traced);

        // Per-module passes, dependencies first.
        let mut modules: IndexMap<String, ModuleAnalysis> = IndexMap::new();
        let mut dep_types = DepTypes::default();
        let mut dep_values = DepValues::default();
        let mut call_graph_builder = CallGraphBuilder::new();
        for name in order {
            let analysis = self.run_module_passes(
                &name,
                &registry,
                &mut resolver,
                &globals,
                &dep_types,
                &dep_values,
                &mut call_graph_builder,
                &mut diagnostics,
            );
            self.trace_new(&diagnostics, &mut traced);
            record_exports(&registry, &analysis, &mut dep_types, &mut dep_values);
            modules.insert(name, analysis);
        }

        // Whole-program passes.
        self.tracer.on_pass_start("call-graph", None);
        let call_graph = call_graph_builder.finish();
        for node in call_graph.recursive_functions() {
            diagnostics.report_info(
                DiagnosticCode::RecursionInfo,
                format!(
                    "function '{}' participates in recursion; per-call stack usage cannot be statically bounded",
                    node.function
                ),
                node.location,
            );
        }
        self.tracer.on_pass_end("call-graph", None);
        self.trace_new(&diagnostics, &mut traced);

        if self.options.optimize() {
            self.run_hint_pass(&registry, &mut modules, &call_graph);
        }

        self.tracer.on_pass_start("memory-layout", None);
        let layout_inputs: IndexMap<String, (&Program, &AnalysisStore)> = modules
            .iter()
            .map(|(name, analysis)| {
                let program = &registry.get(name).expect("registered").program;
                (name.clone(), (program, &analysis.store))
            })
            .collect();
        let layout = build_memory_layout(&layout_inputs, &self.target, &mut diagnostics);
        self.tracer.on_pass_end("memory-layout", None);
        self.trace_new(&diagnostics, &mut traced);

        self.tracer.on_pass_start("frames", None);
        let frame_inputs: IndexMap<String, (&Program, &SymbolTable)> = modules
            .iter()
            .map(|(name, analysis)| {
                let program = &registry.get(name).expect("registered").program;
                (name.clone(), (program, &analysis.table))
            })
            .collect();
        let frames = allocate_frames(&frame_inputs, &call_graph, &self.target, &mut diagnostics);
        self.tracer.on_pass_end("frames", None);
        self.trace_new(&diagnostics, &mut traced);

        // Errors block code emission; warnings and info do not.
        let il = if diagnostics.has_errors() {
            None
        } else {
            self.tracer.on_pass_start("il-generation", None);
            let il_inputs: IndexMap<String, crate::il::ModuleLowerInput<'_>> = modules
                .iter()
                .filter(|(_, analysis)| analysis.success)
                .map(|(name, analysis)| {
                    let program = &registry.get(name).expect("registered").program;
                    (
                        name.clone(),
                        crate::il::ModuleLowerInput {
                            program,
                            table: &analysis.table,
                            store: &analysis.store,
                        },
                    )
                })
                .collect();
            let il = generate_il(&il_inputs, &layout, &frames, &self.target, &self.options);
            self.tracer.on_pass_end("il-generation", None);
            Some(il)
        };

        let statistics = CompileStatistics {
            module_count: modules.len(),
            function_count: modules
                .values()
                .map(|m| registry.get(&m.name).map_or(0, |r| r.program.functions().count()))
                .sum(),
            symbol_count: modules.values().map(|m| m.table.symbol_count()).sum(),
            errors: diagnostics.count(Severity::Error),
            warnings: diagnostics.count(Severity::Warning),
            infos: diagnostics.count(Severity::Info),
        };
        self.tracer.on_statistic("modules", statistics.module_count);
        self.tracer.on_statistic("functions", statistics.function_count);
        self.tracer.on_statistic("symbols", statistics.symbol_count);
        self.tracer.on_statistic("diagnostics", diagnostics.len());

        let success = !diagnostics.has_errors();
        CompileOutput {
            modules,
            globals,
            call_graph,
            layout,
            frames,
            il,
            diagnostics: diagnostics.into_vec(),
            statistics,
            sources,
            success,
        }
    }

    #[expect(clippy::too_many_arguments, reason = "pass wiring, called once per module")]
    fn run_module_passes(
        &mut self,
        name: &str,
        registry: &ModuleRegistry,
        resolver: &mut ImportResolver,
        globals: &GlobalSymbolTable,
        dep_types: &DepTypes,
        dep_values: &DepValues,
        call_graph_builder: &mut CallGraphBuilder,
        diagnostics: &mut DiagnosticBag,
    ) -> ModuleAnalysis {
        let program = &registry.get(name).expect("ordered modules are registered").program;
        let errors_before = diagnostics.count(Severity::Error);

        self.tracer.on_pass_start("symbol-table", Some(name));
        let built = build_symbol_table(program, resolver, registry, dep_types, diagnostics);
        let mut table = built.table;
        let mut types = built.types;
        self.tracer.on_pass_end("symbol-table", Some(name));

        self.tracer.on_pass_start("type-check", Some(name));
        let mut store = AnalysisStore::new();
        TypeChecker::new(program, &mut table, &mut types, &mut store, globals, dep_values, diagnostics).check();
        self.tracer.on_pass_end("type-check", Some(name));

        self.tracer.on_pass_start("control-flow", Some(name));
        let mut cfgs = IndexMap::new();
        for function in program.functions() {
            cfgs.insert(function.name.clone(), build_cfg(&function.name, function, diagnostics));
        }
        self.tracer.on_pass_end("control-flow", Some(name));

        call_graph_builder.add_module(program, &table);

        let mut loops = IndexMap::new();
        if self.options.optimize() {
            self.tracer.on_pass_start("loops", Some(name));
            for function in program.functions() {
                loops.insert(
                    function.name.clone(),
                    analyze_loops(&function.name, function, &mut store, &self.options),
                );
            }
            self.tracer.on_pass_end("loops", Some(name));
        }

        self.tracer.on_pass_start("alias", Some(name));
        let alias = analyze_aliases(program, &table, &mut store, &self.target, diagnostics);
        self.tracer.on_pass_end("alias", Some(name));

        let success = diagnostics.count(Severity::Error) == errors_before;
        ModuleAnalysis {
            name: name.to_owned(),
            table,
            types,
            store,
            cfgs,
            loops,
            alias,
            hints: Vec::new(),
            success,
        }
    }

    /// Forwards freshly recorded diagnostics to the tracer.
    fn trace_new(&mut self, diagnostics: &DiagnosticBag, traced: &mut usize) {
        for diagnostic in diagnostics.iter().skip(*traced) {
            self.tracer.on_diagnostic(diagnostic);
        }
        *traced = diagnostics.len();
    }

    /// Computes hints for every module; requires the finished call graph,
    /// so it runs as a dedicated pass.
    fn run_hint_pass(
        &mut self,
        registry: &ModuleRegistry,
        modules: &mut IndexMap<String, ModuleAnalysis>,
        call_graph: &CallGraph,
    ) {
        for analysis in modules.values_mut() {
            let Some(module) = registry.get(&analysis.name) else { continue };
            self.tracer.on_pass_start("hints", Some(&analysis.name));
            analysis.hints = analyze_hints(&module.program, &analysis.table, call_graph, &self.options);
            self.tracer.on_pass_end("hints", Some(&analysis.name));
        }
    }
}

/// Records one checked module's exported types and value types for modules
/// compiled after it.
fn record_exports(
    registry: &ModuleRegistry,
    analysis: &ModuleAnalysis,
    dep_types: &mut DepTypes,
    dep_values: &mut DepValues,
) {
    let Some(module) = registry.get(&analysis.name) else { return };
    let mut types = AHashMap::new();
    for decl in &module.program.decls {
        if !decl.is_exported() {
            continue;
        }
        if let DeclKind::Enum(_) | DeclKind::TypeAlias(_) = decl.kind {
            if let Some(name) = decl.name() {
                if let Some(ty) = analysis.types.lookup(name) {
                    types.insert(name.to_owned(), ty);
                }
            }
        }
    }
    dep_types.insert(analysis.name.clone(), types);

    let mut values = AHashMap::new();
    for symbol in analysis.table.exports() {
        if let Some(ty) = &symbol.ty {
            values.insert(symbol.name.clone(), ty.clone());
        }
    }
    dep_values.insert(analysis.name.clone(), values);
}

/// Topological order over import dependencies, leaves first. Import cycles
/// are an error; the cycle members keep registration order so later passes
/// still see every module.
fn module_order(registry: &ModuleRegistry, diagnostics: &mut DiagnosticBag) -> Vec<String> {
    let mut order = Vec::with_capacity(registry.len());
    let mut visiting = AHashSet::new();
    let mut done = AHashSet::new();
    let mut cycle_reported = false;

    fn visit(
        name: &str,
        registry: &ModuleRegistry,
        visiting: &mut AHashSet<String>,
        done: &mut AHashSet<String>,
        order: &mut Vec<String>,
        diagnostics: &mut DiagnosticBag,
        cycle_reported: &mut bool,
    ) {
        if done.contains(name) {
            return;
        }
        if !visiting.insert(name.to_owned()) {
            if !*cycle_reported {
                *cycle_reported = true;
                diagnostics.report(
                    DiagnosticCode::ModuleCycle,
                    format!("module dependency cycle involving '{name}'"),
                    crate::source::SourceSpan::synthetic(),
                );
            }
            return;
        }
        if let Some(module) = registry.get(name) {
            for decl in &module.program.decls {
                if let DeclKind::Import(import) = &decl.kind {
                    if registry.contains(&import.module) {
                        visit(&import.module, registry, visiting, done, order, diagnostics, cycle_reported);
                    }
                }
            }
        }
        visiting.remove(name);
        if done.insert(name.to_owned()) {
            order.push(name.to_owned());
        }
    }

    let names: Vec<String> = registry.names().map(str::to_owned).collect();
    for name in names {
        visit(
            &name,
            registry,
            &mut visiting,
            &mut done,
            &mut order,
            diagnostics,
            &mut cycle_reported,
        );
    }
    order
}

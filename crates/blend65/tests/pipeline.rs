//! Pipeline-level behavior: pass tracing, statistics, forwarded parser
//! diagnostics, serialized outputs, and snippet rendering through the
//! source registry.

use blend65::{
    AstBuilder, CompileOptions, Compiler, Diagnostic, DiagnosticCode, MapForm, MemoryLayout, OptLevel, Program,
    RecordingTracer, SourceRegistry, SourceSpan, StorageClass, TargetDescriptor, TraceEvent,
};
use pretty_assertions::assert_eq;

fn trivial_module() -> Program {
    let mut b = AstBuilder::new();
    let f = {
        let one = b.number(1);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(one));
        b.function("main", vec![], Some(ret_ty), vec![ret_stmt])
    };
    b.program("main", vec![f])
}

#[test]
fn passes_run_in_dependency_order() {
    let mut compiler = Compiler::with_tracer(
        TargetDescriptor::c64(),
        CompileOptions::default(),
        RecordingTracer::new(),
    );
    let output = compiler.compile(vec![trivial_module()], vec![], SourceRegistry::new());
    assert!(output.success);

    let tracer = compiler.into_tracer();
    let passes = tracer.pass_names();
    let position = |name: &str| {
        passes
            .iter()
            .position(|p| *p == name)
            .unwrap_or_else(|| panic!("pass {name} missing from {passes:?}"))
    };
    assert!(position("symbol-table") < position("type-check"));
    assert!(position("type-check") < position("control-flow"));
    assert!(position("control-flow") < position("call-graph"));
    assert!(position("call-graph") < position("memory-layout"));
    assert!(position("memory-layout") < position("frames"));
    assert!(position("frames") < position("il-generation"));
}

#[test]
fn statistics_count_modules_functions_and_symbols() {
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    let output = compiler.compile(vec![trivial_module()], vec![], SourceRegistry::new());
    assert_eq!(output.statistics.module_count, 1);
    assert_eq!(output.statistics.function_count, 1);
    // main plus the four seeded intrinsics.
    assert_eq!(output.statistics.symbol_count, 5);
    assert_eq!(output.statistics.errors, 0);
}

#[test]
fn parser_diagnostics_lead_the_stream_and_errors_block_emission() {
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    let parse_error = Diagnostic::new(
        DiagnosticCode::TypeMismatch,
        "upstream parse problem",
        SourceSpan::synthetic(),
    );
    let output = compiler.compile(vec![trivial_module()], vec![parse_error], SourceRegistry::new());
    assert!(!output.success);
    assert!(output.il.is_none());
    assert_eq!(output.diagnostics[0].message, "upstream parse problem");
}

#[test]
fn diagnostics_render_with_the_registered_source_line() {
    let mut sources = SourceRegistry::new();
    let id = sources.register("main.bl65", "function f(): void { break; }");

    let mut b = AstBuilder::for_source(id);
    let f = {
        b.at(1, 22);
        let brk = b.brk();
        b.function("f", vec![], None, vec![brk])
    };
    let program = b.program("main", vec![f]);

    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    let output = compiler.compile(vec![program], vec![], sources);
    let diagnostic = output
        .diagnostics_with(DiagnosticCode::ControlFlowOutsideLoop)
        .next()
        .unwrap();
    let rendered = diagnostic.render(&output.sources);
    assert!(rendered.contains("CONTROL_FLOW_OUTSIDE_LOOP"));
    assert!(rendered.contains("function f(): void { break; }"), "{rendered}");
}

#[test]
fn o0_skips_the_optimization_analyses() {
    let options = CompileOptions {
        opt_level: OptLevel::O0,
        ..CompileOptions::default()
    };
    let mut compiler = Compiler::new(TargetDescriptor::c64(), options);
    let output = compiler.compile(vec![trivial_module()], vec![], SourceRegistry::new());
    assert!(output.success);
    let module = &output.modules["main"];
    assert!(module.loops.is_empty());
    assert!(module.hints.is_empty());
}

/// Downstream tools (the source-map writer, the VICE label emitter) read
/// the serialized plan; the JSON form must survive a round trip unchanged.
#[test]
fn layout_and_diagnostics_round_trip_through_json() {
    let mut b = AstBuilder::new();
    let fast = b.global_var("fast", StorageClass::ZeroPage, Some(b.ty("word")), None);
    let border = b.map_decl("border", MapForm::Simple { address: 0xD020 }, b.ty("byte"));
    let f = {
        let brk = b.brk();
        b.function("f", vec![], None, vec![brk])
    };
    let program = b.program("main", vec![fast, border, f]);
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    let output = compiler.compile(vec![program], vec![], SourceRegistry::new());

    let json = serde_json::to_string(&output.layout).unwrap();
    let layout: MemoryLayout = serde_json::from_str(&json).unwrap();
    assert_eq!(layout.zero_page, output.layout.zero_page);
    assert_eq!(layout.maps, output.layout.maps);
    assert_eq!(layout.statistics, output.layout.statistics);

    // The stray break produced a located diagnostic; it survives too.
    let json = serde_json::to_string(&output.diagnostics).unwrap();
    let diagnostics: Vec<Diagnostic> = serde_json::from_str(&json).unwrap();
    assert_eq!(diagnostics, output.diagnostics);
}

#[test]
fn trace_events_include_diagnostics() {
    let mut b = AstBuilder::new();
    let f = {
        let brk = b.brk();
        b.function("f", vec![], None, vec![brk])
    };
    let program = b.program("main", vec![f]);
    let mut compiler = Compiler::with_tracer(
        TargetDescriptor::c64(),
        CompileOptions::default(),
        RecordingTracer::new(),
    );
    let _ = compiler.compile(vec![program], vec![], SourceRegistry::new());
    let tracer = compiler.into_tracer();
    assert!(tracer.events().iter().any(|e| matches!(
        e,
        TraceEvent::Diagnostic { rendered } if rendered.contains("CONTROL_FLOW_OUTSIDE_LOOP")
    )));
}

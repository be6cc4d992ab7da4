//! Cross-module compilation: imports, the global symbol table, and
//! dependency ordering.

use blend65::{
    AstBuilder, CompileOptions, CompileOutput, Compiler, DiagnosticCode, Program, SimpleLookup, SourceRegistry,
    TargetDescriptor,
};

fn compile(programs: Vec<Program>) -> CompileOutput {
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    compiler.compile(programs, vec![], SourceRegistry::new())
}

fn module_a() -> Program {
    let mut b = AstBuilder::new();
    let helper = {
        let one = b.number(1);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(one));
        let decl = b.function("helper", vec![], Some(ret_ty), vec![ret_stmt]);
        AstBuilder::export(decl)
    };
    b.program("A", vec![helper])
}

fn module_b() -> Program {
    let mut b = AstBuilder::new();
    let import = b.import(&["helper"], "A");
    let main = {
        let call = b.call_named("helper", vec![]);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(call));
        b.function("main", vec![], Some(ret_ty), vec![ret_stmt])
    };
    b.program("B", vec![import, main])
}

#[test]
fn forward_reference_across_modules_compiles() {
    // Registration order does not matter; the importer is handed first.
    let output = compile(vec![module_b(), module_a()]);
    assert!(output.success, "{:?}", output.diagnostics);

    let found = output.globals.lookup_qualified("A", "helper");
    assert!(found.is_some());
    let node = output.call_graph.node("B::main").unwrap();
    assert!(node.callees.contains("A::helper"));
}

#[test]
fn imported_calls_lower_through_the_exporters_frame() {
    let output = compile(vec![module_a(), module_b()]);
    let il = output.il.expect("clean compile");
    let main = il.function("B::main").unwrap();
    let helper_frame = output.frames.frame("A::helper").unwrap();
    let return_slot = helper_frame.return_slot_address().unwrap();

    // The call references the qualified callee and reads its return slot.
    let rendered = format!("{main:?}");
    assert!(rendered.contains("A::helper"), "{rendered}");
    assert!(
        main.blocks.iter().any(|block| {
            block.instructions.iter().any(|i| {
                matches!(&i.op, blend65::Op::Load(blend65::Place::Slot { address }) if *address == return_slot)
            })
        }),
        "caller should load the callee's return slot",
    );
}

#[test]
fn importing_a_missing_module_fails() {
    let mut b = AstBuilder::new();
    let import = b.import(&["helper"], "Nowhere");
    let output = compile(vec![b.program("B", vec![import])]);
    assert!(!output.success);
    assert_eq!(output.diagnostics_with(DiagnosticCode::ModuleNotFound).count(), 1);
}

#[test]
fn importing_an_unexported_symbol_fails() {
    let mut a = AstBuilder::new();
    let private = {
        let one = a.number(1);
        let ret_ty = a.ty("byte");
        let ret_stmt = a.ret(Some(one));
        a.function("secret", vec![], Some(ret_ty), vec![ret_stmt])
    };
    let module_a = a.program("A", vec![private]);

    let mut b = AstBuilder::new();
    let import = b.import(&["secret"], "A");
    let output = compile(vec![module_a, b.program("B", vec![import])]);
    assert_eq!(output.diagnostics_with(DiagnosticCode::SymbolNotExported).count(), 1);
}

#[test]
fn wildcard_import_of_an_empty_module_reports_no_exports() {
    let a = AstBuilder::new();
    let module_a = a.program("A", vec![]);
    let mut b = AstBuilder::new();
    let import = b.import_all("A");
    let output = compile(vec![module_a, b.program("B", vec![import])]);
    assert_eq!(output.diagnostics_with(DiagnosticCode::NoExports).count(), 1);
}

#[test]
fn ambiguous_simple_names_require_qualification() {
    fn exporter(module: &str) -> Program {
        let mut b = AstBuilder::new();
        let init = {
            let one = b.number(1);
            let ret_ty = b.ty("byte");
            let ret_stmt = b.ret(Some(one));
            let decl = b.function("init", vec![], Some(ret_ty), vec![ret_stmt]);
            AstBuilder::export(decl)
        };
        b.program(module, vec![init])
    }
    let output = compile(vec![exporter("Gfx"), exporter("Sfx")]);
    match output.globals.lookup_simple("init") {
        SimpleLookup::Ambiguous(candidates) => assert_eq!(candidates.len(), 2),
        other => panic!("expected ambiguity, got {other:?}"),
    }
}

#[test]
fn import_cycles_are_an_error() {
    let mut a = AstBuilder::new();
    let a_import = a.import(&["b_fn"], "B");
    let a_fn = {
        let one = a.number(1);
        let ret_ty = a.ty("byte");
        let ret_stmt = a.ret(Some(one));
        let decl = a.function("a_fn", vec![], Some(ret_ty), vec![ret_stmt]);
        AstBuilder::export(decl)
    };
    let module_a = a.program("A", vec![a_import, a_fn]);

    let mut b = AstBuilder::new();
    let b_import = b.import(&["a_fn"], "A");
    let b_fn = {
        let one = b.number(1);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(one));
        let decl = b.function("b_fn", vec![], Some(ret_ty), vec![ret_stmt]);
        AstBuilder::export(decl)
    };
    let module_b = b.program("B", vec![b_import, b_fn]);

    let output = compile(vec![module_a, module_b]);
    assert!(!output.success);
    assert_eq!(output.diagnostics_with(DiagnosticCode::ModuleCycle).count(), 1);
}

#[test]
fn wildcard_import_brings_every_export_into_scope() {
    let mut a = AstBuilder::new();
    let f1 = {
        let one = a.number(1);
        let ret_ty = a.ty("byte");
        let ret_stmt = a.ret(Some(one));
        let decl = a.function("first", vec![], Some(ret_ty), vec![ret_stmt]);
        AstBuilder::export(decl)
    };
    let f2 = {
        let two = a.number(2);
        let ret_ty = a.ty("byte");
        let ret_stmt = a.ret(Some(two));
        let decl = a.function("second", vec![], Some(ret_ty), vec![ret_stmt]);
        AstBuilder::export(decl)
    };
    let module_a = a.program("A", vec![f1, f2]);

    let mut b = AstBuilder::new();
    let import = b.import_all("A");
    let caller = {
        let c1 = b.call_named("first", vec![]);
        let s1 = b.expr_stmt(c1);
        let c2 = b.call_named("second", vec![]);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(c2));
        b.function("caller", vec![], Some(ret_ty), vec![s1, ret_stmt])
    };
    let output = compile(vec![module_a, b.program("B", vec![import, caller])]);
    assert!(output.success, "{:?}", output.diagnostics);
    let node = output.call_graph.node("B::caller").unwrap();
    assert!(node.callees.contains("A::first"));
    assert!(node.callees.contains("A::second"));
}

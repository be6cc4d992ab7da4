//! Call-graph construction and recursion handling through the public
//! pipeline.

use blend65::{
    AstBuilder, BinaryOp, CompileOptions, CompileOutput, Compiler, DiagnosticCode, Program, Severity,
    SourceRegistry, TargetDescriptor,
};

fn compile(programs: Vec<Program>) -> CompileOutput {
    let mut compiler = Compiler::new(TargetDescriptor::c64(), CompileOptions::default());
    compiler.compile(programs, vec![], SourceRegistry::new())
}

/// `function factorial(n: byte): byte { if (n == 0) return 1; return n * factorial(n - 1); }`
fn factorial_module() -> Program {
    let mut b = AstBuilder::new();
    let decl = {
        let n = b.ident("n");
        let zero = b.number(0);
        let is_zero = b.binary(BinaryOp::Eq, n, zero);
        let one = b.number(1);
        let base_case = b.ret(Some(one));
        let branch = b.if_stmt(is_zero, vec![base_case], None);
        let n2 = b.ident("n");
        let one2 = b.number(1);
        let n_minus_one = b.binary(BinaryOp::Sub, n2, one2);
        let recurse = b.call_named("factorial", vec![n_minus_one]);
        let n3 = b.ident("n");
        let product = b.binary(BinaryOp::Mul, n3, recurse);
        let tail = b.ret(Some(product));
        let param = b.param("n", b.ty("byte"));
        let ret_ty = b.ty("byte");
        b.function("factorial", vec![param], Some(ret_ty), vec![branch, tail])
    };
    b.program("main", vec![decl])
}

#[test]
fn direct_recursion_compiles_with_exactly_one_info() {
    let output = compile(vec![factorial_module()]);
    assert!(output.success, "{:?}", output.diagnostics);

    let infos: Vec<_> = output
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Info)
        .collect();
    assert_eq!(infos.len(), 1, "expected exactly one info, got {infos:?}");
    assert_eq!(infos[0].code, DiagnosticCode::RecursionInfo);
    assert!(infos[0].message.contains("factorial"));
}

#[test]
fn direct_recursion_is_visible_in_the_call_graph() {
    let output = compile(vec![factorial_module()]);
    assert!(output.call_graph.is_directly_recursive("factorial"));
    assert!(output.call_graph.is_recursive("factorial"));
    // Unbounded call depth.
    assert_eq!(output.call_graph.max_call_depth("factorial"), None);
}

#[test]
fn recursive_functions_still_get_il_and_a_private_frame() {
    let output = compile(vec![factorial_module()]);
    let il = output.il.expect("recursion is not an error");
    assert!(il.function("main::factorial").is_some());
    let frame = output.frames.frame("main::factorial").unwrap();
    // return byte + param byte.
    assert_eq!(frame.size, 2);
    // No other function exists, so nothing could share; the invariant that
    // matters is that the frame got a base inside the region.
    assert!(output.frames.region.contains(frame.base_address));
}

#[test]
fn call_chain_depth_and_entry_points() {
    let mut b = AstBuilder::new();
    let leaf = {
        let one = b.number(1);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(one));
        b.function("leaf", vec![], Some(ret_ty), vec![ret_stmt])
    };
    let mid = {
        let call = b.call_named("leaf", vec![]);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(call));
        b.function("mid", vec![], Some(ret_ty), vec![ret_stmt])
    };
    let top = {
        let call = b.call_named("mid", vec![]);
        let ret_ty = b.ty("byte");
        let ret_stmt = b.ret(Some(call));
        b.function("top", vec![], Some(ret_ty), vec![ret_stmt])
    };
    let output = compile(vec![b.program("main", vec![leaf, mid, top])]);
    assert!(output.success);
    assert_eq!(output.call_graph.max_call_depth("top"), Some(2));
    assert_eq!(output.call_graph.entry_points(), vec!["main::top"]);
    assert_eq!(
        output.call_graph.unreachable_from("mid"),
        vec!["main::top"]
    );
}

#[test]
fn every_call_edge_has_a_recorded_call_site() {
    let output = compile(vec![factorial_module()]);
    let node = output.call_graph.node("factorial").unwrap();
    for callee in &node.callees {
        let sites = node.call_sites.get(callee).expect("edge without call site");
        assert!(!sites.is_empty());
    }
    // Symmetry: factorial calls itself, so it is its own caller.
    assert!(node.callers.contains(&node.function));
}
